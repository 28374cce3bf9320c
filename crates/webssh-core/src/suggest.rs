//! Command suggestions.

use async_trait::async_trait;

use crate::{SessionError, SuggestionError, validation::validate_command_text};

/// Flag hints per recognized command.
const HINTS: &[(&[&str], &[&str])] = &[
    (
        &["ls"],
        &[
            "ls -la - list all files, including hidden ones, in long format",
            "ls -lh - long format with human-readable sizes",
            "ls -lt - sort by modification time, newest first",
        ],
    ),
    (
        &["cd"],
        &[
            "cd ~ - go to the home directory",
            "cd - - go back to the previous directory",
            "cd .. - go up one directory",
        ],
    ),
    (
        &["mkdir"],
        &[
            "mkdir -p - create parent directories as needed",
            "mkdir -m 755 - create with the given mode",
        ],
    ),
    (
        &["rm"],
        &[
            "rm -i - prompt before every removal",
            "rm -r - remove directories and their contents",
            "rm -f - ignore nonexistent files, never prompt",
        ],
    ),
    (
        &["cp"],
        &[
            "cp -r - copy directories recursively",
            "cp -p - preserve mode, ownership and timestamps",
            "cp -i - prompt before overwrite",
        ],
    ),
    (
        &["mv"],
        &[
            "mv -i - prompt before overwrite",
            "mv -n - do not overwrite an existing file",
            "mv -v - explain what is being done",
        ],
    ),
    (
        &["ps"],
        &[
            "ps aux - show every process with owner and resource usage",
            "ps -ef - full-format listing of all processes",
            "ps -u <user> - processes of one user",
        ],
    ),
    (
        &["grep"],
        &[
            "grep -r - search directories recursively",
            "grep -i - ignore case",
            "grep -n - prefix each match with its line number",
        ],
    ),
    (
        &["find"],
        &[
            "find . -name <pattern> - search by file name",
            "find . -type f - only regular files",
            "find . -mtime -1 - modified within the last day",
        ],
    ),
    (
        &["chmod"],
        &[
            "chmod 755 - rwx for owner, rx for group and others",
            "chmod +x - make executable",
            "chmod -R - change recursively",
        ],
    ),
    (
        &["chown"],
        &[
            "chown user:group - change owner and group",
            "chown -R - change recursively",
        ],
    ),
    (
        &["tar"],
        &[
            "tar -czvf archive.tar.gz <dir> - create a gzip archive",
            "tar -xzvf archive.tar.gz - extract a gzip archive",
            "tar -tvf archive.tar - list archive contents",
        ],
    ),
    (
        &["netstat"],
        &[
            "netstat -tuln - listening TCP and UDP ports",
            "netstat -anp - all sockets with owning process",
        ],
    ),
    (
        &["df"],
        &[
            "df -h - disk usage with human-readable sizes",
            "df -i - inode usage",
        ],
    ),
    (
        &["du"],
        &[
            "du -sh - total size of a directory",
            "du -h --max-depth=1 - size of each subdirectory",
        ],
    ),
    (
        &["top", "htop"],
        &[
            "top -u <user> - processes of one user",
            "htop - interactive process viewer",
            "top -o %MEM - sort by memory usage",
        ],
    ),
];

/// Rule-based hints for `text`, used when no external provider answers.
///
/// # Errors
/// Returns [`SessionError::Validation`] when the text fails
/// [`validate_command_text`].
pub fn local_suggestions(text: &str) -> Result<Vec<String>, SessionError> {
    if !validate_command_text(text) {
        return Err(SessionError::invalid("Invalid command text"));
    }

    let command = text.split_whitespace().next().unwrap_or_default();

    let hints = HINTS
        .iter()
        .find(|(names, _)| names.contains(&command))
        .map(|(_, hints)| hints.iter().map(ToString::to_string).collect());

    Ok(hints.unwrap_or_else(|| generic_hints(command)))
}

fn generic_hints(command: &str) -> Vec<String> {
    vec![
        format!("man {command} - read the manual page"),
        format!("{command} --help - show usage and options"),
        format!("which {command} - locate the command on PATH"),
    ]
}

/// External provider of command suggestions.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// Return newline-delimited hint lines for `command`.
    async fn suggest(&self, command: &str) -> Result<String, SuggestionError>;
}
