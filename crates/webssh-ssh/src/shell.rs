//! Interactive shell channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use russh::{Channel, ChannelMsg, client};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use webssh_core::{RemoteError, ShellChannel, ShellControl, ShellEvent, TermSize};

use crate::error::SshError;

const TERM: &str = "xterm-256color";

/// Commands for the task owning the channel.
#[derive(Debug)]
enum ShellCommand {
    Data(Vec<u8>),
    Resize(TermSize),
    Close,
}

/// Control half of a russh shell channel.
pub struct SshShell {
    cmd_tx: mpsc::Sender<ShellCommand>,
    writable: Arc<AtomicBool>,
}

impl SshShell {
    async fn send(&self, cmd: ShellCommand) -> Result<(), RemoteError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RemoteError::Channel("Shell channel closed".to_string()))
    }
}

#[async_trait]
impl ShellControl for SshShell {
    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    async fn write(&self, data: &[u8]) -> Result<(), RemoteError> {
        self.send(ShellCommand::Data(data.to_vec())).await
    }

    async fn resize(&self, size: TermSize) -> Result<(), RemoteError> {
        self.send(ShellCommand::Resize(size)).await
    }

    async fn close(&self) -> Result<(), RemoteError> {
        if !self.is_writable() {
            return Ok(());
        }
        self.send(ShellCommand::Close).await
    }
}

/// Request a PTY and shell on `channel`, then hand it to an owner task.
pub(crate) async fn open_shell(
    channel: Channel<client::Msg>,
    size: TermSize,
) -> Result<ShellChannel, SshError> {
    channel
        .request_pty(
            false,
            TERM,
            u32::from(size.cols),
            u32::from(size.rows),
            0,
            0,
            &[],
        )
        .await
        .map_err(|e| SshError::ChannelError(format!("PTY request failed: {e}")))?;

    debug!("PTY allocated, requesting shell");

    channel
        .request_shell(false)
        .await
        .map_err(|e| SshError::ChannelError(format!("Shell request failed: {e}")))?;

    info!(cols = size.cols, rows = size.rows, "Interactive shell started");

    let (cmd_tx, cmd_rx) = mpsc::channel::<ShellCommand>(1024);
    let (out_tx, out_rx) = mpsc::channel::<ShellEvent>(1024);
    let writable = Arc::new(AtomicBool::new(true));

    tokio::spawn(run_channel(channel, cmd_rx, out_tx, Arc::clone(&writable)));

    Ok(ShellChannel {
        control: Box::new(SshShell { cmd_tx, writable }),
        output: out_rx,
    })
}

async fn run_channel(
    mut channel: Channel<client::Msg>,
    mut cmd_rx: mpsc::Receiver<ShellCommand>,
    out_tx: mpsc::Sender<ShellEvent>,
    writable: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    ShellCommand::Data(data) => {
                        if let Err(e) = channel.data(&data[..]).await {
                            error!("Failed to send data to shell channel: {e}");
                            let _ = out_tx.send(ShellEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                    ShellCommand::Resize(size) => {
                        if let Err(e) = channel
                            .window_change(u32::from(size.cols), u32::from(size.rows), 0, 0)
                            .await
                        {
                            // A failed resize leaves the shell usable.
                            error!("Failed to resize PTY: {e}");
                        }
                    }
                    ShellCommand::Close => {
                        debug!("Closing shell channel");
                        let _ = channel.eof().await;
                        let _ = channel.close().await;
                        break;
                    }
                }
            }

            msg = channel.wait() => {
                match remote_step(msg) {
                    RemoteStep::Output(data) => {
                        if out_tx.send(ShellEvent::Data(data)).await.is_err() {
                            break;
                        }
                    }
                    RemoteStep::Ignore => {}
                    RemoteStep::Ended => break,
                }
            }
        }
    }

    writable.store(false, Ordering::Release);
    debug!("Shell channel task terminated");
}

/// What a message from the remote side means for the shell stream.
#[derive(Debug, PartialEq, Eq)]
enum RemoteStep {
    Output(Vec<u8>),
    Ignore,
    Ended,
}

/// Classify the next channel message. `None` means the connection is gone
/// without the channel having been closed.
fn remote_step(msg: Option<ChannelMsg>) -> RemoteStep {
    match msg {
        Some(ChannelMsg::Data { data }) => RemoteStep::Output(data.to_vec()),
        Some(ChannelMsg::ExtendedData { data, ext: 1 }) => RemoteStep::Output(data.to_vec()),
        Some(ChannelMsg::Eof | ChannelMsg::Close) => {
            info!("Shell channel closed by remote");
            RemoteStep::Ended
        }
        Some(ChannelMsg::ExitStatus { exit_status }) => {
            debug!(exit_status, "Shell exited");
            RemoteStep::Ignore
        }
        Some(_) => RemoteStep::Ignore,
        None => {
            info!("SSH connection lost, ending shell stream");
            RemoteStep::Ended
        }
    }
}
