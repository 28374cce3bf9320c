//! Scripted in-memory remote used by the session tests.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use webssh_core::{
    ConnectParams, FileEntry, FileKind, FileSubsystem, RemoteConnector, RemoteError, RemoteHandle,
    ShellChannel, ShellControl, ShellEvent, TermSize,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir { mode: u32 },
    File(Vec<u8>),
}

#[derive(Default)]
pub struct Counters {
    connects: AtomicUsize,
    handles_opened: AtomicUsize,
    handles_closed: AtomicUsize,
    shells_opened: AtomicUsize,
    shells_closed: AtomicUsize,
    sftp_opened: AtomicUsize,
    sftp_closed: AtomicUsize,
    remote_calls: AtomicUsize,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn handles_closed(&self) -> usize {
        self.handles_closed.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.handles_opened.load(Ordering::SeqCst) - self.handles_closed()
    }

    pub fn shells_opened(&self) -> usize {
        self.shells_opened.load(Ordering::SeqCst)
    }

    pub fn shells_closed(&self) -> usize {
        self.shells_closed.load(Ordering::SeqCst)
    }

    pub fn sftp_opened(&self) -> usize {
        self.sftp_opened.load(Ordering::SeqCst)
    }

    pub fn sftp_closed(&self) -> usize {
        self.sftp_closed.load(Ordering::SeqCst)
    }

    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockState {
    fn close_result(&self, what: &str) -> Result<(), RemoteError> {
        if self.fail_close.load(Ordering::SeqCst) {
            Err(RemoteError::Channel(format!("{what} close failed")))
        } else {
            Ok(())
        }
    }
}

struct MockState {
    counters: Counters,
    fs: Mutex<BTreeMap<String, Node>>,
    shells: Mutex<HashMap<usize, mpsc::Sender<ShellEvent>>>,
    next_shell: AtomicUsize,
    fail_auth: AtomicBool,
    fail_shell: AtomicBool,
    fail_sftp: AtomicBool,
    fail_close: AtomicBool,
    connect_delay: Mutex<Duration>,
    write_delay: Mutex<Duration>,
    last_resize: Mutex<Option<TermSize>>,
}

/// Connector whose hosts share one in-memory file tree.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        let mut fs = BTreeMap::new();
        fs.insert("/".to_string(), Node::Dir { mode: 0o755 });
        fs.insert("/tmp".to_string(), Node::Dir { mode: 0o777 });
        fs.insert("/etc".to_string(), Node::Dir { mode: 0o755 });
        fs.insert("/etc/motd".to_string(), Node::File(b"welcome\n".to_vec()));

        Self {
            state: Arc::new(MockState {
                counters: Counters::default(),
                fs: Mutex::new(fs),
                shells: Mutex::new(HashMap::new()),
                next_shell: AtomicUsize::new(0),
                fail_auth: AtomicBool::new(false),
                fail_shell: AtomicBool::new(false),
                fail_sftp: AtomicBool::new(false),
                fail_close: AtomicBool::new(false),
                connect_delay: Mutex::new(Duration::ZERO),
                write_delay: Mutex::new(Duration::ZERO),
                last_resize: Mutex::new(None),
            }),
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.state.counters
    }

    /// A connected handle, bypassing authentication.
    pub fn handle(&self) -> Box<dyn RemoteHandle> {
        Counters::bump(&self.state.counters.handles_opened);
        Box::new(MockHandle {
            state: Arc::clone(&self.state),
        })
    }

    pub fn fail_auth(&self, fail: bool) {
        self.state.fail_auth.store(fail, Ordering::SeqCst);
    }

    pub fn fail_shell(&self, fail: bool) {
        self.state.fail_shell.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sftp(&self, fail: bool) {
        self.state.fail_sftp.store(fail, Ordering::SeqCst);
    }

    /// Make every close report an error after releasing the resource.
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock().unwrap() = delay;
    }

    /// Delay between a write being issued and the remote acknowledging close.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.state.write_delay.lock().unwrap() = delay;
    }

    /// End every open shell stream, as if the remote closed the channels.
    pub fn kill_shells(&self) {
        self.state.shells.lock().unwrap().clear();
    }

    /// Push output into every open shell.
    pub fn emit(&self, data: &[u8]) {
        for tx in self.state.shells.lock().unwrap().values() {
            let _ = tx.try_send(ShellEvent::Data(data.to_vec()));
        }
    }

    pub fn last_resize(&self) -> Option<TermSize> {
        *self.state.last_resize.lock().unwrap()
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.state.fs.lock().unwrap().get(path).cloned()
    }

    pub fn put_file(&self, path: &str, content: &[u8]) {
        self.state
            .fs
            .lock()
            .unwrap()
            .insert(path.to_string(), Node::File(content.to_vec()));
    }
}

#[async_trait]
impl RemoteConnector for MockConnector {
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn RemoteHandle>, RemoteError> {
        Counters::bump(&self.state.counters.connects);
        let delay = *self.state.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_auth.load(Ordering::SeqCst) {
            return Err(RemoteError::Auth(format!(
                "server rejected credentials for {}",
                params.username
            )));
        }
        Ok(self.handle())
    }
}

struct MockHandle {
    state: Arc<MockState>,
}

#[async_trait]
impl RemoteHandle for MockHandle {
    async fn open_shell(&self, _size: TermSize) -> Result<ShellChannel, RemoteError> {
        if self.state.fail_shell.load(Ordering::SeqCst) {
            return Err(RemoteError::Channel("shell request refused".into()));
        }
        let id = self.state.next_shell.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(64);
        self.state.shells.lock().unwrap().insert(id, tx);
        Counters::bump(&self.state.counters.shells_opened);
        Ok(ShellChannel {
            control: Box::new(MockShell {
                id,
                state: Arc::clone(&self.state),
            }),
            output: rx,
        })
    }

    async fn open_file_subsystem(&self) -> Result<Box<dyn FileSubsystem>, RemoteError> {
        if self.state.fail_sftp.load(Ordering::SeqCst) {
            return Err(RemoteError::Channel("subsystem request refused".into()));
        }
        Counters::bump(&self.state.counters.sftp_opened);
        Ok(Box::new(MockFiles {
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> Result<(), RemoteError> {
        Counters::bump(&self.state.counters.handles_closed);
        self.state.close_result("connection")
    }
}

/// Echoes every write back as output.
struct MockShell {
    id: usize,
    state: Arc<MockState>,
}

#[async_trait]
impl ShellControl for MockShell {
    fn is_writable(&self) -> bool {
        self.state.shells.lock().unwrap().contains_key(&self.id)
    }

    async fn write(&self, data: &[u8]) -> Result<(), RemoteError> {
        let tx = self
            .state
            .shells
            .lock()
            .unwrap()
            .get(&self.id)
            .cloned()
            .ok_or_else(|| RemoteError::Channel("shell closed".into()))?;
        tx.send(ShellEvent::Data(data.to_vec()))
            .await
            .map_err(|_| RemoteError::Channel("shell closed".into()))
    }

    async fn resize(&self, size: TermSize) -> Result<(), RemoteError> {
        *self.state.last_resize.lock().unwrap() = Some(size);
        Ok(())
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.state.shells.lock().unwrap().remove(&self.id);
        Counters::bump(&self.state.counters.shells_closed);
        self.state.close_result("shell")
    }
}

struct MockFiles {
    state: Arc<MockState>,
}

impl MockFiles {
    fn call(&self) {
        Counters::bump(&self.state.counters.remote_calls);
    }

    fn parent(path: &str) -> &str {
        match path.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((parent, _)) => parent,
            None => "/",
        }
    }

    fn normalize(path: &str) -> String {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn no_such_file() -> RemoteError {
        RemoteError::Operation("No such file".into())
    }
}

#[async_trait]
impl FileSubsystem for MockFiles {
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, RemoteError> {
        self.call();
        let path = Self::normalize(path);
        let fs = self.state.fs.lock().unwrap();
        if !matches!(fs.get(&path), Some(Node::Dir { .. })) {
            return Err(Self::no_such_file());
        }
        Ok(fs
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && Self::parent(p) == path)
            .map(|(p, node)| {
                let name = p.rsplit('/').next().unwrap_or_default().to_string();
                let (kind, mode, size) = match node {
                    Node::Dir { mode } => (FileKind::Directory, *mode, 4096),
                    Node::File(content) => (FileKind::File, 0o644, content.len() as u64),
                };
                FileEntry {
                    name,
                    kind,
                    size,
                    modified_at: 1_700_000_000,
                    permissions: FileEntry::mode_string(kind, mode),
                }
            })
            .collect())
    }

    async fn read(&self, path: &str, limit: u64) -> Result<Vec<u8>, RemoteError> {
        self.call();
        match self.state.fs.lock().unwrap().get(path) {
            Some(Node::File(content)) if content.len() as u64 > limit => Err(RemoteError::TooLarge {
                size: content.len() as u64,
                limit,
            }),
            Some(Node::File(content)) => Ok(content.clone()),
            _ => Err(Self::no_such_file()),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), RemoteError> {
        self.call();
        let delay = *self.state.write_delay.lock().unwrap();
        if !matches!(
            self.state.fs.lock().unwrap().get(Self::parent(path)),
            Some(Node::Dir { .. })
        ) {
            return Err(Self::no_such_file());
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state
            .fs
            .lock()
            .unwrap()
            .insert(path.to_string(), Node::File(content.to_vec()));
        Ok(())
    }

    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        self.call();
        let path = Self::normalize(path);
        let mut fs = self.state.fs.lock().unwrap();
        if fs.contains_key(&path) {
            return Err(RemoteError::Operation("Failure".into()));
        }
        if !matches!(fs.get(Self::parent(&path)), Some(Node::Dir { .. })) {
            return Err(Self::no_such_file());
        }
        fs.insert(path, Node::Dir { mode });
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        self.call();
        let mut fs = self.state.fs.lock().unwrap();
        match fs.get(path) {
            Some(Node::File(_)) => {
                fs.remove(path);
                Ok(())
            }
            Some(Node::Dir { .. }) => Err(RemoteError::Operation("Failure".into())),
            None => Err(Self::no_such_file()),
        }
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<u64, RemoteError> {
        let content = self.read(remote, u64::MAX).await?;
        tokio::fs::write(local, &content).await?;
        Ok(content.len() as u64)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64, RemoteError> {
        let content = tokio::fs::read(local).await?;
        self.write(remote, &content).await?;
        Ok(content.len() as u64)
    }

    async fn close(&self) -> Result<(), RemoteError> {
        Counters::bump(&self.state.counters.sftp_closed);
        self.state.close_result("sftp")
    }
}
