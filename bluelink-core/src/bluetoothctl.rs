/*!
 * bluetoothctl Session
 * One long-lived interactive bluetoothctl process: commands in, parsed lines out
 */

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command as ProcessCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::device::DeviceFilter;
use crate::error::{BluetoothError, Result};
use crate::framing::LineSplitter;
use crate::parser::{parse_line, BluetoothctlLine};
use crate::registry::{HandlerRegistry, Subscription};

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// A line written to bluetoothctl's stdin, exactly as typed interactively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pair(String),
    Connect(String),
    Disconnect(String),
    Remove(String),
    Trust(String),
    Scan(bool),
    Discoverable(bool),
    DiscoverableTimeout(u32),
    Agent(bool),
    DefaultAgent,
    Devices(Option<DeviceFilter>),
    Yes,
    No,
    Pin(String),
    Raw(String),
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Pair(mac) => write!(f, "pair {}", mac),
            Command::Connect(mac) => write!(f, "connect {}", mac),
            Command::Disconnect(mac) => write!(f, "disconnect {}", mac),
            Command::Remove(mac) => write!(f, "remove {}", mac),
            Command::Trust(mac) => write!(f, "trust {}", mac),
            Command::Scan(on) => write!(f, "scan {}", on_off(*on)),
            Command::Discoverable(on) => write!(f, "discoverable {}", on_off(*on)),
            Command::DiscoverableTimeout(secs) => write!(f, "discoverable-timeout {}", secs),
            Command::Agent(on) => write!(f, "agent {}", on_off(*on)),
            Command::DefaultAgent => write!(f, "default-agent"),
            Command::Devices(None) => write!(f, "devices"),
            Command::Devices(Some(filter)) => write!(f, "devices {}", filter.as_arg()),
            Command::Yes => write!(f, "yes"),
            Command::No => write!(f, "no"),
            Command::Pin(pin) | Command::Raw(pin) => write!(f, "{}", pin),
        }
    }
}

pub struct Bluetoothctl {
    stdin: tokio::sync::Mutex<Option<Writer>>,
    child: Mutex<Option<Child>>,
    handlers: Arc<HandlerRegistry>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    killed: AtomicBool,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Bluetoothctl {
    /// Starts an interactive `bluetoothctl` with all three standard streams piped.
    pub async fn spawn(program: impl AsRef<Path>) -> Result<Self> {
        let program = program.as_ref();
        let mut child = ProcessCommand::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                error!("Failed to spawn {}: {}", program.display(), source);
                BluetoothError::Spawn {
                    program: program.display().to_string(),
                    source,
                }
            })?;

        let stdout = child.stdout.take().ok_or(BluetoothError::SessionClosed)?;
        let stdin = child.stdin.take().ok_or(BluetoothError::SessionClosed)?;
        let stderr = child.stderr.take().ok_or(BluetoothError::SessionClosed)?;
        debug!("Spawned {} (pid {:?})", program.display(), child.id());

        let session = Self::from_io(stdout, stdin);
        locked(&session.tasks).push(tokio::spawn(log_stderr(stderr)));
        *locked(&session.child) = Some(child);
        Ok(session)
    }

    /// Builds a session over an arbitrary stream pair. Must be called inside a tokio runtime.
    pub fn from_io<R, W>(stdout: R, stdin: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let handlers = HandlerRegistry::new();
        let reader = tokio::spawn(read_lines(stdout, handlers.clone()));
        Self {
            stdin: tokio::sync::Mutex::new(Some(Box::new(stdin))),
            child: Mutex::new(None),
            handlers,
            tasks: Mutex::new(vec![reader]),
            killed: AtomicBool::new(false),
        }
    }

    /// Registers a handler for every parsed line.
    ///
    /// Handlers run on the reader task, in registration order.
    pub fn on_line<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&BluetoothctlLine) + Send + Sync + 'static,
    {
        self.handlers.subscribe(Arc::new(handler))
    }

    /// Channel view of the line stream. The receiver closes once stdout does.
    pub fn events(&self) -> (Subscription, mpsc::UnboundedReceiver<BluetoothctlLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.on_line(move |line| {
            let _ = tx.send(line.clone());
        });
        (subscription, rx)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn execute(&self, command: &Command) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let writer = stdin.as_mut().ok_or(BluetoothError::SessionClosed)?;
        debug!("bluetoothctl <- {}", command);
        writer.write_all(format!("{}\n", command).as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn pair(&self, mac: &str) -> Result<()> {
        self.execute(&Command::Pair(mac.to_string())).await
    }

    pub async fn connect(&self, mac: &str) -> Result<()> {
        self.execute(&Command::Connect(mac.to_string())).await
    }

    pub async fn disconnect(&self, mac: &str) -> Result<()> {
        self.execute(&Command::Disconnect(mac.to_string())).await
    }

    pub async fn remove(&self, mac: &str) -> Result<()> {
        self.execute(&Command::Remove(mac.to_string())).await
    }

    pub async fn trust(&self, mac: &str) -> Result<()> {
        self.execute(&Command::Trust(mac.to_string())).await
    }

    pub async fn scan_on(&self) -> Result<()> {
        self.execute(&Command::Scan(true)).await
    }

    pub async fn scan_off(&self) -> Result<()> {
        self.execute(&Command::Scan(false)).await
    }

    pub async fn discoverable(&self, on: bool) -> Result<()> {
        self.execute(&Command::Discoverable(on)).await
    }

    pub async fn discoverable_timeout(&self, secs: u32) -> Result<()> {
        self.execute(&Command::DiscoverableTimeout(secs)).await
    }

    pub async fn agent(&self, on: bool) -> Result<()> {
        self.execute(&Command::Agent(on)).await
    }

    pub async fn default_agent(&self) -> Result<()> {
        self.execute(&Command::DefaultAgent).await
    }

    pub async fn devices(&self, filter: Option<DeviceFilter>) -> Result<()> {
        self.execute(&Command::Devices(filter)).await
    }

    pub async fn yes(&self) -> Result<()> {
        self.execute(&Command::Yes).await
    }

    pub async fn no(&self) -> Result<()> {
        self.execute(&Command::No).await
    }

    pub async fn pin(&self, pin: &str) -> Result<()> {
        self.execute(&Command::Pin(pin.to_string())).await
    }

    pub async fn raw(&self, line: &str) -> Result<()> {
        self.execute(&Command::Raw(line.to_string())).await
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Signals the process and stops the reader without waiting. Returns false if already done.
    pub fn terminate(&self) -> bool {
        if self.killed.swap(true, Ordering::SeqCst) {
            return false;
        }

        for task in locked(&self.tasks).drain(..) {
            task.abort();
        }
        if let Ok(mut stdin) = self.stdin.try_lock() {
            stdin.take();
        }
        if let Some(child) = locked(&self.child).as_mut() {
            send_sigterm(child);
        }
        true
    }

    /// Terminates the session and reaps the process. Only the first call has any effect.
    pub async fn kill(&self) -> bool {
        if !self.terminate() {
            return false;
        }
        self.stdin.lock().await.take();

        let child = locked(&self.child).take();
        if let Some(mut child) = child {
            match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!("bluetoothctl exited with {}", status),
                Ok(Err(e)) => warn!("Failed to reap bluetoothctl: {}", e),
                Err(_) => {
                    warn!("bluetoothctl ignored SIGTERM, killing");
                    let _ = child.start_kill();
                }
            }
        }
        true
    }
}

impl Drop for Bluetoothctl {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn send_sigterm(child: &mut Child) {
    let signalled = child
        .id()
        .and_then(|pid| i32::try_from(pid).ok())
        .map(|pid| signal::kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok())
        .unwrap_or(false);
    if !signalled {
        let _ = child.start_kill();
    }
}

/// Spawns and hands out one fresh session per workflow.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> Result<Bluetoothctl>;
}

pub struct ProcessLauncher {
    program: PathBuf,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self) -> Result<Bluetoothctl> {
        Bluetoothctl::spawn(&self.program).await
    }
}

fn deliver(handlers: &HandlerRegistry, raw: &str) {
    if raw.trim().is_empty() {
        return;
    }
    let line = parse_line(raw);
    debug!("bluetoothctl -> {:?}", line);
    handlers.dispatch(&line);
}

async fn read_lines<R>(mut stdout: R, handlers: Arc<HandlerRegistry>)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut carry: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to read bluetoothctl stdout: {}", e);
                break;
            }
        };
        carry.extend_from_slice(&buf[..n]);

        // Hold back a multi-byte character cut in half by the read.
        let valid = match std::str::from_utf8(&carry) {
            Ok(_) => carry.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => carry.len(),
        };
        let text = String::from_utf8_lossy(&carry[..valid]).into_owned();
        carry.drain(..valid);

        for raw in splitter.push(&text) {
            deliver(&handlers, &raw);
        }
    }

    if let Some(tail) = splitter.finish() {
        deliver(&handlers, &tail);
    }
    debug!("bluetoothctl stdout closed");
    handlers.close();
}

async fn log_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                warn!("bluetoothctl stderr: {}", line.trim())
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read bluetoothctl stderr: {}", e);
                break;
            }
        }
    }
}
