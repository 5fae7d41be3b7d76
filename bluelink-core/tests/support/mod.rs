#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::sync::Notify;

use bluelink_core::{
    BluelinkConfig, BluetoothError, Bluetoothctl, Confirmation, Confirmer, Host, Launcher,
    Notifier, PromptRequest, Prompter, Result, Toast, Workflows,
};

/// The bluetoothctl side of a fake session: reads commands, writes output.
pub struct Peer {
    commands: Lines<BufReader<DuplexStream>>,
    output: DuplexStream,
}

impl Peer {
    pub async fn expect(&mut self, command: &str) {
        let line = self
            .commands
            .next_line()
            .await
            .expect("read command")
            .expect("session closed before command");
        assert_eq!(line, command);
    }

    pub async fn emit(&mut self, line: &str) {
        self.emit_raw(&format!("{}\n", line)).await;
    }

    /// Writes are best effort: a settled workflow may already have hung up.
    pub async fn emit_raw(&mut self, text: &str) {
        let _ = self.output.write_all(text.as_bytes()).await;
        let _ = self.output.flush().await;
    }

    /// True once the session has closed its stdin.
    pub async fn closed(&mut self) -> bool {
        matches!(self.commands.next_line().await, Ok(None))
    }

    pub fn hang_up(self) -> Lines<BufReader<DuplexStream>> {
        self.commands
    }
}

pub fn fake_session() -> (Bluetoothctl, Peer) {
    let (session_stdin, peer_commands) = tokio::io::duplex(16 * 1024);
    let (peer_output, session_stdout) = tokio::io::duplex(16 * 1024);
    let session = Bluetoothctl::from_io(session_stdout, session_stdin);
    let peer = Peer {
        commands: BufReader::new(peer_commands).lines(),
        output: peer_output,
    };
    (session, peer)
}

#[derive(Default)]
pub struct FakeLauncher {
    sessions: Mutex<VecDeque<Bluetoothctl>>,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn with(sessions: Vec<Bluetoothctl>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Bluetoothctl> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BluetoothError::Spawn {
                program: "fake-bluetoothctl".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no session queued"),
            })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
    changed: Notify,
}

impl RecordingNotifier {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) -> Vec<Toast> {
        loop {
            {
                let toasts = self.toasts.lock().unwrap();
                if toasts.len() >= count {
                    return toasts.clone();
                }
            }
            self.changed.notified().await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn show_toast(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
        self.changed.notify_one();
    }
}

#[derive(Default)]
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<Confirmation>>,
}

impl ScriptedConfirmer {
    pub fn asked(&self) -> Vec<Confirmation> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, request: Confirmation) -> bool {
        self.asked.lock().unwrap().push(request);
        self.answers.lock().unwrap().pop_front().unwrap_or(false)
    }
}

#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<PromptRequest>>,
}

impl ScriptedPrompter {
    pub fn asked(&self) -> Vec<PromptRequest> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn prompt(&self, request: PromptRequest) -> Option<String> {
        self.asked.lock().unwrap().push(request);
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

pub struct TestHost {
    pub notifier: Arc<RecordingNotifier>,
    pub confirmer: Arc<ScriptedConfirmer>,
    pub prompter: Arc<ScriptedPrompter>,
}

impl TestHost {
    pub fn new(confirmations: Vec<bool>, prompts: Vec<Option<&str>>) -> Self {
        Self {
            notifier: Arc::new(RecordingNotifier::default()),
            confirmer: Arc::new(ScriptedConfirmer {
                answers: Mutex::new(confirmations.into()),
                asked: Mutex::new(Vec::new()),
            }),
            prompter: Arc::new(ScriptedPrompter {
                answers: Mutex::new(prompts.into_iter().map(|p| p.map(str::to_string)).collect()),
                asked: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn host(&self) -> Host {
        Host::new(
            self.notifier.clone(),
            self.confirmer.clone(),
            self.prompter.clone(),
        )
    }
}

pub fn workflows(launcher: Arc<FakeLauncher>, host: &TestHost) -> Workflows {
    Workflows::new(launcher, host.host(), &BluelinkConfig::default())
}
