use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::message::AiMessage;

/// Lifecycle of a transport connection.
///
/// HTTP streaming walks `Idle -> Connecting -> Open -> Closed`; sockets add
/// `Closing` between a requested stop and the close handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Idle = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
    Closed = 4,
}

impl ClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ClientState::Idle,
            1 => ClientState::Connecting,
            2 => ClientState::Open,
            3 => ClientState::Closing,
            _ => ClientState::Closed,
        }
    }
}

/// Lock-free holder for a [`ClientState`] shared between a handle and its
/// driver task.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ClientState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ClientState {
        ClientState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ClientState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn swap(&self, state: ClientState) -> ClientState {
        ClientState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }

    /// Move `from -> to`; false when the cell held something else.
    pub fn transition(&self, from: ClientState, to: ClientState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A live, cancellable streaming exchange.
///
/// Implementations never block: `start` schedules the connection on the
/// runtime and returns, `stop` flips state and requests cancellation. Both
/// may be called from any thread; `stop` is idempotent.
pub trait AiClient: Send + Sync {
    fn start(&self, payload: String);
    fn stop(&self);
    fn state(&self) -> ClientState;
}

pub type ClientHandle = Arc<dyn AiClient>;

/// Raw transport events, before vendor parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Started,
    Chunk(String),
    Stopped,
}

pub type ClientListener = mpsc::UnboundedSender<ClientEvent>;

/// Normalized events seen by the caller of a chat.
pub enum ChatEvent {
    Started(ClientHandle),
    Message(AiMessage),
    Stopped,
}

impl fmt::Debug for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEvent::Started(h) => f.debug_tuple("Started").field(&h.state()).finish(),
            ChatEvent::Message(m) => f.debug_tuple("Message").field(m).finish(),
            ChatEvent::Stopped => f.write_str("Stopped"),
        }
    }
}

/// Wraps a [`ClientListener`] so a transport emits at most one `Started`
/// and exactly one `Stopped`, with no chunk after the stop.
#[derive(Debug)]
pub struct EventSink {
    tx: ClientListener,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl EventSink {
    pub fn new(tx: ClientListener) -> Self {
        Self {
            tx,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn started(&self) {
        if self.is_stopped() || self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(ClientEvent::Started);
    }

    /// Returns false once the sink is stopped or the listener went away.
    pub fn chunk(&self, chunk: String) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.tx.send(ClientEvent::Chunk(chunk)).is_ok()
    }

    pub fn stopped(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(ClientEvent::Stopped);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
