use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Deserialize;
use tracing::warn;

use super::world::GameState;

static WORLD_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_world_lock_poison_once(operation: &'static str) {
    if WORLD_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "world lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum HandoffMode {
    #[default]
    #[serde(rename = "mailbox")]
    Mailbox,
    #[serde(rename = "locked", alias = "locked_snapshot")]
    LockedSnapshot,
}

impl HandoffMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mailbox" => Some(Self::Mailbox),
            "locked" | "locked_snapshot" => Some(Self::LockedSnapshot),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mailbox => "mailbox",
            Self::LockedSnapshot => "locked",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorldBuffers {
    pub current: GameState,
    pub previous: GameState,
}

#[derive(Debug, Clone, Default)]
pub struct SharedWorld {
    buffers: Arc<Mutex<WorldBuffers>>,
    ticks: Arc<AtomicU64>,
}

impl SharedWorld {
    pub fn new(initial: GameState) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(WorldBuffers {
                previous: initial.clone(),
                current: initial,
            })),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn tick<R>(&self, update: impl FnOnce(&mut GameState) -> R) -> R {
        let mut guard = self.lock("tick");
        let buffers = &mut *guard;
        buffers.previous.clone_from(&buffers.current);
        let result = update(&mut buffers.current);
        drop(guard);
        self.ticks.fetch_add(1, Ordering::Release);
        result
    }

    pub fn snapshot(&self) -> GameState {
        self.lock("snapshot").current.clone()
    }

    pub fn snapshot_pair(&self) -> (GameState, GameState) {
        let guard = self.lock("snapshot_pair");
        (guard.previous.clone(), guard.current.clone())
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn lock(&self, operation: &'static str) -> MutexGuard<'_, WorldBuffers> {
        match self.buffers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_world_lock_poison_once(operation);
                poisoned.into_inner()
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (sender, receiver) = bounded(1);
    (
        MailboxSender {
            sender,
            drain: receiver.clone(),
        },
        MailboxReceiver { receiver },
    )
}

#[derive(Debug)]
pub struct MailboxSender<T> {
    sender: Sender<T>,
    drain: Receiver<T>,
}

impl<T> MailboxSender<T> {
    /// Replaces whatever is pending with `item`. Never blocks.
    pub fn publish(&self, mut item: T) {
        loop {
            while self.drain.try_recv().is_ok() {}
            match self.sender.try_send(item) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => item = rejected,
                // `drain` keeps a receiver alive, so this only happens mid-teardown.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

#[derive(Debug)]
pub struct MailboxReceiver<T> {
    receiver: Receiver<T>,
}

impl<T> MailboxReceiver<T> {
    pub fn poll(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug)]
pub struct FrameSlot<T> {
    receiver: MailboxReceiver<T>,
    latest: Option<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFreshness {
    Fresh,
    Stale,
    Empty,
}

impl<T> FrameSlot<T> {
    pub fn new(receiver: MailboxReceiver<T>) -> Self {
        Self {
            receiver,
            latest: None,
        }
    }

    pub fn refresh(&mut self) -> FrameFreshness {
        match self.receiver.poll() {
            Some(item) => {
                self.latest = Some(item);
                FrameFreshness::Fresh
            }
            None if self.latest.is_some() => FrameFreshness::Stale,
            None => FrameFreshness::Empty,
        }
    }

    pub fn latest(&self) -> Option<&T> {
        self.latest.as_ref()
    }
}
