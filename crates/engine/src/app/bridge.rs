use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use thiserror::Error;
use tracing::{debug, warn};

use super::handoff::StopToken;

pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(10);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Image {
    pub handle: ImageHandle,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    by_path: HashMap<String, Image>,
    by_handle: HashMap<ImageHandle, Image>,
}

impl ImageCatalog {
    pub fn insert(&mut self, path: impl Into<String>, image: Image) {
        self.by_handle.insert(image.handle, image);
        self.by_path.insert(path.into(), image);
    }

    pub fn get(&self, path: &str) -> Option<Image> {
        self.by_path.get(path).copied()
    }

    pub fn by_handle(&self, handle: ImageHandle) -> Option<Image> {
        self.by_handle.get(&handle).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRequest {
    LoadImage { path: String },
}

impl fmt::Display for EngineRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineRequest::LoadImage { path } => write!(f, "LoadImage({path})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineResponse {
    LoadImage(Result<Image, String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("engine host disconnected while handling {request}")]
    Disconnected { request: String },
    #[error("engine host did not answer {request} within {waited_ms} ms")]
    Timeout { request: String, waited_ms: u64 },
    #[error("engine host failed to load image '{path}': {reason}")]
    LoadFailed { path: String, reason: String },
    #[error("{request} was cancelled")]
    Cancelled { request: String },
}

#[derive(Debug)]
struct Envelope<T> {
    seq: u64,
    body: T,
}

pub fn engine_bridge() -> (BridgeClient, BridgeHost) {
    let (request_tx, request_rx) = bounded(1);
    let (response_tx, response_rx) = bounded(1);
    (
        BridgeClient {
            requests: request_tx,
            responses: response_rx.clone(),
            timeout: DEFAULT_BRIDGE_TIMEOUT,
            stop: StopToken::default(),
            next_seq: Cell::new(0),
        },
        BridgeHost {
            requests: request_rx,
            responses: response_tx,
            unread: response_rx,
        },
    )
}

#[derive(Debug)]
pub struct BridgeClient {
    requests: Sender<Envelope<EngineRequest>>,
    responses: Receiver<Envelope<EngineResponse>>,
    timeout: Duration,
    stop: StopToken,
    next_seq: Cell<u64>,
}

impl BridgeClient {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_stop(mut self, stop: StopToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn load_image(&self, path: &str) -> Result<Image, BridgeError> {
        let request = EngineRequest::LoadImage {
            path: path.to_string(),
        };
        match self.exchange(request)? {
            EngineResponse::LoadImage(Ok(image)) => Ok(image),
            EngineResponse::LoadImage(Err(reason)) => Err(BridgeError::LoadFailed {
                path: path.to_string(),
                reason,
            }),
        }
    }

    fn exchange(&self, request: EngineRequest) -> Result<EngineResponse, BridgeError> {
        let label = request.to_string();
        let seq = self.next_seq.get();
        self.next_seq.set(seq.wrapping_add(1));
        let started = Instant::now();
        let deadline = started + self.timeout;

        // A reply to an exchange that already timed out would occupy the slot.
        while let Ok(stale) = self.responses.try_recv() {
            debug!(got = stale.seq, "bridge_stale_response_discarded");
        }

        let mut envelope = Envelope { seq, body: request };
        loop {
            self.check_stop(&label)?;
            let slice = self.next_slice(deadline);
            if slice.is_zero() {
                return Err(self.timeout_error(&label, started));
            }
            match self.requests.send_timeout(envelope, slice) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(rejected)) => envelope = rejected,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(BridgeError::Disconnected { request: label })
                }
            }
        }

        loop {
            self.check_stop(&label)?;
            let slice = self.next_slice(deadline);
            if slice.is_zero() {
                return Err(self.timeout_error(&label, started));
            }
            match self.responses.recv_timeout(slice) {
                Ok(envelope) if envelope.seq == seq => return Ok(envelope.body),
                Ok(stale) => {
                    debug!(expected = seq, got = stale.seq, "bridge_stale_response_discarded");
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::Disconnected { request: label })
                }
            }
        }
    }

    fn next_slice(&self, deadline: Instant) -> Duration {
        deadline
            .saturating_duration_since(Instant::now())
            .min(STOP_POLL_INTERVAL)
    }

    fn check_stop(&self, label: &str) -> Result<(), BridgeError> {
        if self.stop.is_stopped() {
            return Err(BridgeError::Cancelled {
                request: label.to_string(),
            });
        }
        Ok(())
    }

    fn timeout_error(&self, label: &str, started: Instant) -> BridgeError {
        BridgeError::Timeout {
            request: label.to_string(),
            waited_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug)]
pub struct BridgeHost {
    requests: Receiver<Envelope<EngineRequest>>,
    responses: Sender<Envelope<EngineResponse>>,
    unread: Receiver<Envelope<EngineResponse>>,
}

impl BridgeHost {
    pub fn service_pending<F>(&self, mut handler: F) -> usize
    where
        F: FnMut(&EngineRequest) -> EngineResponse,
    {
        let mut serviced = 0;
        while let Ok(envelope) = self.requests.try_recv() {
            let response = handler(&envelope.body);
            let reply = Envelope {
                seq: envelope.seq,
                body: response,
            };
            // The client only sends after finishing its previous exchange, so
            // anything still unread answers an abandoned request.
            while self.unread.try_recv().is_ok() {}
            if self.responses.try_send(reply).is_err() {
                warn!(request = %envelope.body, "bridge_reply_undeliverable");
                continue;
            }
            serviced += 1;
        }
        serviced
    }
}
