//! Request/response multiplexing over one shared, message-based channel.
//!
//! Callers ask for tiles; identical in-flight requests (same [`TileRequestKey`])
//! share one outbound message and one [`TileHandle`]. Inbound messages are
//! matched back to their pending entry by recomputing the key from the fields
//! the server echoes, so responses may arrive in any order.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::StreamingConfig;
use crate::error::RequestError;
use crate::key::TileRequestKey;
use crate::protocol::{TileRequest, TileResponse};

pub type TileResult = Result<Arc<TileResponse>, RequestError>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Future for one tile request. Clones observe the same outcome.
#[derive(Clone)]
pub struct TileHandle {
    key: TileRequestKey,
    request_id: u64,
    inner: Shared<BoxFuture<'static, TileResult>>,
}

impl TileHandle {
    fn pending(key: TileRequestKey, request_id: u64, rx: oneshot::Receiver<TileResult>) -> Self {
        let inner = rx
            .map(|received| received.unwrap_or(Err(RequestError::ChannelClosed)))
            .boxed()
            .shared();
        Self {
            key,
            request_id,
            inner,
        }
    }

    fn failed(key: TileRequestKey, request_id: u64, err: RequestError) -> Self {
        Self {
            key,
            request_id,
            inner: future::ready::<TileResult>(Err(err)).boxed().shared(),
        }
    }

    pub fn key(&self) -> &TileRequestKey {
        &self.key
    }

    /// Identifier of the underlying request. Coalesced callers see the same id.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn shares_request_with(&self, other: &TileHandle) -> bool {
        self.request_id == other.request_id
    }

    /// Outcome, if the request has already completed and been polled.
    pub fn peek(&self) -> Option<&TileResult> {
        self.inner.peek()
    }
}

impl Future for TileHandle {
    type Output = TileResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for TileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileHandle")
            .field("key", &self.key)
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Resolved(TileRequestKey),
    Rejected(TileRequestKey),
    /// No pending request for this key; the message was dropped.
    Unexpected(TileRequestKey),
    /// The message could not be parsed; it was dropped.
    Malformed,
}

struct PendingRequest {
    handle: TileHandle,
    resolve: oneshot::Sender<TileResult>,
    issued_at: Instant,
}

struct Inner {
    state: ChannelState,
    next_request_id: u64,
    pending: HashMap<TileRequestKey, PendingRequest>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }
}

/// Client side of the tile channel.
///
/// Outbound messages are pushed onto an unbounded queue that the transport
/// drains (see [`Connection`](crate::connection::Connection)); inbound text is
/// fed back through [`TileRequester::handle_message`]. The pending table lock is
/// never held across an await.
#[derive(Clone)]
pub struct TileRequester {
    inner: Arc<Mutex<Inner>>,
    outbound: mpsc::UnboundedSender<String>,
    state_tx: Arc<watch::Sender<ChannelState>>,
    config: StreamingConfig,
}

impl TileRequester {
    /// Create a requester in the `Connecting` state, returning the receiving end
    /// of its outbound message queue.
    pub fn new(config: StreamingConfig) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ChannelState::Connecting);
        let requester = Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ChannelState::Connecting,
                next_request_id: 0,
                pending: HashMap::new(),
            })),
            outbound,
            state_tx: Arc::new(state_tx),
            config,
        };
        (requester, rx)
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock().state
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_pending(&self, key: &TileRequestKey) -> bool {
        self.inner.lock().pending.contains_key(key)
    }

    /// Request a tile. Returns the existing handle if an identical request is
    /// already in flight; otherwise sends exactly one message.
    pub fn request(&self, mut request: TileRequest) -> TileHandle {
        request.tilecoord = request.tilecoord.normalized();
        let key = TileRequestKey::for_request(&request);
        let mut inner = self.inner.lock();

        if let Some(pending) = inner.pending.get(&key) {
            debug!(%key, "coalescing tile request");
            return pending.handle.clone();
        }

        let request_id = inner.next_id();
        match inner.state {
            ChannelState::Open => {}
            ChannelState::Connecting => {
                warn!(%key, "tile channel not open yet; request dropped");
                return TileHandle::failed(key, request_id, RequestError::ChannelNotOpen);
            }
            ChannelState::Closed => {
                warn!(%key, "tile channel closed; request dropped");
                return TileHandle::failed(key, request_id, RequestError::ChannelClosed);
            }
        }

        let text = match serde_json::to_string(&request) {
            Ok(t) => t,
            Err(err) => {
                error!(%key, %err, "failed to encode tile request");
                let err = RequestError::Encode {
                    key: key.to_string(),
                    message: err.to_string(),
                };
                return TileHandle::failed(key, request_id, err);
            }
        };

        if self.outbound.send(text).is_err() {
            warn!(%key, "tile channel transport has gone away");
            inner.state = ChannelState::Closed;
            self.state_tx.send_replace(ChannelState::Closed);
            return TileHandle::failed(key, request_id, RequestError::ChannelClosed);
        }

        let (resolve, rx) = oneshot::channel();
        let handle = TileHandle::pending(key.clone(), request_id, rx);
        inner.pending.insert(
            key,
            PendingRequest {
                handle: handle.clone(),
                resolve,
                issued_at: Instant::now(),
            },
        );
        handle
    }

    /// Feed one inbound text message.
    pub fn handle_message(&self, text: &str) -> Dispatch {
        match serde_json::from_str::<TileResponse>(text) {
            Ok(response) => self.dispatch(response),
            Err(err) => {
                warn!(%err, "dropping malformed tile message");
                Dispatch::Malformed
            }
        }
    }

    /// Resolve or reject the pending request a response answers.
    pub fn dispatch(&self, response: TileResponse) -> Dispatch {
        let key = TileRequestKey::for_response(&response);
        let pending = self.inner.lock().pending.remove(&key);
        let Some(pending) = pending else {
            warn!(%key, "unexpected tile response");
            return Dispatch::Unexpected(key);
        };

        if response.success {
            debug!(%key, "resolving tile request");
            let _ = pending.resolve.send(Ok(Arc::new(response)));
            Dispatch::Resolved(key)
        } else {
            debug!(%key, "rejecting tile request");
            let err = RequestError::Rejected {
                key: key.to_string(),
            };
            let _ = pending.resolve.send(Err(err));
            Dispatch::Rejected(key)
        }
    }

    /// Drop one pending request, failing its handle with `Cancelled`.
    pub fn cancel(&self, key: &TileRequestKey) -> bool {
        let pending = self.inner.lock().pending.remove(key);
        match pending {
            Some(p) => {
                debug!(%key, "cancelling tile request");
                let _ = p.resolve.send(Err(RequestError::Cancelled {
                    key: key.to_string(),
                }));
                true
            }
            None => false,
        }
    }

    /// Reject and drop every pending request older than the configured timeout.
    /// Returns how many were dropped.
    pub fn expire_stale(&self, now: Instant) -> usize {
        let Some(timeout) = self.config.request_timeout() else {
            return 0;
        };
        let expired: Vec<(TileRequestKey, PendingRequest)> = {
            let mut inner = self.inner.lock();
            let keys: Vec<TileRequestKey> = inner
                .pending
                .iter()
                .filter(|(_, p)| now.saturating_duration_since(p.issued_at) >= timeout)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| inner.pending.remove(&k).map(|p| (k, p)))
                .collect()
        };
        let count = expired.len();
        for (key, pending) in expired {
            warn!(%key, "tile request timed out");
            let _ = pending.resolve.send(Err(RequestError::TimedOut {
                key: key.to_string(),
            }));
        }
        count
    }

    pub fn mark_open(&self) {
        self.set_state(ChannelState::Open);
    }

    /// Mark the channel closed and fail everything still pending.
    pub fn mark_closed(&self) {
        let drained: Vec<PendingRequest> = {
            let mut inner = self.inner.lock();
            inner.state = ChannelState::Closed;
            inner.pending.drain().map(|(_, p)| p).collect()
        };
        self.state_tx.send_replace(ChannelState::Closed);
        if !drained.is_empty() {
            info!(count = drained.len(), "failing pending tile requests on channel close");
        }
        for pending in drained {
            let _ = pending.resolve.send(Err(RequestError::ChannelClosed));
        }
    }

    /// Wait until the channel opens. Fails if it closes first.
    pub async fn wait_open(&self) -> Result<(), RequestError> {
        let mut rx = self.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ChannelState::Open => return Ok(()),
                ChannelState::Closed => return Err(RequestError::ChannelClosed),
                ChannelState::Connecting => {}
            }
            if rx.changed().await.is_err() {
                return Err(RequestError::ChannelClosed);
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        self.inner.lock().state = state;
        self.state_tx.send_replace(state);
    }
}
