//! WebSocket transport for the tile channel.

use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::StreamingConfig;
use crate::error::StreamError;
use crate::multiplexer::TileRequester;

/// An open (or opening) tile channel and the task pumping it.
pub struct Connection {
    requester: TileRequester,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Connection {
    /// Start connecting to `address` in the background and return immediately.
    ///
    /// `on_ready` runs once the channel is open. Requests issued before that
    /// fail with `ChannelNotOpen`. Must be called inside a tokio runtime.
    pub fn open<F>(address: impl Into<String>, config: StreamingConfig, on_ready: F) -> Self
    where
        F: FnOnce(&TileRequester) + Send + 'static,
    {
        let address = address.into();
        let (requester, outbound) = TileRequester::new(config);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_channel(
            address,
            requester.clone(),
            outbound,
            shutdown.clone(),
            on_ready,
        ));
        Self {
            requester,
            shutdown,
            task,
        }
    }

    /// Open the channel and wait until it is ready.
    pub async fn connect(address: impl Into<String>, config: StreamingConfig) -> Result<Self, StreamError> {
        let connection = Self::open(address, config, |_| {});
        connection.requester.wait_open().await?;
        Ok(connection)
    }

    pub fn requester(&self) -> &TileRequester {
        &self.requester
    }

    /// Close the channel and wait for the transport task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(err) = self.task.await {
            warn!(%err, "tile channel task ended abnormally");
        }
    }
}

async fn run_channel<F>(
    address: String,
    requester: TileRequester,
    mut outbound: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
    on_ready: F,
) where
    F: FnOnce(&TileRequester) + Send + 'static,
{
    let connected = tokio::select! {
        _ = shutdown.cancelled() => {
            requester.mark_closed();
            return;
        }
        res = connect_async(address.as_str()) => res,
    };
    let ws = match connected {
        Ok((ws, _response)) => ws,
        Err(err) => {
            error!(%address, %err, "failed to open tile channel");
            requester.mark_closed();
            return;
        }
    };

    info!(%address, "tile channel open");
    requester.mark_open();
    on_ready(&requester);

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut sweep = tokio::time::interval(requester.config().sweep_interval());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            Some(text) = outbound.recv() => {
                if let Err(err) = ws_tx.send(Message::Text(text)).await {
                    warn!(%err, "failed to send tile request");
                    break;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    requester.handle_message(&text);
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "tile channel closed by server");
                    break;
                }
                Some(Ok(other)) => {
                    debug!(kind = ?message_kind(&other), "ignoring non-text frame");
                }
                Some(Err(err)) => {
                    warn!(%err, "tile channel receive error");
                    break;
                }
                None => {
                    info!("tile channel stream ended");
                    break;
                }
            },
            _ = sweep.tick() => {
                let expired = requester.expire_stale(Instant::now());
                if expired > 0 {
                    debug!(expired, "swept stale tile requests");
                }
            }
        }
    }

    requester.mark_closed();
    info!(%address, "tile channel closed");
}

fn message_kind(msg: &Message) -> &'static str {
    match msg {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

/// Derive the channel address from a page URL: `http` becomes `ws`, `https`
/// becomes `wss`, and the path is kept.
pub fn channel_address(page_url: &str) -> Result<String, StreamError> {
    let url = Url::parse(page_url).map_err(|err| StreamError::InvalidAddress {
        address: page_url.to_string(),
        message: err.to_string(),
    })?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(StreamError::InvalidAddress {
                address: page_url.to_string(),
                message: format!("unsupported scheme '{other}'"),
            });
        }
    };
    let rest = &url.as_str()[url.scheme().len()..];
    Ok(format!("{scheme}{rest}"))
}
