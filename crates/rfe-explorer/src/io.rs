//! IO task: the single owner of the device transport.
//!
//! One tokio task owns the transport exclusively. It writes outgoing
//! commands as they arrive on a request channel and, while idle, polls the
//! transport for the unsolicited stream of configuration frames, sweeps and
//! text lines the device produces. Received bytes go through a
//! [`FrameSplitter`]; every completed [`Token`] is forwarded on an unbounded
//! channel for the session to drain at its own pace.
//!
//! Two pieces of state are shared outside the channels:
//!
//! - the last decoded configuration, published as an immutable snapshot on a
//!   `watch` channel and replaced wholesale on every new frame;
//! - the link flags: whether the transport is currently usable, and whether
//!   a tracking sweep is in progress (which turns off the idle sleep so
//!   tracking steps are read as fast as they arrive).
//!
//! No error ends the loop. Read failures are logged, the link is marked
//! down, and polling continues until the task is cancelled or shut down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use rfe_core::error::{Error, Result};
use rfe_core::transport::Transport;

use crate::config::Configuration;
use crate::framer::{FrameSplitter, Token, DEFAULT_MAX_BUFFER, DEFAULT_RESYNC_LIMIT};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// How long a single idle read waits for bytes.
    pub read_timeout: Duration,
    /// Pause after an idle read that returned nothing.
    pub idle_sleep: Duration,
    /// Size of the read buffer handed to the transport.
    pub read_chunk: usize,
    /// Receive buffer bound; exceeding it discards everything buffered.
    pub max_buffer: usize,
    /// Consecutive corrupted frames tolerated before the receive buffer is
    /// cleared.
    pub resync_limit: u32,
    /// Keep the undecoded payload on every sweep.
    pub capture_raw: bool,
    /// Extra time allowed on top of a request's own timeout before the
    /// caller gives up on the task.
    pub reply_grace: Duration,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            read_timeout: Duration::from_millis(100),
            idle_sleep: Duration::from_millis(10),
            read_chunk: 4096,
            max_buffer: DEFAULT_MAX_BUFFER,
            resync_limit: DEFAULT_RESYNC_LIMIT,
            capture_raw: false,
            reply_grace: Duration::from_millis(500),
        }
    }
}

/// A request sent from the session to the IO task.
pub enum Request {
    /// Write a framed command.
    Send {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Graceful shutdown; returns the transport so it can be closed.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Flags shared between the IO task and its handle.
#[derive(Debug)]
pub struct LinkState {
    connected: AtomicBool,
    tracking: AtomicBool,
}

impl LinkState {
    fn new(connected: bool) -> Self {
        LinkState {
            connected: AtomicBool::new(connected),
            tracking: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::AcqRel);
        if was != connected {
            if connected {
                tracing::info!("device link restored");
            } else {
                tracing::warn!("device link lost");
            }
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::Acquire)
    }

    pub fn set_tracking(&self, tracking: bool) {
        self.tracking.store(tracking, Ordering::Release);
    }
}

/// Handle to the IO task. Owned by the device session.
pub struct DeviceIo {
    /// Command channel into the IO loop.
    pub cmd_tx: mpsc::Sender<Request>,
    /// Cancellation token for the IO loop.
    pub cancel: CancellationToken,
    /// Join handle for the IO task.
    pub task: JoinHandle<()>,
    tokens: mpsc::UnboundedReceiver<Token>,
    config_rx: watch::Receiver<Option<Arc<Configuration>>>,
    link: Arc<LinkState>,
    reply_grace: Duration,
}

impl DeviceIo {
    /// Write a framed command and wait for the write to complete.
    pub async fn send(&self, data: Vec<u8>, timeout: Duration) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Send {
                data,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        match tokio::time::timeout(timeout + self.reply_grace, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Next token already received, without waiting.
    pub fn try_next_token(&mut self) -> Option<Token> {
        self.tokens.try_recv().ok()
    }

    /// Wait for the next token. `None` once the IO task has stopped and every
    /// queued token has been taken.
    pub async fn next_token(&mut self) -> Option<Token> {
        self.tokens.recv().await
    }

    /// Number of tokens waiting to be drained.
    pub fn pending_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Snapshot of the configuration sweeps are currently decoded against.
    pub fn configuration(&self) -> Option<Arc<Configuration>> {
        self.config_rx.borrow().clone()
    }

    /// Whether the transport is usable and the IO task is running.
    pub fn is_connected(&self) -> bool {
        self.link.is_connected() && !self.task.is_finished()
    }

    pub fn link(&self) -> &Arc<LinkState> {
        &self.link
    }

    /// Stop idle sleeping while a tracking sweep runs.
    pub fn set_tracking(&self, tracking: bool) {
        self.link.set_tracking(tracking);
    }

    /// Shut down the IO task and recover the transport.
    ///
    /// Waits at most `timeout` for the task to hand the transport back. On
    /// timeout the task is cancelled and [`Error::Timeout`] returned.
    pub async fn shutdown(self, timeout: Duration) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send_timeout(Request::Shutdown { reply: reply_tx }, timeout)
            .await;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(transport)) => {
                let _ = self.task.await;
                Ok(transport)
            }
            Ok(Err(_)) => {
                self.cancel.cancel();
                Err(Error::NotConnected)
            }
            Err(_) => {
                tracing::warn!(?timeout, "IO task did not stop in time");
                self.cancel.cancel();
                Err(Error::Timeout)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle used to send commands and drain
/// tokens.
pub fn spawn_io_task(transport: Box<dyn Transport>, config: IoConfig) -> DeviceIo {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    let (token_tx, tokens) = mpsc::unbounded_channel::<Token>();
    let (config_tx, config_rx) = watch::channel::<Option<Arc<Configuration>>>(None);
    let link = Arc::new(LinkState::new(transport.is_connected()));
    let cancel = CancellationToken::new();
    let reply_grace = config.reply_grace;

    let task = tokio::spawn(io_loop(
        transport,
        config,
        cmd_rx,
        token_tx,
        config_tx,
        Arc::clone(&link),
        cancel.clone(),
    ));

    DeviceIo {
        cmd_tx,
        cancel,
        task,
        tokens,
        config_rx,
        link,
        reply_grace,
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// The main IO loop.
///
/// `tokio::select! { biased; }` gives priority to:
/// 1. Cancellation
/// 2. Outgoing requests
/// 3. Idle reads of the device stream
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    mut cmd_rx: mpsc::Receiver<Request>,
    token_tx: mpsc::UnboundedSender<Token>,
    config_tx: watch::Sender<Option<Arc<Configuration>>>,
    link: Arc<LinkState>,
    cancel: CancellationToken,
) {
    let mut framer = FrameSplitter::with_limits(config.max_buffer, config.resync_limit);
    framer.set_capture_raw(config.capture_raw);
    let mut read_buf = vec![0u8; config.read_chunk.max(1)];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break;
            }

            req = cmd_rx.recv() => {
                match req {
                    Some(Request::Send { data, reply }) => {
                        tracing::trace!(bytes = ?data, "send");
                        let result = transport.send(&data).await;
                        if let Err(e) = &result {
                            if is_link_error(e) {
                                link.set_connected(false);
                            } else {
                                tracing::error!(error = %e, "command write failed");
                            }
                        }
                        let _ = reply.send(result);
                    }
                    Some(Request::Shutdown { reply }) => {
                        debug!(stats = ?framer.stats(), "IO task shutdown requested");
                        link.set_connected(false);
                        let _ = reply.send(transport);
                        return;
                    }
                    None => {
                        debug!("command channel closed, exiting IO task");
                        break;
                    }
                }
            }

            // Idle: read whatever the device streams.
            _ = async {
                match transport.receive(&mut read_buf, config.read_timeout).await {
                    Ok(n) if n > 0 => {
                        link.set_connected(true);
                        tracing::trace!(len = n, "received");
                        for token in framer.push(&read_buf[..n]) {
                            if let Token::Configuration(cfg) = &token {
                                config_tx.send_replace(Some(Arc::clone(cfg)));
                            }
                            let _ = token_tx.send(token);
                        }
                    }
                    Ok(_) | Err(Error::Timeout) => {
                        if !link.is_tracking() {
                            tokio::time::sleep(config.idle_sleep).await;
                        }
                    }
                    Err(e) => {
                        if is_link_error(&e) {
                            link.set_connected(false);
                        } else {
                            tracing::error!(error = %e, "transport read failed");
                        }
                        tokio::time::sleep(config.idle_sleep).await;
                    }
                }
            } => {}
        }
    }

    link.set_connected(false);
}

fn is_link_error(e: &Error) -> bool {
    matches!(
        e,
        Error::NotConnected | Error::ConnectionLost | Error::Io(_) | Error::Transport(_)
    )
}
