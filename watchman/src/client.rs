//! The connection multiplexer.
//!
//! A connected [`Client`] runs two tasks:
//!
//! - the reader task owns the read half of the transport and turns bytes into
//!   [`Envelope`]s, forever, without waiting on anybody;
//! - the dispatcher task owns everything else: the write half, the single
//!   outstanding request, the subscription handlers and the log handler.
//!
//! Callers talk to the dispatcher task through channels only. Requests queue
//! up in its inbox and are taken one at a time, and only while no other
//! request is waiting for its reply, which is what keeps replies and callers
//! paired up. The dispatcher task is the only writer to the socket; it writes
//! each command while moving from idle to awaiting-reply.

use std::future::Future;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::address;
use crate::command::Command;
use crate::config::ClientConfig;
use crate::error::*;
use crate::models::SubscriptionEvent;
use crate::sansio::{Dispatcher, Envelope, FrameDecoder, Reply, Route};
use crate::stream::{Connector, Transport, UnixConnector};
use crate::wire::{self, Direction};

/// Receives every log line the daemon pushes.
pub type LogHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Receives every notification for one subscription.
pub type SubscriptionHandler = Arc<dyn Fn(SubscriptionEvent) + Send + Sync>;

/// Lifecycle of a client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
    Closing,
    Closed,
}

/// Registry change that takes effect together with a command.
pub(crate) enum Effect {
    None,
    Subscribe {
        name: String,
        handler: SubscriptionHandler,
    },
    Unsubscribe {
        name: String,
    },
}

struct Request {
    command: Command,
    reply: oneshot::Sender<Result<Reply>>,
    effect: Effect,
}

enum Control {
    Close(oneshot::Sender<Result<()>>),
}

/// The request occupying the dispatcher's single slot.
struct Pending {
    verb: String,
    reply: oneshot::Sender<Result<Reply>>,
    applied: Applied,
}

/// What a request already did to the handler registry, so it can be undone.
enum Applied {
    Nothing,
    Subscribed {
        name: String,
        previous: Option<SubscriptionHandler>,
    },
    Unsubscribe {
        name: String,
    },
}

impl Pending {
    fn complete(
        self,
        outcome: Result<Reply>,
        dispatcher: &mut Dispatcher<Pending, SubscriptionHandler>,
    ) {
        match (self.applied, outcome.is_ok()) {
            (Applied::Subscribed { name, previous }, false) => match previous {
                Some(handler) => {
                    dispatcher.register(name, handler);
                }
                None => {
                    dispatcher.unregister(&name);
                }
            },
            (Applied::Unsubscribe { name }, true) => {
                dispatcher.unregister(&name);
            }
            _ => {}
        }

        if self.reply.send(outcome).is_err() {
            debug!(command = %self.verb, "caller stopped waiting before the reply arrived");
        }
    }

    fn fail(self, error: Error) {
        let _ = self.reply.send(Err(error));
    }
}

/// Handle to a running session.
#[derive(Clone)]
struct Session {
    requests: mpsc::UnboundedSender<Request>,
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ConnectionState>,
}

/// A client for one watchman socket connection.
///
/// `Client` is `Send + Sync`; share it behind an `Arc` and call [`send`] from
/// as many tasks as needed. Each call waits for the reply to its own command.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> watchman::Result<()> {
/// let client = watchman::Client::new().with_log_handler(|line| eprintln!("watchman: {}", line));
/// client.connect().await?;
/// let version = client.version().await?;
/// println!("{}", version);
/// client.close().await
/// # }
/// ```
///
/// [`send`]: Client::send
pub struct Client {
    config: ClientConfig,
    log_handler: Option<LogHandler>,
    session: OnceLock<Session>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Client {
            config,
            log_handler: None,
            session: OnceLock::new(),
        }
    }

    /// Set the callback for log lines the daemon pushes.
    ///
    /// The callback runs on the dispatcher task; a panic inside it is caught
    /// and logged.
    pub fn with_log_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.log_handler = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        match self.session.get() {
            Some(session) => *session.state.borrow(),
            None => ConnectionState::Unconnected,
        }
    }

    /// Locate the daemon's socket and connect to it.
    ///
    /// See [`address::resolve`] for the lookup order. A client connects at
    /// most once; further calls fail with [`Error::AlreadyConnected`].
    pub async fn connect(&self) -> Result<()> {
        self.ensure_unconnected()?;
        let address = address::resolve(&self.config).await?;
        self.connect_to(&address).await
    }

    /// Connect to the unix socket at `address`, skipping discovery.
    pub async fn connect_to(&self, address: &str) -> Result<()> {
        self.connect_using(&UnixConnector, address).await
    }

    /// Connect through a custom [`Connector`].
    pub async fn connect_using(&self, connector: &dyn Connector, address: &str) -> Result<()> {
        self.ensure_unconnected()?;
        debug!(%address, "connecting");
        let transport = connector.connect(address).await?;
        self.connect_with(transport)
    }

    /// Start a session on an already established stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect_with<T: Transport>(&self, transport: T) -> Result<()> {
        self.ensure_unconnected()?;
        let session = spawn_session(transport, &self.config, self.log_handler.clone());
        if self.session.set(session).is_err() {
            // Lost a race with a concurrent connect; dropping the handle
            // winds the surplus session down.
            return Err(Error::AlreadyConnected);
        }
        Ok(())
    }

    fn ensure_unconnected(&self) -> Result<()> {
        match self.session.get() {
            Some(_) => Err(Error::AlreadyConnected),
            None => Ok(()),
        }
    }

    /// Send a command and decode its reply into `T`.
    ///
    /// Waits until this command's own reply arrives, however many other
    /// callers are sending concurrently. A reply carrying an `error` field
    /// yields [`Error::CommandFailed`] and leaves the connection usable.
    pub async fn send<T: DeserializeOwned>(&self, command: Command) -> Result<T> {
        let reply = self.request(command, Effect::None).await?;
        serde_json::from_slice(&reply.raw).map_err(Error::ResultDecode)
    }

    /// Send a command and ignore the body of its reply.
    pub async fn send_and_discard(&self, command: Command) -> Result<()> {
        self.request(command, Effect::None).await.map(|_| ())
    }

    pub(crate) async fn request(&self, command: Command, effect: Effect) -> Result<Reply> {
        let session = self.session.get().ok_or(Error::NotConnected)?;
        let (reply, done) = oneshot::channel();
        session
            .requests
            .send(Request {
                command,
                reply,
                effect,
            })
            .map_err(|_| Error::ConnectionClosed)?;
        done.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close the connection.
    ///
    /// A command still waiting for its reply, and every command queued behind
    /// it, fails with [`Error::ConnectionClosed`]. Returns the result of
    /// shutting the transport down; closing again, or closing a client that
    /// never connected, is a no-op.
    pub async fn close(&self) -> Result<()> {
        let session = match self.session.get() {
            Some(session) => session,
            None => return Ok(()),
        };
        let (tx, rx) = oneshot::channel();
        if session.control.send(Control::Close(tx)).is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

fn spawn_session<T: Transport>(
    transport: T,
    config: &ClientConfig,
    log_handler: Option<LogHandler>,
) -> Session {
    let (read_half, write_half) = tokio::io::split(transport);
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);

    let reader = tokio::spawn(read_loop(read_half, frames_tx, config.read_buffer_size));

    let actor = Actor {
        writer: write_half,
        dispatcher: Dispatcher::new(),
        log_handler,
        requests: requests_rx,
        control: control_rx,
        frames: frames_rx,
        reader,
        state: state_tx,
        timeout: config.request_timeout,
        deadline: None,
    };
    tokio::spawn(actor.run());
    debug!("session started");

    Session {
        requests: requests_tx,
        control: control_tx,
        state: state_rx,
    }
}

/// Decode frames off the wire until the stream ends or turns out malformed.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    frames: mpsc::UnboundedSender<Result<Envelope>>,
    buffer_size: usize,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; buffer_size.max(1)];

    loop {
        loop {
            match decoder.next_envelope() {
                Ok(Some(envelope)) => {
                    wire::log_frame(Direction::Response, &envelope.raw);
                    if frames.send(Ok(envelope)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = frames.send(Err(e));
                    return;
                }
            }
        }

        let n = match reader.read(&mut buf).await {
            Ok(0) if decoder.has_partial() => {
                let _ = frames.send(Err(Error::Decode("stream ended inside a frame".into())));
                return;
            }
            Ok(0) => {
                let _ = frames.send(Err(Error::ConnectionClosed));
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = frames.send(Err(e.into()));
                return;
            }
        };
        decoder.extend(&buf[..n]);
    }
}

enum Exit {
    Close(oneshot::Sender<Result<()>>),
    Fatal(Error),
    Dropped,
}

struct Actor<W> {
    writer: W,
    dispatcher: Dispatcher<Pending, SubscriptionHandler>,
    log_handler: Option<LogHandler>,
    requests: mpsc::UnboundedReceiver<Request>,
    control: mpsc::UnboundedReceiver<Control>,
    frames: mpsc::UnboundedReceiver<Result<Envelope>>,
    reader: JoinHandle<()>,
    state: watch::Sender<ConnectionState>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl<T: Transport> Actor<WriteHalf<T>> {
    async fn run(mut self) {
        let exit = loop {
            let deadline = self.deadline;
            let expired = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;

                ctl = self.control.recv() => match ctl {
                    Some(Control::Close(done)) => break Exit::Close(done),
                    None => break Exit::Dropped,
                },

                () = expired => {
                    break Exit::Fatal(Error::Timeout(self.timeout.unwrap_or_default()));
                }

                // Polled before frames. Only while idle: one command in flight.
                request = self.requests.recv(), if self.dispatcher.is_idle() => match request {
                    Some(request) => {
                        if let Err(exit) = self.start(request).await {
                            break exit;
                        }
                    }
                    None => break Exit::Dropped,
                },

                frame = self.frames.recv() => match frame {
                    Some(Ok(envelope)) => {
                        if let Err(e) = self.route(envelope) {
                            break Exit::Fatal(e);
                        }
                    }
                    Some(Err(e)) => break Exit::Fatal(e),
                    None => break Exit::Fatal(Error::ConnectionClosed),
                },
            }
        };

        self.shutdown(exit).await;
    }

    /// Accept one request and write its command.
    ///
    /// A failed write fails only this request. An error return means the
    /// session must end: either a close arrived while the frame was being
    /// written, or the write timed out. Both may leave half a frame on the
    /// stream.
    async fn start(&mut self, request: Request) -> std::result::Result<(), Exit> {
        let Request {
            command,
            reply,
            effect,
        } = request;

        if reply.is_closed() {
            debug!(command = %command.verb(), "caller gave up before sending");
            return Ok(());
        }

        let applied = match effect {
            Effect::None => Applied::Nothing,
            Effect::Subscribe { name, handler } => {
                let previous = self.dispatcher.register(name.clone(), handler);
                Applied::Subscribed { name, previous }
            }
            Effect::Unsubscribe { name } => Applied::Unsubscribe { name },
        };

        let pending = Pending {
            verb: command.verb().to_string(),
            reply,
            applied,
        };

        let transmit = match self.dispatcher.send_command(pending, command) {
            Ok(transmit) => transmit,
            Err((pending, e)) => {
                pending.complete(Err(e), &mut self.dispatcher);
                return Ok(());
            }
        };

        wire::log_frame(Direction::Request, &transmit.payload);
        let write = bounded(self.timeout, write_frame(&mut self.writer, &transmit.payload));
        let written = tokio::select! {
            biased;

            ctl = self.control.recv() => {
                debug!("close requested while writing a command");
                return Err(match ctl {
                    Some(Control::Close(done)) => Exit::Close(done),
                    None => Exit::Dropped,
                });
            }

            written = write => written,
        };

        match written {
            Ok(()) => {
                self.deadline = self.timeout.map(|t| Instant::now() + t);
                Ok(())
            }
            Err(e) => {
                let timed_out = e.kind() == io::ErrorKind::TimedOut;
                if let Some(pending) = self.dispatcher.write_failed() {
                    let error = match (timed_out, self.timeout) {
                        (true, Some(t)) => Error::Timeout(t),
                        _ => Error::from(e),
                    };
                    pending.complete(Err(error), &mut self.dispatcher);
                }
                if timed_out {
                    Err(Exit::Fatal(Error::ConnectionClosed))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn route(&mut self, envelope: Envelope) -> Result<()> {
        match self.dispatcher.handle_envelope(envelope)? {
            Route::Log(line) => {
                self.deliver_log(&line);
                Ok(())
            }
            Route::Subscription { name, handler, raw } => {
                let event: SubscriptionEvent = serde_json::from_slice(&raw).map_err(|e| {
                    Error::Decode(format!("notification for '{}': {}", name, e))
                })?;
                if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                    warn!(subscription = %name, "subscription handler panicked");
                }
                Ok(())
            }
            Route::Reply { pending, outcome } => {
                self.deadline = None;
                if let Ok(Reply {
                    warning: Some(ref warning),
                    ..
                }) = outcome
                {
                    warn!(command = %pending.verb, "daemon warning: {}", warning);
                }
                pending.complete(outcome, &mut self.dispatcher);
                Ok(())
            }
        }
    }

    fn deliver_log(&self, line: &str) {
        match self.log_handler {
            Some(ref handler) => {
                if catch_unwind(AssertUnwindSafe(|| handler(line))).is_err() {
                    warn!("log handler panicked");
                }
            }
            None => debug!(target: "watchman::daemon", "{}", line.trim_end()),
        }
    }

    async fn shutdown(mut self, exit: Exit) {
        self.state.send_replace(ConnectionState::Closing);
        self.reader.abort();

        let (closer, cause) = match exit {
            Exit::Close(done) => {
                debug!("closing connection");
                (Some(done), Error::ConnectionClosed)
            }
            Exit::Fatal(e) => {
                warn!(error = %e, "connection lost");
                (None, e)
            }
            Exit::Dropped => {
                debug!("client dropped, closing connection");
                (None, Error::ConnectionClosed)
            }
        };

        if let Some(pending) = self.dispatcher.abort() {
            pending.fail(cause);
        }

        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            let _ = request.reply.send(Err(Error::ConnectionClosed));
        }

        let result = self.writer.shutdown().await.map_err(Error::from);
        self.state.send_replace(ConnectionState::Closed);

        if let Some(done) = closer {
            let _ = done.send(result);
        }

        self.control.close();
        while let Ok(Control::Close(done)) = self.control.try_recv() {
            let _ = done.send(Ok(()));
        }
        debug!("session ended");
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}

async fn bounded<F>(limit: Option<Duration>, write: F) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "write to daemon timed out",
            )),
        },
        None => write.await,
    }
}
