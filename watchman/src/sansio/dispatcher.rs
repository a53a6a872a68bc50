//! Dispatcher state machine for the watchman protocol.
//!
//! This module implements the request/reply correlation logic without any I/O
//! operations. The daemon answers commands strictly in order and never
//! interleaves two of them, so a single slot is enough to remember the one
//! request that is waiting for its reply. Everything that arrives while that
//! slot is filled is either a push event or the reply.

use std::collections::HashMap;

use super::protocol::{excerpt, serialize_command};
use super::types::{Envelope, Reply, Route, Transmit};
use crate::command::Command;
use crate::{Error, Result};

/// Dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// No request outstanding
    Idle,
    /// Exactly one request is waiting for its reply
    AwaitingReply,
}

/// Sans-IO dispatcher.
///
/// `P` is whatever the driver needs to hand the outcome back to the issuing
/// caller (a completion channel, a test token). `H` is a subscription
/// handler; it is cloned out of the registry for every notification.
///
/// - `send_command()`: accept a command and produce the bytes to write
/// - `handle_envelope()`: route one inbound frame
/// - `abort()`: give up the outstanding request when the connection dies
///
/// # Example
///
/// ```
/// use watchman::sansio::{Dispatcher, Route};
/// use watchman::sansio::protocol::parse_envelope;
/// use watchman::Command;
///
/// let mut dispatcher: Dispatcher<u32, ()> = Dispatcher::new();
/// let transmit = dispatcher.send_command(7, Command::new("version")).unwrap();
/// assert_eq!(transmit.payload, b"[\"version\"]\n");
///
/// let envelope = parse_envelope(b"{\"version\":\"4.9.0\"}".to_vec()).unwrap();
/// match dispatcher.handle_envelope(envelope).unwrap() {
///     Route::Reply { pending, outcome } => {
///         assert_eq!(pending, 7);
///         assert!(outcome.is_ok());
///     }
///     _ => panic!("expected a reply"),
/// }
/// assert!(dispatcher.is_idle());
/// ```
#[derive(Debug)]
pub struct Dispatcher<P, H> {
    pending: Option<P>,
    handlers: HashMap<String, H>,
}

impl<P, H: Clone> Dispatcher<P, H> {
    pub fn new() -> Self {
        Self {
            pending: None,
            handlers: HashMap::new(),
        }
    }

    /// Accept a command for sending.
    ///
    /// On success the request is recorded as outstanding and the encoded
    /// frame is returned; the caller must write it before feeding any more
    /// input. If the dispatcher is already waiting for a reply, or the command
    /// cannot be encoded, `pending` is handed back together with the error so
    /// the caller can fail it.
    pub fn send_command(
        &mut self,
        pending: P,
        command: Command,
    ) -> std::result::Result<Transmit, (P, Error)> {
        if self.pending.is_some() {
            return Err((
                pending,
                Error::ProtocolViolation("a command is already awaiting its reply".into()),
            ));
        }
        match serialize_command(command) {
            Ok(payload) => {
                self.pending = Some(pending);
                Ok(Transmit::new(payload))
            }
            Err(e) => Err((pending, e)),
        }
    }

    /// Forget the outstanding request after its frame could not be written.
    pub fn write_failed(&mut self) -> Option<P> {
        self.pending.take()
    }

    /// Route one inbound frame.
    ///
    /// Log lines and notifications for registered subscriptions leave the
    /// outstanding request untouched. Any other frame is the reply to it.
    /// An error here means the client and the daemon no longer agree on the
    /// state of the conversation and the connection must be torn down.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Result<Route<P, H>> {
        if let Some(log) = envelope.log {
            return Ok(Route::Log(log));
        }

        if let Some(name) = envelope.subscription {
            return match self.handlers.get(&name) {
                Some(handler) => Ok(Route::Subscription {
                    handler: handler.clone(),
                    name,
                    raw: envelope.raw,
                }),
                None => Err(Error::ProtocolViolation(format!(
                    "notification for unknown subscription '{}'",
                    name
                ))),
            };
        }

        let pending = match self.pending.take() {
            Some(p) => p,
            None => {
                return Err(Error::ProtocolViolation(format!(
                    "reply without a request: {}",
                    excerpt(&envelope.raw)
                )))
            }
        };

        let outcome = match envelope.error {
            Some(message) => Err(Error::CommandFailed(message)),
            None => Ok(Reply {
                warning: envelope.warning,
                raw: envelope.raw,
            }),
        };

        Ok(Route::Reply { pending, outcome })
    }

    /// Take the outstanding request, if any, so it can be failed.
    pub fn abort(&mut self) -> Option<P> {
        self.pending.take()
    }

    /// Register the handler for a subscription name, replacing any previous one.
    pub fn register(&mut self, name: String, handler: H) -> Option<H> {
        self.handlers.insert(name, handler)
    }

    pub fn unregister(&mut self, name: &str) -> Option<H> {
        self.handlers.remove(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn state(&self) -> DispatcherState {
        match self.pending {
            Some(_) => DispatcherState::AwaitingReply,
            None => DispatcherState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }
}

impl<P, H: Clone> Default for Dispatcher<P, H> {
    fn default() -> Self {
        Self::new()
    }
}
