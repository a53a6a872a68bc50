//! Core types for the sans-io watchman implementation.

use serde_derive::Deserialize;

/// Represents data to be written to the daemon.
///
/// The dispatcher produces a `Transmit` for every accepted command. The
/// caller is responsible for actually writing it to the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmit {
    /// One encoded frame, newline-terminated
    pub payload: Vec<u8>,
}

impl Transmit {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

/// Result of looking for one JSON value at the head of a byte buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult {
    /// A complete value was found
    Complete {
        /// The bytes of the value, without surrounding whitespace
        message: Vec<u8>,
        /// Number of bytes consumed from the input, including leading whitespace
        consumed: usize,
    },
    /// More data is needed to complete the value
    Incomplete,
    /// The buffer cannot start a valid JSON value
    Invalid {
        /// Description of the parse error
        error: String,
    },
}

/// The fields of an inbound frame needed to classify it.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub(crate) struct EnvelopeFields {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// One decoded inbound frame.
///
/// Carries just enough structure to tell a reply from a push event, plus the
/// raw bytes of the frame so the reply can later be decoded into whatever
/// type the issuing caller expects.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub version: Option<String>,
    /// Set when the daemon reports that the command failed
    pub error: Option<String>,
    /// Advisory text; never changes how the frame is handled
    pub warning: Option<String>,
    /// Set on unilateral log pushes
    pub log: Option<String>,
    /// Set on subscription notifications
    pub subscription: Option<String>,
    pub raw: Vec<u8>,
}

impl Envelope {
    pub(crate) fn new(fields: EnvelopeFields, raw: Vec<u8>) -> Self {
        Envelope {
            version: fields.version,
            error: fields.error,
            warning: fields.warning,
            log: fields.log,
            subscription: fields.subscription,
            raw,
        }
    }

    pub fn is_push(&self) -> bool {
        self.log.is_some() || self.subscription.is_some()
    }
}

/// The successful body of a reply, not yet decoded into a caller type.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub warning: Option<String>,
    pub raw: Vec<u8>,
}

/// Where the dispatcher sent an inbound frame.
#[derive(Debug)]
pub enum Route<P, H> {
    /// A daemon log line
    Log(String),
    /// A notification for a registered subscription
    Subscription {
        name: String,
        handler: H,
        raw: Vec<u8>,
    },
    /// The reply to the outstanding request
    Reply {
        pending: P,
        outcome: crate::Result<Reply>,
    },
}
