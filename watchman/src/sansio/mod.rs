//! Sans-IO implementation of the watchman JSON protocol.
//!
//! This module provides a pure state machine implementation of the
//! client side of the protocol that is independent of any I/O operations:
//!
//! - `FrameDecoder`: feed incoming bytes, take out classified frames
//! - `Dispatcher`: correlate the single outstanding command with its reply
//!   and route push events (log lines, subscription notifications)
//!
//! The async [`Client`](crate::Client) drives these from a reader task and a
//! dispatcher task.
//!
//! # Example
//!
//! ```
//! use watchman::sansio::{Dispatcher, FrameDecoder, Route};
//! use watchman::Command;
//!
//! let mut dispatcher: Dispatcher<&str, ()> = Dispatcher::new();
//! let mut decoder = FrameDecoder::new();
//!
//! // 1. Send data
//! let transmit = dispatcher.send_command("caller-1", Command::new("clock").arg("/tmp/x"))
//!     .map_err(|(_, e)| e)?;
//! # let _ = transmit;
//!
//! // 2. Receive data
//! decoder.extend(b"{\"log\":\"notice: hi\"}\n{\"clock\":\"c:123:1\"}\n");
//!
//! // 3. Route frames
//! while let Some(envelope) = decoder.next_envelope()? {
//!     match dispatcher.handle_envelope(envelope)? {
//!         Route::Log(line) => assert_eq!(line, "notice: hi"),
//!         Route::Reply { pending, outcome } => {
//!             assert_eq!(pending, "caller-1");
//!             assert!(outcome.is_ok());
//!         }
//!         Route::Subscription { .. } => unreachable!(),
//!     }
//! }
//! # Ok::<(), watchman::Error>(())
//! ```

pub mod dispatcher;
pub mod protocol;
pub mod types;

pub use self::dispatcher::{Dispatcher, DispatcherState};
pub use self::protocol::{parse_envelope, parse_message, serialize_command, FrameDecoder};
pub use self::types::{Envelope, ParseResult, Reply, Route, Transmit};
