//! Client for the [watchman](https://facebook.github.io/watchman/) file
//! watching daemon.
//!
//! The daemon speaks JSON over a local stream socket. A command is a JSON
//! array written on one line; the daemon answers every command with exactly
//! one JSON object, in order. In between replies it may push two kinds of
//! unsolicited frames on the same stream: log lines (objects carrying `log`)
//! and subscription notifications (objects carrying `subscription`).
//!
//! A [`Client`] multiplexes one such connection between any number of
//! concurrent callers. Each caller gets the reply to its own command, log
//! lines go to the client's log handler, and notifications go to the handler
//! registered for their subscription.
//!
//! ```no_run
//! use watchman::{expr, Client, QueryOptions};
//!
//! # async fn run() -> watchman::Result<()> {
//! let client = Client::new();
//! client.connect().await?;
//!
//! let project = client.watch_project("/home/me/src/project").await?;
//! let result = client
//!     .query(
//!         &project.watch,
//!         &QueryOptions {
//!             expression: Some(expr::all_of(vec![expr::exists(), expr::suffix("rs")])),
//!             fields: vec!["name".into()],
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! for file in result.files {
//!     println!("{}", file.name);
//! }
//! client.close().await
//! # }
//! ```
//!
//! The protocol state machine lives in [`sansio`] and performs no I/O; the
//! client drives it from a Tokio task.

pub mod address;
mod client;
mod command;
mod commands;
mod config;
mod error;
pub mod expr;
pub mod models;
pub mod sansio;
mod stream;
mod wire;


pub use crate::client::{Client, ConnectionState, LogHandler, SubscriptionHandler};
pub use crate::command::Command;
pub use crate::config::{ClientConfig, DEFAULT_SOCKET_ENV};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::expr::Expr;
pub use crate::models::{
    File, Path, QueryOptions, QueryResult, Stdin, SubscriptionEvent, SubscriptionOptions,
    TriggerOptions, WatchProject, WatchmanConfig,
};
pub use crate::stream::{Connector, Transport, UnixConnector};
