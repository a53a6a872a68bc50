//! Typed wrappers for the daemon's commands.
//!
//! Each method builds one [`Command`] and decodes the fields of the reply the
//! caller cares about. Anything not covered here can be sent with
//! [`Client::send`].

use std::sync::Arc;

use serde_derive::Deserialize;

use crate::client::{Client, Effect};
use crate::command::Command;
use crate::error::*;
use crate::models::{
    File, QueryOptions, QueryResult, SubscriptionEvent, SubscriptionOptions, TriggerOptions,
    WatchProject, WatchmanConfig,
};

#[derive(Deserialize)]
struct VersionReply {
    version: String,
}

#[derive(Deserialize)]
struct ClockReply {
    clock: String,
}

#[derive(Deserialize)]
struct ConfigReply {
    #[serde(default)]
    config: WatchmanConfig,
}

#[derive(Deserialize)]
struct SocknameReply {
    sockname: String,
}

#[derive(Deserialize)]
struct CapabilitiesReply {
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Deserialize)]
struct LogReply {
    #[serde(default)]
    logged: bool,
}

#[derive(Deserialize)]
struct RootsReply {
    #[serde(default)]
    roots: Vec<String>,
}

#[derive(Deserialize)]
struct TriggerListReply {
    #[serde(default)]
    triggers: Vec<TriggerEntry>,
}

#[derive(Deserialize)]
struct TriggerEntry {
    name: String,
}

#[derive(Deserialize)]
struct FilesReply {
    clock: String,
    #[serde(default)]
    files: Vec<File>,
    #[serde(default)]
    is_fresh_instance: bool,
}

impl From<FilesReply> for QueryResult {
    fn from(r: FilesReply) -> Self {
        QueryResult {
            clock: r.clock,
            files: r.files,
            is_fresh_instance: r.is_fresh_instance,
        }
    }
}

impl Client {
    /// The daemon's version string.
    pub async fn version(&self) -> Result<String> {
        let reply: VersionReply = self.send(Command::new("version")).await?;
        Ok(reply.version)
    }

    /// The current clock of a watched root.
    pub async fn clock(&self, root: &str) -> Result<String> {
        let reply: ClockReply = self.send(Command::new("clock").arg(root)).await?;
        Ok(reply.clock)
    }

    /// Files under `dir` matching any of the glob `patterns` (all files when
    /// empty).
    pub async fn find(&self, dir: &str, patterns: &[&str]) -> Result<QueryResult> {
        let reply: FilesReply = self
            .send(Command::new("find").arg(dir).args(patterns))
            .await?;
        Ok(reply.into())
    }

    pub async fn get_config(&self, dir: &str) -> Result<WatchmanConfig> {
        let reply: ConfigReply = self.send(Command::new("get-config").arg(dir)).await?;
        Ok(reply.config)
    }

    pub async fn get_sockname(&self) -> Result<String> {
        let reply: SocknameReply = self.send(Command::new("get-sockname")).await?;
        Ok(reply.sockname)
    }

    pub async fn list_capabilities(&self) -> Result<Vec<String>> {
        let reply: CapabilitiesReply = self.send(Command::new("list-capabilities")).await?;
        Ok(reply.capabilities)
    }

    /// Write `message` to the daemon's log at `level`; returns whether it was
    /// logged.
    pub async fn log(&self, level: &str, message: &str) -> Result<bool> {
        let reply: LogReply = self
            .send(Command::new("log").arg(level).arg(message))
            .await?;
        Ok(reply.logged)
    }

    /// Ask the daemon to push its log lines at `level` and above to this
    /// connection. They arrive at the client's log handler.
    pub async fn log_level(&self, level: &str) -> Result<()> {
        self.send_and_discard(Command::new("log-level").arg(level))
            .await
    }

    pub async fn query(&self, dir: &str, options: &QueryOptions) -> Result<QueryResult> {
        let reply: FilesReply = self
            .send(Command::new("query").arg(dir).arg(options))
            .await?;
        Ok(reply.into())
    }

    /// Files under `dir` changed since `clock`, optionally filtered by glob
    /// `patterns`.
    pub async fn since(&self, dir: &str, clock: &str, patterns: &[&str]) -> Result<QueryResult> {
        let reply: FilesReply = self
            .send(Command::new("since").arg(dir).arg(clock).args(patterns))
            .await?;
        Ok(reply.into())
    }

    /// Subscribe to changes under `root`.
    ///
    /// `handler` is registered before the command is written, so notifications
    /// that overtake the reply are not lost. It is removed again if the daemon
    /// rejects the subscription.
    pub async fn subscribe<F>(
        &self,
        root: &str,
        name: &str,
        options: &SubscriptionOptions,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(SubscriptionEvent) + Send + Sync + 'static,
    {
        let command = Command::new("subscribe").arg(root).arg(name).arg(options);
        let effect = Effect::Subscribe {
            name: name.to_string(),
            handler: Arc::new(handler),
        };
        self.request(command, effect).await.map(|_| ())
    }

    /// Cancel a subscription; its handler is dropped once the daemon confirms.
    pub async fn unsubscribe(&self, root: &str, name: &str) -> Result<()> {
        let command = Command::new("unsubscribe").arg(root).arg(name);
        let effect = Effect::Unsubscribe {
            name: name.to_string(),
        };
        self.request(command, effect).await.map(|_| ())
    }

    pub async fn trigger(&self, root: &str, options: &TriggerOptions) -> Result<()> {
        self.send_and_discard(Command::new("trigger").arg(root).arg(options))
            .await
    }

    pub async fn trigger_del(&self, root: &str, name: &str) -> Result<()> {
        self.send_and_discard(Command::new("trigger-del").arg(root).arg(name))
            .await
    }

    /// Names of the triggers registered on `root`.
    pub async fn trigger_list(&self, root: &str) -> Result<Vec<String>> {
        let reply: TriggerListReply = self.send(Command::new("trigger-list").arg(root)).await?;
        Ok(reply.triggers.into_iter().map(|t| t.name).collect())
    }

    pub async fn watch(&self, dir: &str) -> Result<()> {
        self.send_and_discard(Command::new("watch").arg(dir)).await
    }

    pub async fn watch_del(&self, dir: &str) -> Result<()> {
        self.send_and_discard(Command::new("watch-del").arg(dir))
            .await
    }

    /// Stop watching every root; returns the roots that were dropped.
    pub async fn watch_del_all(&self) -> Result<Vec<String>> {
        let reply: RootsReply = self.send(Command::new("watch-del-all")).await?;
        Ok(reply.roots)
    }

    pub async fn watch_list(&self) -> Result<Vec<String>> {
        let reply: RootsReply = self.send(Command::new("watch-list")).await?;
        Ok(reply.roots)
    }

    /// Watch the project containing `dir`.
    pub async fn watch_project(&self, dir: &str) -> Result<WatchProject> {
        self.send(Command::new("watch-project").arg(dir)).await
    }
}
