//! Locating the daemon's socket.

use std::env;

use serde_derive::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::*;

#[derive(Debug, Deserialize)]
struct SocknameReply {
    #[serde(default)]
    version: Option<String>,
    sockname: String,
}

/// Resolve the socket path for `config`.
///
/// An explicit `address` wins. Otherwise the environment variable named by
/// `socket_env` is used when set and non-empty, and as a last resort the
/// `watchman get-sockname` helper is asked.
pub async fn resolve(config: &ClientConfig) -> Result<String> {
    if let Some(ref address) = config.address {
        return Ok(address.clone());
    }

    if let Some(address) = from_env(&config.socket_env) {
        debug!(env = %config.socket_env, %address, "socket path from environment");
        return Ok(address);
    }

    debug!(bin = %config.watchman_bin.display(), "asking watchman for its socket");
    let output = Command::new(&config.watchman_bin)
        .arg("get-sockname")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            Error::Discovery(format!(
                "cannot run '{} get-sockname': {}",
                config.watchman_bin.display(),
                e
            ))
        })?;

    if !output.status.success() {
        return Err(Error::Discovery(format!(
            "'{} get-sockname' exited with {}: {}",
            config.watchman_bin.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_sockname(&output.stdout)
}

fn from_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_sockname(stdout: &[u8]) -> Result<String> {
    let reply: SocknameReply = serde_json::from_slice(stdout)
        .map_err(|e| Error::Discovery(format!("unexpected get-sockname output: {}", e)))?;
    debug!(version = ?reply.version, sockname = %reply.sockname, "discovered socket");
    Ok(reply.sockname)
}
