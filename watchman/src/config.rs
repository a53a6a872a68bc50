use std::path::PathBuf;
use std::time::Duration;

use serde_derive::Deserialize;

/// Environment variable the daemon exports with its socket path.
pub const DEFAULT_SOCKET_ENV: &str = "WATCHMAN_SOCK";

/// Client configuration
///
/// # Examples
///
/// ```
/// use watchman::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     request_timeout: Some(Duration::from_secs(30)),
///     ..Default::default()
/// };
/// assert_eq!(config.socket_env, "WATCHMAN_SOCK");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Socket path to use instead of discovering one
    pub address: Option<String>,

    /// Environment variable consulted first during discovery
    pub socket_env: String,

    /// Executable asked for the socket path when the environment has none
    pub watchman_bin: PathBuf,

    /// How long a command may wait for its reply
    ///
    /// `None` (default) waits forever. Expiry closes the connection, since
    /// the reply would otherwise be mistaken for the answer to the next
    /// command.
    #[serde(with = "millis")]
    pub request_timeout: Option<Duration>,

    /// Size of the socket read buffer
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            address: None,
            socket_env: DEFAULT_SOCKET_ENV.to_string(),
            watchman_bin: PathBuf::from("watchman"),
            request_timeout: None,
            read_buffer_size: 8192,
        }
    }
}

impl ClientConfig {
    pub fn with_address<S: Into<String>>(mut self, address: S) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_watchman_bin<P: Into<PathBuf>>(mut self, bin: P) -> Self {
        self.watchman_bin = bin.into();
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
