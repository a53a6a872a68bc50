use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored_json::{ColorMode, ColoredFormatter, Output, PrettyFormatter};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use watchman::{expr, Client, ClientConfig, Command, SubscriptionOptions};

/// Environment variable holding the log filter, e.g. `watchman::wire=trace`.
const LOG_ENV: &str = "WMC_LOG";

#[derive(Debug, Parser)]
#[command(name = "wmc", version, about = "Talk to a running watchman daemon")]
struct Cli {
    /// Path of the daemon's socket, instead of discovering it
    #[arg(long, value_name = "PATH")]
    sock: Option<String>,

    /// Give up on a reply after this many milliseconds
    #[arg(long, value_name = "N")]
    timeout_ms: Option<u64>,

    /// Colorize output: on, off or auto
    #[arg(long, default_value = "auto")]
    color: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print the daemon's version
    Version,
    /// Print the current clock of a watched root
    Clock { root: String },
    /// Start watching a directory
    Watch { dir: String },
    /// Stop watching a directory
    WatchDel { dir: String },
    /// Stop watching everything
    WatchDelAll,
    /// List watched roots
    WatchList,
    /// Watch the project containing a directory
    WatchProject { dir: String },
    /// List files matching glob patterns
    Find { dir: String, patterns: Vec<String> },
    /// List files changed since a clock
    Since {
        dir: String,
        clock: String,
        patterns: Vec<String>,
    },
    /// Run a query; OPTIONS is the query object as JSON
    Query {
        dir: String,
        #[arg(default_value = "{}")]
        options: String,
    },
    /// Print the configuration of a root
    GetConfig { dir: String },
    /// Print the daemon's socket path
    GetSockname,
    /// List the daemon's capabilities
    ListCapabilities,
    /// Write a line to the daemon's log
    Log { level: String, message: String },
    /// Stream the daemon's log at LEVEL until interrupted
    LogLevel { level: String },
    /// List triggers on a root
    TriggerList { root: String },
    /// Delete a trigger
    TriggerDel { root: String, name: String },
    /// Print change notifications until interrupted
    Subscribe {
        root: String,
        name: String,
        /// Only report files with these suffixes
        #[arg(long)]
        suffix: Vec<String>,
        /// Fields to report for each file
        #[arg(long, value_delimiter = ',', default_value = "name")]
        fields: Vec<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(true)
        .init();
}

struct Printer {
    mode: ColorMode,
    formatter: ColoredFormatter<PrettyFormatter<'static>>,
}

impl Printer {
    fn new(color: &str) -> Self {
        let mode = match color {
            "on" => ColorMode::On,
            "off" => ColorMode::Off,
            _ => ColorMode::Auto(Output::StdOut),
        };
        Printer {
            mode,
            formatter: ColoredFormatter::new(PrettyFormatter::new()),
        }
    }

    fn print(&self, value: &Value) -> Result<()> {
        let text = self
            .formatter
            .clone()
            .to_colored_json(value, self.mode)
            .context("failed to format reply")?;
        println!("{}", text);
        Ok(())
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::default();
    if let Some(sock) = cli.sock {
        config = config.with_address(sock);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_request_timeout(Duration::from_millis(ms));
    }

    let printer = Arc::new(Printer::new(&cli.color));
    let client = Client::with_config(config).with_log_handler(|line| eprint!("{}", line));
    client
        .connect()
        .await
        .context("failed to connect to watchman")?;
    debug!(command = ?cli.command, "connected");

    let outcome = dispatch(&client, &printer, cli.command).await;
    let closed = client.close().await.context("failed to close connection");
    outcome.and(closed)
}

async fn dispatch(client: &Client, printer: &Arc<Printer>, command: Cmd) -> Result<()> {
    let value = match command {
        Cmd::Version => json!({ "version": client.version().await? }),
        Cmd::Clock { root } => json!({ "clock": client.clock(&root).await? }),
        Cmd::Watch { dir } => {
            client
                .watch(&dir)
                .await
                .with_context(|| format!("failed to watch '{}'", dir))?;
            json!({ "watch": dir })
        }
        Cmd::WatchDel { dir } => {
            client.watch_del(&dir).await?;
            json!({ "watch-del": true, "root": dir })
        }
        Cmd::WatchDelAll => json!({ "roots": client.watch_del_all().await? }),
        Cmd::WatchList => json!({ "roots": client.watch_list().await? }),
        Cmd::WatchProject { dir } => {
            let wp = client.watch_project(&dir).await?;
            json!({ "watch": wp.watch, "relative_path": wp.relative_path })
        }
        Cmd::Find { dir, patterns } => {
            client
                .send::<Value>(Command::new("find").arg(&dir).args(&patterns))
                .await?
        }
        Cmd::Since {
            dir,
            clock,
            patterns,
        } => {
            client
                .send::<Value>(Command::new("since").arg(&dir).arg(&clock).args(&patterns))
                .await?
        }
        Cmd::Query { dir, options } => {
            let options: Value =
                serde_json::from_str(&options).context("query options are not valid JSON")?;
            client
                .send::<Value>(Command::new("query").arg(&dir).arg(options))
                .await?
        }
        Cmd::GetConfig { dir } => client
            .send::<Value>(Command::new("get-config").arg(&dir))
            .await?,
        Cmd::GetSockname => json!({ "sockname": client.get_sockname().await? }),
        Cmd::ListCapabilities => json!({ "capabilities": client.list_capabilities().await? }),
        Cmd::Log { level, message } => json!({ "logged": client.log(&level, &message).await? }),
        Cmd::LogLevel { level } => {
            client.log_level(&level).await?;
            wait_for_interrupt().await?;
            return Ok(());
        }
        Cmd::TriggerList { root } => json!({ "triggers": client.trigger_list(&root).await? }),
        Cmd::TriggerDel { root, name } => {
            client.trigger_del(&root, &name).await?;
            json!({ "deleted": true, "trigger": name })
        }
        Cmd::Subscribe {
            root,
            name,
            suffix,
            fields,
        } => {
            let expression = match suffix.len() {
                0 => None,
                _ => Some(expr::any_of(suffix.iter().map(|s| expr::suffix(s)).collect())),
            };
            let options = SubscriptionOptions {
                expression,
                fields,
                ..Default::default()
            };
            let sink = printer.clone();
            client
                .subscribe(&root, &name, &options, move |event| {
                    let value = json!({
                        "subscription": event.subscription,
                        "root": event.root,
                        "clock": event.clock,
                        "is_fresh_instance": event.is_fresh_instance,
                        "files": event.files,
                    });
                    if let Err(e) = sink.print(&value) {
                        eprintln!("{:#}", e);
                    }
                })
                .await
                .with_context(|| format!("failed to subscribe to '{}'", root))?;
            wait_for_interrupt().await?;
            client.unsubscribe(&root, &name).await?;
            return Ok(());
        }
    };
    printer.print(&value)
}

async fn wait_for_interrupt() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("wmc: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_subscribe() {
        let cli = Cli::try_parse_from([
            "wmc", "--sock", "/tmp/s", "subscribe", "/src", "mysub", "--suffix", "rs",
            "--fields", "name,size",
        ])
        .unwrap();
        assert_eq!(cli.sock.as_deref(), Some("/tmp/s"));
        match cli.command {
            Cmd::Subscribe {
                root,
                name,
                suffix,
                fields,
            } => {
                assert_eq!(root, "/src");
                assert_eq!(name, "mysub");
                assert_eq!(suffix, vec!["rs"]);
                assert_eq!(fields, vec!["name", "size"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_timeout() {
        let cli = Cli::try_parse_from(["wmc", "--timeout-ms", "250", "watch-list"]).unwrap();
        assert_eq!(cli.timeout_ms, Some(250));
        assert!(matches!(cli.command, Cmd::WatchList));
    }
}
