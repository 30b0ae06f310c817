#![deny(unsafe_code)]

//! jailkeeper CLI: HTTP control plane and one-shot fail2ban commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jailkeeper_config::AppConfig;
use jailkeeper_core::http::{self, AppState};
use jailkeeper_core::{ClientChannel, Command, CommandReport, JailDefinition, templates};

/// jailkeeper: manage fail2ban jails, bans and the allow-list.
#[derive(Parser)]
#[command(name = "jailkeeper", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "jailkeeper.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control plane.
    Serve {
        /// Override `server.listen_addr`.
        #[arg(long)]
        addr: Option<String>,

        /// Override `server.listen_port`.
        #[arg(long)]
        port: Option<u16>,
    },

    /// List the built-in jail templates.
    Templates,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    #[command(flatten)]
    Oneshot(DaemonCommands),
}

/// Commands that talk to fail2ban or its configuration once and exit.
#[derive(Subcommand)]
enum DaemonCommands {
    /// List running and configured jails.
    Jails,

    /// Show one jail's counters and banned addresses.
    Status { jail: String },

    /// Ban an address or CIDR block in a jail.
    Ban { jail: String, ip: String },

    /// Lift a ban.
    Unban { jail: String, ip: String },

    /// Write a jail fragment and restart the daemon until the jail is live.
    Create {
        name: String,

        /// Start from a built-in template (see `templates`).
        #[arg(short, long)]
        template: Option<String>,

        #[arg(long)]
        filter: Option<String>,

        #[arg(long)]
        logpath: Option<String>,

        #[arg(long)]
        maxretry: Option<u32>,

        #[arg(long)]
        findtime: Option<u64>,

        /// Seconds; negative bans forever.
        #[arg(long, allow_negative_numbers = true)]
        bantime: Option<i64>,

        #[arg(long)]
        action: Option<String>,
    },

    /// Stop a jail and remove its fragment.
    Delete { name: String },

    /// Show or replace the allow-list.
    Allowlist {
        /// Replace the list with these entries (reserved ranges are kept).
        #[arg(long, num_args = 1..)]
        set: Option<Vec<String>>,
    },

    /// Start, stop or reload the daemon.
    Daemon {
        #[arg(value_enum)]
        action: DaemonAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DaemonAction {
    Start,
    Stop,
    Reload,
}

impl From<DaemonAction> for Command {
    fn from(action: DaemonAction) -> Self {
        match action {
            DaemonAction::Start => Command::Start,
            DaemonAction::Stop => Command::Stop,
            DaemonAction::Reload => Command::Reload,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    // RUST_LOG wins, then -v, then the config file.
    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if !found {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Serve { addr, port } => cmd_serve(config, addr, port).await?,
        Commands::Config { show } => cmd_config(&cli.config, config, show)?,
        Commands::Templates => print_json(&templates::catalogue())?,
        Commands::Oneshot(command) => cmd_oneshot(&config, command).await?,
    }

    Ok(())
}

async fn cmd_serve(mut config: AppConfig, addr: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(addr) = addr {
        config.server.listen_addr = addr;
    }
    if let Some(port) = port {
        config.server.listen_port = port;
    }
    config.validate()?;

    let bind = format!("{}:{}", config.server.listen_addr, config.server.listen_port);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    let channel = Arc::new(ClientChannel::from_config(&config.daemon));
    let state = Arc::new(AppState::from_config(&config, channel));
    info!(socket = %config.daemon.socket_path, "Starting jailkeeper control plane");

    http::serve(listener, state, async {
        // A failed signal handler just means we run until killed.
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

async fn cmd_oneshot(config: &AppConfig, command: DaemonCommands) -> Result<()> {
    let channel = Arc::new(ClientChannel::from_config(&config.daemon));
    let state = AppState::from_config(config, channel);
    let engine = &state.engine;
    let daemon = engine.daemon();

    match command {
        DaemonCommands::Jails => {
            let listing = engine.store().list().await?;
            print_json(&http::JailsResponse {
                live: daemon.query(&Command::Status).await,
                configured: listing.names(),
            })?;
        }
        DaemonCommands::Status { jail } => print_json(&daemon.jail_status(&jail).await?)?,
        DaemonCommands::Ban { jail, ip } => print_json(&daemon.ban(&jail, &ip).await?)?,
        DaemonCommands::Unban { jail, ip } => print_json(&daemon.unban(&jail, &ip).await?)?,
        DaemonCommands::Create {
            name,
            template,
            filter,
            logpath,
            maxretry,
            findtime,
            bantime,
            action,
        } => {
            let mut def = match template.as_deref() {
                Some(t) => templates::get(t)
                    .with_context(|| format!("unknown template {t:?}"))?
                    .instantiate(&name),
                None => JailDefinition::new(&name, "", ""),
            };
            if let Some(filter) = filter {
                def.filter = filter;
            }
            if let Some(logpath) = logpath {
                def.logpath = logpath;
            }
            if let Some(maxretry) = maxretry {
                def.maxretry = maxretry;
            }
            if let Some(findtime) = findtime {
                def.findtime = findtime;
            }
            if let Some(bantime) = bantime {
                def.bantime = bantime;
            }
            if action.is_some() {
                def.action = action;
            }

            let outcome = engine.create(def).await?;
            print_json(&outcome)?;
            if !outcome.active {
                bail!("jail {name:?} was written but is not running");
            }
        }
        DaemonCommands::Delete { name } => {
            let outcome = engine.delete(&name).await?;
            if !outcome.existed {
                bail!("jail {name:?} is not configured");
            }
            print_json(&outcome)?;
        }
        DaemonCommands::Allowlist { set: None } => print_json(&state.allowlist.read().await?)?,
        DaemonCommands::Allowlist { set: Some(entries) } => {
            let update = state.allowlist.write(entries.as_slice(), engine).await?;
            print_json(&update)?;
            ensure_ok(&update.reload)?;
        }
        DaemonCommands::Daemon { action } => {
            let report = engine.control(&action.into()).await;
            print_json(&report)?;
            ensure_ok(&report)?;
        }
    }
    Ok(())
}

fn ensure_ok(report: &CommandReport) -> Result<()> {
    if !report.ok {
        bail!("`{}` failed: {}", report.command, report.response);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_config(config_path: &Path, mut config: AppConfig, show: bool) -> Result<()> {
    if show {
        if config.server.api_token.is_some() {
            config.server.api_token = Some("[REDACTED]".to_string());
        }
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Load `path`, or defaults when it does not exist. The flag says which.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if path.exists() {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_create_from_template() {
        let cli = Cli::try_parse_from([
            "jailkeeper",
            "create",
            "ssh-strict",
            "--template",
            "sshd",
            "--bantime",
            "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Oneshot(DaemonCommands::Create {
                name,
                template,
                bantime,
                ..
            }) => {
                assert_eq!(name, "ssh-strict");
                assert_eq!(template.as_deref(), Some("sshd"));
                assert_eq!(bantime, Some(-1));
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_parse_daemon_action() {
        let cli = Cli::try_parse_from(["jailkeeper", "-vv", "daemon", "reload"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Oneshot(DaemonCommands::Daemon { action }) => {
                assert_eq!(Command::from(action), Command::Reload);
            }
            _ => panic!("expected daemon"),
        }
        assert!(Cli::try_parse_from(["jailkeeper", "daemon", "restart"]).is_err());
    }

    #[test]
    fn test_parse_allowlist_set() {
        let cli = Cli::try_parse_from([
            "jailkeeper",
            "allowlist",
            "--set",
            "203.0.113.0/24",
            "198.51.100.7",
        ])
        .unwrap();
        match cli.command {
            Commands::Oneshot(DaemonCommands::Allowlist { set }) => {
                assert_eq!(set.unwrap(), vec!["203.0.113.0/24", "198.51.100.7"]);
            }
            _ => panic!("expected allowlist"),
        }
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let (config, found) = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert!(!found);
        assert_eq!(config.server.listen_port, 5000);
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("jailkeeper.toml");
        std::fs::write(&path, "[server]\nlisten_port = 0\n").unwrap();
        assert!(load_config(&path).await.is_err());

        std::fs::write(&path, "[server]\nlisten_port = 8080\n").unwrap();
        let (config, found) = load_config(&path).await.unwrap();
        assert!(found);
        assert_eq!(config.server.listen_port, 8080);
    }
}
