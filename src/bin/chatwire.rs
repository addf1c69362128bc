//! Chatwire CLI binary.
//!
//! Offline tooling around the session manager.
//!
//! # Commands
//!
//! - `normalize` - Normalize a raw message upsert (JSON)
//! - `pairing-code` - Format a raw pairing code
//! - `config check` - Validate a config file and list its sessions
//! - `creds show` / `creds clear` - Inspect or remove stored credentials

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::Context;
use chatwire::{
    config::Config,
    normalize::{normalize, RawMessage, RawMessageBatch},
    session::format_pairing_code,
    CredentialStore, FileCredentialStore, VERSION,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "chatwire")]
#[command(version = VERSION)]
#[command(about = "Chatwire - chat network session manager", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a raw upsert batch or single message
    Normalize {
        /// JSON input (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Own account id, used as sender of own messages
        #[arg(long)]
        self_id: Option<String>,

        /// Output as pretty-printed JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Format a raw 8-character pairing code as XXXX-XXXX
    PairingCode {
        /// Code as returned by the network
        raw: String,
    },

    /// Configuration file tools
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Stored credential tools
    Creds {
        #[command(subcommand)]
        action: CredsAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Parse and validate a config file
    Check {
        /// TOML config path
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum CredsAction {
    /// Show registration status of a session
    Show {
        /// Session name
        session: String,

        /// Credential root (default: config/env/data dir)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Delete stored credentials, forcing a fresh login
    Clear {
        /// Session name
        session: String,

        /// Credential root (default: config/env/data dir)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    match cli.command {
        Commands::Normalize {
            input,
            file,
            self_id,
            pretty,
        } => cmd_normalize(input, file, self_id.as_deref(), pretty),

        Commands::PairingCode { raw } => {
            println!("{}", format_pairing_code(&raw)?);
            Ok(())
        },

        Commands::Config {
            action: ConfigAction::Check { file },
        } => cmd_config_check(file),

        Commands::Creds { action } => match action {
            CredsAction::Show { session, root } => cmd_creds_show(&session, root),
            CredsAction::Clear { session, root } => cmd_creds_clear(&session, root),
        },
    }
}

fn init_logging(log_level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn cmd_normalize(
    input: Option<String>,
    file: Option<PathBuf>,
    self_id: Option<&str>,
    pretty: bool,
) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let value: Value = serde_json::from_str(&content).context("Input is not valid JSON")?;

    // Accept either a full upsert or a bare message envelope
    let batch = if value.get("messages").is_some() {
        serde_json::from_value::<RawMessageBatch>(value)?
    } else {
        RawMessageBatch::notify(serde_json::from_value::<RawMessage>(value)?)
    };

    match normalize(&batch, self_id)? {
        Some(message) => {
            let output = if pretty {
                serde_json::to_string_pretty(&message)?
            } else {
                serde_json::to_string(&message)?
            };
            println!("{output}");
        },
        None => println!("filtered"),
    }
    Ok(())
}

fn cmd_config_check(file: PathBuf) -> anyhow::Result<()> {
    let config = Config::from_file(&file)?;
    config.validate()?;

    println!("Config OK: {}", file.display());
    println!("  store root: {}", config.store.root.display());
    println!(
        "  timings: pairing settle {}ms, reconnect backoff {}ms",
        config.timings.pairing_settle_ms, config.timings.reconnect_backoff_ms
    );
    println!("  sessions: {}", config.sessions.len());
    for session in config.session_configs() {
        let phone = session.phone_number().unwrap_or("-");
        println!(
            "    {:<16} mode={:<8} phone={:<16} auto-read={}",
            session.session_name,
            session.connection_mode,
            phone,
            session.auto_acknowledge_reads
        );
    }
    Ok(())
}

fn cmd_creds_show(session: &str, root: Option<PathBuf>) -> anyhow::Result<()> {
    let store = FileCredentialStore::new(resolve_root(root));
    let dir = store.session_dir(session)?;

    match store.load(session)? {
        Some(creds) => {
            println!("Session: {session}");
            println!("  path: {}", dir.display());
            println!("  registered: {}", creds.registered);
            println!("  me: {}", creds.me.as_deref().unwrap_or("-"));
            println!("  blob: {} bytes", creds.blob.len());
        },
        None => println!("No credentials stored for {session} under {}", dir.display()),
    }
    Ok(())
}

fn cmd_creds_clear(session: &str, root: Option<PathBuf>) -> anyhow::Result<()> {
    let store = FileCredentialStore::new(resolve_root(root));
    store.clear(session)?;
    println!("Cleared credentials for {session}");
    Ok(())
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| Config::from_env().store.root)
}

fn read_input(input: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(path) = file {
        Ok(std::fs::read_to_string(path)?)
    } else if let Some(s) = input {
        if s == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        } else {
            Ok(s)
        }
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}
