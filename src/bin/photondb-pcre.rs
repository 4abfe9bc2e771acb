//! PhotonDB PCRE command-line tool
//!
//! Compile patterns into stored values, inspect them and run matches the
//! same way the database does.
//!
//! # Examples
//!
//! ```bash
//! # Compile a pattern into a stored value (base64)
//! photondb-pcre compile '^a(b)?c$'
//!
//! # Show the pattern text of a stored value
//! photondb-pcre show <BLOB>
//!
//! # Capture groups as JSON
//! photondb-pcre captures <BLOB> abc
//!
//! # Filter stdin through an ad-hoc pattern
//! cat access.log | photondb-pcre grep 'GET /api/[a-z]+'
//! ```

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Args, Parser, Subcommand};
use photondb_pcre::{CompiledPattern, PatternCache, RegexConfig, Session};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// PhotonDB PCRE - compiled regular expressions for PhotonDB
#[derive(Parser, Debug)]
#[command(name = "photondb-pcre")]
#[command(version = photondb_pcre::VERSION)]
#[command(about = "PhotonDB PCRE - compiled regular expressions for PhotonDB", long_about = None)]
#[command(author = "Anton Feldmann <afeldman@lynqtech.com>")]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "PHOTONDB_PCRE_CONFIG")]
    config: Option<PathBuf>,

    /// Database encoding, overrides the configuration
    #[arg(long, global = true)]
    encoding: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a pattern and print the stored value (base64)
    Compile {
        /// Pattern text
        pattern: String,
    },

    /// Print the pattern text of a stored value
    Show {
        /// Stored value (base64)
        blob: String,
    },

    /// Test whether a stored pattern matches a subject
    Match(MatchArgs),

    /// Print the text of the whole match
    MatchOne(MatchArgs),

    /// Print captured groups as a JSON array
    Captures(MatchArgs),

    /// Print stdin lines matching an ad-hoc pattern
    Grep {
        /// Pattern text
        pattern: String,

        /// Print lines that do not match
        #[arg(short = 'v', long)]
        invert: bool,
    },

    /// Print the effective configuration
    Config,
}

/// Stored pattern and subject
#[derive(Args, Debug)]
struct MatchArgs {
    /// Stored value (base64)
    blob: String,

    /// Subject text
    subject: String,

    /// Negate the result
    #[arg(long)]
    not: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let mut config = RegexConfig::load(cli.config.as_ref())?;
    if let Some(encoding) = &cli.encoding {
        config.encoding = encoding.clone();
        config.validate()?;
    }

    let cache = Arc::new(PatternCache::new(config.cache_capacity)?);
    let session = Session::from_config(&config, cache)?;
    debug!(encoding = %session.encoding(), "Session ready");

    match cli.command {
        Commands::Compile { pattern } => {
            let compiled = session.compile(&to_database(&session, &pattern)?)?;
            info!(version = %compiled.producer_version(), "Pattern compiled");
            println!("{}", BASE64.encode(compiled.to_bytes()?));
            Ok(())
        }
        Commands::Show { blob } => {
            let pattern = decode_blob(&blob)?;
            println!("{}", to_display(&session, session.render(&pattern)));
            Ok(())
        }
        Commands::Match(args) => {
            let pattern = decode_blob(&args.blob)?;
            let subject = to_database(&session, &args.subject)?;
            let matched = if args.not {
                session.matches_not(&subject, &pattern)?
            } else {
                session.matches(&subject, &pattern)?
            };
            println!("{}", matched);
            Ok(())
        }
        Commands::MatchOne(args) => {
            let pattern = decode_blob(&args.blob)?;
            let subject = to_database(&session, &args.subject)?;
            match session.match_one(&subject, &pattern)? {
                Some(text) => println!("{}", to_display(&session, &text)),
                None => println!("NULL"),
            }
            Ok(())
        }
        Commands::Captures(args) => {
            let pattern = decode_blob(&args.blob)?;
            let subject = to_database(&session, &args.subject)?;
            let json = match session.captures(&subject, &pattern)? {
                Some(groups) => serde_json::Value::Array(
                    groups
                        .into_iter()
                        .map(|group| match group {
                            Some(text) => serde_json::Value::String(to_display(&session, &text)),
                            None => serde_json::Value::Null,
                        })
                        .collect(),
                ),
                None => serde_json::Value::Null,
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Grep { pattern, invert } => {
            grep_command(&session, &to_database(&session, &pattern)?, invert)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Setup logging to stderr
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(io::stderr))
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(!cli.no_color),
            )
            .with(filter)
            .try_init()?;
    }

    Ok(())
}

/// Command-line text converted to the database encoding
fn to_database(session: &Session, text: &str) -> anyhow::Result<Vec<u8>> {
    let converted = session
        .encoding()
        .denormalize(text.as_bytes())
        .with_context(|| format!("cannot represent argument in {}", session.encoding()))?;
    Ok(converted.into_owned())
}

/// Database-encoded text converted for the terminal
fn to_display(session: &Session, text: &[u8]) -> String {
    match session.encoding().normalize(text) {
        Ok(utf8) => String::from_utf8_lossy(&utf8).into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

fn decode_blob(blob: &str) -> anyhow::Result<CompiledPattern> {
    let bytes = BASE64
        .decode(blob.trim())
        .context("stored value is not valid base64")?;
    Ok(CompiledPattern::from_bytes(&bytes)?)
}

/// Grep command - filter stdin through the ad-hoc pattern cache.
///
/// Input lines are taken as raw bytes in the database encoding.
fn grep_command(session: &Session, pattern: &[u8], invert: bool) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().split(b'\n') {
        let line = line?;
        if session.matches_adhoc(&line, pattern)? != invert {
            out.write_all(&line)?;
            out.write_all(b"\n")?;
        }
    }

    let stats = session.cache().stats();
    debug!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate,
        "Pattern cache statistics"
    );
    Ok(())
}
