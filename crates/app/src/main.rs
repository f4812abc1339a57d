use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use intake_core::model::{RemoteSettingsDraft, StepKey};
use services::{AppServices, Clock, Durability, Navigation, WizardError};
use storage::FileIdentityStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { command: &'static str, what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidStep { raw: String },
    InvalidPair { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { command, what } => {
                write!(f, "{command} requires {what}")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidStep { raw } => write!(f, "invalid step: {raw}"),
            ArgsError::InvalidPair { raw } => {
                write!(f, "invalid answer (expected <step>=<value>): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  intake [options] whoami");
    eprintln!("  intake [options] get <step>");
    eprintln!("  intake [options] set <step> <value>");
    eprintln!("  intake [options] show");
    eprintln!("  intake [options] resume");
    eprintln!("  intake [options] submit <route> [<step>=<value>...]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>      default sqlite:intake.sqlite3");
    eprintln!("  --identity <path>      default .intake/identity.json");
    eprintln!("  --remote               use the hosted record store instead of SQLite");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  INTAKE_DB_URL, INTAKE_IDENTITY_FILE,");
    eprintln!("  INTAKE_REMOTE_URL, INTAKE_REMOTE_KEY, INTAKE_REMOTE_TABLE, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    WhoAmI,
    Get(StepKey),
    Set(StepKey, String),
    Show,
    Resume,
    Submit {
        route: String,
        answers: Vec<(StepKey, String)>,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Backend {
    Sqlite(String),
    Remote,
}

#[derive(Debug)]
struct Args {
    backend: Backend,
    identity_path: PathBuf,
    command: Command,
}

fn parse_step(raw: &str) -> Result<StepKey, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidStep {
        raw: raw.to_string(),
    })
}

fn parse_pair(raw: &str) -> Result<(StepKey, String), ArgsError> {
    let (step, value) = raw.split_once('=').ok_or_else(|| ArgsError::InvalidPair {
        raw: raw.to_string(),
    })?;
    Ok((parse_step(step)?, value.to_string()))
}

impl Command {
    fn parse(positional: Vec<String>) -> Result<Self, ArgsError> {
        let mut iter = positional.into_iter();
        let Some(name) = iter.next() else {
            return Ok(Self::Resume);
        };
        match name.as_str() {
            "whoami" => Ok(Self::WhoAmI),
            "get" => {
                let step = iter.next().ok_or(ArgsError::MissingArgument {
                    command: "get",
                    what: "a step",
                })?;
                Ok(Self::Get(parse_step(&step)?))
            }
            "set" => {
                let step = iter.next().ok_or(ArgsError::MissingArgument {
                    command: "set",
                    what: "a step",
                })?;
                let value = iter.next().ok_or(ArgsError::MissingArgument {
                    command: "set",
                    what: "a value",
                })?;
                Ok(Self::Set(parse_step(&step)?, value))
            }
            "show" => Ok(Self::Show),
            "resume" => Ok(Self::Resume),
            "submit" => {
                let route = iter.next().ok_or(ArgsError::MissingArgument {
                    command: "submit",
                    what: "a route",
                })?;
                let answers = iter
                    .map(|raw| parse_pair(&raw))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Submit { route, answers })
            }
            "help" => Ok(Self::Help),
            _ => Err(ArgsError::UnknownCommand(name)),
        }
    }
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = normalize_sqlite_url(
            std::env::var("INTAKE_DB_URL").unwrap_or_else(|_| "sqlite:intake.sqlite3".into()),
        );
        let mut identity_path = std::env::var("INTAKE_IDENTITY_FILE")
            .map_or_else(|_| PathBuf::from(".intake/identity.json"), PathBuf::from);
        let mut remote = false;
        let mut positional = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--identity" => {
                    identity_path = PathBuf::from(require_value(&mut args, "--identity")?);
                }
                "--remote" => remote = true,
                "--help" | "-h" => positional = vec!["help".to_string()],
                other if other.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        Ok(Self {
            backend: if remote {
                Backend::Remote
            } else {
                Backend::Sqlite(db_url)
            },
            identity_path,
            command: Command::parse(positional)?,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn remote_settings_from_env() -> RemoteSettingsDraft {
    RemoteSettingsDraft {
        base_url: std::env::var("INTAKE_REMOTE_URL").ok(),
        api_key: std::env::var("INTAKE_REMOTE_KEY").ok(),
        table: std::env::var("INTAKE_REMOTE_TABLE").ok(),
    }
}

async fn build_services(args: &Args) -> Result<AppServices, Box<dyn std::error::Error>> {
    let identity_store = Arc::new(FileIdentityStore::new(args.identity_path.clone()));
    let clock = Clock::system();
    let services = match &args.backend {
        Backend::Sqlite(db_url) => {
            // Keep file preparation in the binary glue so storage stays pure.
            prepare_sqlite_file(db_url)?;
            AppServices::new_sqlite(db_url, identity_store, clock).await?
        }
        Backend::Remote => AppServices::new_remote(remote_settings_from_env(), identity_store, clock)?,
    };
    Ok(services)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    if args.command == Command::Help {
        print_usage();
        return Ok(());
    }

    let services = build_services(&args).await?;
    let identity = services.identity().ensure_identity().await;
    if identity.durability() == Durability::Ephemeral {
        eprintln!(
            "warning: {} is not writable; this session will not be resumable",
            args.identity_path.display()
        );
    }
    info!(session_id = %identity.id(), backend = ?args.backend, "session ready");

    let answers = services.answers();
    match args.command {
        Command::WhoAmI => {
            println!("{}", identity.id());
        }
        Command::Get(step) => match answers.get_response(step).await {
            Some(value) => println!("{value}"),
            None => println!("(unanswered)"),
        },
        Command::Set(step, value) => {
            answers.update_response(step, value).await?;
        }
        Command::Show => {
            let Some(record) = answers.record().await? else {
                println!("no answers yet");
                return Ok(());
            };
            for (step, value) in &record.answers {
                let name = answers
                    .schema()
                    .get(*step)
                    .map_or("?", |spec| spec.name());
                println!("{:>7}  {name:<26} {value}", step.column());
            }
            if let Some(score) = record.derived.risk_score {
                println!("risk_score  {score}");
            }
            if let Some(code) = record.derived.color_code.as_deref() {
                println!("color_code  {code}");
            }
        }
        Command::Resume => match services.wizard().resume().await {
            Some(route) => println!("{route}"),
            None => println!("complete"),
        },
        Command::Submit { route, answers } => {
            match services.wizard().submit(&route, answers).await {
                Ok(Navigation::Next(next)) => println!("{next}"),
                Ok(Navigation::Finished) => println!("complete"),
                Err(err @ WizardError::NotSaved { .. }) => {
                    eprintln!("{err}; nothing was saved, submit the page again to retry");
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Help => print_usage(),
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
