use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub const PASSWORD_ENV: &str = "JUSTDOIT_PASSWORD";
pub const PASSWORD_CONFIRM_ENV: &str = "JUSTDOIT_PASSWORD_CONFIRM";

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "justdoit",
    version,
    about = "Month calendar and to-do list with local or remote storage",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the calendar with today's, the selected day's and overdue tasks
    Show,

    /// Add a task
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,

        #[arg(short = 'd', long)]
        description: Option<String>,

        /// Deadline, e.g. `tomorrow`, `+2h`, `friday`, `2024-10-15T09:00`
        #[arg(long, allow_hyphen_values = true)]
        due: Option<String>,
    },

    /// Change a task's title, description or deadline
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// An empty value clears the description
        #[arg(short = 'd', long)]
        description: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        due: Option<String>,
    },

    /// Toggle a task between done and not done
    Done { id: String },

    Delete { id: String },

    /// Show the next month
    Next,

    /// Show the previous month
    Prev,

    /// Select a day (`YYYY-MM-DD`, `today`, `tomorrow`, `yesterday`)
    Select { day: String },

    /// Jump to a month (`YYYY-MM`) and select its first day
    Month { month: String },

    /// Clear the selection and show the current month
    Today,

    Login {
        email: String,

        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: Option<String>,
    },

    Register {
        name: String,

        email: String,

        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: Option<String>,

        #[arg(long = "confirm-password", env = PASSWORD_CONFIRM_ENV, hide_env_values = true)]
        confirm_password: Option<String>,
    },

    Logout,

    Version,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Show => "show",
            Command::Add { .. } => "add",
            Command::Edit { .. } => "edit",
            Command::Done { .. } => "done",
            Command::Delete { .. } => "delete",
            Command::Next => "next",
            Command::Prev => "prev",
            Command::Select { .. } => "select",
            Command::Month { .. } => "month",
            Command::Today => "today",
            Command::Login { .. } => "login",
            Command::Register { .. } => "register",
            Command::Logout => "logout",
            Command::Version => "version",
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));

            if let Some((k, v)) = parsed {
                if k.trim().is_empty() {
                    return Err(anyhow!("empty key in override: {s}"));
                }
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}
