use clap::{Parser, Subcommand, ValueEnum};
use fieldlog::config::DEFAULT_BASE_URL;
use fieldlog::record::QuestionKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fieldlog")]
#[command(about = "A CLI client for logging biodiversity observations")]
#[command(version = "1.0")]
pub(crate) struct Args {
    /// Backend base URL
    #[arg(short, long, global = true, env = "FIELDLOG_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Credential file (defaults to ~/.fieldlog/credentials.json)
    #[arg(short, long, global = true, env = "FIELDLOG_STORE")]
    pub store: Option<PathBuf>,

    /// Request timeout in seconds; unset leaves it to the transport
    #[arg(short, long, global = true)]
    pub timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Log in and remember the session
    Login {
        username: String,
        #[arg(short, long, env = "FIELDLOG_PASSWORD")]
        password: String,
    },

    /// Create an account (log in afterwards)
    Register {
        username: String,
        email: String,
        #[arg(short, long, env = "FIELDLOG_PASSWORD")]
        password: String,
        /// Secret that unlocks admin account creation
        #[arg(long, env = "FIELDLOG_ADMIN_SECRET")]
        admin_secret: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the profile and observation stats
    Whoami,

    /// Browse or add species
    Species {
        #[command(subcommand)]
        action: SpeciesCommand,
    },

    /// List the observation questionnaire
    Questions,

    /// Record a new observation
    Log(LogArgs),

    /// List past observations
    History {
        /// Also save the list to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show one observation in full
    Show { id: i64 },

    /// Admin-only operations
    Admin {
        #[command(subcommand)]
        action: AdminCommand,
    },
}

#[derive(Subcommand)]
pub(crate) enum SpeciesCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "")]
        scientific_name: String,
        #[arg(short, long)]
        category: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum AdminCommand {
    /// List all users
    Users,
    /// List every user's observations
    Logs,
    /// Download all observations as CSV
    Export {
        /// Directory the CSV file is written to
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Add a question to the questionnaire
    AddQuestion {
        text: String,
        #[arg(short, long, value_enum, default_value_t = KindArg::Text)]
        kind: KindArg,
        /// Option for multiple choice questions (repeatable)
        #[arg(short, long = "option")]
        options: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub(crate) enum KindArg {
    MultipleChoice,
    Text,
    Number,
    YesNo,
}

impl KindArg {
    pub fn into_kind(self, options: Vec<String>) -> QuestionKind {
        match self {
            KindArg::MultipleChoice => QuestionKind::MultipleChoice(options),
            KindArg::Text => QuestionKind::Text,
            KindArg::Number => QuestionKind::Number,
            KindArg::YesNo => QuestionKind::YesNo,
        }
    }
}

#[derive(clap::Args)]
pub(crate) struct LogArgs {
    /// Id of an existing species
    #[arg(long, conflicts_with = "new_species")]
    pub species_id: Option<i64>,

    /// Common name of a species to create first
    #[arg(long)]
    pub new_species: Option<String>,

    #[arg(long, requires = "new_species", default_value = "")]
    pub scientific_name: String,

    #[arg(long, requires = "new_species", default_value = "")]
    pub category: String,

    /// Where the observation was made
    #[arg(short, long, default_value = "")]
    pub location: String,

    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub latitude: String,

    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub longitude: String,

    /// Fill coordinates from the device location
    #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
    pub locate: bool,

    #[arg(short, long, default_value = "")]
    pub notes: String,

    /// Photo to attach
    #[arg(short, long)]
    pub photo: Option<PathBuf>,

    /// Answer as QUESTION_ID=VALUE (repeatable)
    #[arg(short, long = "answer", value_parser = parse_answer_arg)]
    pub answers: Vec<(i64, String)>,
}

fn parse_answer_arg(raw: &str) -> Result<(i64, String), String> {
    let (id, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION_ID=VALUE, got {raw:?}"))?;
    let id = id
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("question id must be a number, got {id:?}"))?;
    Ok((id, value.to_string()))
}
