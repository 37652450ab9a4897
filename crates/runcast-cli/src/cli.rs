use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use runcast_schedule::BackendKind;

#[derive(Debug, Parser)]
#[command(
    name = "runcast",
    author,
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RUNCAST_GIT_SHA"), ")"),
    about = "Project scheduled tasks onto launchd, cron, containers and VMs"
)]
pub struct Cli {
    /// Config file (default: $RUNCAST_CONFIG, then ~/.runcast/runcast.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cron expression tools
    #[command(subcommand)]
    Cron(CronCommand),

    /// Manage stored tasks and their backend artifacts
    #[command(subcommand)]
    Task(TaskCommand),

    /// Container configuration tools
    #[command(subcommand)]
    Container(ContainerCommand),
}

#[derive(Debug, Subcommand)]
pub enum CronCommand {
    /// Check a five-field expression and list every problem
    Validate { expression: String },

    /// Render an expression in plain English
    Describe { expression: String },

    /// Build an expression from calendar fields (unset fields mean "every")
    FromCalendar(CalendarArgs),
}

#[derive(Debug, Args)]
pub struct CalendarArgs {
    #[arg(long)]
    pub minute: Option<u8>,
    #[arg(long)]
    pub hour: Option<u8>,
    #[arg(long)]
    pub day: Option<u8>,
    /// 0 = Sunday
    #[arg(long)]
    pub weekday: Option<u8>,
    #[arg(long)]
    pub month: Option<u8>,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// List stored tasks
    List {
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// Print a stored task as JSON
    Show { id: String },

    /// Validate and store a task read from a JSON file
    Save { file: PathBuf },

    /// Store a task from a JSON file, install it and enable it if enabled
    Install { file: PathBuf },

    /// Replace an installed task's artifact with the definition in a JSON file
    Update { file: PathBuf },

    /// Remove a task's backend artifact
    Uninstall {
        id: String,
        /// Also delete the stored task and its history
        #[arg(long)]
        forget: bool,
    },

    Enable { id: String },

    Disable { id: String },

    /// Run a task once now and record the result
    Run { id: String },

    /// Show recent runs, newest first
    History {
        id: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// List tasks found in the backends' native state
    Discover {
        /// Only this backend (default: all)
        #[arg(long)]
        backend: Option<BackendKind>,
        /// Store what was found
        #[arg(long)]
        import: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum ContainerCommand {
    /// Decide whether moving between two configurations recreates the container
    Diff { old: PathBuf, new: PathBuf },

    /// Merge a .env file into a container configuration and print the result
    ImportEnv {
        info: PathBuf,
        env_file: PathBuf,
        /// Write the merged configuration back to INFO
        #[arg(long)]
        write: bool,
    },
}
