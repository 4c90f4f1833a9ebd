//! Command-line interface built on clap.
//!
//! Defines [`Cli`] with its [`Command`] subcommands and the global flags
//! that pick the config file and the caller identity (--config, --caller,
//! --admin, --json, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::auth::Caller;
use crate::state_machine::{ProcessPatch, ProcessStatus, ProcessType};

/// wasteflow: track waste-processing runs through their lifecycle.
#[derive(Debug, Parser)]
#[command(name = "wasteflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the config file (defaults to ./wasteflow.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Identity recorded for changes made from the command line.
    #[arg(long, global = true, default_value = "cli")]
    pub caller: String,

    /// Act with the admin role.
    #[arg(long, global = true, default_value_t = false)]
    pub admin: bool,

    /// Print results as JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Enable verbose (debug) logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn as_caller(&self) -> Caller {
        if self.admin {
            Caller::admin(self.caller.clone())
        } else {
            Caller::user(self.caller.clone())
        }
    }
}

/// Process type accepted on the command line, mapped to [`ProcessType`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TypeArg {
    Organic,
    Plastic,
    Metal,
    Glass,
    Paper,
    Electronic,
}

impl From<TypeArg> for ProcessType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Organic => ProcessType::Organic,
            TypeArg::Plastic => ProcessType::Plastic,
            TypeArg::Metal => ProcessType::Metal,
            TypeArg::Glass => ProcessType::Glass,
            TypeArg::Paper => ProcessType::Paper,
            TypeArg::Electronic => ProcessType::Electronic,
        }
    }
}

/// Status accepted on the command line, mapped to [`ProcessStatus`].
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Stopped,
    Running,
    Paused,
    Error,
    Completed,
}

impl From<StatusArg> for ProcessStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Stopped => ProcessStatus::Stopped,
            StatusArg::Running => ProcessStatus::Running,
            StatusArg::Paused => ProcessStatus::Paused,
            StatusArg::Error => ProcessStatus::Error,
            StatusArg::Completed => ProcessStatus::Completed,
        }
    }
}

/// Field edits for `update`; only the flags given end up in the patch.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long = "type", value_enum)]
    pub process_type: Option<TypeArg>,

    /// Admin only.
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// Admin only.
    #[arg(long)]
    pub progress: Option<f64>,

    /// Admin only.
    #[arg(long, conflicts_with = "clear_error")]
    pub error_message: Option<String>,

    /// Admin only. Clears the recorded error message.
    #[arg(long, default_value_t = false)]
    pub clear_error: bool,

    /// Admin only. Estimated duration in minutes.
    #[arg(long)]
    pub duration: Option<u32>,
}

impl UpdateArgs {
    pub fn into_patch(self) -> ProcessPatch {
        let error_message = match (self.error_message, self.clear_error) {
            (Some(message), _) => Some(Some(message)),
            (None, true) => Some(None),
            (None, false) => None,
        };
        ProcessPatch {
            name: self.name,
            description: self.description,
            process_type: self.process_type.map(Into::into),
            status: self.status.map(|status| Some(status.into())),
            progress: self.progress.map(Some),
            error_message,
            estimated_duration: self.duration.map(Some),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the REST API.
    Serve {
        /// Address to bind, overriding the config file.
        #[arg(long)]
        bind: Option<String>,

        /// Keep records in memory instead of the data file.
        #[arg(long, default_value_t = false)]
        memory: bool,
    },

    /// List processes, newest first.
    List {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        /// Case-insensitive match on name, description or type.
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one process.
    Show { id: String },

    /// Create a process in the stopped state.
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        #[arg(long = "type", value_enum)]
        process_type: TypeArg,

        /// Estimated duration in minutes.
        #[arg(long)]
        duration: Option<u32>,
    },

    /// Edit process fields.
    Update {
        id: String,

        #[command(flatten)]
        fields: UpdateArgs,
    },

    /// Delete a process.
    Delete { id: String },

    /// Start (or restart) a process from zero progress.
    Start { id: String },

    /// Pause a running process.
    Pause { id: String },

    /// Resume a paused process.
    Resume { id: String },

    /// Stop a process.
    Stop { id: String },

    /// Clear an error and resume.
    Fix { id: String },

    /// Mark a process completed (admin).
    Complete { id: String },

    /// Stop a process with a recorded reason (admin).
    ForceStop {
        id: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Advance progress and shorten the estimate (admin).
    Boost {
        id: String,

        /// Speed factor from 1 to 5; larger values are capped at 5.
        #[arg(long, allow_negative_numbers = true)]
        factor: Option<i64>,
    },

    /// Show dashboard counts.
    Stats,
}
