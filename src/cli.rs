use crate::model::{Priority, SuggestionKind};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskpad", version, about = "Local task tracker grouped by project")]
pub struct Cli {
    /// Directory holding the task and suggestion stores
    #[arg(long, global = true, env = "TASKPAD_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    /// Path to config.yml
    #[arg(long, global = true, env = "TASKPAD_CONFIG")]
    pub config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a project-local store in the current directory
    Init,
    /// List projects and their tasks
    List {
        /// Only show this project
        #[arg(long)]
        project: Option<String>,
        /// Show completed tasks even in collapsed projects
        #[arg(long)]
        all: bool,
    },
    /// Add a new task
    Add {
        /// Task description
        text: String,
        /// Task type, e.g. Call, Email, Note
        #[arg(long = "type", short = 't')]
        task_type: String,
        /// Project the task belongs to
        #[arg(long, short = 'p')]
        project: String,
        /// Person the task is about or assigned to
        #[arg(long)]
        person: Option<String>,
        /// none, low, medium or high (defaults to the configured priority)
        #[arg(long)]
        priority: Option<Priority>,
        /// Due date in YYYY-MM-DD format
        #[arg(long)]
        due: Option<String>,
        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Toggle a task's completed state
    Complete {
        project: String,
        /// Task number as shown by `list`
        position: usize,
    },
    /// Delete a task (the project goes with its last task)
    Delete { project: String, position: usize },
    /// Replace a task's notes
    Notes {
        project: String,
        position: usize,
        /// New notes; empty clears them
        notes: String,
    },
    /// Toggle hiding completed tasks in a project
    Collapse { project: String },
    /// Show stored autocomplete values
    Suggestions {
        #[arg(long, value_enum)]
        kind: Option<SuggestionKind>,
    },
    /// Export both stores as JSON files
    Export {
        /// Target directory (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Replace all tasks with the contents of a JSON file
    Import { file: PathBuf },
    /// Delete every task and the collapse settings
    ClearTasks {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Delete every stored suggestion
    ClearSuggestions {
        #[arg(long)]
        yes: bool,
    },
    /// Launch the interactive TUI
    Tui,
}
