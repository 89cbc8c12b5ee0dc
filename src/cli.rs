use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "mavi",
    version,
    about = "Terminal coding companion that grounds answers in GitHub documentation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Start an interactive chat session (default)
    Chat,
    /// Show, set or delete stored API keys
    Keys {
        /// Store a key for a cloud model
        #[arg(long, conflicts_with = "delete")]
        set: bool,
        /// Remove a stored key
        #[arg(long)]
        delete: bool,
    },
    /// Ask a single question and exit
    Ask {
        /// Model identifier to use instead of the first available one
        #[arg(long)]
        model: Option<String>,
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat)
    }
}
