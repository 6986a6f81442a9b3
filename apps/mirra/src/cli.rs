use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mirra", about = "Transparent recording proxy for Claude, OpenAI, and Gemini APIs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the proxy server (default if no subcommand is given).
    Start,
    /// Rebuild index.json from the recordings directory and save it.
    Reindex,
    /// Delete all recordings, index.json, and groups/ after confirmation.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Session grouping queries.
    Groups {
        #[command(subcommand)]
        command: GroupsCommand,
    },
}

#[derive(Subcommand)]
pub enum GroupsCommand {
    /// List session groups.
    Sessions(SessionsArgs),
    /// Show one session group and its recordings.
    Session {
        trace_id: String,
    },
}

#[derive(Args)]
pub struct SessionsArgs {
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub errors: Option<bool>,
}
