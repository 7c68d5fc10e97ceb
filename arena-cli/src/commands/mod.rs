//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod follow;
mod launch;

use follow::WaitArgs;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a game runner for a game and its projects
    Game {
        /// Game ID
        #[arg(long)]
        id: i64,

        /// Game type ID, selects the runner image
        #[arg(long)]
        game_type: i64,

        /// Project as ID:LANGUAGE[:DIRECTORY], repeatable
        #[arg(long = "project", value_parser = launch::parse_project)]
        projects: Vec<arena_core::domain::game::Project>,

        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Start a bot runner next to a running game
    Bot {
        /// IP of the game runner the bot connects to
        #[arg(long)]
        ip: String,

        /// Bot ID within the game
        #[arg(long)]
        bot_id: i32,

        /// Game ID
        #[arg(long)]
        game_id: i64,

        /// Game type ID, selects the runner image
        #[arg(long)]
        game_type: i64,

        /// Project as ID:LANGUAGE[:DIRECTORY]
        #[arg(long, value_parser = launch::parse_project)]
        project: arena_core::domain::game::Project,

        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Build the runner images for a game type
    Build {
        /// Game type ID
        #[arg(long)]
        game_type: i64,

        #[command(flatten)]
        wait: WaitArgs,
    },
}

/// Handle a CLI command
///
/// Routes the command to the launcher with the watch each kind defaults to.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let (request, wait) = launch::into_request(command);
    launch::launch(request, wait, config).await
}
