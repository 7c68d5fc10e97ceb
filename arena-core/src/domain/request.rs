//! Job requests and workload naming
//!
//! Workload names are the only identifiers other services use to look
//! workloads up, so they must stay stable across releases.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::game::{Game, GameType, Project};

/// What a caller wants the backend to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobRequest {
    /// Run a game session for the given projects
    StartGame { game: Game, projects: Vec<Project> },
    /// Run one bot's code next to an already running game runner
    StartBot {
        ip: String,
        bot_id: i32,
        project: Project,
        game: Game,
    },
    /// Build the runner images for a new game type
    BuildGameType { game_type: GameType },
}

/// The three request kinds, without their payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    StartGame,
    StartBot,
    BuildGameType,
}

impl JobRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            JobRequest::StartGame { .. } => RequestKind::StartGame,
            JobRequest::StartBot { .. } => RequestKind::StartBot,
            JobRequest::BuildGameType { .. } => RequestKind::BuildGameType,
        }
    }

    /// Name of the pod this request turns into
    pub fn workload_name(&self) -> String {
        match self {
            JobRequest::StartGame { game, .. } => game_workload_name(game.id),
            JobRequest::StartBot { bot_id, game, .. } => bot_workload_name(game.id, *bot_id),
            JobRequest::BuildGameType { game_type } => builder_workload_name(game_type.id),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestKind::StartGame => "StartGame",
            RequestKind::StartBot => "StartBot",
            RequestKind::BuildGameType => "BuildGameType",
        };
        write!(f, "{}", s)
    }
}

pub fn game_workload_name(game_id: i64) -> String {
    format!("game-{}", game_id)
}

pub fn bot_workload_name(game_id: i64, bot_id: i32) -> String {
    format!("bot-{}-{}", game_id, bot_id)
}

pub fn builder_workload_name(game_type_id: i64) -> String {
    format!("builder-{}", game_type_id)
}

/// Compose project name for a game session
pub fn game_project_name(game_id: i64) -> String {
    format!("game-{}", game_id)
}

/// Compose project name for a game type build
pub fn builder_project_name(game_type_id: i64) -> String {
    format!("game-type-builder-{}", game_type_id)
}
