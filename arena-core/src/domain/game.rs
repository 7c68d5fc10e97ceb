//! Game domain types

use serde::{Deserialize, Serialize};

/// A single match between projects of one game type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub game_type_id: i64,
    pub project_ids: Vec<i64>,
}

/// A user's bot project, written in one language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub language: String,
    /// Local source checkout, mounted into the team runner when running locally
    pub directory: Option<String>,
}

/// A game type whose runner images get built on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameType {
    pub id: i64,
}
