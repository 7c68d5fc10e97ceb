//! Arena job client
//!
//! Launches game sessions, bot runners and game type builds on one of two
//! backends, and watches them until they start or finish:
//! - Cluster: pods created through the Kubernetes API server
//! - Compose: `docker compose` projects on the local machine
//!
//! Callers pick the backend once through [`Settings`] and only ever talk to
//! the [`JobClient`] and [`Job`] traits.
//!
//! # Example
//!
//! ```no_run
//! use arena_core::domain::game::Game;
//! use arena_jobs::{Settings, connect};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let client = connect(&settings).await?;
//!
//!     let game = Game { id: 7, game_type_id: 1, project_ids: vec![] };
//!     let job = client.start_game(&game, &[]).await?;
//!     job.watch_to_startup(&CancellationToken::new()).await?;
//!
//!     println!("{} is running", job.name());
//!     Ok(())
//! }
//! ```

pub mod compose;
pub mod config;
pub mod error;
pub mod kube;
pub mod watch;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Settings;
pub use error::{JobError, Result};

use arena_core::domain::game::{Game, GameType, Project};
use arena_core::domain::request::JobRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::compose::{ComposeJobClient, DockerCompose};
use crate::kube::{ApiServer, KubeJobClient};

/// Which backend runs the workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cluster,
    Compose,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cluster => write!(f, "cluster"),
            BackendKind::Compose => write!(f, "compose"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cluster" | "kube" | "kubernetes" => Ok(BackendKind::Cluster),
            "compose" | "docker" => Ok(BackendKind::Compose),
            other => anyhow::bail!("Unknown backend '{}' (expected cluster or compose)", other),
        }
    }
}

/// A submitted workload that can be watched
#[async_trait]
pub trait Job: Send + Sync {
    /// Backend name of the workload
    fn name(&self) -> &str;

    /// Waits until the workload is up and running
    async fn watch_to_startup(&self, cancel: &CancellationToken) -> Result<()>;

    /// Waits until the workload has finished successfully
    async fn watch_to_completion(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Starts games, bots and game type builds
///
/// Every operation returns once the backend has accepted the workload,
/// not once it is running.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// The backend this client submits to
    fn backend(&self) -> BackendKind;

    /// Starts a game runner for the game and its projects
    async fn start_game(&self, game: &Game, projects: &[Project]) -> Result<Box<dyn Job>>;

    /// Starts a bot, which runs a user's code in the image built for its language
    async fn start_bot(
        &self,
        ip: &str,
        bot_id: i32,
        project: &Project,
        game: &Game,
    ) -> Result<Box<dyn Job>>;

    /// Kicks off a game type build
    async fn build_game_type(&self, game_type: &GameType) -> Result<Box<dyn Job>>;

    /// Submits any request kind
    async fn submit(&self, request: &JobRequest) -> Result<Box<dyn Job>> {
        match request {
            JobRequest::StartGame { game, projects } => self.start_game(game, projects).await,
            JobRequest::StartBot {
                ip,
                bot_id,
                project,
                game,
            } => self.start_bot(ip, *bot_id, project, game).await,
            JobRequest::BuildGameType { game_type } => self.build_game_type(game_type).await,
        }
    }
}

/// Connects to the backend chosen by the settings
///
/// Fails with [`JobError::Connection`] if the backend cannot be reached.
/// Call once at startup and share the returned client.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn JobClient>> {
    let settings = Arc::new(settings.clone());

    match settings.backend() {
        BackendKind::Cluster => {
            let api = match &settings.kube_api_url {
                Some(url) => ApiServer::new(url, &settings.namespace)?,
                None => ApiServer::in_cluster(&settings.namespace)?,
            };
            info!("Using cluster backend at {}", api.cluster_url());
            Ok(Arc::new(KubeJobClient::new(Arc::new(api), settings)))
        }
        BackendKind::Compose => {
            let engine = DockerCompose::connect().await?;
            info!("Using compose backend");
            Ok(Arc::new(ComposeJobClient::new(Arc::new(engine), settings)))
        }
    }
}
