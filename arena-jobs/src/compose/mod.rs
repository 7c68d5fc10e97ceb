//! Compose backend
//!
//! Each request becomes a compose project on the local docker engine. Bots
//! are not supported: in local mode the game project already runs a team
//! runner per project.
//!
//! Compose events carry no lifecycle phase, so neither startup nor completion
//! can be detected. Watches end only on a `die` event (reported as
//! [`JobError::WorkloadDeleted`] with the container's exit code), a stream
//! failure, or cancellation.
//!
//! [`JobError::WorkloadDeleted`]: crate::error::JobError::WorkloadDeleted

pub mod engine;
pub mod project;

pub use engine::{ComposeEngine, DockerCompose};
pub use project::ComposeProject;

use arena_core::domain::game::{Game, GameType, Project};
use arena_core::domain::request::RequestKind;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{JobError, Result};
use crate::watch::{self, never};
use crate::{BackendKind, Job, JobClient};

/// Job client that brings up compose projects
pub struct ComposeJobClient<E: ComposeEngine = DockerCompose> {
    engine: Arc<E>,
    settings: Arc<Settings>,
}

impl<E: ComposeEngine> ComposeJobClient<E> {
    pub fn new(engine: Arc<E>, settings: Arc<Settings>) -> Self {
        Self { engine, settings }
    }

    async fn up(&self, kind: RequestKind, project: ComposeProject) -> Result<Box<dyn Job>> {
        info!("Starting {} as compose project {}", kind, project.name);
        debug!("Project spec: {:?}", project);

        self.engine.up(&project).await?;
        Ok(Box::new(ComposeJob {
            project_name: project.name,
            engine: Arc::clone(&self.engine),
        }))
    }
}

#[async_trait]
impl<E: ComposeEngine> JobClient for ComposeJobClient<E> {
    fn backend(&self) -> BackendKind {
        BackendKind::Compose
    }

    async fn start_game(&self, game: &Game, projects: &[Project]) -> Result<Box<dyn Job>> {
        let project = project::game_project(&self.settings, game, projects);
        self.up(RequestKind::StartGame, project).await
    }

    async fn start_bot(
        &self,
        _ip: &str,
        _bot_id: i32,
        _project: &Project,
        _game: &Game,
    ) -> Result<Box<dyn Job>> {
        Err(JobError::UnsupportedOperation {
            backend: BackendKind::Compose,
            operation: RequestKind::StartBot,
        })
    }

    async fn build_game_type(&self, game_type: &GameType) -> Result<Box<dyn Job>> {
        let project = project::builder_project(&self.settings, game_type);
        self.up(RequestKind::BuildGameType, project).await
    }
}

/// A compose project brought up by [`ComposeJobClient`]
pub struct ComposeJob<E: ComposeEngine = DockerCompose> {
    project_name: String,
    engine: Arc<E>,
}

impl<E: ComposeEngine> ComposeJob<E> {
    async fn watch_project(&self, cancel: &CancellationToken) -> Result<()> {
        let engine = &self.engine;
        let name = self.project_name.as_str();
        watch::watch_until(name, move || engine.events(name), never, cancel)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl<E: ComposeEngine> Job for ComposeJob<E> {
    fn name(&self) -> &str {
        &self.project_name
    }

    async fn watch_to_startup(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Watching {} to startup", self.project_name);
        self.watch_project(cancel).await
    }

    async fn watch_to_completion(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Watching {} to completion", self.project_name);
        self.watch_project(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeComposeEngine, event};
    use arena_core::domain::watch::{EventKind, Phase};
    use std::time::Duration;

    fn client(engine: FakeComposeEngine) -> (ComposeJobClient<FakeComposeEngine>, Arc<FakeComposeEngine>) {
        let engine = Arc::new(engine);
        let settings = Arc::new(Settings::new("arena-dev").with_local(true));
        (ComposeJobClient::new(Arc::clone(&engine), settings), engine)
    }

    fn game(id: i64) -> Game {
        Game {
            id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_bot_is_unsupported() {
        let (client, engine) = client(FakeComposeEngine::new(vec![]));
        let project = Project {
            id: 12,
            language: "py".to_string(),
            directory: None,
        };

        let err = client
            .start_bot("10.0.0.5", 3, &project, &game(7))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            JobError::UnsupportedOperation {
                backend: BackendKind::Compose,
                operation: RequestKind::StartBot,
            }
        ));
        assert!(engine.project_names().is_empty());
    }

    #[tokio::test]
    async fn test_project_names() {
        let (client, engine) = client(FakeComposeEngine::new(vec![]));

        let game_job = client.start_game(&game(7), &[]).await.unwrap();
        let build_job = client.build_game_type(&GameType { id: 2 }).await.unwrap();

        assert_eq!(game_job.name(), "game-7");
        assert_eq!(build_job.name(), "game-type-builder-2");
        assert_eq!(
            engine.project_names(),
            vec!["game-7".to_string(), "game-type-builder-2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_watch_never_detects_startup() {
        // Even a phase that would satisfy the cluster watch is ignored here
        let (client, _engine) = client(
            FakeComposeEngine::new(vec![
                event(EventKind::Modified, Phase::Unknown),
                event(EventKind::Modified, Phase::Running),
            ])
            .held_open(),
        );

        let job = client.start_game(&game(7), &[]).await.unwrap();
        let cancel = CancellationToken::new();
        let result =
            tokio::time::timeout(Duration::from_millis(100), job.watch_to_startup(&cancel)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_die_ends_watch() {
        let (client, _engine) = client(FakeComposeEngine::new(vec![
            event(EventKind::Modified, Phase::Unknown),
            event(EventKind::Deleted, Phase::Unknown),
        ]));

        let job = client.build_game_type(&GameType { id: 2 }).await.unwrap();
        let err = job
            .watch_to_completion(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::WorkloadDeleted { .. }));
    }

    #[tokio::test]
    async fn test_clean_exit_is_told_apart_from_crash() {
        let die = engine::decode_event(
            r#"{"type":"container","action":"die","service":"game-runner","attributes":{"exitCode":"0"}}"#,
        );
        let (client, _engine) = client(FakeComposeEngine::new(vec![die]));

        let job = client.start_game(&game(7), &[]).await.unwrap();
        let err = job
            .watch_to_completion(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(0));
        assert_eq!(
            err.to_string(),
            "Workload game-7 exited with code 0 before reaching desired state"
        );
    }

    #[tokio::test]
    async fn test_cancel_while_events_are_opening() {
        let (client, _engine) = client(FakeComposeEngine::new(vec![]).hanging_events());

        let job = client.start_game(&game(7), &[]).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            tokio::time::timeout(Duration::from_millis(300), job.watch_to_startup(&cancel))
                .await
                .expect("watch ignored the cancelled token while opening");
        assert!(matches!(result, Err(JobError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancel_compose_watch() {
        let (client, _engine) = client(FakeComposeEngine::new(vec![]).held_open());

        let job = client.start_game(&game(7), &[]).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = job.watch_to_completion(&cancel).await.unwrap_err();
        assert!(matches!(err, JobError::Cancelled { .. }));
    }
}
