//! Cluster backend
//!
//! Every request becomes a single pod in the configured namespace. Jobs are
//! watched through a field-selector watch on the pod's name, re-opened each
//! time the API server expires it.

pub mod api;
pub mod pod;

pub use api::{ApiServer, PodApi};

use arena_core::domain::game::{Game, GameType, Project};
use arena_core::domain::request::JobRequest;
use arena_core::domain::watch::WatchEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::Result;
use crate::watch::{self, is_running, is_succeeded};
use crate::{BackendKind, Job, JobClient};

/// Job client that creates pods
pub struct KubeJobClient<A: PodApi = ApiServer> {
    api: Arc<A>,
    settings: Arc<Settings>,
}

impl<A: PodApi> KubeJobClient<A> {
    pub fn new(api: Arc<A>, settings: Arc<Settings>) -> Self {
        Self { api, settings }
    }

    async fn create(&self, request: JobRequest) -> Result<Box<dyn Job>> {
        let pod = pod::build_pod(&self.settings, &request);
        let name = request.workload_name();
        info!("Starting {} as pod {}", request.kind(), name);
        debug!("Pod spec: {:?}", pod);

        self.api.create_pod(&pod).await?;
        Ok(Box::new(KubeJob {
            name,
            api: Arc::clone(&self.api),
        }))
    }
}

#[async_trait]
impl<A: PodApi> JobClient for KubeJobClient<A> {
    fn backend(&self) -> BackendKind {
        BackendKind::Cluster
    }

    async fn start_game(&self, game: &Game, projects: &[Project]) -> Result<Box<dyn Job>> {
        self.create(JobRequest::StartGame {
            game: game.clone(),
            projects: projects.to_vec(),
        })
        .await
    }

    async fn start_bot(
        &self,
        ip: &str,
        bot_id: i32,
        project: &Project,
        game: &Game,
    ) -> Result<Box<dyn Job>> {
        self.create(JobRequest::StartBot {
            ip: ip.to_string(),
            bot_id,
            project: project.clone(),
            game: game.clone(),
        })
        .await
    }

    async fn build_game_type(&self, game_type: &GameType) -> Result<Box<dyn Job>> {
        self.create(JobRequest::BuildGameType {
            game_type: game_type.clone(),
        })
        .await
    }
}

/// A pod created by [`KubeJobClient`]
pub struct KubeJob<A: PodApi = ApiServer> {
    name: String,
    api: Arc<A>,
}

impl<A: PodApi> KubeJob<A> {
    async fn watch_pod(
        &self,
        is_desired: fn(&WatchEvent) -> bool,
        cancel: &CancellationToken,
    ) -> Result<WatchEvent> {
        let api = &self.api;
        let name = self.name.as_str();
        watch::watch_until(name, move || api.watch_pod(name), is_desired, cancel).await
    }
}

#[async_trait]
impl<A: PodApi> Job for KubeJob<A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn watch_to_startup(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Watching {} to startup", self.name());
        self.watch_pod(is_running, cancel).await.map(|_| ())
    }

    async fn watch_to_completion(&self, cancel: &CancellationToken) -> Result<()> {
        info!("Watching {} to completion", self.name());
        self.watch_pod(is_succeeded, cancel).await.map(|_| ())
    }
}
