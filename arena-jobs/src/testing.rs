//! In-memory backends for tests
//!
//! Each fake replays a scripted list of events on every subscription, either
//! closing the stream afterwards or holding it open like a live backend.
//! Scripts given to `FakePodApi::scripted` are used first, one per subscription.

use arena_core::domain::watch::{EventKind, Phase, WatchEvent};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::compose::engine::ComposeEngine;
use crate::compose::project::ComposeProject;
use crate::error::{JobError, Result};
use crate::kube::api::PodApi;
use crate::watch::{Subscription, WATCH_CHANNEL_CAPACITY};

pub fn event(kind: EventKind, phase: Phase) -> WatchEvent {
    WatchEvent::new(
        kind,
        phase,
        serde_json::json!({ "status": { "phase": phase.to_string() } }),
    )
}

fn replay(name: &str, events: Vec<WatchEvent>, hold_open: bool) -> Subscription {
    let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
    let pump = tokio::spawn(async move {
        for e in events {
            if tx.send(e).await.is_err() {
                return;
            }
        }
        if hold_open {
            std::future::pending::<()>().await;
        }
    });
    Subscription::new(name, rx, pump)
}

#[derive(Default)]
pub struct FakePodApi {
    events: Vec<WatchEvent>,
    scripts: Mutex<VecDeque<Vec<WatchEvent>>>,
    reject: Option<String>,
    fail_watch: bool,
    hang_watch: bool,
    hold_open: bool,
    created: Mutex<Vec<Pod>>,
    watched: Mutex<Vec<String>>,
}

impl FakePodApi {
    pub fn new(events: Vec<WatchEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            reject: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Streams `first`, then `then`, before falling back to the default events
    pub fn scripted(first: Vec<WatchEvent>, then: Vec<WatchEvent>) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::from([first, then])),
            ..Default::default()
        }
    }

    pub fn failing_watch(mut self) -> Self {
        self.fail_watch = true;
        self
    }

    /// The watch request is accepted but never answered
    pub fn hanging_watch(mut self) -> Self {
        self.hang_watch = true;
        self
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn created_names(&self) -> Vec<String> {
        let created = self.created.lock().unwrap();
        created
            .iter()
            .filter_map(|p| p.metadata.name.clone())
            .collect()
    }

    pub fn watched_names(&self) -> Vec<String> {
        self.watched.lock().unwrap().clone()
    }
}

#[async_trait]
impl PodApi for FakePodApi {
    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        if let Some(message) = &self.reject {
            let name = pod.metadata.name.clone().unwrap_or_default();
            return Err(JobError::submission(name, message.clone()));
        }

        let mut stored = pod.clone();
        stored.status = Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        self.created.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn watch_pod(&self, name: &str) -> Result<Subscription> {
        if self.fail_watch {
            return Err(JobError::subscription(name, "connection refused"));
        }
        if self.hang_watch {
            std::future::pending::<()>().await;
        }
        self.watched.lock().unwrap().push(name.to_string());

        let script = self.scripts.lock().unwrap().pop_front();
        let events = script.unwrap_or_else(|| self.events.clone());
        Ok(replay(name, events, self.hold_open))
    }
}

#[derive(Default)]
pub struct FakeComposeEngine {
    events: Vec<WatchEvent>,
    hold_open: bool,
    hang_events: bool,
    projects: Mutex<Vec<ComposeProject>>,
}

impl FakeComposeEngine {
    pub fn new(events: Vec<WatchEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// `compose events` starts but the subscription never opens
    pub fn hanging_events(mut self) -> Self {
        self.hang_events = true;
        self
    }

    pub fn project_names(&self) -> Vec<String> {
        let projects = self.projects.lock().unwrap();
        projects.iter().map(|p| p.name.clone()).collect()
    }
}

#[async_trait]
impl ComposeEngine for FakeComposeEngine {
    async fn up(&self, project: &ComposeProject) -> Result<()> {
        self.projects.lock().unwrap().push(project.clone());
        Ok(())
    }

    async fn events(&self, project_name: &str) -> Result<Subscription> {
        if self.hang_events {
            std::future::pending::<()>().await;
        }
        Ok(replay(project_name, self.events.clone(), self.hold_open))
    }
}
