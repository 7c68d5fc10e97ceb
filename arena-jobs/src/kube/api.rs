//! Kubernetes API server access
//!
//! Creates pods and streams watch events for a single pod through
//! `kube::Api<Pod>`. Each watch is a field-selector watch on the pod's name
//! that the API server ends after [`WATCH_TIMEOUT_SECS`]; the watch loop
//! re-opens it.

use arena_core::domain::watch::{EventKind, Phase, WatchEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, PostParams, WatchParams};
use kube::core::WatchEvent as PodEvent;
use kube::{Client, Config};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::BackendKind;
use crate::error::{JobError, Result};
use crate::watch::{Subscription, WATCH_CHANNEL_CAPACITY};

/// Server-side lifetime of one watch request
pub const WATCH_TIMEOUT_SECS: u32 = 290;

/// Pod operations the cluster job client needs
#[async_trait]
pub trait PodApi: Send + Sync + 'static {
    /// Creates the pod and returns it as stored by the backend
    async fn create_pod(&self, pod: &Pod) -> Result<Pod>;

    /// Opens an event stream for the pod with the given name
    async fn watch_pod(&self, name: &str) -> Result<Subscription>;
}

/// Pod API of one namespace
#[derive(Clone)]
pub struct ApiServer {
    /// Where the API server was found, for logging
    cluster_url: String,
    pods: Api<Pod>,
}

impl ApiServer {
    /// Creates a client for an API server that needs no authentication
    ///
    /// Meant for `kubectl proxy` and similar local endpoints.
    pub fn new(url: &str, namespace: &str) -> Result<Self> {
        let cluster_url = url
            .parse()
            .map_err(|e| connection_error(format!("invalid API URL '{}': {}", url, e)))?;
        Self::from_config(Config::new(cluster_url), namespace)
    }

    /// Creates a client from the service account mounted into every pod
    ///
    /// Only works when running inside the cluster.
    pub fn in_cluster(namespace: &str) -> Result<Self> {
        let config = Config::incluster().map_err(|e| connection_error(e.to_string()))?;
        Self::from_config(config, namespace)
    }

    fn from_config(mut config: Config, namespace: &str) -> Result<Self> {
        config.default_namespace = namespace.to_string();
        let cluster_url = config.cluster_url.to_string();
        let client = Client::try_from(config).map_err(|e| connection_error(e.to_string()))?;

        Ok(Self {
            cluster_url,
            pods: Api::namespaced(client, namespace),
        })
    }

    /// URL of the API server
    pub fn cluster_url(&self) -> &str {
        &self.cluster_url
    }
}

#[async_trait]
impl PodApi for ApiServer {
    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| create_error(&name, e))
    }

    async fn watch_pod(&self, name: &str) -> Result<Subscription> {
        let params = WatchParams::default()
            .fields(&format!("metadata.name={}", name))
            .timeout(WATCH_TIMEOUT_SECS);

        // Version "0" replays the current state first, so a re-opened watch
        // sees the phase the pod is in now
        let stream = self
            .pods
            .watch(&params, "0")
            .await
            .map_err(|e| JobError::subscription(name, e.to_string()))?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let pod_name = name.to_string();

        let pump = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(event) => match decode_event(event) {
                        Some(event) => event,
                        None => continue,
                    },
                    Err(e) => {
                        warn!("Watch stream for pod {} failed: {}", pod_name, e);
                        let _ = tx.send(WatchEvent::stream_error(e.to_string())).await;
                        return;
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            debug!("Watch stream for pod {} ended", pod_name);
        });

        Ok(Subscription::new(name, rx, pump))
    }
}

fn connection_error(message: impl Into<String>) -> JobError {
    JobError::Connection {
        backend: BackendKind::Cluster,
        message: message.into(),
    }
}

/// Classifies a failed create
///
/// A reply that arrived but did not decode means the API server stored the
/// pod, so it must not be reported as a rejected submission.
fn create_error(name: &str, error: kube::Error) -> JobError {
    match error {
        kube::Error::SerdeError(e) => JobError::Unconfirmed {
            name: name.to_string(),
            message: e.to_string(),
        },
        kube::Error::Api(response) => JobError::submission(
            name,
            format!("API error (status {}): {}", response.code, response.message),
        ),
        other => JobError::submission(name, other.to_string()),
    }
}

/// Translates one watch event
///
/// Bookmarks carry no pod state and are skipped.
pub fn decode_event(event: PodEvent<Pod>) -> Option<WatchEvent> {
    let (kind, pod) = match event {
        PodEvent::Added(pod) => (EventKind::Added, pod),
        PodEvent::Modified(pod) => (EventKind::Modified, pod),
        PodEvent::Deleted(pod) => (EventKind::Deleted, pod),
        PodEvent::Bookmark(_) => return None,
        PodEvent::Error(status) => {
            let snapshot = serde_json::json!({
                "status": status.status,
                "message": status.message,
                "reason": status.reason,
                "code": status.code,
            });
            return Some(WatchEvent::new(EventKind::Error, Phase::Unknown, snapshot));
        }
    };

    let phase = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(Phase::parse)
        .unwrap_or(Phase::Unknown);
    let exit_code = exit_code(&pod);

    let event = match serde_json::to_value(&pod) {
        Ok(snapshot) => WatchEvent::new(kind, phase, snapshot),
        Err(e) => WatchEvent::stream_error(format!("unencodable pod: {}", e)),
    };
    Some(event.with_exit_code(exit_code))
}

/// Exit code of the pod's first terminated container
fn exit_code(pod: &Pod) -> Option<i32> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .iter()
        .find_map(|c| c.state.as_ref()?.terminated.as_ref().map(|t| t.exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn pod(mut value: serde_json::Value) -> Pod {
        value["apiVersion"] = "v1".into();
        value["kind"] = "Pod".into();
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_api_server_from_url() {
        let api = ApiServer::new("http://localhost:8001", "default").unwrap();
        assert!(api.cluster_url().starts_with("http://localhost:8001"));
    }

    #[tokio::test]
    async fn test_api_server_rejects_bad_url() {
        let err = ApiServer::new("not a url", "default").err().unwrap();
        assert!(matches!(err, JobError::Connection { .. }));
        assert!(!err.workload_started());
    }

    #[test]
    fn test_decode_modified_event() {
        let event = decode_event(PodEvent::Modified(pod(serde_json::json!({
            "metadata": { "name": "game-7" },
            "status": { "phase": "Running" }
        }))))
        .unwrap();
        assert_eq!(event.kind, EventKind::Modified);
        assert_eq!(event.phase, Phase::Running);
        assert_eq!(event.snapshot["metadata"]["name"], "game-7");
        assert!(event.exit_code.is_none());
    }

    #[test]
    fn test_decode_event_without_status() {
        let event = decode_event(PodEvent::Added(pod(serde_json::json!({
            "metadata": { "name": "game-7" }
        }))))
        .unwrap();
        assert_eq!(event.kind, EventKind::Added);
        assert_eq!(event.phase, Phase::Unknown);
    }

    #[test]
    fn test_decode_terminated_container() {
        let event = decode_event(PodEvent::Modified(pod(serde_json::json!({
            "metadata": { "name": "builder-2" },
            "status": {
                "phase": "Failed",
                "containerStatuses": [{
                    "name": "builder",
                    "image": "gcr.io/arena-dev/builder:latest",
                    "imageID": "",
                    "ready": false,
                    "restartCount": 0,
                    "state": { "terminated": { "exitCode": 2 } }
                }]
            }
        }))))
        .unwrap();
        assert_eq!(event.phase, Phase::Failed);
        assert_eq!(event.exit_code, Some(2));
    }

    #[test]
    fn test_decode_error_event() {
        let event = decode_event(PodEvent::Error(ErrorResponse {
            status: "Failure".to_string(),
            message: "too old resource version".to_string(),
            reason: "Expired".to_string(),
            code: 410,
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::Error);
        assert_eq!(event.phase, Phase::Unknown);
        assert_eq!(event.snapshot["message"], "too old resource version");
    }

    #[test]
    fn test_undecodable_create_reply_is_not_a_rejection() {
        let decode = serde_json::from_str::<Pod>("{").unwrap_err();
        let err = create_error("game-7", kube::Error::SerdeError(decode));
        assert!(matches!(err, JobError::Unconfirmed { ref name, .. } if name == "game-7"));
        assert!(err.workload_started());

        let err = create_error(
            "game-7",
            kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: "pods \"game-7\" already exists".to_string(),
                reason: "AlreadyExists".to_string(),
                code: 409,
            }),
        );
        assert!(matches!(err, JobError::Submission { .. }));
        assert!(!err.workload_started());
    }
}
