//! Job client settings
//!
//! Values the workload descriptors are assembled from, plus the choice of
//! backend. Settings are read once at startup and passed explicitly to
//! [`crate::connect`].

use anyhow::Context;

use crate::BackendKind;

/// Job client settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Running on a developer machine rather than in the cloud
    pub local: bool,

    /// Explicit backend choice; falls back to `local` when unset
    pub backend: Option<BackendKind>,

    /// Cloud project that owns the image registry and datastore
    pub gcloud_project_id: String,

    /// Datastore emulator address handed to every workload
    pub datastore_emulator_host: String,

    /// Registry host images are pulled from (e.g., "gcr.io")
    pub registry_host: String,

    /// Path holding project sources, on the node and inside containers
    pub source_path: String,

    /// Path of the local store, only mounted in local mode
    pub local_store_path: String,

    /// Namespace pods are created in
    pub namespace: String,

    /// API server URL; in-cluster discovery is used when unset
    pub kube_api_url: Option<String>,

    /// Config map the cluster workloads read shared settings from
    pub config_map_name: String,

    /// External compose network every compose project joins
    pub compose_network: String,

    /// External compose volume backing the local store
    pub local_store_volume: String,
}

impl Settings {
    /// Creates settings for the given cloud project with defaults for the rest
    pub fn new(gcloud_project_id: impl Into<String>) -> Self {
        Self {
            local: false,
            backend: None,
            gcloud_project_id: gcloud_project_id.into(),
            datastore_emulator_host: String::new(),
            registry_host: "gcr.io".to_string(),
            source_path: "/source".to_string(),
            local_store_path: "/localstore".to_string(),
            namespace: "default".to_string(),
            kube_api_url: None,
            config_map_name: "arena-config".to_string(),
            compose_network: "arena_cgp-network".to_string(),
            local_store_volume: "arena_local-store".to_string(),
        }
    }

    /// Creates settings from environment variables
    ///
    /// Expected environment variables:
    /// - GCLOUD_PROJECT_ID (required)
    /// - IS_LOCAL (optional, default: false)
    /// - JOB_BACKEND (optional, "cluster" or "compose")
    /// - DATASTORE_EMULATOR_HOST (optional)
    /// - REGISTRY_HOST (optional, default: gcr.io)
    /// - SOURCE_PATH (optional, default: /source)
    /// - LOCAL_STORE_PATH (optional, default: /localstore)
    /// - KUBE_NAMESPACE (optional, default: default)
    /// - KUBE_API_URL (optional)
    /// - CONFIG_MAP_NAME (optional, default: arena-config)
    /// - COMPOSE_NETWORK (optional, default: arena_cgp-network)
    /// - LOCAL_STORE_VOLUME (optional, default: arena_local-store)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gcloud_project_id = lookup("GCLOUD_PROJECT_ID")
            .ok_or_else(|| anyhow::anyhow!("GCLOUD_PROJECT_ID environment variable not set"))?;

        let mut settings = Self::new(gcloud_project_id);

        if let Some(value) = lookup("IS_LOCAL") {
            settings.local = parse_bool(&value)
                .with_context(|| format!("Invalid IS_LOCAL value '{}'", value))?;
        }

        if let Some(value) = lookup("JOB_BACKEND") {
            settings.backend = Some(value.parse()?);
        }

        if let Some(value) = lookup("DATASTORE_EMULATOR_HOST") {
            settings.datastore_emulator_host = value;
        }
        if let Some(value) = lookup("REGISTRY_HOST") {
            settings.registry_host = value;
        }
        if let Some(value) = lookup("SOURCE_PATH") {
            settings.source_path = value;
        }
        if let Some(value) = lookup("LOCAL_STORE_PATH") {
            settings.local_store_path = value;
        }
        if let Some(value) = lookup("KUBE_NAMESPACE") {
            settings.namespace = value;
        }
        settings.kube_api_url = lookup("KUBE_API_URL").filter(|url| !url.is_empty());
        if let Some(value) = lookup("CONFIG_MAP_NAME") {
            settings.config_map_name = value;
        }
        if let Some(value) = lookup("COMPOSE_NETWORK") {
            settings.compose_network = value;
        }
        if let Some(value) = lookup("LOCAL_STORE_VOLUME") {
            settings.local_store_volume = value;
        }

        Ok(settings)
    }

    /// Sets local mode
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Forces a backend regardless of local mode
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Talks to the API server at `url` instead of discovering it in-cluster
    pub fn with_kube_api_url(mut self, url: impl Into<String>) -> Self {
        self.kube_api_url = Some(url.into());
        self
    }

    /// The backend this process should use
    pub fn backend(&self) -> BackendKind {
        match self.backend {
            Some(backend) => backend,
            None if self.local => BackendKind::Compose,
            None => BackendKind::Cluster,
        }
    }

    /// Full image reference for an image name in the project registry
    pub fn image(&self, name: &str) -> String {
        format!(
            "{}/{}/{}:latest",
            self.registry_host, self.gcloud_project_id, name
        )
    }

    /// Validates the settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gcloud_project_id.is_empty() {
            anyhow::bail!("gcloud_project_id cannot be empty");
        }

        if self.registry_host.is_empty() {
            anyhow::bail!("registry_host cannot be empty");
        }

        if !self.source_path.starts_with('/') {
            anyhow::bail!("source_path must be an absolute path");
        }

        if self.local && !self.local_store_path.starts_with('/') {
            anyhow::bail!("local_store_path must be an absolute path");
        }

        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if let Some(url) = &self.kube_api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("kube_api_url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => anyhow::bail!("expected a boolean"),
    }
}
