//! Configuration module
//!
//! Job client settings come from the environment; command-line flags
//! override them.

use anyhow::{Context, Result};
use arena_jobs::{BackendKind, Settings};

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Settings handed to the job client
    pub settings: Settings,
}

impl Config {
    /// Loads settings from the environment and applies flag overrides
    pub fn load(
        local: Option<bool>,
        backend: Option<&str>,
        kube_api_url: Option<String>,
    ) -> Result<Self> {
        let mut settings = Settings::from_env().context("Failed to load job client settings")?;

        if let Some(local) = local {
            settings = settings.with_local(local);
        }
        if let Some(backend) = backend {
            let backend: BackendKind = backend.parse()?;
            settings = settings.with_backend(backend);
        }
        if let Some(url) = kube_api_url.filter(|url| !url.is_empty()) {
            settings = settings.with_kube_api_url(url);
        }

        settings.validate().context("Invalid job client settings")?;

        Ok(Self { settings })
    }
}
