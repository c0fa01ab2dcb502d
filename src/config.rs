use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Directory the wrapper scripts run from.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    /// Directory holding deploy-version.sh and list-versions.sh.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
    #[serde(default = "default_helm_bin")]
    pub helm_bin: String,
    #[serde(default = "default_kubectl_bin")]
    pub kubectl_bin: String,
    /// Origin allowed by the CORS layer (the dev web UI).
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_workspace_dir() -> String {
    "/workspace".to_string()
}

fn default_scripts_dir() -> String {
    "/workspace/scripts".to_string()
}

fn default_helm_bin() -> String {
    "helm".to_string()
}

fn default_kubectl_bin() -> String {
    "kubectl".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        #[cfg(debug_assertions)]
        let _ = dotenvy::from_filename(".env.local");

        let config = ConfigBuilder::builder()
            .add_source(Environment::with_prefix("VERPLOY").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
