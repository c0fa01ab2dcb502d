use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::process::Command;

use crate::api::types::DeploymentMode;

const DEPLOY_SCRIPT: &str = "deploy-version.sh";
const LIST_SCRIPT: &str = "list-versions.sh";

/// Captured result of one external tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

pub(crate) async fn run_captured(mut cmd: Command, label: &str) -> Result<ToolOutput> {
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to run {label}"))?;
    Ok(ToolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Wrapper around the Helm packaging tool and the deployment wrapper
/// scripts. All invocations are blocking subprocess calls with captured
/// output; no timeout is imposed here.
#[derive(Clone, Debug)]
pub struct HelmClient {
    helm_bin: String,
    scripts_dir: PathBuf,
    workspace_dir: PathBuf,
}

impl HelmClient {
    pub fn new(
        helm_bin: impl Into<String>,
        scripts_dir: impl Into<PathBuf>,
        workspace_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            helm_bin: helm_bin.into(),
            scripts_dir: scripts_dir.into(),
            workspace_dir: workspace_dir.into(),
        }
    }

    /// Runs the deploy script for a version with the derived flags.
    pub async fn deploy_version(
        &self,
        version: &str,
        mode: DeploymentMode,
        name: Option<&str>,
        snapshot: Option<&str>,
        values_file: Option<&Path>,
    ) -> Result<ToolOutput> {
        let script = self.scripts_dir.join(DEPLOY_SCRIPT);
        let mut cmd = Command::new(&script);
        cmd.arg(version).arg(mode.flag());
        if let Some(name) = name {
            cmd.args(["--name", name]);
        }
        if let Some(snapshot) = snapshot {
            cmd.args(["--snapshot", snapshot]);
        }
        if let Some(values_file) = values_file {
            cmd.arg("--values-file").arg(values_file);
        }
        cmd.current_dir(&self.workspace_dir);
        run_captured(cmd, DEPLOY_SCRIPT).await
    }

    /// Runs the listing script covering all live deployments.
    pub async fn list_versions(&self) -> Result<ToolOutput> {
        let mut cmd = Command::new(self.scripts_dir.join(LIST_SCRIPT));
        cmd.current_dir(&self.workspace_dir);
        run_captured(cmd, LIST_SCRIPT).await
    }

    /// Fetches the recorded values of a release as JSON.
    pub async fn get_values(&self, namespace: &str) -> Result<Value> {
        let mut cmd = Command::new(&self.helm_bin);
        cmd.args(["get", "values", namespace, "-n", namespace, "-o", "json"]);
        let out = run_captured(cmd, "helm get values").await?;
        if !out.success {
            bail!("helm get values failed: {}", out.stderr.trim());
        }
        serde_json::from_str(&out.stdout).context("failed to decode helm values")
    }

    /// Uninstalls a release. Callers treat failures as best-effort.
    pub async fn uninstall(&self, namespace: &str) -> Result<ToolOutput> {
        let mut cmd = Command::new(&self.helm_bin);
        cmd.args(["uninstall", namespace, "--namespace", namespace]);
        run_captured(cmd, "helm uninstall").await
    }
}

/// How a non-zero deploy exit was classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Success,
    /// The tool reported a namespace conflict caused by a namespace
    /// still terminating; the deployment itself went through, so the
    /// operation is reclassified as a success.
    AbsorbedConflict { error: String },
    Failure { error: String },
}

pub fn classify_deploy(output: &ToolOutput) -> DeployOutcome {
    if output.success {
        return DeployOutcome::Success;
    }

    let stderr = output.stderr.trim();
    let stdout = output.stdout.trim();
    let error = if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        "Deployment failed with no error message"
    };

    let lowered = error.to_lowercase();
    if lowered.contains("already exists") && lowered.contains("namespace") {
        DeployOutcome::AbsorbedConflict {
            error: error.to_string(),
        }
    } else {
        DeployOutcome::Failure {
            error: error.to_string(),
        }
    }
}

/// Pulls the snapshot name out of a release's recorded values: the
/// `database.isolated.snapshot` section must be enabled with a
/// non-empty name. One trailing `.sql` suffix is stripped.
pub fn snapshot_from_values(values: &Value) -> Option<String> {
    let snapshot = values.get("database")?.get("isolated")?.get("snapshot")?;
    if !snapshot
        .get("enabled")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        return None;
    }
    let name = snapshot.get("name").and_then(Value::as_str).unwrap_or("");
    if name.is_empty() {
        return None;
    }
    Some(name.strip_suffix(".sql").unwrap_or(name).to_string())
}
