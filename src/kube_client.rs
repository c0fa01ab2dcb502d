use std::process::Stdio;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::helm_client::{ToolOutput, run_captured};

/// Wrapper around the kubectl control-plane client. One instance lives
/// in the shared state for the whole process.
#[derive(Clone, Debug)]
pub struct KubeClient {
    kubectl_bin: String,
}

impl KubeClient {
    pub fn new(kubectl_bin: impl Into<String>) -> Self {
        Self {
            kubectl_bin: kubectl_bin.into(),
        }
    }

    fn kubectl(&self) -> Command {
        Command::new(&self.kubectl_bin)
    }

    /// Existence probe: any non-zero exit counts as "absent", which is
    /// what deletion polling needs.
    pub async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let mut cmd = self.kubectl();
        cmd.args(["get", "namespace", namespace]);
        let out = run_captured(cmd, "kubectl get namespace").await?;
        Ok(out.success)
    }

    /// Creation timestamp from the namespace metadata; `None` when the
    /// field is empty. Query failures are for the caller to absorb.
    pub async fn namespace_creation_timestamp(&self, namespace: &str) -> Result<Option<String>> {
        self.namespace_jsonpath(namespace, "{.metadata.creationTimestamp}")
            .await
    }

    /// The `version` label a custom-named namespace was stamped with at
    /// deploy time.
    pub async fn namespace_version_label(&self, namespace: &str) -> Result<Option<String>> {
        self.namespace_jsonpath(namespace, "{.metadata.labels.version}")
            .await
    }

    async fn namespace_jsonpath(&self, namespace: &str, path: &str) -> Result<Option<String>> {
        let mut cmd = self.kubectl();
        cmd.args(["get", "namespace", namespace, "-o"])
            .arg(format!("jsonpath={path}"));
        let out = run_captured(cmd, "kubectl get namespace").await?;
        if !out.success {
            bail!("kubectl get namespace failed: {}", out.stderr.trim());
        }
        let value = out.stdout.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    pub async fn delete_namespace(&self, namespace: &str) -> Result<ToolOutput> {
        let mut cmd = self.kubectl();
        cmd.args(["delete", "namespace", namespace]);
        run_captured(cmd, "kubectl delete namespace").await
    }

    pub async fn pods_json(&self, namespace: &str) -> Result<ToolOutput> {
        let mut cmd = self.kubectl();
        cmd.args(["get", "pods", "-n", namespace, "-o", "json"]);
        run_captured(cmd, "kubectl get pods").await
    }

    /// Events sorted by last-observed time, ascending, as the parser
    /// expects.
    pub async fn events_json(&self, namespace: &str) -> Result<ToolOutput> {
        let mut cmd = self.kubectl();
        cmd.args([
            "get",
            "events",
            "-n",
            namespace,
            "--sort-by=.lastTimestamp",
            "-o",
            "json",
        ]);
        run_captured(cmd, "kubectl get events").await
    }

    pub async fn pod_names(&self, namespace: &str) -> Result<Vec<String>> {
        let mut cmd = self.kubectl();
        cmd.args([
            "get",
            "pods",
            "-n",
            namespace,
            "-o",
            "jsonpath={.items[*].metadata.name}",
        ]);
        let out = run_captured(cmd, "kubectl get pods").await?;
        if !out.success {
            bail!("kubectl get pods failed: {}", out.stderr.trim());
        }
        Ok(out
            .stdout
            .split_whitespace()
            .map(|name| name.to_string())
            .collect())
    }

    pub async fn logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail: usize,
    ) -> Result<ToolOutput> {
        let mut cmd = self.kubectl();
        cmd.args(["logs", "-n", namespace, pod])
            .arg(format!("--tail={tail}"));
        if let Some(container) = container {
            cmd.args(["-c", container]);
        }
        run_captured(cmd, "kubectl logs").await
    }

    /// Follows one pod's logs and yields lines as they arrive. The
    /// kubectl child is killed once the receiver goes away.
    pub async fn stream_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail: usize,
        follow: bool,
    ) -> Result<mpsc::Receiver<Result<String, String>>> {
        let mut cmd = self.kubectl();
        cmd.args(["logs", "-n", namespace, pod])
            .arg(format!("--tail={tail}"));
        if follow {
            cmd.arg("-f");
        }
        if let Some(container) = container {
            cmd.args(["-c", container]);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());

        let mut child = cmd.spawn().context("failed to spawn kubectl logs")?;
        let stdout = child
            .stdout
            .take()
            .context("kubectl logs child has no stdout pipe")?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(Ok(line)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        let _ = tx.send(Err(err.to_string())).await;
                        break;
                    }
                }
            }
            let _ = child.kill().await;
        });

        Ok(rx)
    }
}
