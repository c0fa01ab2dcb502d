use anyhow::Context;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Error;
use crate::helm_client::{
    DeployOutcome, HelmClient, ToolOutput, classify_deploy, snapshot_from_values,
};
use crate::kube_client::KubeClient;
use crate::listing::{ListedDeployment, extract_version, parse_listing};
use crate::status::{parse_events, parse_pods};
use crate::values::compose;
use crate::{AppState, ReleaseCoordinates, derive_coordinates};

use super::types::*;

#[derive(Deserialize)]
pub struct EventParams {
    #[serde(default = "default_event_limit")]
    pub limit: usize,
}

fn default_event_limit() -> usize {
    50
}

#[derive(Deserialize)]
pub struct LogParams {
    pub pod: Option<String>,
    pub container: Option<String>,
    #[serde(default = "default_tail")]
    pub tail: usize,
}

#[derive(Deserialize)]
pub struct LogStreamParams {
    pub pod: String,
    pub container: Option<String>,
    #[serde(default = "default_tail")]
    pub tail: usize,
    #[serde(default = "default_follow")]
    pub follow: bool,
}

fn default_tail() -> usize {
    100
}

fn default_follow() -> bool {
    true
}

/// GET /api/versions - list all deployed versions.
pub async fn list_versions(
    State(state): State<AppState>,
) -> Result<Json<VersionListResponse>, Error> {
    Ok(Json(list_impl(&state.helm, &state.kube).await?))
}

/// POST /api/versions - deploy a new version.
pub async fn deploy_version(
    State(state): State<AppState>,
    Json(body): Json<DeployRequest>,
) -> Result<Json<DeployResponse>, Error> {
    Ok(Json(deploy_impl(&state.helm, body).await?))
}

/// DELETE /api/versions/{namespace} - tear an environment down.
pub async fn remove_version(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<RemoveResponse>, Error> {
    Ok(Json(
        remove_impl(&state.helm, &state.kube, &namespace).await?,
    ))
}

/// GET /api/versions/{namespace}/status - existence check, used by the
/// UI to poll deletions.
pub async fn namespace_status(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<NamespaceStatusResponse>, Error> {
    let exists = state
        .kube
        .namespace_exists(&namespace)
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;
    Ok(Json(NamespaceStatusResponse { exists, namespace }))
}

/// GET /api/versions/{namespace}/events - cluster events for a namespace.
pub async fn namespace_events(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(params): Query<EventParams>,
) -> Result<Json<EventsResponse>, Error> {
    let out = state
        .kube
        .events_json(&namespace)
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;
    if !out.success {
        return Err(Error::Tool(format!(
            "Failed to get events: {}",
            out.stderr.trim()
        )));
    }
    Ok(Json(EventsResponse {
        events: parse_events(&out.stdout, params.limit),
    }))
}

/// GET /api/versions/{namespace}/pods - detailed pod status.
pub async fn namespace_pods(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<PodsResponse>, Error> {
    let out = state
        .kube
        .pods_json(&namespace)
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;
    if !out.success {
        return Err(Error::Tool(format!(
            "Failed to get pods: {}",
            out.stderr.trim()
        )));
    }
    Ok(Json(PodsResponse {
        pods: parse_pods(&out.stdout),
    }))
}

/// GET /api/versions/{namespace}/logs - log tails per pod.
pub async fn namespace_logs(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(params): Query<LogParams>,
) -> Result<Json<LogsResponse>, Error> {
    Ok(Json(logs_impl(&state.kube, &namespace, params).await?))
}

/// GET /api/versions/{namespace}/logs/stream - follow one pod's logs
/// via SSE.
pub async fn stream_pod_logs(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(params): Query<LogStreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, String>>>, Error> {
    let exists = state
        .kube
        .namespace_exists(&namespace)
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;
    if !exists {
        return Err(Error::NotFound(format!("Namespace {namespace}")));
    }

    tracing::info!(
        namespace,
        pod = %params.pod,
        tail = params.tail,
        follow = params.follow,
        "streaming pod logs"
    );

    let receiver = state
        .kube
        .stream_logs(
            &namespace,
            &params.pod,
            params.container.as_deref(),
            params.tail,
            params.follow,
        )
        .await
        .map_err(|err| Error::Tool(format!("Failed to stream logs: {err}")))?;

    let stream =
        ReceiverStream::new(receiver).map(|line| line.map(|text| Event::default().data(text)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_impl(helm: &HelmClient, kube: &KubeClient) -> Result<VersionListResponse, Error> {
    let out = helm
        .list_versions()
        .await
        .map_err(|err| Error::Tool(format!("Failed to list versions: {err}")))?;
    if !out.success {
        return Err(Error::Tool(format!(
            "Failed to list versions: {}",
            out.stderr.trim()
        )));
    }

    let mut versions = Vec::new();
    for block in parse_listing(&out.stdout) {
        versions.push(enrich_block(helm, kube, block).await);
    }
    Ok(VersionListResponse { versions })
}

/// Fills in the fields the listing script does not carry: the version
/// (from the namespace or its label), the creation timestamp and the
/// snapshot name. Lookup failures are logged here and degrade to absent
/// values; a half-broken namespace still shows up in the listing.
async fn enrich_block(
    helm: &HelmClient,
    kube: &KubeClient,
    block: ListedDeployment,
) -> DeploymentRecord {
    let (version, custom_name) = match extract_version(&block.namespace) {
        Some(version) => (version, None),
        None => {
            let label = kube
                .namespace_version_label(&block.namespace)
                .await
                .unwrap_or_else(|err| {
                    tracing::warn!(namespace = %block.namespace, error = %err, "version label lookup failed");
                    None
                });
            (
                label.unwrap_or_else(|| "unknown".to_string()),
                Some(block.namespace.clone()),
            )
        }
    };

    let created_at = kube
        .namespace_creation_timestamp(&block.namespace)
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(namespace = %block.namespace, error = %err, "creation timestamp lookup failed");
            None
        });

    let snapshot = match helm.get_values(&block.namespace).await {
        Ok(values) => snapshot_from_values(&values),
        Err(err) => {
            tracing::debug!(namespace = %block.namespace, error = %err, "values lookup failed, reporting no snapshot");
            None
        }
    };

    DeploymentRecord {
        version,
        namespace: block.namespace,
        custom_name,
        mode: block.mode,
        status: block.status,
        url: block.url,
        isolated_db: true,
        snapshot,
        created_at,
        pods: block.pods,
    }
}

async fn deploy_impl(helm: &HelmClient, request: DeployRequest) -> Result<DeployResponse, Error> {
    // Reject bad versions before anything touches the cluster.
    let coords = derive_coordinates(&request.version, request.name.as_deref())?;

    let composed = request
        .helm_values
        .as_ref()
        .map(compose)
        .filter(|map| !map.is_empty());
    let values_file = match &composed {
        Some(map) => Some(
            write_values_file(map).map_err(|err| Error::Tool(format!("{err:#}")))?,
        ),
        None => None,
    };

    let out = helm
        .deploy_version(
            &request.version,
            request.mode,
            request.name.as_deref(),
            request.snapshot.as_deref(),
            values_file.as_ref().map(|file| file.path()),
        )
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;

    // The values artifact only lives for the invocation itself; drop
    // removes it on this path, and unwinding covers the earlier ones.
    drop(values_file);

    match classify_deploy(&out) {
        DeployOutcome::Success => Ok(success_response(coords, out.stdout)),
        DeployOutcome::AbsorbedConflict { error } => {
            tracing::warn!(
                error = %error,
                "packaging tool reported a namespace conflict; deployment likely succeeded"
            );
            Ok(success_response(coords, out.stdout))
        }
        DeployOutcome::Failure { error } => Ok(DeployResponse {
            success: false,
            message: "Deployment failed".to_string(),
            namespace: None,
            url: None,
            error: Some(error),
            output: out.stdout,
        }),
    }
}

fn success_response(coords: ReleaseCoordinates, output: String) -> DeployResponse {
    DeployResponse {
        success: true,
        message: "Deployment initiated".to_string(),
        namespace: Some(coords.namespace),
        url: Some(coords.url),
        error: None,
        output,
    }
}

fn write_values_file(values: &serde_json::Map<String, Value>) -> anyhow::Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("helm-values-")
        .suffix(".yaml")
        .tempfile()
        .context("failed to create values file")?;
    let yaml = serde_yaml::to_string(&Value::Object(values.clone()))
        .context("failed to serialize values")?;
    std::fs::write(file.path(), yaml).context("failed to write values file")?;
    Ok(file)
}

async fn remove_impl(
    helm: &HelmClient,
    kube: &KubeClient,
    namespace: &str,
) -> Result<RemoveResponse, Error> {
    let exists = kube
        .namespace_exists(namespace)
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;
    if !exists {
        return Ok(RemoveResponse {
            success: false,
            message: "Namespace not found".to_string(),
            error: Some(format!("Namespace {namespace} does not exist")),
            output: None,
        });
    }

    // Best effort; a failed uninstall must not block the namespace delete.
    match helm.uninstall(namespace).await {
        Ok(out) if !out.success => {
            tracing::debug!(
                namespace,
                stderr = %out.stderr.trim(),
                "helm uninstall failed, continuing with namespace delete"
            );
        }
        Err(err) => {
            tracing::warn!(namespace, error = %err, "helm uninstall could not run, continuing with namespace delete");
        }
        Ok(_) => {}
    }

    let out = kube
        .delete_namespace(namespace)
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;
    if !out.success {
        return Ok(RemoveResponse {
            success: false,
            message: "Removal failed".to_string(),
            error: Some(out.stderr),
            output: Some(out.stdout),
        });
    }
    Ok(RemoveResponse {
        success: true,
        message: format!("Namespace {namespace} removed"),
        error: None,
        output: Some(out.stdout),
    })
}

async fn logs_impl(
    kube: &KubeClient,
    namespace: &str,
    params: LogParams,
) -> Result<LogsResponse, Error> {
    if let Some(pod) = &params.pod {
        let out = kube
            .logs(namespace, pod, params.container.as_deref(), params.tail)
            .await
            .map_err(|err| Error::Tool(err.to_string()))?;
        return Ok(LogsResponse {
            logs: vec![log_entry(pod.clone(), params.container.clone(), out)],
        });
    }

    let names = kube
        .pod_names(namespace)
        .await
        .map_err(|err| Error::Tool(err.to_string()))?;

    let mut logs = Vec::new();
    for pod in names {
        let out = kube
            .logs(namespace, &pod, params.container.as_deref(), params.tail)
            .await
            .map_err(|err| Error::Tool(err.to_string()))?;
        logs.push(log_entry(pod, params.container.clone(), out));
    }
    Ok(LogsResponse { logs })
}

fn log_entry(pod: String, container: Option<String>, out: ToolOutput) -> PodLogEntry {
    PodLogEntry {
        pod,
        container,
        logs: out.stdout,
        error: (!out.success).then_some(out.stderr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn stub_bin(dir: &std::path::Path, name: &str, script: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path.display().to_string()
    }

    fn deploy_request(version: &str) -> DeployRequest {
        DeployRequest {
            version: version.to_string(),
            mode: DeploymentMode::Queue,
            name: None,
            snapshot: None,
            helm_values: None,
        }
    }

    #[tokio::test]
    async fn remove_on_missing_namespace_skips_uninstall() {
        let dir = TempDir::new().unwrap();
        let kubectl = stub_bin(dir.path(), "kubectl", "#!/bin/sh\nexit 1\n");
        let marker = dir.path().join("helm-invoked");
        let helm_bin = stub_bin(
            dir.path(),
            "helm",
            &format!("#!/bin/sh\ntouch {}\nexit 0\n", marker.display()),
        );

        let helm = HelmClient::new(helm_bin, dir.path(), dir.path());
        let kube = KubeClient::new(kubectl);

        let response = remove_impl(&helm, &kube, "ghost").await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message, "Namespace not found");
        assert_eq!(
            response.error.as_deref(),
            Some("Namespace ghost does not exist")
        );
        assert!(!marker.exists(), "uninstall must not run for a missing namespace");
    }

    #[tokio::test]
    async fn deploy_success_reports_derived_coordinates() {
        let dir = TempDir::new().unwrap();
        stub_bin(
            dir.path(),
            "deploy-version.sh",
            "#!/bin/sh\necho 'release deployed'\nexit 0\n",
        );
        let helm = HelmClient::new("helm", dir.path(), dir.path());

        let response = deploy_impl(&helm, deploy_request("1.2.3")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message, "Deployment initiated");
        assert_eq!(response.namespace.as_deref(), Some("n8n-v1-2-3"));
        assert_eq!(response.url.as_deref(), Some("http://localhost:30123"));
        assert!(response.output.contains("release deployed"));
    }

    #[tokio::test]
    async fn absorbed_conflict_is_reported_as_success() {
        let dir = TempDir::new().unwrap();
        stub_bin(
            dir.path(),
            "deploy-version.sh",
            "#!/bin/sh\necho 'Error: namespaces \"foo\" already exists' >&2\nexit 1\n",
        );
        let helm = HelmClient::new("helm", dir.path(), dir.path());

        let response = deploy_impl(&helm, deploy_request("1.2.3")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.namespace.as_deref(), Some("n8n-v1-2-3"));
    }

    #[tokio::test]
    async fn genuine_failure_surfaces_the_error_text() {
        let dir = TempDir::new().unwrap();
        stub_bin(
            dir.path(),
            "deploy-version.sh",
            "#!/bin/sh\necho 'Error: insufficient quota' >&2\nexit 1\n",
        );
        let helm = HelmClient::new("helm", dir.path(), dir.path());

        let response = deploy_impl(&helm, deploy_request("1.2.3")).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message, "Deployment failed");
        assert_eq!(response.error.as_deref(), Some("Error: insufficient quota"));
    }

    #[tokio::test]
    async fn invalid_version_is_rejected_before_any_invocation() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("deploy-invoked");
        stub_bin(
            dir.path(),
            "deploy-version.sh",
            &format!("#!/bin/sh\ntouch {}\nexit 0\n", marker.display()),
        );
        let helm = HelmClient::new("helm", dir.path(), dir.path());

        let err = deploy_impl(&helm, deploy_request("not-a-version"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidVersion(_)));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn values_file_reaches_the_tool_and_is_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let captured = dir.path().join("captured-values.yaml");
        let recorded = dir.path().join("values-path.txt");
        let script = format!(
            "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--values-file\" ]; then\n    cp \"$2\" {captured}\n    echo \"$2\" > {recorded}\n  fi\n  shift\ndone\nexit 0\n",
            captured = captured.display(),
            recorded = recorded.display(),
        );
        stub_bin(dir.path(), "deploy-version.sh", &script);
        let helm = HelmClient::new("helm", dir.path(), dir.path());

        let mut request = deploy_request("1.2.3");
        request.helm_values = Some(crate::values::HelmValues {
            redis: Some(crate::values::RedisConfig {
                host: Some("redis.shared".to_string()),
                port: None,
            }),
            ..Default::default()
        });

        let response = deploy_impl(&helm, request).await.unwrap();
        assert!(response.success);

        let yaml = fs::read_to_string(&captured).unwrap();
        assert!(yaml.contains("redis.shared"), "values file content: {yaml}");

        let path = fs::read_to_string(&recorded).unwrap();
        assert!(
            !std::path::Path::new(path.trim()).exists(),
            "values artifact must be removed after the invocation"
        );
    }

    #[tokio::test]
    async fn list_enrichment_absorbs_lookup_failures() {
        let dir = TempDir::new().unwrap();
        stub_bin(
            dir.path(),
            "list-versions.sh",
            "#!/bin/sh\necho 'Namespace: custom-env'\necho 'Mode: queue'\necho 'Pods:'\necho 'custom-main-0 - Running'\nexit 0\n",
        );
        let helm_bin = stub_bin(dir.path(), "helm", "#!/bin/sh\nexit 1\n");
        let kubectl = stub_bin(dir.path(), "kubectl", "#!/bin/sh\nexit 1\n");

        let helm = HelmClient::new(helm_bin, dir.path(), dir.path());
        let kube = KubeClient::new(kubectl);

        let response = list_impl(&helm, &kube).await.unwrap();
        assert_eq!(response.versions.len(), 1);

        let record = &response.versions[0];
        assert_eq!(record.namespace, "custom-env");
        assert_eq!(record.custom_name.as_deref(), Some("custom-env"));
        assert_eq!(record.version, "unknown");
        assert_eq!(record.status, DeploymentStatus::Running);
        assert_eq!(record.pods, PodCounts { ready: 1, total: 1 });
        assert_eq!(record.created_at, None);
        assert_eq!(record.snapshot, None);
        assert!(record.isolated_db);
    }

    #[tokio::test]
    async fn list_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        stub_bin(
            dir.path(),
            "list-versions.sh",
            "#!/bin/sh\necho 'cluster unreachable' >&2\nexit 1\n",
        );
        let helm = HelmClient::new("helm", dir.path(), dir.path());
        let kube = KubeClient::new("kubectl");

        let err = list_impl(&helm, &kube).await.unwrap_err();
        assert!(matches!(err, Error::Tool(_)));
        assert!(err.to_string().contains("cluster unreachable"));
    }
}
