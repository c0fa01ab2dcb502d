//! Serde shapes for the slices of `kubectl ... -o json` output this
//! service reads. Only the fields we consume are modelled; everything
//! else in the payloads is ignored.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<PodItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PodItem {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<PodStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<RawContainerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawContainerStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub restart_count: i64,
    #[serde(default)]
    pub state: Option<RawContainerState>,
}

/// At most one of the three keys is populated by the cluster, but the
/// classification still applies a fixed priority in case several appear.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContainerState {
    #[serde(default)]
    pub running: Option<serde_json::Value>,
    #[serde(default)]
    pub waiting: Option<RawStateDetail>,
    #[serde(default)]
    pub terminated: Option<RawStateDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawStateDetail {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub items: Vec<EventItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub last_timestamp: Option<String>,
    #[serde(default)]
    pub event_time: Option<String>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub involved_object: InvolvedObject,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvolvedObject {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}
