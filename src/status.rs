//! Normalizes raw kubectl JSON into the pod and event records served by
//! the API. Decode failures are absorbed into empty results here; the
//! caller cannot tell "no items" from "unparseable payload", which is
//! the documented contract for this layer.

use crate::api::types::{
    ContainerRecord, ContainerState, EventObjectRef, EventRecord, PodPhase, PodRecord,
};
use crate::models::kube::{EventList, PodList, RawContainerStatus};

pub fn parse_pods(raw: &str) -> Vec<PodRecord> {
    let list: PodList = match serde_json::from_str(raw) {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(error = %err, "failed to decode pod listing, returning no pods");
            return Vec::new();
        }
    };

    list.items
        .into_iter()
        .map(|item| {
            let status = item.status.unwrap_or_default();
            PodRecord {
                name: item.metadata.name,
                phase: parse_phase(status.phase.as_deref()),
                created_at: item.metadata.creation_timestamp,
                containers: status
                    .container_statuses
                    .iter()
                    .map(classify_container)
                    .collect(),
            }
        })
        .collect()
}

pub fn parse_events(raw: &str, limit: usize) -> Vec<EventRecord> {
    let list: EventList = match serde_json::from_str(raw) {
        Ok(list) => list,
        Err(err) => {
            tracing::warn!(error = %err, "failed to decode event listing, returning no events");
            return Vec::new();
        }
    };

    // The inspection command already sorts by last-observed time; keep
    // that order and only truncate.
    list.items
        .into_iter()
        .take(limit)
        .map(|item| EventRecord {
            event_type: item.event_type,
            reason: item.reason,
            message: item.message,
            timestamp: item.last_timestamp.or(item.event_time),
            count: item.count.unwrap_or(1),
            object: EventObjectRef {
                kind: item.involved_object.kind,
                name: item.involved_object.name,
            },
        })
        .collect()
}

fn parse_phase(phase: Option<&str>) -> PodPhase {
    match phase {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    }
}

/// Classifies a container status with fixed priority running > waiting >
/// terminated; the reason is captured for waiting and terminated only.
fn classify_container(raw: &RawContainerStatus) -> ContainerRecord {
    let (state, state_detail) = match raw.state.as_ref() {
        Some(state) if state.running.is_some() => (ContainerState::Running, None),
        Some(state) if state.waiting.is_some() => (
            ContainerState::Waiting,
            state.waiting.as_ref().and_then(|w| w.reason.clone()),
        ),
        Some(state) if state.terminated.is_some() => (
            ContainerState::Terminated,
            state.terminated.as_ref().and_then(|t| t.reason.clone()),
        ),
        _ => (ContainerState::Unknown, None),
    };

    ContainerRecord {
        name: raw.name.clone(),
        ready: raw.ready,
        state,
        state_detail,
        restart_count: raw.restart_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_payload(container_state: serde_json::Value) -> String {
        json!({
            "items": [{
                "metadata": { "name": "n8n-main-0", "creationTimestamp": "2025-01-01T00:00:00Z" },
                "status": {
                    "phase": "Running",
                    "containerStatuses": [{
                        "name": "n8n",
                        "ready": false,
                        "restartCount": 3,
                        "state": container_state
                    }]
                }
            }]
        })
        .to_string()
    }

    #[test]
    fn waiting_reason_becomes_state_detail() {
        let pods = parse_pods(&pod_payload(json!({
            "waiting": { "reason": "ImagePullBackOff" }
        })));
        let container = &pods[0].containers[0];
        assert_eq!(container.state, ContainerState::Waiting);
        assert_eq!(container.state_detail.as_deref(), Some("ImagePullBackOff"));
        assert_eq!(container.restart_count, 3);
        assert!(!container.ready);
    }

    #[test]
    fn running_takes_priority_and_has_no_detail() {
        let pods = parse_pods(&pod_payload(json!({
            "running": { "startedAt": "2025-01-01T00:00:00Z" },
            "waiting": { "reason": "ShouldNotWin" }
        })));
        let container = &pods[0].containers[0];
        assert_eq!(container.state, ContainerState::Running);
        assert_eq!(container.state_detail, None);
    }

    #[test]
    fn terminated_reason_is_captured() {
        let pods = parse_pods(&pod_payload(json!({
            "terminated": { "reason": "OOMKilled" }
        })));
        let container = &pods[0].containers[0];
        assert_eq!(container.state, ContainerState::Terminated);
        assert_eq!(container.state_detail.as_deref(), Some("OOMKilled"));
    }

    #[test]
    fn missing_state_is_unknown_without_detail() {
        let pods = parse_pods(&pod_payload(json!({})));
        let container = &pods[0].containers[0];
        assert_eq!(container.state, ContainerState::Unknown);
        assert_eq!(container.state_detail, None);
    }

    #[test]
    fn pod_phase_maps_with_unknown_fallback() {
        assert_eq!(parse_phase(Some("Succeeded")), PodPhase::Succeeded);
        assert_eq!(parse_phase(Some("Evicted")), PodPhase::Unknown);
        assert_eq!(parse_phase(None), PodPhase::Unknown);
    }

    #[test]
    fn malformed_pod_json_yields_empty() {
        assert!(parse_pods("not json").is_empty());
        assert!(parse_pods("").is_empty());
    }

    fn event_payload() -> String {
        json!({
            "items": [
                {
                    "type": "Warning",
                    "reason": "FailedScheduling",
                    "message": "0/3 nodes available",
                    "lastTimestamp": "2025-01-01T00:10:00Z",
                    "eventTime": "2025-01-01T00:05:00Z",
                    "count": 4,
                    "involvedObject": { "kind": "Pod", "name": "n8n-main-0" }
                },
                {
                    "type": "Normal",
                    "reason": "Scheduled",
                    "message": "assigned",
                    "eventTime": "2025-01-01T00:06:00Z",
                    "involvedObject": { "kind": "Pod", "name": "n8n-main-0" }
                },
                {
                    "type": "Normal",
                    "reason": "Pulled",
                    "message": "image pulled",
                    "lastTimestamp": "2025-01-01T00:07:00Z",
                    "involvedObject": { "kind": "Pod", "name": "n8n-worker-0" }
                }
            ]
        })
        .to_string()
    }

    #[test]
    fn events_prefer_last_timestamp_and_default_count() {
        let events = parse_events(&event_payload(), 50);
        assert_eq!(events.len(), 3);

        assert_eq!(
            events[0].timestamp.as_deref(),
            Some("2025-01-01T00:10:00Z"),
            "lastTimestamp wins when both are present"
        );
        assert_eq!(events[0].count, 4);
        assert_eq!(events[0].object.kind.as_deref(), Some("Pod"));

        assert_eq!(
            events[1].timestamp.as_deref(),
            Some("2025-01-01T00:06:00Z"),
            "eventTime is the fallback"
        );
        assert_eq!(events[1].count, 1);
    }

    #[test]
    fn events_are_truncated_in_given_order() {
        let events = parse_events(&event_payload(), 2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason.as_deref(), Some("FailedScheduling"));
        assert_eq!(events[1].reason.as_deref(), Some("Scheduled"));
    }

    #[test]
    fn malformed_event_json_yields_empty() {
        assert!(parse_events("{", 50).is_empty());
    }
}
