//! Helm values composition: a partial, nested request model is folded
//! into a single values mapping, then an optional raw YAML override is
//! deep-merged on top.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmValues {
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub n8n_config: Option<N8nConfig>,
    pub resources: Option<ResourcesConfig>,
    pub replicas: Option<ReplicasConfig>,
    pub service: Option<ServiceConfig>,
    pub extra_env: Option<BTreeMap<String, String>>,
    pub raw_yaml: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub isolated: Option<DatabaseIsolated>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseIsolated {
    pub image: Option<String>,
    pub storage: Option<DatabaseIsolatedStorage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseIsolatedStorage {
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N8nConfig {
    pub encryption_key: Option<String>,
    pub timezone: Option<String>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesConfig {
    pub main: Option<ResourceSpec>,
    pub worker: Option<ResourceSpec>,
    pub webhook: Option<ResourceSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub requests: Option<ResourceAmounts>,
    pub limits: Option<ResourceAmounts>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceAmounts {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicasConfig {
    pub workers: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(rename = "type")]
    pub service_type: Option<String>,
}

/// Builds the final values mapping. Absent leaves are omitted entirely
/// so the chart's own defaults apply; groups that end up empty are
/// dropped as well. The raw YAML override is merged last and wins on
/// conflicts. The output map is ordered, so identical input always
/// serializes identically.
pub fn compose(values: &HelmValues) -> Map<String, Value> {
    let mut out = Map::new();

    if let Some(database) = &values.database {
        let mut isolated = Map::new();
        if let Some(iso) = &database.isolated {
            if let Some(image) = non_empty(&iso.image) {
                isolated.insert("image".to_string(), json!(image));
            }
            if let Some(storage) = &iso.storage
                && let Some(size) = non_empty(&storage.size)
            {
                isolated.insert("storage".to_string(), json!({ "size": size }));
            }
        }
        if !isolated.is_empty() {
            out.insert("database".to_string(), json!({ "isolated": isolated }));
        }
    }

    if let Some(redis) = &values.redis {
        let mut section = Map::new();
        if let Some(host) = non_empty(&redis.host) {
            section.insert("host".to_string(), json!(host));
        }
        if let Some(port) = redis.port {
            section.insert("port".to_string(), json!(port));
        }
        if !section.is_empty() {
            out.insert("redis".to_string(), Value::Object(section));
        }
    }

    if let Some(n8n) = &values.n8n_config {
        let mut section = Map::new();
        if let Some(key) = non_empty(&n8n.encryption_key) {
            section.insert("encryptionKey".to_string(), json!(key));
        }
        if let Some(tz) = non_empty(&n8n.timezone) {
            section.insert("timezone".to_string(), json!(tz));
        }
        if let Some(url) = non_empty(&n8n.webhook_url) {
            section.insert("webhookUrl".to_string(), json!(url));
        }
        if !section.is_empty() {
            out.insert("n8nConfig".to_string(), Value::Object(section));
        }
    }

    if let Some(resources) = &values.resources {
        let mut section = Map::new();
        let roles = [
            ("main", &resources.main),
            ("worker", &resources.worker),
            ("webhook", &resources.webhook),
        ];
        for (role, spec) in roles {
            if let Some(spec) = spec {
                let mut per_role = Map::new();
                if let Some(requests) = spec.requests.as_ref().and_then(compose_amounts) {
                    per_role.insert("requests".to_string(), requests);
                }
                if let Some(limits) = spec.limits.as_ref().and_then(compose_amounts) {
                    per_role.insert("limits".to_string(), limits);
                }
                if !per_role.is_empty() {
                    section.insert(role.to_string(), Value::Object(per_role));
                }
            }
        }
        if !section.is_empty() {
            out.insert("resources".to_string(), Value::Object(section));
        }
    }

    if let Some(replicas) = &values.replicas
        && let Some(workers) = replicas.workers
    {
        out.insert("replicas".to_string(), json!({ "workers": workers }));
    }

    if let Some(service) = &values.service
        && let Some(service_type) = non_empty(&service.service_type)
    {
        out.insert("service".to_string(), json!({ "type": service_type }));
    }

    if let Some(extra_env) = &values.extra_env
        && !extra_env.is_empty()
    {
        out.insert("extraEnv".to_string(), json!(extra_env));
    }

    if let Some(raw) = non_empty(&values.raw_yaml) {
        apply_raw_override(&mut out, raw);
    }

    out
}

fn compose_amounts(amounts: &ResourceAmounts) -> Option<Value> {
    let mut section = Map::new();
    if let Some(cpu) = non_empty(&amounts.cpu) {
        section.insert("cpu".to_string(), json!(cpu));
    }
    if let Some(memory) = non_empty(&amounts.memory) {
        section.insert("memory".to_string(), json!(memory));
    }
    if section.is_empty() {
        None
    } else {
        Some(Value::Object(section))
    }
}

/// Parses the raw override as YAML and merges it over the structured
/// result. Anything that fails to parse, or parses to a non-mapping,
/// is dropped: a bad override must never fail the create operation.
fn apply_raw_override(out: &mut Map<String, Value>, raw: &str) {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Object(overlay)) => {
            let mut base = Value::Object(std::mem::take(out));
            deep_merge(&mut base, &Value::Object(overlay));
            if let Value::Object(merged) = base {
                *out = merged;
            }
        }
        Ok(other) => {
            tracing::debug!(kind = ?other, "raw values override is not a mapping, ignoring");
        }
        Err(err) => {
            tracing::warn!(error = %err, "raw values override is invalid YAML, ignoring");
        }
    }
}

/// Recursive merge with override precedence: mappings merge key-wise,
/// everything else is replaced by the overlay value.
fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}
