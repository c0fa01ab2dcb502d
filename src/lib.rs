use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod helm_client;
pub mod kube_client;
pub mod listing;
pub mod models;
pub mod status;
pub mod values;

pub use config::Config;
pub use error::Error;
pub use helm_client::HelmClient;
pub use kube_client::KubeClient;

/// Shared per-process state handed to every request handler.
/// Both clients are constructed once at startup and reused for the
/// lifetime of the process.
#[derive(Clone)]
pub struct AppState {
    pub helm: Arc<HelmClient>,
    pub kube: Arc<KubeClient>,
    pub config: Config,
}

/// Namespace, external port and URL derived from a release version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCoordinates {
    pub namespace: String,
    pub port: u32,
    pub url: String,
}

/// Computes the deployment coordinates for a version.
/// A non-empty custom name is used verbatim as the namespace; otherwise
/// the namespace is `n8n-v{major}-{minor}-{patch}`.
///
/// The port formula `30000 + major*100 + minor*10 + patch` keeps every
/// release inside the NodePort range with a distinct port per patch
/// release, as long as minor and patch stay single-digit. Two-digit
/// components collide with neighbouring versions; known limitation of
/// the scheme, kept as-is.
pub fn derive_coordinates(
    version: &str,
    custom_name: Option<&str>,
) -> Result<ReleaseCoordinates, Error> {
    let (major, minor, patch) = parse_version(version)?;

    let namespace = match custom_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("n8n-v{major}-{minor}-{patch}"),
    };

    let port = 30000 + major * 100 + minor * 10 + patch;
    let url = format!("http://localhost:{port}");

    Ok(ReleaseCoordinates {
        namespace,
        port,
        url,
    })
}

fn parse_version(version: &str) -> Result<(u32, u32, u32), Error> {
    let mut parts = version.split('.');
    let parsed = (
        parts.next().and_then(|p| p.parse::<u32>().ok()),
        parts.next().and_then(|p| p.parse::<u32>().ok()),
        parts.next().and_then(|p| p.parse::<u32>().ok()),
    );
    match (parsed, parts.next()) {
        ((Some(major), Some(minor), Some(patch)), None) => Ok((major, minor, patch)),
        _ => Err(Error::InvalidVersion(version.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_namespace_and_port() {
        let coords = derive_coordinates("1.85.0", None).unwrap();
        assert_eq!(coords.namespace, "n8n-v1-85-0");
        assert_eq!(coords.port, 30950);
        assert_eq!(coords.url, "http://localhost:30950");
    }

    #[test]
    fn custom_name_is_used_verbatim() {
        let coords = derive_coordinates("1.2.3", Some("feature-test")).unwrap();
        assert_eq!(coords.namespace, "feature-test");
        // Port still comes from the version, not the name.
        assert_eq!(coords.port, 30123);
    }

    #[test]
    fn empty_custom_name_falls_back_to_derived() {
        let coords = derive_coordinates("1.2.3", Some("")).unwrap();
        assert_eq!(coords.namespace, "n8n-v1-2-3");
    }

    #[test]
    fn ports_are_unique_and_in_range_for_single_digit_components() {
        let mut seen = std::collections::HashSet::new();
        for major in 0..10u32 {
            for minor in 0..10u32 {
                for patch in 0..10u32 {
                    let version = format!("{major}.{minor}.{patch}");
                    let coords = derive_coordinates(&version, None).unwrap();
                    assert!((30000..=30999).contains(&coords.port), "{version}");
                    assert!(seen.insert(coords.port), "duplicate port for {version}");
                }
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", "1", "1.2", "1.2.x", "a.b.c", "1.2.3.4", "1..3"] {
            assert!(
                matches!(derive_coordinates(bad, None), Err(Error::InvalidVersion(_))),
                "expected rejection for {bad:?}"
            );
        }
    }
}
