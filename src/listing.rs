//! Parser for the block-structured output of the list-versions script.
//!
//! The grammar is line-oriented: a `Namespace:` line opens a block, field
//! lines fill it in, and anything with a dash that matches no field prefix
//! is a pod status line. The parser is pure so every transition can be
//! tested without touching the cluster.

use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::types::{DeploymentMode, DeploymentStatus, PodCounts};

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]+-v(\d+)-(\d+)-(\d+)").expect("version pattern"));

/// One deployment block as reported by the listing script, before any
/// per-namespace enrichment (creation timestamp, snapshot, labels).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDeployment {
    pub namespace: String,
    pub mode: Option<DeploymentMode>,
    pub url: Option<String>,
    pub status: DeploymentStatus,
    pub pods: PodCounts,
}

enum Line<'a> {
    BlockStart(&'a str),
    Version,
    Mode(&'a str),
    Access(&'a str),
    PodsHeader,
    Pod(&'a str),
    Skip,
}

fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() || line.contains("===") {
        return Line::Skip;
    }
    if let Some(rest) = line.strip_prefix("Namespace:") {
        return Line::BlockStart(rest.trim());
    }
    if line.starts_with("Version:") {
        // Redundant with the namespace-derived version.
        return Line::Version;
    }
    if let Some(rest) = line.strip_prefix("Mode:") {
        return Line::Mode(rest.trim());
    }
    if let Some(rest) = line.strip_prefix("Access:") {
        return Line::Access(rest.trim());
    }
    if line.starts_with("Pods:") {
        return Line::PodsHeader;
    }
    if line.contains('-') {
        return Line::Pod(line);
    }
    Line::Skip
}

struct BlockBuilder {
    namespace: String,
    mode: Option<DeploymentMode>,
    url: Option<String>,
    running_seen: bool,
    ready: usize,
    total: usize,
}

impl BlockBuilder {
    fn open(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            mode: None,
            url: None,
            running_seen: false,
            ready: 0,
            total: 0,
        }
    }

    fn pod_line(&mut self, line: &str) {
        self.total += 1;
        if line.contains("Running") {
            self.running_seen = true;
            self.ready += 1;
        }
    }

    fn finish(self) -> ListedDeployment {
        let status = if self.running_seen {
            DeploymentStatus::Running
        } else if self.total > 0 {
            DeploymentStatus::Pending
        } else {
            DeploymentStatus::Unknown
        };
        ListedDeployment {
            namespace: self.namespace,
            mode: self.mode,
            url: self.url,
            status,
            pods: PodCounts {
                ready: self.ready,
                total: self.total,
            },
        }
    }
}

pub fn parse_listing(input: &str) -> Vec<ListedDeployment> {
    let mut blocks = Vec::new();
    let mut current: Option<BlockBuilder> = None;

    for raw in input.lines() {
        match classify(raw) {
            Line::BlockStart(namespace) => {
                if let Some(done) = current.take() {
                    blocks.push(done.finish());
                }
                current = Some(BlockBuilder::open(namespace));
            }
            Line::Mode(mode) => {
                if let Some(block) = current.as_mut() {
                    block.mode = DeploymentMode::from_str(mode).ok();
                }
            }
            Line::Access(url) => {
                if let Some(block) = current.as_mut() {
                    block.url = Some(url.to_string());
                }
            }
            Line::Pod(line) => {
                if let Some(block) = current.as_mut() {
                    block.pod_line(line);
                }
            }
            Line::Version | Line::PodsHeader | Line::Skip => {}
        }
    }

    if let Some(done) = current {
        blocks.push(done.finish());
    }
    blocks
}

/// Recovers `major.minor.patch` from a derived namespace such as
/// `n8n-v1-85-0`. Namespaces that do not match are custom names; their
/// version lives in a namespace label instead.
pub fn extract_version(namespace: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(namespace)
        .map(|caps| format!("{}.{}.{}", &caps[1], &caps[2], &caps[3]))
}
