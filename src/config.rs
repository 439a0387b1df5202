use std::{net::SocketAddr, path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

const PREFIX: &str = "replicator.homerow.ca";

/// Names shared by every replicated kind: annotation keys read from sources,
/// the finalizer token, and the label stamped on replicas.
///
/// Built once at startup and handed to each controller behind an `Arc`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicationKeys {
    pub enabled_annotation: String,
    pub replicate_to_annotation: String,
    pub replicate_keys_annotation: String,
    pub finalizer: String,
    pub managed_by_label: String,
    pub managed_by_value: String,
}

impl Default for ReplicationKeys {
    fn default() -> Self {
        Self {
            enabled_annotation: format!("{PREFIX}/enabled"),
            replicate_to_annotation: format!("{PREFIX}/replicate-to"),
            replicate_keys_annotation: format!("{PREFIX}/replicate-keys"),
            finalizer: format!("{PREFIX}/finalizer"),
            managed_by_label: "app.kubernetes.io/managed-by".to_owned(),
            managed_by_value: "replicator".to_owned(),
        }
    }
}

impl ReplicationKeys {
    /// Reads a YAML override file. Fields missing from the file keep their defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;

        Self::from_yaml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(raw)?)
    }
}

/// Settings for the surrounding process.
#[derive(Clone, Debug)]
pub struct Settings {
    pub keys: ReplicationKeys,
    pub probe_addr: SocketAddr,
    /// Re-check interval after a successful converge; `None` relies on watches alone.
    pub resync_interval: Option<Duration>,
    pub concurrency: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keys: ReplicationKeys::default(),
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            resync_interval: Some(Duration::from_secs(30)),
            concurrency: 4,
        }
    }
}
