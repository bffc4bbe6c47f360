use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cri_api::SandboxState;
use cri_crictl::CrictlConfig;
use serde::{Deserialize, Serialize};

use crate::enumerator::{SandboxQuery, Selection};
use crate::error::{CollectorError, CollectorResult};

pub(crate) const DEFAULT_BASE_DIR: &str = "/var/lib/pod-usage";
pub(crate) const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub(crate) const DEFAULT_COMPACT_INTERVAL_SECS: u64 = usage_store::DEFAULT_COMPACT_INTERVAL.as_secs();
pub(crate) const DEFAULT_RUNTIME_TIMEOUT_SECS: u64 = 3;

/// On-disk (YAML) configuration. Every field has a default.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub compact_interval_secs: u64,
    pub runtime: RuntimeSection,
    pub filter: FilterSection,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            compact_interval_secs: DEFAULT_COMPACT_INTERVAL_SECS,
            runtime: RuntimeSection::default(),
            filter: FilterSection::default(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub endpoint: Option<String>,
    pub crictl: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            crictl: None,
            timeout_secs: DEFAULT_RUNTIME_TIMEOUT_SECS,
        }
    }
}

impl RuntimeSection {
    pub fn crictl_config(&self) -> CrictlConfig {
        CrictlConfig {
            binary: self.crictl.clone(),
            runtime_endpoint: self.endpoint.clone().filter(|e| !e.is_empty()),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    pub id: Option<String>,
    /// `ready` or `notready`.
    pub state: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Regular expression matched against the pod name.
    pub name: Option<String>,
    /// Regular expression matched against the pod namespace.
    pub namespace: Option<String>,
    pub latest: bool,
    /// Keep only the `last` most recently created sandboxes. 0 = unlimited.
    pub last: usize,
}

impl FilterSection {
    /// Build the enumeration query. An unrecognised state is a config error.
    pub fn to_query(&self) -> CollectorResult<SandboxQuery> {
        let state = match self.state.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                s.parse::<SandboxState>()
                    .map_err(|e| CollectorError::Config(format!("filter.state: {e}")))?,
            ),
            None => None,
        };
        Ok(SandboxQuery {
            id: self.id.clone().filter(|id| !id.is_empty()),
            state,
            labels: self.labels.clone(),
            name_pattern: self.name.clone().filter(|p| !p.is_empty()),
            namespace_pattern: self.namespace.clone().filter(|p| !p.is_empty()),
            selection: Selection::from_flags(self.latest, self.last),
        })
    }
}

/// Validated, immutable daemon configuration handed to constructors.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub base_dir: PathBuf,
    pub poll_interval: Duration,
    pub compact_interval: Duration,
    pub crictl: CrictlConfig,
    pub query: SandboxQuery,
}

impl FileConfig {
    pub fn validate(&self) -> CollectorResult<CollectorConfig> {
        if self.poll_interval_secs == 0 {
            return Err(CollectorError::Config(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }
        if self.compact_interval_secs == 0 {
            return Err(CollectorError::Config(
                "compact_interval_secs must be greater than 0".into(),
            ));
        }
        if self.base_dir.as_os_str().is_empty() {
            return Err(CollectorError::Config("base_dir must not be empty".into()));
        }
        Ok(CollectorConfig {
            base_dir: self.base_dir.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            compact_interval: Duration::from_secs(self.compact_interval_secs),
            crictl: self.runtime.crictl_config(),
            query: self.filter.to_query()?,
        })
    }

    /// Resolve relative paths against `config_dir` (the directory containing the YAML file).
    fn resolve_relative_paths(&mut self, config_dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = config_dir.join(&*p);
            }
        };
        resolve(&mut self.base_dir);
        if let Some(crictl) = &mut self.runtime.crictl {
            resolve(crictl);
        }
    }
}

/// Load a collector config from a YAML file.
///
/// Relative paths in the config are resolved against the config file's parent directory.
pub async fn load(path: &Path) -> CollectorResult<FileConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CollectorError::Config(format!("read {}: {e}", path.display())))?;
    let mut config: FileConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| CollectorError::Config(format!("parse {}: {e}", path.display())))?;
    if let Some(config_dir) = path.parent() {
        config.resolve_relative_paths(config_dir);
    }
    Ok(config)
}

/// Parse `key=value` label selectors.
///
/// Each entry may hold several comma-separated pairs (`a=b,c=d`). Empty
/// entries are ignored; anything that is not exactly one `=` is an error.
pub fn parse_label_pairs(entries: &[String]) -> CollectorResult<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for pair in entries
        .iter()
        .flat_map(|e| e.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let mut parts = pair.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.is_empty() => {
                labels.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(CollectorError::Config(format!(
                    "incorrectly specified label: {pair}"
                )));
            }
        }
    }
    Ok(labels)
}
