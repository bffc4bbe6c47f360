//! JSON shapes emitted by `crictl ... -o json` and their conversion into
//! [`cri_api`] types.
//!
//! crictl prints protobuf messages as JSON, so 64-bit integers may arrive
//! either as numbers or as decimal strings, and zero-valued fields may be
//! omitted entirely.

use std::collections::BTreeMap;

use cri_api::{
    CpuUsage, LinuxPodSandboxStats, MemoryUsage, PodSandboxStats, RuntimeError, RuntimeVersion,
    SandboxDescriptor, SandboxState,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum ProtoInt {
    Num(i64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProtoUint {
    Num(u64),
    Text(String),
}

fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Option::<ProtoInt>::deserialize(d)? {
        None => Ok(0),
        Some(ProtoInt::Num(n)) => Ok(n),
        Some(ProtoInt::Text(s)) => s.parse().map_err(D::Error::custom),
    }
}

fn de_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Option::<ProtoUint>::deserialize(d)? {
        None => Ok(0),
        Some(ProtoUint::Num(n)) => Ok(n),
        Some(ProtoUint::Text(s)) => s.parse().map_err(D::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// pods
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Default, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    uid: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    attempt: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pod {
    id: String,
    #[serde(default)]
    metadata: Option<Metadata>,
    /// Omitted when it is the zero value, `SANDBOX_READY`.
    #[serde(default)]
    state: Option<SandboxState>,
    #[serde(default, deserialize_with = "de_i64")]
    created_at: i64,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

impl From<Pod> for SandboxDescriptor {
    fn from(pod: Pod) -> Self {
        let metadata = pod.metadata.unwrap_or_default();
        Self {
            id: pod.id,
            uid: metadata.uid,
            name: metadata.name,
            namespace: metadata.namespace,
            attempt: metadata.attempt,
            state: pod.state.unwrap_or(SandboxState::Ready),
            created_at: pod.created_at,
            labels: pod.labels.unwrap_or_default(),
        }
    }
}

/// Decode the output of `crictl pods -o json`.
pub fn decode_pods(json: &str) -> Result<Vec<SandboxDescriptor>, RuntimeError> {
    let list: PodList =
        serde_json::from_str(json).map_err(|e| RuntimeError::Decode(format!("pods: {e}")))?;
    Ok(list.items.into_iter().map(SandboxDescriptor::from).collect())
}

// ---------------------------------------------------------------------------
// statsp
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StatsList {
    #[serde(default)]
    stats: Vec<Stats>,
}

#[derive(Deserialize)]
struct Stats {
    #[serde(default)]
    attributes: Option<Attributes>,
    #[serde(default)]
    linux: Option<Linux>,
}

#[derive(Deserialize)]
struct Attributes {
    #[serde(default)]
    id: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Deserialize)]
struct Linux {
    #[serde(default)]
    cpu: Option<Cpu>,
    #[serde(default)]
    memory: Option<Memory>,
}

#[derive(Deserialize)]
struct UInt64Value {
    #[serde(default, deserialize_with = "de_u64")]
    value: u64,
}

fn value(v: Option<UInt64Value>) -> Option<u64> {
    v.map(|v| v.value)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cpu {
    #[serde(default, deserialize_with = "de_i64")]
    timestamp: i64,
    #[serde(default)]
    usage_core_nano_seconds: Option<UInt64Value>,
    #[serde(default)]
    usage_nano_cores: Option<UInt64Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Memory {
    #[serde(default, deserialize_with = "de_i64")]
    timestamp: i64,
    #[serde(default)]
    working_set_bytes: Option<UInt64Value>,
    #[serde(default)]
    available_bytes: Option<UInt64Value>,
    #[serde(default)]
    usage_bytes: Option<UInt64Value>,
    #[serde(default)]
    rss_bytes: Option<UInt64Value>,
    #[serde(default)]
    page_faults: Option<UInt64Value>,
    #[serde(default)]
    major_page_faults: Option<UInt64Value>,
}

impl From<Stats> for PodSandboxStats {
    fn from(stats: Stats) -> Self {
        let (id, uid) = match stats.attributes {
            Some(attrs) => (attrs.id, attrs.metadata.unwrap_or_default().uid),
            None => (String::new(), String::new()),
        };
        let linux = stats.linux.map(|linux| LinuxPodSandboxStats {
            cpu: linux.cpu.map(|cpu| CpuUsage {
                timestamp: cpu.timestamp,
                usage_core_nano_seconds: value(cpu.usage_core_nano_seconds),
                usage_nano_cores: value(cpu.usage_nano_cores),
            }),
            memory: linux.memory.map(|mem| MemoryUsage {
                timestamp: mem.timestamp,
                working_set_bytes: value(mem.working_set_bytes),
                available_bytes: value(mem.available_bytes),
                usage_bytes: value(mem.usage_bytes),
                rss_bytes: value(mem.rss_bytes),
                page_faults: value(mem.page_faults),
                major_page_faults: value(mem.major_page_faults),
            }),
        });
        Self { id, uid, linux }
    }
}

/// Decode the output of `crictl statsp -o json`.
pub fn decode_stats(json: &str) -> Result<Vec<PodSandboxStats>, RuntimeError> {
    let list: StatsList =
        serde_json::from_str(json).map_err(|e| RuntimeError::Decode(format!("statsp: {e}")))?;
    Ok(list.stats.into_iter().map(PodSandboxStats::from).collect())
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// Parse the `Key:  value` lines printed by `crictl version`.
pub fn parse_version(text: &str) -> Result<RuntimeVersion, RuntimeError> {
    let mut version = RuntimeVersion::default();
    for line in text.lines() {
        let Some((key, val)) = line.split_once(':') else {
            continue;
        };
        let val = val.trim().to_string();
        match key.trim() {
            "Version" => version.version = val,
            "RuntimeName" => version.runtime_name = val,
            "RuntimeVersion" => version.runtime_version = val,
            "RuntimeApiVersion" => version.runtime_api_version = val,
            _ => {}
        }
    }
    if version.runtime_name.is_empty() {
        return Err(RuntimeError::Decode(format!(
            "version: no RuntimeName in {text:?}"
        )));
    }
    Ok(version)
}
