use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Pod sandbox state as reported by the runtime.
///
/// The discriminants are the CRI `PodSandboxState` values and are what gets
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SandboxState {
    #[serde(rename = "SANDBOX_READY")]
    Ready = 0,
    #[serde(rename = "SANDBOX_NOTREADY")]
    NotReady = 1,
}

impl SandboxState {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Ready),
            1 => Some(Self::NotReady),
            _ => None,
        }
    }

    /// CRI wire name (`SANDBOX_READY` / `SANDBOX_NOTREADY`).
    pub fn as_cri_str(self) -> &'static str {
        match self {
            Self::Ready => "SANDBOX_READY",
            Self::NotReady => "SANDBOX_NOTREADY",
        }
    }

    /// Short filter name (`ready` / `notready`).
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::NotReady => "notready",
        }
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cri_str())
    }
}

impl FromStr for SandboxState {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ready" | "sandbox_ready" => Ok(Self::Ready),
            "notready" | "sandbox_notready" => Ok(Self::NotReady),
            _ => Err(RuntimeError::InvalidConfig(format!(
                "state should be ready or notready, got {s:?}"
            ))),
        }
    }
}

/// A pod sandbox as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxDescriptor {
    pub id: String,
    /// Logical pod identity, stable across sandbox recreation.
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub attempt: u32,
    pub state: SandboxState,
    /// Runtime-assigned creation time in nanoseconds. Only used for ordering.
    pub created_at: i64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CpuUsage {
    pub timestamp: i64,
    pub usage_core_nano_seconds: Option<u64>,
    pub usage_nano_cores: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryUsage {
    pub timestamp: i64,
    pub working_set_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
    pub usage_bytes: Option<u64>,
    pub rss_bytes: Option<u64>,
    pub page_faults: Option<u64>,
    pub major_page_faults: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinuxPodSandboxStats {
    pub cpu: Option<CpuUsage>,
    pub memory: Option<MemoryUsage>,
}

/// Usage statistics for one sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSandboxStats {
    pub id: String,
    /// Empty when the runtime omits sandbox metadata from the stats reply.
    pub uid: String,
    pub linux: Option<LinuxPodSandboxStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeVersion {
    pub version: String,
    pub runtime_name: String,
    pub runtime_version: String,
    pub runtime_api_version: String,
}
