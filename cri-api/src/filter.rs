use std::collections::BTreeMap;

use crate::types::SandboxState;

/// Coarse sandbox filter evaluated by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxFilter {
    /// Exact sandbox id.
    pub id: Option<String>,
    pub state: Option<SandboxState>,
    /// Exact key=value label equality; every pair must match.
    pub label_selector: BTreeMap<String, String>,
}

/// Stats query filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsFilter {
    pub id: Option<String>,
}

impl StatsFilter {
    pub fn for_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }
}
