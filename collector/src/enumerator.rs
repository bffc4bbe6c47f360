use std::collections::BTreeMap;
use std::sync::Arc;

use cri_api::{RuntimeClient, SandboxDescriptor, SandboxFilter, SandboxState};
use regex::Regex;
use tracing::warn;

use crate::error::{CollectorError, CollectorResult};

/// How many of the newest sandboxes to keep after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    Latest,
    LastN(usize),
}

impl Selection {
    /// `last > 0` wins over `latest`.
    pub fn from_flags(latest: bool, last: usize) -> Self {
        if last > 0 {
            Self::LastN(last)
        } else if latest {
            Self::Latest
        } else {
            Self::All
        }
    }

    fn cap(self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Latest => Some(1),
            Self::LastN(0) => None,
            Self::LastN(n) => Some(n),
        }
    }
}

/// Immutable enumeration query.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxQuery {
    pub id: Option<String>,
    pub state: Option<SandboxState>,
    pub labels: BTreeMap<String, String>,
    pub name_pattern: Option<String>,
    pub namespace_pattern: Option<String>,
    pub selection: Selection,
}

impl Default for SandboxQuery {
    fn default() -> Self {
        Self {
            id: None,
            state: None,
            labels: BTreeMap::new(),
            name_pattern: None,
            namespace_pattern: None,
            selection: Selection::All,
        }
    }
}

#[derive(Debug)]
enum Pattern {
    Any,
    Regex(Regex),
    Invalid,
}

impl Pattern {
    fn compile(field: &'static str, pattern: Option<&str>) -> Self {
        match pattern {
            None | Some("") => Self::Any,
            Some(p) => match Regex::new(p) {
                Ok(re) => Self::Regex(re),
                Err(e) => {
                    warn!(field, pattern = p, error = %e, "invalid filter pattern, nothing will match");
                    Self::Invalid
                }
            },
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Regex(re) => re.is_match(value),
            Self::Invalid => false,
        }
    }
}

/// Lists the sandboxes a collection run should look at.
pub struct Enumerator {
    client: Arc<dyn RuntimeClient>,
    filter: SandboxFilter,
    name: Pattern,
    namespace: Pattern,
    selection: Selection,
}

impl Enumerator {
    pub fn new(client: Arc<dyn RuntimeClient>, query: &SandboxQuery) -> Self {
        Self {
            client,
            filter: SandboxFilter {
                id: query.id.clone(),
                state: query.state,
                label_selector: query.labels.clone(),
            },
            name: Pattern::compile("name", query.name_pattern.as_deref()),
            namespace: Pattern::compile("namespace", query.namespace_pattern.as_deref()),
            selection: query.selection,
        }
    }

    pub fn client(&self) -> &Arc<dyn RuntimeClient> {
        &self.client
    }

    /// Newest first, filtered by name/namespace and capped by the selection.
    pub async fn list(&self) -> CollectorResult<Vec<SandboxDescriptor>> {
        let sandboxes = self
            .client
            .list_sandboxes(&self.filter)
            .await
            .map_err(CollectorError::Enumerate)?;
        Ok(self.select(sandboxes))
    }

    fn select(&self, sandboxes: Vec<SandboxDescriptor>) -> Vec<SandboxDescriptor> {
        let mut kept: Vec<SandboxDescriptor> = sandboxes
            .into_iter()
            .filter(|s| self.name.matches(&s.name) && self.namespace.matches(&s.namespace))
            .collect();
        kept.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(cap) = self.selection.cap() {
            kept.truncate(cap);
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, sandbox};

    fn enumerator(runtime: &Arc<FakeRuntime>, query: SandboxQuery) -> Enumerator {
        Enumerator::new(runtime.clone() as Arc<dyn RuntimeClient>, &query)
    }

    fn ids(sandboxes: &[SandboxDescriptor]) -> Vec<&str> {
        sandboxes.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn selection_from_flags() {
        assert_eq!(Selection::from_flags(false, 0), Selection::All);
        assert_eq!(Selection::from_flags(true, 0), Selection::Latest);
        assert_eq!(Selection::from_flags(true, 4), Selection::LastN(4));
        assert_eq!(Selection::from_flags(false, 2), Selection::LastN(2));
    }

    #[tokio::test]
    async fn last_n_keeps_newest_first() {
        let runtime = Arc::new(FakeRuntime::new(vec![
            sandbox("a", "web-a", "shop", 100),
            sandbox("b", "web-b", "shop", 300),
            sandbox("c", "web-c", "shop", 200),
        ]));
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());
        let query = SandboxQuery {
            labels: labels.clone(),
            selection: Selection::LastN(2),
            ..SandboxQuery::default()
        };

        let listed = enumerator(&runtime, query).list().await.unwrap();

        let created: Vec<i64> = listed.iter().map(|s| s.created_at).collect();
        assert_eq!(created, vec![300, 200]);
        // Labels are passed through to the runtime, not evaluated locally.
        let filters = runtime.sandbox_filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].label_selector, labels);
    }

    #[tokio::test]
    async fn selection_bounds() {
        let runtime = Arc::new(FakeRuntime::new(vec![
            sandbox("a", "a", "ns", 1),
            sandbox("b", "b", "ns", 2),
            sandbox("c", "c", "ns", 3),
        ]));

        for (selection, expected) in [
            (Selection::All, 3),
            (Selection::Latest, 1),
            (Selection::LastN(2), 2),
            (Selection::LastN(10), 3),
            (Selection::LastN(0), 3),
        ] {
            let query = SandboxQuery {
                selection,
                ..SandboxQuery::default()
            };
            let listed = enumerator(&runtime, query).list().await.unwrap();
            assert_eq!(listed.len(), expected, "{selection:?}");
        }
    }

    #[tokio::test]
    async fn latest_returns_newest() {
        let runtime = Arc::new(FakeRuntime::new(vec![
            sandbox("old", "a", "ns", 10),
            sandbox("new", "b", "ns", 20),
        ]));
        let query = SandboxQuery {
            selection: Selection::Latest,
            ..SandboxQuery::default()
        };
        let listed = enumerator(&runtime, query).list().await.unwrap();
        assert_eq!(ids(&listed), vec!["new"]);
    }

    #[tokio::test]
    async fn equal_creation_times_break_on_id() {
        let runtime = Arc::new(FakeRuntime::new(vec![
            sandbox("c", "c", "ns", 5),
            sandbox("a", "a", "ns", 5),
            sandbox("z", "z", "ns", 9),
            sandbox("b", "b", "ns", 5),
        ]));
        let listed = enumerator(&runtime, SandboxQuery::default())
            .list()
            .await
            .unwrap();
        assert_eq!(ids(&listed), vec!["z", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn name_and_namespace_patterns_are_unanchored() {
        let runtime = Arc::new(FakeRuntime::new(vec![
            sandbox("1", "web-frontend", "shop-prod", 1),
            sandbox("2", "api", "shop-prod", 2),
            sandbox("3", "my-web", "kube-system", 3),
        ]));
        let query = SandboxQuery {
            name_pattern: Some("web".into()),
            namespace_pattern: Some("prod".into()),
            ..SandboxQuery::default()
        };
        let listed = enumerator(&runtime, query).list().await.unwrap();
        assert_eq!(ids(&listed), vec!["1"]);
    }

    #[tokio::test]
    async fn anchored_pattern_filters() {
        let runtime = Arc::new(FakeRuntime::new(vec![
            sandbox("1", "web-frontend", "ns", 1),
            sandbox("2", "my-web", "ns", 2),
        ]));
        let query = SandboxQuery {
            name_pattern: Some("^web-".into()),
            ..SandboxQuery::default()
        };
        let listed = enumerator(&runtime, query).list().await.unwrap();
        assert_eq!(ids(&listed), vec!["1"]);
    }

    #[tokio::test]
    async fn malformed_pattern_matches_nothing() {
        let runtime = Arc::new(FakeRuntime::new(vec![
            sandbox("1", "web", "ns", 1),
            sandbox("2", "[web", "ns", 2),
        ]));
        let query = SandboxQuery {
            name_pattern: Some("[web".into()),
            ..SandboxQuery::default()
        };
        let enumerator = enumerator(&runtime, query);

        let listed = enumerator.list().await.unwrap();
        assert!(listed.is_empty());
        // Still succeeds on repeated calls.
        assert!(enumerator.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filter_fields_are_forwarded() {
        let runtime = Arc::new(FakeRuntime::new(vec![]));
        let query = SandboxQuery {
            id: Some("abc".into()),
            state: Some(SandboxState::NotReady),
            ..SandboxQuery::default()
        };
        enumerator(&runtime, query).list().await.unwrap();

        let filters = runtime.sandbox_filters();
        assert_eq!(filters[0].id.as_deref(), Some("abc"));
        assert_eq!(filters[0].state, Some(SandboxState::NotReady));
    }

    #[tokio::test]
    async fn runtime_failure_is_wrapped() {
        let runtime = Arc::new(FakeRuntime::new(vec![sandbox("1", "a", "ns", 1)]));
        runtime.fail_list(true);

        let err = enumerator(&runtime, SandboxQuery::default())
            .list()
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::Enumerate(_)), "got: {err}");
        assert!(err.to_string().starts_with("list sandboxes:"), "got: {err}");
    }
}
