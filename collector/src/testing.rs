//! In-process fakes shared by the collector tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cri_api::{
    CpuUsage, LinuxPodSandboxStats, MemoryUsage, PodSandboxStats, RuntimeClient, RuntimeError,
    RuntimeVersion, SandboxDescriptor, SandboxFilter, SandboxState, StatsFilter,
};
use usage_store::{
    IdentityOutcome, IdentityRecord, StoreError, StoredSample, UsageSample, UsageStore,
};

pub fn sandbox(id: &str, name: &str, namespace: &str, created_at: i64) -> SandboxDescriptor {
    SandboxDescriptor {
        id: id.to_string(),
        uid: format!("uid-{id}"),
        name: name.to_string(),
        namespace: namespace.to_string(),
        attempt: 0,
        state: SandboxState::Ready,
        created_at,
        labels: BTreeMap::new(),
    }
}

pub fn stats_for(id: &str, uid: &str) -> PodSandboxStats {
    PodSandboxStats {
        id: id.to_string(),
        uid: uid.to_string(),
        linux: Some(LinuxPodSandboxStats {
            cpu: Some(CpuUsage {
                timestamp: 1,
                usage_core_nano_seconds: Some(5_000_000),
                usage_nano_cores: Some(1_000),
            }),
            memory: Some(MemoryUsage {
                timestamp: 1,
                working_set_bytes: Some(4096),
                ..MemoryUsage::default()
            }),
        }),
    }
}

/// Programmable runtime. Unless overridden, every listed sandbox has exactly
/// one stats entry.
pub struct FakeRuntime {
    sandboxes: Mutex<Vec<SandboxDescriptor>>,
    stats: Mutex<HashMap<String, Vec<PodSandboxStats>>>,
    failing_stats: Mutex<HashSet<String>>,
    fail_list: AtomicBool,
    list_delay: Mutex<Duration>,
    sandbox_filters: Mutex<Vec<SandboxFilter>>,
    stats_filters: Mutex<Vec<StatsFilter>>,
    list_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn new(sandboxes: Vec<SandboxDescriptor>) -> Self {
        Self {
            sandboxes: Mutex::new(sandboxes),
            stats: Mutex::new(HashMap::new()),
            failing_stats: Mutex::new(HashSet::new()),
            fail_list: AtomicBool::new(false),
            list_delay: Mutex::new(Duration::ZERO),
            sandbox_filters: Mutex::new(Vec::new()),
            stats_filters: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_stats(&self, id: &str, stats: Vec<PodSandboxStats>) {
        self.stats.lock().unwrap().insert(id.to_string(), stats);
    }

    pub fn fail_stats(&self, id: &str) {
        self.failing_stats.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn sandbox_filters(&self) -> Vec<SandboxFilter> {
        self.sandbox_filters.lock().unwrap().clone()
    }

    pub fn stats_filters(&self) -> Vec<StatsFilter> {
        self.stats_filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn version(&self) -> cri_api::Result<RuntimeVersion> {
        Ok(RuntimeVersion {
            version: "0.1.0".into(),
            runtime_name: "fake".into(),
            runtime_version: "1.0.0".into(),
            runtime_api_version: "v1".into(),
        })
    }

    async fn list_sandboxes(&self, filter: &SandboxFilter) -> cri_api::Result<Vec<SandboxDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.sandbox_filters.lock().unwrap().push(filter.clone());
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RuntimeError::Request("runtime unreachable".into()));
        }
        Ok(self.sandboxes.lock().unwrap().clone())
    }

    async fn list_sandbox_stats(&self, filter: &StatsFilter) -> cri_api::Result<Vec<PodSandboxStats>> {
        self.stats_filters.lock().unwrap().push(filter.clone());
        let id = filter.id.clone().unwrap_or_default();
        if self.failing_stats.lock().unwrap().contains(&id) {
            return Err(RuntimeError::Request(format!("stats for {id} failed")));
        }
        if let Some(stats) = self.stats.lock().unwrap().get(&id) {
            return Ok(stats.clone());
        }
        let sandboxes = self.sandboxes.lock().unwrap();
        Ok(sandboxes
            .iter()
            .filter(|s| s.id == id)
            .map(|s| stats_for(&s.id, &s.uid))
            .collect())
    }
}

/// Vec-backed store with injectable failures.
#[derive(Default)]
pub struct MemoryStore {
    identities: Mutex<Vec<IdentityRecord>>,
    samples: Mutex<Vec<StoredSample>>,
    failing_identities: Mutex<HashSet<String>>,
    fail_append: AtomicBool,
}

impl MemoryStore {
    pub fn fail_identity(&self, uid: &str) {
        self.failing_identities.lock().unwrap().insert(uid.to_string());
    }

    pub fn fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn ensure_identity(&self, record: &IdentityRecord) -> usage_store::Result<IdentityOutcome> {
        if self.failing_identities.lock().unwrap().contains(&record.uid) {
            return Err(StoreError::Task(format!("lookup {} failed", record.uid)));
        }
        let mut identities = self.identities.lock().unwrap();
        if identities.iter().any(|i| i.uid == record.uid) {
            return Ok(IdentityOutcome::AlreadyExists);
        }
        identities.push(record.clone());
        Ok(IdentityOutcome::Inserted)
    }

    async fn append_sample(&self, sample: &UsageSample) -> usage_store::Result<i64> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(StoreError::Task("append failed".into()));
        }
        let mut samples = self.samples.lock().unwrap();
        let id = samples.len() as i64 + 1;
        samples.push(StoredSample {
            id,
            sample: sample.clone(),
        });
        Ok(id)
    }

    async fn compact(&self) -> usage_store::Result<()> {
        Ok(())
    }

    async fn identity(&self, uid: &str) -> usage_store::Result<Option<IdentityRecord>> {
        Ok(self
            .identities
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.uid == uid)
            .cloned())
    }

    async fn identities(&self) -> usage_store::Result<Vec<IdentityRecord>> {
        Ok(self.identities.lock().unwrap().clone())
    }

    async fn samples(&self, uid: &str) -> usage_store::Result<Vec<StoredSample>> {
        Ok(self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.sample.uid == uid)
            .cloned()
            .collect())
    }

    async fn sample_count(&self) -> usage_store::Result<u64> {
        Ok(self.samples.lock().unwrap().len() as u64)
    }
}
