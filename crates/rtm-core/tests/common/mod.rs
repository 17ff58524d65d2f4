//! Shared fakes for the lifecycle integration tests
//!
//! Every external collaborator of the manager is replaced by an in-process
//! fake whose answers can be changed between operations:
//!
//! - [`FakeCatalog`]: file inventories by dataset name
//! - [`FakeRucio`]: rule ids, rule states and pre-existing rules
//! - [`FakeChecksums`]: checksum answers by storage URL

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rtm_common::checksum::Adler32;
use rtm_core::catalog::{CatalogQuery, CatalogResolver};
use rtm_core::models::{FileRecord, LockCounts};
use rtm_core::replication::{ReplicationClient, ReplicationRule, RuleFilter, RuleStatus};
use rtm_core::verifier::{ChecksumTool, ChecksumVerifier};
use rtm_core::{EngineError, Manager, Repository, Result};

pub const SITE: &str = "SITE_A";
pub const URL_PREFIX: &str = "root://eospublic.cern.ch//eos/opendata/cms";
pub const DATA_MARKER: &str = "Run2016";

#[derive(Default)]
pub struct FakeCatalog {
    inventories: Mutex<HashMap<String, Vec<FileRecord>>>,
    pub queries: AtomicUsize,
}

impl FakeCatalog {
    pub fn set(&self, dataset: &str, files: Vec<FileRecord>) {
        self.inventories.lock().unwrap().insert(dataset.to_string(), files);
    }
}

#[async_trait]
impl CatalogQuery for FakeCatalog {
    async fn query(&self, dataset: &str) -> Result<Vec<FileRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inventories
            .lock()
            .unwrap()
            .get(dataset)
            .cloned()
            .ok_or_else(|| EngineError::catalog(dataset, "dasgoclient exited with status 1"))
    }
}

#[derive(Default)]
pub struct FakeRucio {
    next_rule: Mutex<HashMap<String, String>>,
    rejected: Mutex<Vec<String>>,
    states: Mutex<HashMap<String, RuleStatus>>,
    existing: Mutex<HashMap<String, ReplicationRule>>,
    pub created: Mutex<Vec<(String, String)>>,
}

impl FakeRucio {
    /// Rule id handed out when a rule is created for `dataset`
    pub fn will_create(&self, dataset: &str, rule_id: &str) {
        self.next_rule
            .lock()
            .unwrap()
            .insert(dataset.to_string(), rule_id.to_string());
    }

    pub fn will_reject(&self, dataset: &str) {
        self.rejected.lock().unwrap().push(dataset.to_string());
    }

    pub fn set_state(&self, rule_id: &str, state: &str, ok: u64, replicating: u64, stuck: u64) {
        self.states.lock().unwrap().insert(
            rule_id.to_string(),
            RuleStatus {
                state: state.to_string(),
                locks: LockCounts {
                    ok,
                    replicating,
                    stuck,
                },
            },
        );
    }

    pub fn has_rule(&self, dataset: &str, rule_id: &str, locks: LockCounts) {
        self.existing.lock().unwrap().insert(
            dataset.to_string(),
            ReplicationRule {
                id: rule_id.to_string(),
                state: "REPLICATING".to_string(),
                locks,
            },
        );
    }
}

#[async_trait]
impl ReplicationClient for FakeRucio {
    async fn create_rule(&self, dataset: &str, site: &str) -> Result<String> {
        if self.rejected.lock().unwrap().iter().any(|d| d == dataset) {
            return Err(EngineError::rejected(dataset, "RSE expression is invalid"));
        }
        let id = self
            .next_rule
            .lock()
            .unwrap()
            .get(dataset)
            .cloned()
            .unwrap_or_else(|| format!("rule-{}", dataset));
        self.created
            .lock()
            .unwrap()
            .push((dataset.to_string(), site.to_string()));
        Ok(id)
    }

    async fn query_rule(&self, rule_id: &str) -> Result<RuleStatus> {
        self.states
            .lock()
            .unwrap()
            .get(rule_id)
            .cloned()
            .ok_or_else(|| EngineError::replication(format!("404 /rules/{}: RuleNotFound", rule_id)))
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<ReplicationRule>> {
        assert_eq!(filter.scope, "cms");
        Ok(self
            .existing
            .lock()
            .unwrap()
            .get(&filter.name)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn whoami(&self) -> Result<String> {
        Ok("transfer_ops".to_string())
    }
}

#[derive(Default)]
pub struct FakeChecksums {
    answers: Mutex<HashMap<String, Adler32>>,
    pub calls: AtomicUsize,
}

impl FakeChecksums {
    pub fn answer(&self, url: &str, checksum: u32) {
        self.answers
            .lock()
            .unwrap()
            .insert(url.to_string(), Adler32::new(checksum));
    }
}

#[async_trait]
impl ChecksumTool for FakeChecksums {
    async fn checksum(&self, url: &str) -> Result<Adler32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .ok_or_else(|| EngineError::Io(std::io::Error::other("xrdadler32 exited with status 54")))
    }
}

/// Manager over an in-memory repository and the given fakes
pub struct Harness {
    pub manager: Manager,
    pub catalog: Arc<FakeCatalog>,
    pub rucio: Arc<FakeRucio>,
    pub checksums: Arc<FakeChecksums>,
}

impl Harness {
    pub async fn new() -> Self {
        let rucio = Arc::new(FakeRucio::default());
        Self::build(rucio.clone(), rucio).await
    }

    /// Harness whose manager talks to `replication` instead of the fake
    pub async fn with_replication(replication: Arc<dyn ReplicationClient>) -> Self {
        Self::build(Arc::new(FakeRucio::default()), replication).await
    }

    async fn build(rucio: Arc<FakeRucio>, replication: Arc<dyn ReplicationClient>) -> Self {
        let catalog = Arc::new(FakeCatalog::default());
        let checksums = Arc::new(FakeChecksums::default());

        let manager = Manager::new(
            Repository::in_memory().await.unwrap(),
            CatalogResolver::new(catalog.clone(), 4),
            replication,
            ChecksumVerifier::new(checksums.clone(), 10, URL_PREFIX, DATA_MARKER),
        );

        Self {
            manager,
            catalog,
            rucio,
            checksums,
        }
    }

    pub fn repo(&self) -> &Repository {
        self.manager.repository()
    }
}

/// Collision-data file of `run` with checksum `checksum`
pub fn data_file(run: &str, index: usize, size: u64, checksum: u32) -> FileRecord {
    FileRecord {
        lfn: format!("/store/data/{}/DoubleMuon/MINIAOD/{}.root", run, index),
        size,
        checksum: Adler32::new(checksum),
        events: 1000,
    }
}

/// Storage URL the verifier computes for a collision-data file
pub fn data_url(file: &FileRecord) -> String {
    format!("{}/{}", URL_PREFIX, &file.lfn[12..])
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
