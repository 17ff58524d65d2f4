//! Dataset lifecycle orchestration
//!
//! The [`Manager`] composes the repository, catalog resolver, replication
//! client and checksum verifier into the operations exposed to users:
//!
//! - [`Manager::ingest`]: resolve and register new datasets
//! - [`Manager::subscribe`]: create replication rules for `new` datasets
//! - [`Manager::update_status`]: poll rules of `subscribed` datasets
//! - [`Manager::verify`]: checksum every file of `transferred` datasets
//! - [`Manager::report`], [`Manager::summary`]: read-only views
//! - [`Manager::whoami`]: replication service identity
//!
//! Each operation runs in a single coordinating flow. Catalog queries and
//! checksum computations fan out under their own concurrency ceilings and
//! hand their results back; only the coordinating flow writes to the
//! repository. Replication calls run one dataset at a time.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::{CatalogResolver, DasGoClient};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::lifecycle::DatasetStatus;
use crate::models::{Dataset, NewDataset};
use crate::replication::{ReplicationClient, RucioClient, RuleFilter};
use crate::report::{Report, Summary};
use crate::repository::Repository;
use crate::verifier::{ChecksumVerifier, FileCheck, XrdAdler32};

/// A dataset an operation could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDataset {
    pub name: String,
    pub reason: String,
}

/// Outcome of [`Manager::ingest`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Registered as `new`
    pub created: Vec<String>,
    /// Registered as `subscribed` because a rule already existed
    pub already_subscribed: Vec<String>,
    /// Already present in the repository
    pub skipped: Vec<String>,
    /// Left out of the commit
    pub failed: Vec<FailedDataset>,
}

impl IngestReport {
    pub fn stored(&self) -> usize {
        self.created.len() + self.already_subscribed.len()
    }
}

/// Outcome of a per-dataset sweep (subscribe, status update, verify)
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Moved one step forward in the lifecycle
    pub advanced: Vec<String>,
    /// Still in the same state
    pub unchanged: Vec<String>,
    /// Moved to `error`
    pub errored: Vec<FailedDataset>,
    /// Files that failed checksum verification
    pub bad_files: Vec<FileCheck>,
}

impl SweepReport {
    pub fn processed(&self) -> usize {
        self.advanced.len() + self.unchanged.len() + self.errored.len()
    }
}

pub struct Manager {
    repository: Repository,
    catalog: CatalogResolver,
    replication: Arc<dyn ReplicationClient>,
    verifier: ChecksumVerifier,
}

impl Manager {
    pub fn new(
        repository: Repository,
        catalog: CatalogResolver,
        replication: Arc<dyn ReplicationClient>,
        verifier: ChecksumVerifier,
    ) -> Self {
        Self {
            repository,
            catalog,
            replication,
            verifier,
        }
    }

    /// Wire up the production components described by `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let repository = Repository::connect(&config.db_url, config.db_echo).await?;
        let catalog = CatalogResolver::new(
            Arc::new(DasGoClient::new(&config.catalog.command)),
            config.max_dasgoclient,
        );
        let replication = Arc::new(RucioClient::new(&config.rucio_client)?);
        let verifier = ChecksumVerifier::new(
            Arc::new(XrdAdler32::new(&config.verify.command)),
            config.max_xrdadler32,
            &config.verify.url_prefix,
            &config.verify.data_marker,
        );

        Ok(Self::new(repository, catalog, replication, verifier))
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Resolve and register datasets at `site`
    ///
    /// Names already in the repository are skipped. A dataset whose catalog
    /// query or rule listing fails is left out; every other dataset of the
    /// batch is committed together in one transaction.
    #[instrument(skip(self, names), fields(requested = names.len()))]
    pub async fn ingest(&self, names: &[String], site: &str) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            if self.repository.find_by_name(name).await?.is_some() {
                debug!(dataset = %name, "Dataset already defined");
                report.skipped.push(name.clone());
                continue;
            }
            pending.push(name.as_str());
        }

        let resolved = join_all(pending.iter().map(|name| self.catalog.resolve(name))).await;

        let mut batch = Vec::with_capacity(pending.len());
        for (name, files) in pending.into_iter().zip(resolved) {
            let files = match files {
                Ok(files) => files,
                Err(e) if e.is_per_dataset() => {
                    error!(dataset = %name, error = %e, "Failed to resolve dataset");
                    report.failed.push(failed(name, &e));
                    continue;
                },
                Err(e) => return Err(e),
            };

            let mut dataset = NewDataset::new(name, site, files);

            let rules = match self.replication.list_rules(&RuleFilter::for_dataset(name, site)).await {
                Ok(rules) => rules,
                Err(e) if e.is_per_dataset() => {
                    error!(dataset = %name, error = %e, "Failed to list replication rules");
                    report.failed.push(failed(name, &e));
                    continue;
                },
                Err(e) => return Err(e),
            };

            info!(dataset = %name, files = dataset.files.len(), bytes = dataset.total_size(), "Creating dataset");

            match rules.into_iter().next() {
                Some(rule) => {
                    info!(dataset = %name, rule = %rule.id, "Already subscribed");
                    dataset.adopt_rule(rule.id, rule.locks)?;
                    report.already_subscribed.push(name.to_string());
                },
                None => report.created.push(name.to_string()),
            }

            batch.push(dataset);
        }

        if !batch.is_empty() {
            self.repository.insert_batch(&batch).await?;
        }

        info!(
            created = report.created.len(),
            already_subscribed = report.already_subscribed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Ingest finished"
        );
        Ok(report)
    }

    /// Create a replication rule for every matching `new` dataset
    #[instrument(skip(self))]
    pub async fn subscribe(&self, pattern: &str) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for mut dataset in self.repository.find(pattern, Some(DatasetStatus::New)).await? {
            let previous = dataset.status;

            match self.replication.create_rule(&dataset.name, &dataset.site).await {
                Ok(rule_id) => {
                    dataset.subscribe(rule_id)?;
                    self.repository.save(&dataset, previous).await?;
                    info!(dataset = %dataset.name, site = %dataset.site, "Subscribed");
                    report.advanced.push(dataset.name);
                },
                Err(e) if e.is_per_dataset() => {
                    error!(dataset = %dataset.name, error = %e, "Error creating replication rule");
                    self.fail(&mut dataset, previous, &e, &mut report).await?;
                },
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Refresh lock counts of every matching `subscribed` dataset
    ///
    /// Datasets whose rule reports `OK` move to `transferred`.
    #[instrument(skip(self))]
    pub async fn update_status(&self, pattern: &str) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for mut dataset in self.repository.find(pattern, Some(DatasetStatus::Subscribed)).await? {
            let previous = dataset.status;
            let Some(rule_id) = dataset.subscription.clone() else {
                return Err(EngineError::CorruptRecord(format!(
                    "dataset '{}' is subscribed without a rule",
                    dataset.name
                )));
            };

            match self.replication.query_rule(&rule_id).await {
                Ok(status) => {
                    dataset.locks = status.locks;
                    let advanced = status.is_ok();
                    if advanced {
                        dataset.mark_transferred()?;
                    }
                    self.repository.save(&dataset, previous).await?;

                    debug!(
                        dataset = %dataset.name,
                        state = %status.state,
                        ok = dataset.locks.ok,
                        replicating = dataset.locks.replicating,
                        stuck = dataset.locks.stuck,
                        "Rule status"
                    );
                    if advanced {
                        info!(dataset = %dataset.name, "Transferred");
                        report.advanced.push(dataset.name);
                    } else {
                        report.unchanged.push(dataset.name);
                    }
                },
                Err(e) if e.is_per_dataset() => {
                    error!(dataset = %dataset.name, rule = %rule_id, error = %e, "Error querying replication rule");
                    self.fail(&mut dataset, previous, &e, &mut report).await?;
                },
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Checksum every file of each matching `transferred` dataset
    ///
    /// A dataset moves to `done` only if all of its files match. Otherwise
    /// its state is left alone so the sweep can be repeated.
    #[instrument(skip(self))]
    pub async fn verify(&self, pattern: &str) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for mut dataset in self.repository.find(pattern, Some(DatasetStatus::Transferred)).await? {
            let previous = dataset.status;
            let files = self.repository.files(dataset.id).await?;
            let checks = self.verifier.check_all(&files).await;
            let bad: Vec<FileCheck> = checks.into_iter().filter(|c| !c.is_match()).collect();

            if bad.is_empty() {
                dataset.mark_verified()?;
                self.repository.save(&dataset, previous).await?;
                info!(dataset = %dataset.name, files = files.len(), "Dataset is ok");
                report.advanced.push(dataset.name);
            } else {
                error!(
                    dataset = %dataset.name,
                    bad_files = bad.len(),
                    files = files.len(),
                    "Dataset has bad files"
                );
                report.unchanged.push(dataset.name);
                report.bad_files.extend(bad);
            }
        }

        Ok(report)
    }

    /// Per-dataset usage of every dataset matching `pattern`
    pub async fn report(&self, pattern: &str) -> Result<Report> {
        Ok(Report {
            rows: self.repository.usage(pattern).await?,
        })
    }

    /// Dataset and file totals per lifecycle state
    pub async fn summary(&self) -> Result<Summary> {
        Ok(Summary::from_totals(self.repository.status_totals().await?))
    }

    /// Account the replication client is authenticated as
    pub async fn whoami(&self) -> Result<String> {
        let account = self.replication.whoami().await?;
        info!(account = %account, "Rucio account");
        Ok(account)
    }

    async fn fail(
        &self,
        dataset: &mut Dataset,
        previous: DatasetStatus,
        cause: &EngineError,
        report: &mut SweepReport,
    ) -> Result<()> {
        dataset.mark_error()?;
        self.repository.save(dataset, previous).await?;
        warn!(dataset = %dataset.name, "Dataset moved to error");
        report.errored.push(failed(&dataset.name, cause));
        Ok(())
    }
}

fn failed(name: &str, cause: &EngineError) -> FailedDataset {
    FailedDataset {
        name: name.to_string(),
        reason: cause.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::CatalogQuery;
    use crate::models::{FileRecord, LockCounts};
    use crate::replication::{ReplicationRule, RuleStatus};
    use crate::verifier::ChecksumTool;
    use async_trait::async_trait;
    use rtm_common::checksum::Adler32;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedCatalog(HashMap<String, Vec<FileRecord>>);

    #[async_trait]
    impl CatalogQuery for FixedCatalog {
        async fn query(&self, dataset: &str) -> Result<Vec<FileRecord>> {
            self.0
                .get(dataset)
                .cloned()
                .ok_or_else(|| EngineError::catalog(dataset, "exit status 1"))
        }
    }

    #[derive(Default)]
    struct FakeRucio {
        existing: Mutex<HashMap<String, ReplicationRule>>,
        reject: Mutex<HashSet<String>>,
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReplicationClient for FakeRucio {
        async fn create_rule(&self, dataset: &str, _site: &str) -> Result<String> {
            if self.reject.lock().unwrap().contains(dataset) {
                return Err(EngineError::rejected(dataset, "RSE does not exist"));
            }
            self.created.lock().unwrap().push(dataset.to_string());
            Ok(format!("rule-{}", dataset))
        }

        async fn query_rule(&self, rule_id: &str) -> Result<RuleStatus> {
            Err(EngineError::replication(format!("rule {} not found", rule_id)))
        }

        async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<ReplicationRule>> {
            Ok(self.existing.lock().unwrap().get(&filter.name).cloned().into_iter().collect())
        }

        async fn whoami(&self) -> Result<String> {
            Ok("transfer_ops".to_string())
        }
    }

    struct AlwaysMatch;

    #[async_trait]
    impl ChecksumTool for AlwaysMatch {
        async fn checksum(&self, _url: &str) -> Result<Adler32> {
            Ok(Adler32::new(1))
        }
    }

    fn files(prefix: &str, n: usize) -> Vec<FileRecord> {
        (0..n)
            .map(|i| FileRecord {
                lfn: format!("/store/data/{}/{}.root", prefix, i),
                size: 10,
                checksum: Adler32::new(1),
                events: 5,
            })
            .collect()
    }

    async fn manager(catalog: &[(&str, usize)], rucio: Arc<FakeRucio>) -> Manager {
        let catalog = FixedCatalog(
            catalog
                .iter()
                .map(|(name, n)| (name.to_string(), files(name.trim_start_matches('/'), *n)))
                .collect(),
        );
        Manager::new(
            Repository::in_memory().await.unwrap(),
            CatalogResolver::new(Arc::new(catalog), 2),
            rucio,
            ChecksumVerifier::new(Arc::new(AlwaysMatch), 2, "root://host//eos", "Run2016"),
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ingest_excludes_failures_and_skips_existing() {
        let rucio = Arc::new(FakeRucio::default());
        let manager = manager(&[("DS1", 2), ("DS2", 1), ("EMPTY", 0)], rucio).await;

        let report = manager
            .ingest(&names(&["DS1", "DS1", "MISSING", "EMPTY", "DS2"]), "T2_CH_CERN")
            .await
            .unwrap();

        assert_eq!(report.created, vec!["DS1", "DS2"]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.skipped.is_empty());
        assert!(manager.repository().find_by_name("MISSING").await.unwrap().is_none());
        assert!(manager.repository().find_by_name("EMPTY").await.unwrap().is_none());

        let again = manager.ingest(&names(&["DS1", "DS2"]), "T2_CH_CERN").await.unwrap();
        assert_eq!(again.skipped, vec!["DS1", "DS2"]);
        assert_eq!(again.stored(), 0);
        assert_eq!(manager.repository().find("", None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_adopts_existing_rule() {
        let rucio = Arc::new(FakeRucio::default());
        rucio.existing.lock().unwrap().insert(
            "DS1".to_string(),
            ReplicationRule {
                id: "rule-old".to_string(),
                state: "REPLICATING".to_string(),
                locks: LockCounts {
                    ok: 1,
                    replicating: 1,
                    stuck: 0,
                },
            },
        );
        let manager = manager(&[("DS1", 2)], rucio).await;

        let report = manager.ingest(&names(&["DS1"]), "T2_CH_CERN").await.unwrap();
        assert_eq!(report.already_subscribed, vec!["DS1"]);

        let ds = manager.repository().find_by_name("DS1").await.unwrap().unwrap();
        assert_eq!(ds.status, DatasetStatus::Subscribed);
        assert_eq!(ds.subscription.as_deref(), Some("rule-old"));
        assert_eq!(ds.locks.total(), 2);
    }

    #[tokio::test]
    async fn test_subscribe_isolates_rejections() {
        let rucio = Arc::new(FakeRucio::default());
        rucio.reject.lock().unwrap().insert("BAD".to_string());
        let manager = manager(&[("GOOD", 1), ("BAD", 1)], rucio.clone()).await;
        manager.ingest(&names(&["GOOD", "BAD"]), "T2_CH_CERN").await.unwrap();

        let report = manager.subscribe("").await.unwrap();
        assert_eq!(report.advanced, vec!["GOOD"]);
        assert_eq!(report.errored.len(), 1);
        assert_eq!(report.errored[0].name, "BAD");

        let bad = manager.repository().find_by_name("BAD").await.unwrap().unwrap();
        assert_eq!(bad.status, DatasetStatus::Error);

        // Nothing left in `new`: a second sweep is a no-op
        let again = manager.subscribe("").await.unwrap();
        assert_eq!(again.processed(), 0);
        assert_eq!(rucio.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_rule_query_moves_to_error() {
        let rucio = Arc::new(FakeRucio::default());
        let manager = manager(&[("DS1", 1)], rucio).await;
        manager.ingest(&names(&["DS1"]), "T2_CH_CERN").await.unwrap();
        manager.subscribe("DS1").await.unwrap();

        let report = manager.update_status("DS1").await.unwrap();
        assert_eq!(report.errored.len(), 1);

        let ds = manager.repository().find_by_name("DS1").await.unwrap().unwrap();
        assert_eq!(ds.status, DatasetStatus::Error);
        assert_eq!(ds.subscription.as_deref(), Some("rule-DS1"));
    }

    #[tokio::test]
    async fn test_summary_and_whoami() {
        let rucio = Arc::new(FakeRucio::default());
        let manager = manager(&[("DS1", 3), ("DS2", 1)], rucio).await;
        manager.ingest(&names(&["DS1", "DS2"]), "T2_CH_CERN").await.unwrap();
        manager.subscribe("DS2").await.unwrap();

        let summary = manager.summary().await.unwrap();
        assert_eq!(summary.datasets(), 2);
        assert_eq!(summary.files(), 4);
        assert_eq!(summary.by_status[0].datasets, 1);
        assert_eq!(summary.by_status[1].datasets, 1);

        assert_eq!(manager.whoami().await.unwrap(), "transfer_ops");
    }
}
