//! Dataset repository backed by SQLite
//!
//! Every manager operation selects datasets by a shell-glob pattern over the
//! dataset name and, usually, a status. The glob is evaluated by SQLite's own
//! `GLOB` operator, so `*`, `?` and `[...]` classes behave exactly as in a
//! shell. An empty pattern selects everything.
//!
//! Writes follow a single-writer discipline: only the coordinating flow of a
//! manager operation calls the mutating methods. State changes are committed
//! with a compare-and-set on the previous status.

use std::str::FromStr;

use rtm_common::checksum::Adler32;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{ConnectOptions, QueryBuilder, Sqlite};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::lifecycle::DatasetStatus;
use crate::models::{Dataset, File, LockCounts, NewDataset};
use crate::report::{DatasetUsage, StatusTotals};

const DATASET_COLUMNS: &str =
    "d.id, d.name, d.site, d.subscription, d.status, d.ok_cnt, d.replicating_cnt, d.stuck_cnt";

/// Persistent store for datasets and their files
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Open (creating if needed) the database at `url` and apply migrations
    ///
    /// With `echo` enabled every statement is logged by sqlx under the
    /// `sqlx::query` target.
    pub async fn connect(url: &str, echo: bool) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if !echo {
            options = options.disable_statement_logging();
        }

        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::migrate(pool).await
    }

    /// Fresh in-memory database
    ///
    /// Each SQLite in-memory connection is its own database, so the pool is
    /// pinned to a single connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.disable_statement_logging();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Dataset>> {
        let sql = format!("SELECT {} FROM datasets d WHERE d.name = ?1", DATASET_COLUMNS);
        let row = sqlx::query_as::<_, DatasetRow>(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Dataset::try_from).transpose()
    }

    /// Datasets whose name matches `pattern`, optionally restricted to one status
    pub async fn find(&self, pattern: &str, status: Option<DatasetStatus>) -> Result<Vec<Dataset>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM datasets d", DATASET_COLUMNS));
        push_filters(&mut query, pattern, status);
        query.push(" ORDER BY d.id");

        let rows = query.build_query_as::<DatasetRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(Dataset::try_from).collect()
    }

    /// Files of one dataset in insertion order
    pub async fn files(&self, dataset_id: i64) -> Result<Vec<File>> {
        let rows = sqlx::query_as::<_, FileRow>(
            r#"
            SELECT id, dataset_id, lfn, size, checksum, events
            FROM files WHERE dataset_id = ?1
            ORDER BY id
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(File::try_from).collect()
    }

    /// Insert a batch of resolved datasets with their files in one transaction
    ///
    /// Either every dataset of the batch is stored or none is.
    pub async fn insert_batch(&self, batch: &[NewDataset]) -> Result<Vec<Dataset>> {
        for new in batch {
            if new.files.is_empty() {
                return Err(EngineError::EmptyDataset(new.name.clone()));
            }
            if new.status.requires_subscription() && new.subscription.is_none() {
                return Err(EngineError::CorruptRecord(format!(
                    "dataset '{}' is {} without a subscription",
                    new.name, new.status
                )));
            }
        }

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(batch.len());

        for new in batch {
            let dataset_id = sqlx::query(
                r#"
                INSERT INTO datasets (name, site, subscription, status, ok_cnt, replicating_cnt, stuck_cnt)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&new.name)
            .bind(&new.site)
            .bind(&new.subscription)
            .bind(new.status.as_str())
            .bind(to_i64(new.locks.ok)?)
            .bind(to_i64(new.locks.replicating)?)
            .bind(to_i64(new.locks.stuck)?)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            for file in &new.files {
                sqlx::query(
                    r#"
                    INSERT INTO files (dataset_id, lfn, size, checksum, events)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(dataset_id)
                .bind(&file.lfn)
                .bind(to_i64(file.size)?)
                .bind(i64::from(file.checksum.value()))
                .bind(to_i64(file.events)?)
                .execute(&mut *tx)
                .await?;
            }

            debug!(dataset = %new.name, files = new.files.len(), "Staged dataset");

            stored.push(Dataset {
                id: dataset_id,
                name: new.name.clone(),
                site: new.site.clone(),
                status: new.status,
                subscription: new.subscription.clone(),
                locks: new.locks,
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    /// Persist the state, subscription and lock counts of `dataset`
    ///
    /// The write only applies if the stored status is still `previous`;
    /// otherwise `StaleState` is returned and nothing changes.
    pub async fn save(&self, dataset: &Dataset, previous: DatasetStatus) -> Result<()> {
        dataset.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE datasets
            SET status = ?1, subscription = ?2, ok_cnt = ?3, replicating_cnt = ?4, stuck_cnt = ?5,
                updated_at = datetime('now')
            WHERE id = ?6 AND status = ?7
            "#,
        )
        .bind(dataset.status.as_str())
        .bind(&dataset.subscription)
        .bind(to_i64(dataset.locks.ok)?)
        .bind(to_i64(dataset.locks.replicating)?)
        .bind(to_i64(dataset.locks.stuck)?)
        .bind(dataset.id)
        .bind(previous.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::StaleState(dataset.name.clone()));
        }

        Ok(())
    }

    /// Datasets matching `pattern` with their total size and file count
    pub async fn usage(&self, pattern: &str) -> Result<Vec<DatasetUsage>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {}, COALESCE(SUM(f.size), 0) AS total_size, COUNT(f.id) AS file_count \
             FROM datasets d LEFT JOIN files f ON f.dataset_id = d.id",
            DATASET_COLUMNS
        ));
        push_filters(&mut query, pattern, None);
        query.push(" GROUP BY d.id ORDER BY d.id");

        let rows = query.build_query_as::<UsageRow>().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                Ok(DatasetUsage {
                    dataset: Dataset::try_from(row.dataset)?,
                    total_size: to_u64(row.total_size, "total_size")?,
                    file_count: to_u64(row.file_count, "file_count")?,
                })
            })
            .collect()
    }

    /// Dataset count, file count and bytes per status
    pub async fn status_totals(&self) -> Result<Vec<StatusTotals>> {
        let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT d.status, COUNT(DISTINCT d.id), COUNT(f.id), COALESCE(SUM(f.size), 0)
            FROM datasets d LEFT JOIN files f ON f.dataset_id = d.id
            GROUP BY d.status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, datasets, files, size)| {
                Ok(StatusTotals {
                    status: status.parse()?,
                    datasets: to_u64(datasets, "datasets")?,
                    files: to_u64(files, "files")?,
                    total_size: to_u64(size, "size")?,
                })
            })
            .collect()
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, pattern: &str, status: Option<DatasetStatus>) {
    let mut separator = " WHERE ";

    if !pattern.is_empty() {
        query.push(separator).push("d.name GLOB ").push_bind(pattern.to_string());
        separator = " AND ";
    }

    if let Some(status) = status {
        query.push(separator).push("d.status = ").push_bind(status.as_str());
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| EngineError::CorruptRecord(format!("value {} exceeds i64", value)))
}

fn to_u64(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| EngineError::CorruptRecord(format!("negative {}: {}", column, value)))
}

#[derive(sqlx::FromRow)]
struct DatasetRow {
    id: i64,
    name: String,
    site: String,
    subscription: Option<String>,
    status: String,
    ok_cnt: i64,
    replicating_cnt: i64,
    stuck_cnt: i64,
}

impl TryFrom<DatasetRow> for Dataset {
    type Error = EngineError;

    fn try_from(row: DatasetRow) -> Result<Self> {
        Ok(Dataset {
            id: row.id,
            status: row.status.parse()?,
            locks: LockCounts {
                ok: to_u64(row.ok_cnt, "ok_cnt")?,
                replicating: to_u64(row.replicating_cnt, "replicating_cnt")?,
                stuck: to_u64(row.stuck_cnt, "stuck_cnt")?,
            },
            name: row.name,
            site: row.site,
            subscription: row.subscription,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    #[sqlx(flatten)]
    dataset: DatasetRow,
    total_size: i64,
    file_count: i64,
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    dataset_id: i64,
    lfn: String,
    size: i64,
    checksum: i64,
    events: i64,
}

impl TryFrom<FileRow> for File {
    type Error = EngineError;

    fn try_from(row: FileRow) -> Result<Self> {
        let checksum = u32::try_from(row.checksum)
            .map_err(|_| EngineError::CorruptRecord(format!("checksum out of range for '{}'", row.lfn)))?;

        Ok(File {
            id: row.id,
            dataset_id: row.dataset_id,
            size: to_u64(row.size, "size")?,
            checksum: Adler32::new(checksum),
            events: to_u64(row.events, "events")?,
            lfn: row.lfn,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::FileRecord;

    fn file(lfn: &str, size: u64) -> FileRecord {
        FileRecord {
            lfn: lfn.to_string(),
            size,
            checksum: Adler32::new(0x1234_abcd),
            events: 100,
        }
    }

    fn new_dataset(name: &str, files: &[(&str, u64)]) -> NewDataset {
        NewDataset::new(
            name,
            "T2_CH_CERN",
            files.iter().map(|(lfn, size)| file(lfn, *size)).collect(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = Repository::in_memory().await.unwrap();
        let stored = repo
            .insert_batch(&[new_dataset("Run2016A", &[("/store/a/1.root", 10), ("/store/a/2.root", 20)])])
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);

        let ds = repo.find_by_name("Run2016A").await.unwrap().unwrap();
        assert_eq!(ds.status, DatasetStatus::New);
        assert_eq!(ds.subscription, None);

        let files = repo.files(ds.id).await.unwrap();
        let lfns: Vec<_> = files.iter().map(|f| f.lfn.as_str()).collect();
        assert_eq!(lfns, vec!["/store/a/1.root", "/store/a/2.root"]);
        assert_eq!(files[0].checksum, Adler32::new(0x1234_abcd));

        assert!(repo.find_by_name("Run2016B").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_glob_filter() {
        let repo = Repository::in_memory().await.unwrap();
        repo.insert_batch(&[
            new_dataset("Run2016A", &[("/store/1.root", 1)]),
            new_dataset("Run2016B", &[("/store/2.root", 1)]),
            new_dataset("Run2017B", &[("/store/3.root", 1)]),
        ])
        .await
        .unwrap();

        let names = |v: Vec<Dataset>| v.into_iter().map(|d| d.name).collect::<Vec<_>>();

        assert_eq!(names(repo.find("", None).await.unwrap()).len(), 3);
        assert_eq!(names(repo.find("Run2016*", None).await.unwrap()), vec!["Run2016A", "Run2016B"]);
        assert_eq!(names(repo.find("Run201?B", None).await.unwrap()), vec!["Run2016B", "Run2017B"]);
        assert_eq!(names(repo.find("Run2016[A]", None).await.unwrap()), vec!["Run2016A"]);
        assert!(repo.find("run2016*", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let repo = Repository::in_memory().await.unwrap();

        // Same lfn in two datasets violates the unique index on files.lfn
        let result = repo
            .insert_batch(&[
                new_dataset("DS1", &[("/store/shared.root", 1)]),
                new_dataset("DS2", &[("/store/shared.root", 1)]),
            ])
            .await;

        assert!(matches!(result, Err(EngineError::Persistence(_))));
        assert!(repo.find("", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dataset_is_refused() {
        let repo = Repository::in_memory().await.unwrap();
        let result = repo.insert_batch(&[new_dataset("DS1", &[])]).await;
        assert!(matches!(result, Err(EngineError::EmptyDataset(_))));
    }

    #[tokio::test]
    async fn test_save_is_compare_and_set() {
        let repo = Repository::in_memory().await.unwrap();
        repo.insert_batch(&[new_dataset("DS1", &[("/store/1.root", 1)])])
            .await
            .unwrap();

        let mut ds = repo.find_by_name("DS1").await.unwrap().unwrap();
        ds.subscribe("R1").unwrap();
        repo.save(&ds, DatasetStatus::New).await.unwrap();

        // A second writer still holding the old state loses
        let mut stale = ds.clone();
        stale.status = DatasetStatus::New;
        stale.mark_error().unwrap();
        let result = repo.save(&stale, DatasetStatus::New).await;
        assert!(matches!(result, Err(EngineError::StaleState(_))));

        let stored = repo.find_by_name("DS1").await.unwrap().unwrap();
        assert_eq!(stored.status, DatasetStatus::Subscribed);
        assert_eq!(stored.subscription.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_usage_and_totals() {
        let repo = Repository::in_memory().await.unwrap();
        repo.insert_batch(&[
            new_dataset("DS1", &[("/store/1.root", 10), ("/store/2.root", 20), ("/store/3.root", 30)]),
            new_dataset("DS2", &[("/store/4.root", 5)]),
        ])
        .await
        .unwrap();

        let usage = repo.usage("DS1").await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].total_size, 60);
        assert_eq!(usage[0].file_count, 3);

        let totals = repo.status_totals().await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].status, DatasetStatus::New);
        assert_eq!(totals[0].datasets, 2);
        assert_eq!(totals[0].files, 4);
        assert_eq!(totals[0].total_size, 65);
    }
}
