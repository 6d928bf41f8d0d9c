//! Daily audit log appender

use crate::audit::daily_log::{daily_log_key, AuditRecord, DailyLog};
use crate::audit::store::{ObjectStore, Precondition};
use crate::config::{AppendStrategy, AuditConfig, CorruptLogPolicy};
use crate::error::{AuditError, StoreError};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Object key of the day log
    pub key: String,
    /// Data rows in the log after the append
    pub rows: usize,
    /// Fetch/write cycles used
    pub attempts: u32,
    /// Whether this append wrote a fresh header
    pub created: bool,
}

/// Appends audit records to one log object per calendar day.
///
/// Every append rewrites the whole day log. With
/// [`AppendStrategy::Overwrite`] two concurrent appends that fetched the same
/// state lose one row; [`AppendStrategy::Conditional`] writes only if the log
/// is unchanged since the fetch and retries otherwise.
pub struct AuditLogAppender {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    strategy: AppendStrategy,
    max_attempts: u32,
    corrupt_log_policy: CorruptLogPolicy,
}

impl AuditLogAppender {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            strategy: AppendStrategy::default(),
            max_attempts: 5,
            corrupt_log_policy: CorruptLogPolicy::default(),
        }
    }

    pub fn from_config(store: Arc<dyn ObjectStore>, config: &AuditConfig) -> Self {
        Self::new(store, config.prefix.clone())
            .with_strategy(config.strategy)
            .with_max_attempts(config.max_attempts)
            .with_corrupt_log_policy(config.corrupt_log_policy)
    }

    pub fn with_strategy(mut self, strategy: AppendStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_corrupt_log_policy(mut self, policy: CorruptLogPolicy) -> Self {
        self.corrupt_log_policy = policy;
        self
    }

    pub fn strategy(&self) -> AppendStrategy {
        self.strategy
    }

    /// Object key of the log for `date`
    pub fn key_for(&self, date: NaiveDate) -> String {
        daily_log_key(&self.prefix, date)
    }

    /// Append `record` to the log of `date`.
    pub fn append(&self, date: NaiveDate, record: &AuditRecord) -> Result<AppendOutcome, AuditError> {
        let key = self.key_for(date);

        match self.strategy {
            AppendStrategy::Overwrite => {
                let (log, _, created) = self.prepare(&key, record)?;
                self.store.put(&key, &log.render())?;
                Ok(AppendOutcome {
                    key,
                    rows: log.rows().len(),
                    attempts: 1,
                    created,
                })
            }
            AppendStrategy::Conditional => {
                for attempt in 1..=self.max_attempts {
                    let (log, precondition, created) = self.prepare(&key, record)?;
                    match self.store.put_if(&key, &log.render(), &precondition) {
                        Ok(_) => {
                            return Ok(AppendOutcome {
                                key,
                                rows: log.rows().len(),
                                attempts: attempt,
                                created,
                            })
                        }
                        Err(StoreError::PreconditionFailed { .. }) => {
                            debug!(key = %key, attempt = attempt, "Audit log changed during append, retrying");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }

                Err(AuditError::AppendConflict {
                    key,
                    attempts: self.max_attempts,
                })
            }
        }
    }

    /// Fetch the current log of `date`, if any.
    pub fn read(&self, date: NaiveDate) -> Result<Option<DailyLog>, AuditError> {
        let key = self.key_for(date);
        match self.store.get(&key)? {
            Some(object) => Ok(Some(DailyLog::parse(&key, &object.body)?)),
            None => Ok(None),
        }
    }

    /// Fetch the day log and add `record` to it.
    fn prepare(
        &self,
        key: &str,
        record: &AuditRecord,
    ) -> Result<(DailyLog, Precondition, bool), AuditError> {
        let (mut log, precondition, created) = match self.store.get(key)? {
            None => (DailyLog::create(record), Precondition::Absent, true),
            Some(object) => match DailyLog::parse(key, &object.body) {
                Ok(log) => (log, Precondition::Version(object.version), false),
                Err(AuditError::CorruptLog { .. })
                    if self.corrupt_log_policy == CorruptLogPolicy::StartFresh =>
                {
                    warn!(key = %key, "Audit log is empty, starting a fresh log");
                    (
                        DailyLog::create(record),
                        Precondition::Version(object.version),
                        true,
                    )
                }
                Err(e) => return Err(e),
            },
        };

        log.push(record);
        Ok((log, precondition, created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::store::{MemoryObjectStore, StoredObject};
    use crate::types::record::InputRecord;
    use chrono::NaiveDateTime;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    const PREFIX: &str = "credit-score-real-data";

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn at() -> NaiveDateTime {
        day().and_hms_opt(9, 30, 0).unwrap()
    }

    fn record(age: i64) -> AuditRecord {
        let input: InputRecord =
            serde_json::from_value(json!({"Age": age, "Annual_Income": 1000.5})).unwrap();
        AuditRecord::new(&input, 600.0, at(), "v1")
    }

    fn appender(store: Arc<dyn ObjectStore>, strategy: AppendStrategy) -> AuditLogAppender {
        AuditLogAppender::new(store, PREFIX).with_strategy(strategy)
    }

    /// Holds the first two fetches until both have happened
    struct GatedStore {
        inner: MemoryObjectStore,
        barrier: Barrier,
        gets: AtomicUsize,
    }

    impl GatedStore {
        fn new(inner: MemoryObjectStore) -> Self {
            Self {
                inner,
                barrier: Barrier::new(2),
                gets: AtomicUsize::new(0),
            }
        }
    }

    impl ObjectStore for GatedStore {
        fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
            let fetched = self.inner.get(key);
            if self.gets.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait();
            }
            fetched
        }

        fn put(&self, key: &str, body: &str) -> Result<String, StoreError> {
            self.inner.put(key, body)
        }

        fn put_if(
            &self,
            key: &str,
            body: &str,
            precondition: &Precondition,
        ) -> Result<String, StoreError> {
            self.inner.put_if(key, body, precondition)
        }
    }

    /// Store whose writes always fail with an I/O error
    struct BrokenStore;

    impl ObjectStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<StoredObject>, StoreError> {
            Ok(None)
        }

        fn put(&self, _key: &str, _body: &str) -> Result<String, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        fn put_if(
            &self,
            key: &str,
            body: &str,
            _precondition: &Precondition,
        ) -> Result<String, StoreError> {
            self.put(key, body)
        }
    }

    #[test]
    fn test_first_write_creates_header() {
        let store = Arc::new(MemoryObjectStore::new());
        let appender = appender(store.clone(), AppendStrategy::Conditional);

        let outcome = appender.append(day(), &record(30)).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.rows, 1);

        let log = appender.read(day()).unwrap().unwrap();
        assert_eq!(
            log.header(),
            "Age,Annual_Income,credit_score_prediction,timestamp,model_version"
        );
        assert_eq!(log.rows(), ["30,1000.5,600.0,01-06-2025 09:30,v1"]);
    }

    #[test]
    fn test_subsequent_write_keeps_prior_rows() {
        for strategy in [AppendStrategy::Overwrite, AppendStrategy::Conditional] {
            let store = Arc::new(MemoryObjectStore::new());
            let appender = appender(store.clone(), strategy);
            for age in 20..23 {
                appender.append(day(), &record(age)).unwrap();
            }
            let before = appender.read(day()).unwrap().unwrap();

            let outcome = appender.append(day(), &record(40)).unwrap();
            assert!(!outcome.created);

            let after = appender.read(day()).unwrap().unwrap();
            assert_eq!(after.rows().len(), before.rows().len() + 1);
            assert_eq!(&after.rows()[..3], before.rows());
            assert_eq!(after.header(), before.header());
        }
    }

    #[test]
    fn test_read_returns_written_content() {
        let store = Arc::new(MemoryObjectStore::new());
        let appender = appender(store.clone(), AppendStrategy::Conditional);
        appender.append(day(), &record(30)).unwrap();
        appender.append(day(), &record(31)).unwrap();

        let stored = store.get(&appender.key_for(day())).unwrap().unwrap();
        let log = appender.read(day()).unwrap().unwrap();
        assert_eq!(log.render(), stored.body);
    }

    #[test]
    fn test_logs_are_per_day() {
        let store = Arc::new(MemoryObjectStore::new());
        let appender = appender(store.clone(), AppendStrategy::Conditional);
        let next_day = day().succ_opt().unwrap();

        appender.append(day(), &record(30)).unwrap();
        let outcome = appender.append(next_day, &record(31)).unwrap();

        assert!(outcome.created);
        assert!(outcome.key.contains("2025-06-02"));
        assert_eq!(appender.read(day()).unwrap().unwrap().rows().len(), 1);
    }

    #[test]
    fn test_corrupt_log_fails_by_default() {
        let store = Arc::new(MemoryObjectStore::new());
        let appender = appender(store.clone(), AppendStrategy::Conditional);
        store.put(&appender.key_for(day()), "").unwrap();

        let err = appender.append(day(), &record(30)).unwrap_err();
        assert!(matches!(err, AuditError::CorruptLog { .. }));
        assert_eq!(store.get(&appender.key_for(day())).unwrap().unwrap().body, "");
    }

    #[test]
    fn test_corrupt_log_start_fresh() {
        let store = Arc::new(MemoryObjectStore::new());
        let appender = appender(store.clone(), AppendStrategy::Conditional)
            .with_corrupt_log_policy(CorruptLogPolicy::StartFresh);
        store.put(&appender.key_for(day()), "").unwrap();

        let outcome = appender.append(day(), &record(30)).unwrap();
        assert!(outcome.created);

        let log = appender.read(day()).unwrap().unwrap();
        assert_eq!(log.rows().len(), 1);
        assert!(log.header().starts_with("Age,"));
    }

    #[test]
    fn test_storage_failure_propagates() {
        let appender = appender(Arc::new(BrokenStore), AppendStrategy::Overwrite);
        let err = appender.append(day(), &record(30)).unwrap_err();
        assert!(matches!(err, AuditError::Storage(StoreError::Io(_))));
    }

    fn race(strategy: AppendStrategy) -> DailyLog {
        let seed = MemoryObjectStore::new();
        let seeded = appender(Arc::new(MemoryObjectStore::new()), strategy);
        seed.put(
            &seeded.key_for(day()),
            "Age,Annual_Income,credit_score_prediction,timestamp,model_version\n1,1.5,1.0,01-06-2025 09:00,v1",
        )
        .unwrap();

        let store: Arc<dyn ObjectStore> = Arc::new(GatedStore::new(seed));
        let appender = appender(store, strategy);

        std::thread::scope(|s| {
            s.spawn(|| appender.append(day(), &record(50)).unwrap());
            s.spawn(|| appender.append(day(), &record(60)).unwrap());
        });

        appender.read(day()).unwrap().unwrap()
    }

    #[test]
    fn test_overwrite_race_loses_a_row() {
        let log = race(AppendStrategy::Overwrite);
        assert_eq!(log.rows().len(), 2);
        assert!(log.rows()[0].starts_with("1,"));

        let new_rows = log.rows()[1..]
            .iter()
            .filter(|row| row.starts_with("50,") || row.starts_with("60,"))
            .count();
        assert_eq!(new_rows, 1);
    }

    #[test]
    fn test_conditional_race_keeps_both_rows() {
        let log = race(AppendStrategy::Conditional);
        assert_eq!(log.rows().len(), 3);
        assert!(log.rows().iter().any(|row| row.starts_with("50,")));
        assert!(log.rows().iter().any(|row| row.starts_with("60,")));
    }

    #[test]
    fn test_conditional_gives_up_after_max_attempts() {
        /// Every conditional write loses
        struct ContendedStore(MemoryObjectStore);

        impl ObjectStore for ContendedStore {
            fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
                self.0.get(key)
            }

            fn put(&self, key: &str, body: &str) -> Result<String, StoreError> {
                self.0.put(key, body)
            }

            fn put_if(
                &self,
                key: &str,
                _body: &str,
                _precondition: &Precondition,
            ) -> Result<String, StoreError> {
                Err(StoreError::PreconditionFailed {
                    key: key.to_string(),
                })
            }
        }

        let appender = appender(
            Arc::new(ContendedStore(MemoryObjectStore::new())),
            AppendStrategy::Conditional,
        )
        .with_max_attempts(3);

        let err = appender.append(day(), &record(30)).unwrap_err();
        assert!(matches!(err, AuditError::AppendConflict { attempts: 3, .. }));
    }
}
