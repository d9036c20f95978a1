//! Daily log repository

use super::Repository;
use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::models::{daily_log::log_id_for, Collection, DailyLog, RecordKey, Syncable};
use crate::service::SyncReport;
use chrono::{NaiveDate, SubsecRound};
use std::sync::Arc;

fn log_key(user_id: &str, date: NaiveDate) -> RecordKey {
    RecordKey::new(user_id, log_id_for(date))
}

#[derive(Clone)]
pub struct LogRepository {
    records: Repository<DailyLog>,
}

impl LogRepository {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            records: Repository::new(engine),
        }
    }

    fn engine(&self) -> &Arc<SyncEngine> {
        self.records.engine()
    }

    /// Upsert the log for its day. An existing log keeps its `created_at`.
    pub async fn save_log(&self, log: DailyLog) -> SyncResult<DailyLog> {
        log.validate()?;
        let log = self.carry_created_at(log).await?;
        self.records.save(log).await
    }

    /// Save several days with one remote round trip. Nothing is written
    /// unless every log is valid.
    pub async fn save_logs(&self, logs: Vec<DailyLog>) -> SyncResult<Vec<DailyLog>> {
        for log in &logs {
            log.validate()?;
        }
        let mut prepared = Vec::with_capacity(logs.len());
        for log in logs {
            prepared.push(self.carry_created_at(log).await?);
        }
        self.records.save_many(prepared).await
    }

    async fn carry_created_at(&self, mut log: DailyLog) -> SyncResult<DailyLog> {
        match self.records.get(&log.key()).await? {
            Some(existing) => log.created_at = existing.created_at,
            // Stored timestamps are millisecond-stamped; keep created_at from
            // sorting after the first updated_at
            None => log.created_at = log.created_at.trunc_subsecs(3),
        }
        Ok(log)
    }

    pub async fn get_log(&self, user_id: &str, date: NaiveDate) -> SyncResult<Option<DailyLog>> {
        self.records.get(&log_key(user_id, date)).await
    }

    /// Logs with `start <= date <= end`, oldest first. Falls back to a remote
    /// range query when nothing is stored locally for the window.
    pub async fn logs_in_range(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SyncResult<Vec<DailyLog>> {
        if start > end {
            return Err(SyncError::validation(format!(
                "range start {} is after end {}",
                start, end
            )));
        }

        let mut logs: Vec<DailyLog> = self
            .records
            .list_for_user(user_id)
            .await?
            .into_iter()
            .filter(|log| log.date >= start && log.date <= end)
            .collect();

        if logs.is_empty() {
            logs = self
                .engine()
                .pull_range(
                    Collection::DailyLogs,
                    user_id,
                    &log_id_for(start),
                    &log_id_for(end),
                )
                .await?
                .iter()
                .map(DailyLog::from_document)
                .collect::<SyncResult<_>>()?;
        }

        logs.sort_by_key(|log| log.date);
        Ok(logs)
    }

    /// Most recent local logs, newest first.
    pub async fn recent_logs(&self, user_id: &str, limit: usize) -> SyncResult<Vec<DailyLog>> {
        let mut logs = self.records.list_for_user(user_id).await?;
        logs.sort_by(|a, b| b.date.cmp(&a.date));
        logs.truncate(limit);
        Ok(logs)
    }

    pub async fn delete_log(&self, user_id: &str, date: NaiveDate) -> SyncResult<()> {
        self.records.delete(&log_key(user_id, date)).await
    }

    pub async fn sync_log(&self, user_id: &str, date: NaiveDate) -> SyncResult<SyncOutcome> {
        self.records.sync(&log_key(user_id, date)).await
    }

    /// Reconcile every dirty log of the user; failures are isolated.
    pub async fn retry_failed(&self, user_id: &str) -> SyncResult<SyncReport> {
        if !self.engine().is_online() {
            return Err(SyncError::Network("device is offline".to_string()));
        }
        let mut report = SyncReport::default();
        for key in self.records.dirty_keys(user_id).await? {
            let result = self
                .engine()
                .sync_with_conflict_resolution(Collection::DailyLogs, &key)
                .await;
            report.record(Collection::DailyLogs, &key, result)?;
        }
        Ok(report)
    }
}
