//! Daily health log record

use super::{validate_user_id, Collection, RecordKey, Syncable};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

pub const MAX_NOTES_LEN: usize = 2000;
pub const BBT_CELSIUS_MIN: f64 = 35.0;
pub const BBT_CELSIUS_MAX: f64 = 42.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodFlow {
    Spotting,
    Light,
    Medium,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Symptom {
    Cramps,
    Headache,
    Bloating,
    BreastTenderness,
    Acne,
    Fatigue,
    Backache,
    Nausea,
    Cravings,
    Insomnia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    Happy,
    Calm,
    Sad,
    Anxious,
    Irritable,
    Energetic,
    Tired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CervicalMucus {
    Dry,
    Sticky,
    Creamy,
    Watery,
    EggWhite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OvulationTestResult {
    Negative,
    Positive,
    Peak,
    NotTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Protection {
    Condom,
    Pill,
    Iud,
    Withdrawal,
    Unprotected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SexualActivity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection: Option<Protection>,
}

/// `null`, a missing field and `[]` all read back as the empty set.
fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeSet<Symptom>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<Symptom>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    /// `YYYY-MM-DD` of `date`
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_flow: Option<PeriodFlow>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub symptoms: BTreeSet<Symptom>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    /// Basal body temperature in °C
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cervical_mucus: Option<CervicalMucus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovulation_test: Option<OvulationTestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sexual_activity: Option<SexualActivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Log id for a calendar day.
pub fn log_id_for(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl DailyLog {
    pub const CURRENT_VERSION: u32 = 1;

    /// Empty log for a day.
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: log_id_for(date),
            user_id: user_id.into(),
            date,
            period_flow: None,
            symptoms: BTreeSet::new(),
            mood: None,
            bbt: None,
            cervical_mucus: None,
            ovulation_test: None,
            sexual_activity: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Nothing recorded besides the day itself.
    pub fn is_empty(&self) -> bool {
        self.period_flow.is_none()
            && self.symptoms.is_empty()
            && self.mood.is_none()
            && self.bbt.is_none()
            && self.cervical_mucus.is_none()
            && self.ovulation_test.is_none()
            && self.sexual_activity.is_none()
            && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
    }
}

impl Syncable for DailyLog {
    const COLLECTION: Collection = Collection::DailyLogs;

    fn key(&self) -> RecordKey {
        RecordKey::new(self.user_id.clone(), self.id.clone())
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn set_last_modified(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    // Logs are always entered by hand
    fn is_manual(&self) -> bool {
        true
    }

    fn schema_version(&self) -> u32 {
        Self::CURRENT_VERSION
    }

    fn validate(&self) -> SyncResult<()> {
        validate_user_id(&self.user_id)?;
        if self.id != log_id_for(self.date) {
            return Err(SyncError::validation(format!(
                "log id {} does not match date {}",
                self.id, self.date
            )));
        }
        if let Some(bbt) = self.bbt {
            if !(BBT_CELSIUS_MIN..=BBT_CELSIUS_MAX).contains(&bbt) {
                return Err(SyncError::validation(format!(
                    "bbt must be between {} and {} °C, got {}",
                    BBT_CELSIUS_MIN, BBT_CELSIUS_MAX, bbt
                )));
            }
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(SyncError::validation(format!(
                    "notes must be at most {} characters",
                    MAX_NOTES_LEN
                )));
            }
        }
        if self.updated_at < self.created_at {
            return Err(SyncError::validation("updatedAt precedes createdAt"));
        }
        Ok(())
    }
}
