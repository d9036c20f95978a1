//! User settings record and its preference groups

use super::{validate_user_id, Collection, RecordKey, Syncable};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const CYCLE_LENGTH_DAYS: RangeInclusive<u32> = 21..=45;
pub const LUTEAL_PHASE_DAYS: RangeInclusive<u32> = 10..=17;
pub const PERIOD_DURATION_DAYS: RangeInclusive<u32> = 2..=10;
pub const TEXT_SIZE_SCALE: RangeInclusive<f64> = 0.5..=3.0;
pub const REMINDER_DAYS_IN_ADVANCE: RangeInclusive<u32> = 0..=7;

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPreference {
    pub enabled: bool,
    pub time: NaiveTime,
    pub days_in_advance: u32,
}

impl ReminderPreference {
    fn new(enabled: bool, time: NaiveTime, days_in_advance: u32) -> Self {
        Self {
            enabled,
            time,
            days_in_advance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub global_notifications_enabled: bool,
    pub daily_logging_reminder: ReminderPreference,
    pub period_prediction_alert: ReminderPreference,
    pub ovulation_alert: ReminderPreference,
    pub insight_notifications: ReminderPreference,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            global_notifications_enabled: true,
            daily_logging_reminder: ReminderPreference::new(false, at(20, 0), 0),
            period_prediction_alert: ReminderPreference::new(true, at(9, 0), 2),
            ovulation_alert: ReminderPreference::new(false, at(9, 0), 1),
            insight_notifications: ReminderPreference::new(true, at(10, 0), 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclePreferences {
    pub average_cycle_length: u32,
    pub average_luteal_phase_length: u32,
    pub period_duration: u32,
    /// Entered by the user instead of the population defaults
    pub is_customized: bool,
}

impl Default for CyclePreferences {
    fn default() -> Self {
        Self {
            average_cycle_length: 28,
            average_luteal_phase_length: 14,
            period_duration: 5,
            is_customized: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeightUnit {
    #[default]
    Kilograms,
    Pounds,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitPreferences {
    pub temperature_unit: TemperatureUnit,
    pub weight_unit: WeightUnit,
    pub is_manually_set: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyPreferences {
    pub data_sharing_enabled: bool,
    pub anonymous_insights_enabled: bool,
    pub crash_reporting_enabled: bool,
    pub analytics_enabled: bool,
}

impl Default for PrivacyPreferences {
    fn default() -> Self {
        Self {
            data_sharing_enabled: false,
            anonymous_insights_enabled: false,
            crash_reporting_enabled: true,
            analytics_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HapticIntensity {
    Light,
    #[default]
    Medium,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPreferences {
    pub text_size_scale: f64,
    pub high_contrast_mode: bool,
    pub haptic_feedback_enabled: bool,
    pub haptic_intensity: HapticIntensity,
}

impl Default for DisplayPreferences {
    fn default() -> Self {
        Self {
            text_size_scale: 1.0,
            high_contrast_mode: false,
            haptic_feedback_enabled: true,
            haptic_intensity: HapticIntensity::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPreferences {
    pub auto_sync_enabled: bool,
    pub wifi_only_sync: bool,
    pub cloud_backup_enabled: bool,
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            auto_sync_enabled: true,
            wifi_only_sync: false,
            cloud_backup_enabled: true,
        }
    }
}

/// Which groups hold user-chosen values rather than defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationFlags {
    pub cycle_customized: bool,
    pub units_manually_set: bool,
    pub notifications_customized: bool,
    pub display_customized: bool,
    pub privacy_customized: bool,
    pub sync_customized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub user_id: String,
    pub notifications: NotificationPreferences,
    pub cycle: CyclePreferences,
    pub units: UnitPreferences,
    pub privacy: PrivacyPreferences,
    pub display: DisplayPreferences,
    pub sync: SyncPreferences,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
}

impl UserSettings {
    pub const CURRENT_VERSION: u32 = 2;

    /// Factory defaults for a user.
    pub fn defaults(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            notifications: NotificationPreferences::default(),
            cycle: CyclePreferences::default(),
            units: UnitPreferences::default(),
            privacy: PrivacyPreferences::default(),
            display: DisplayPreferences::default(),
            sync: SyncPreferences::default(),
            last_modified: Utc::now(),
            version: Self::CURRENT_VERSION,
        }
    }

    pub fn customization_flags(&self) -> CustomizationFlags {
        CustomizationFlags {
            cycle_customized: self.cycle.is_customized,
            units_manually_set: self.units.is_manually_set,
            notifications_customized: self.notifications != NotificationPreferences::default(),
            display_customized: self.display != DisplayPreferences::default(),
            privacy_customized: self.privacy != PrivacyPreferences::default(),
            sync_customized: self.sync != SyncPreferences::default(),
        }
    }
}

fn check_range<T>(name: &str, value: T, range: &RangeInclusive<T>) -> SyncResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SyncError::validation(format!(
            "{} must be between {} and {}, got {}",
            name,
            range.start(),
            range.end(),
            value
        )))
    }
}

impl Syncable for UserSettings {
    const COLLECTION: Collection = Collection::Settings;

    fn key(&self) -> RecordKey {
        RecordKey::for_user(self.user_id.clone())
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn set_last_modified(&mut self, at: DateTime<Utc>) {
        self.last_modified = at;
    }

    fn is_manual(&self) -> bool {
        self.cycle.is_customized || self.units.is_manually_set
    }

    fn schema_version(&self) -> u32 {
        self.version
    }

    fn validate(&self) -> SyncResult<()> {
        validate_user_id(&self.user_id)?;
        if self.version == 0 || self.version > Self::CURRENT_VERSION {
            return Err(SyncError::validation(format!(
                "unsupported settings version {}",
                self.version
            )));
        }

        check_range("averageCycleLength", self.cycle.average_cycle_length, &CYCLE_LENGTH_DAYS)?;
        check_range(
            "averageLutealPhaseLength",
            self.cycle.average_luteal_phase_length,
            &LUTEAL_PHASE_DAYS,
        )?;
        check_range("periodDuration", self.cycle.period_duration, &PERIOD_DURATION_DAYS)?;
        if self.cycle.average_luteal_phase_length >= self.cycle.average_cycle_length {
            return Err(SyncError::validation(
                "luteal phase must be shorter than the cycle",
            ));
        }

        // NaN fails `contains` and is rejected here too
        check_range("textSizeScale", self.display.text_size_scale, &TEXT_SIZE_SCALE)?;

        let reminders = [
            ("dailyLoggingReminder", &self.notifications.daily_logging_reminder),
            ("periodPredictionAlert", &self.notifications.period_prediction_alert),
            ("ovulationAlert", &self.notifications.ovulation_alert),
            ("insightNotifications", &self.notifications.insight_notifications),
        ];
        for (name, reminder) in reminders {
            check_range(name, reminder.days_in_advance, &REMINDER_DAYS_IN_ADVANCE)?;
        }

        Ok(())
    }
}
