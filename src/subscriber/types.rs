//! Subscription types for threatwire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::article::{Category, Severity};

/// Verification-token lifetime in hours.
pub const VERIFICATION_TOKEN_TTL_HOURS: i64 = 48;

/// Management-link token lifetime in hours.
pub const MANAGEMENT_TOKEN_TTL_HOURS: i64 = 2;

/// Verification axis of the subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationState {
    /// Address not yet confirmed; never receives dispatch.
    Pending,
    /// Address confirmed through the verification link.
    Verified,
}

impl VerificationState {
    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationState::Pending => "pending",
            VerificationState::Verified => "verified",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VerificationState::Pending),
            "verified" => Some(VerificationState::Verified),
            _ => None,
        }
    }
}

/// Activity axis of the subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    /// Eligible for dispatch (subject to verification).
    Active,
    /// Unsubscribed; retained so a resubscribe can reactivate it.
    Inactive,
}

impl ActivityState {
    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Active => "active",
            ActivityState::Inactive => "inactive",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ActivityState::Active),
            "inactive" => Some(ActivityState::Inactive),
            _ => None,
        }
    }
}

/// Delivery cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Evaluated on every critical-alert run, no local-hour matching.
    Immediate,
    /// One digest per day at the preferred local hour.
    Daily,
    /// One digest per week at the preferred local hour and weekday.
    Weekly,
}

impl Frequency {
    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Immediate => "immediate",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }

    /// Parse from the stored string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "immediate" => Some(Frequency::Immediate),
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            _ => None,
        }
    }
}

/// A subscription record.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscription ID.
    pub id: i64,
    /// Contact address, case-normalized; unique.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Category filter; empty = all categories.
    pub categories: Vec<Category>,
    /// Technology filter; empty = no narrowing.
    pub technologies: Vec<String>,
    /// Delivery cadence.
    pub frequency: Frequency,
    /// Minimum severity threshold (inclusive).
    pub min_severity: Severity,
    /// Preferred delivery hour in the subscriber's local time (0-23).
    pub preferred_hour: u8,
    /// Subscriber's UTC offset in minutes; supports half-hour zones.
    pub utc_offset_minutes: i32,
    /// Preferred local weekday (0-6, Sunday=0); weekly cadence only.
    pub preferred_weekday: u8,
    /// Verification axis.
    pub verification: VerificationState,
    /// Activity axis.
    pub activity: ActivityState,
    /// Current single-use token, if one is outstanding.
    pub token: Option<String>,
    /// Token expiry.
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Timestamp of the last successful notification.
    pub last_notified_at: Option<DateTime<Utc>>,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
    /// When the subscription was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether this record may receive dispatch at all.
    pub fn is_deliverable(&self) -> bool {
        self.verification == VerificationState::Verified && self.activity == ActivityState::Active
    }
}

/// New subscription for upsert.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// Contact address; normalized to lowercase on construction.
    pub email: String,
    /// Display name.
    pub name: Option<String>,
    /// Category filter.
    pub categories: Vec<Category>,
    /// Technology filter.
    pub technologies: Vec<String>,
    /// Delivery cadence.
    pub frequency: Frequency,
    /// Minimum severity threshold.
    pub min_severity: Severity,
    /// Preferred local hour (0-23).
    pub preferred_hour: u8,
    /// UTC offset in minutes.
    pub utc_offset_minutes: i32,
    /// Preferred local weekday (0-6, Sunday=0).
    pub preferred_weekday: u8,
    /// Initial verification token.
    pub token: String,
    /// Token expiry.
    pub token_expires_at: DateTime<Utc>,
}

impl NewSubscription {
    /// Create a new subscription with defaults for the optional filters.
    pub fn new(
        email: impl Into<String>,
        frequency: Frequency,
        min_severity: Severity,
        token: impl Into<String>,
        token_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.into().trim().to_lowercase(),
            name: None,
            categories: Vec::new(),
            technologies: Vec::new(),
            frequency,
            min_severity,
            preferred_hour: 9,
            utc_offset_minutes: 0,
            preferred_weekday: 1,
            token: token.into(),
            token_expires_at,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the category filter.
    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    /// Set the technology filter.
    pub fn with_technologies(mut self, technologies: Vec<String>) -> Self {
        self.technologies = technologies;
        self
    }

    /// Set the delivery schedule.
    pub fn with_schedule(mut self, hour: u8, utc_offset_minutes: i32, weekday: u8) -> Self {
        self.preferred_hour = hour;
        self.utc_offset_minutes = utc_offset_minutes;
        self.preferred_weekday = weekday;
        self
    }
}
