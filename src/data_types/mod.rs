pub mod stwhh_data_types;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// ISO weekday (1 = Monday .. 7 = Sunday) -> (opens, closes)
pub type OpeningTimes = BTreeMap<u32, (NaiveTime, NaiveTime)>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Diet {
    pub vegetarian: bool,
    pub vegan: bool,
}

/// One serving as extracted from an upstream page, before reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ServingDraft {
    pub day: NaiveDate,
    pub title: String,
    pub price: Decimal,
    pub price_staff: Decimal,
    pub vegetarian: bool,
    pub vegan: bool,
    pub allergens: BTreeSet<String>,
}

impl ServingDraft {
    pub fn diet(&self) -> Diet {
        Diet {
            vegetarian: self.vegetarian,
            vegan: self.vegan,
        }
    }
}

/// Everything one source parser produced for one canteen. Handed to the archive as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanteenResult {
    pub opening_times: OpeningTimes,
    pub servings: Vec<ServingDraft>,
}

impl CanteenResult {
    pub fn new(opening_times: OpeningTimes, servings: Vec<ServingDraft>) -> Self {
        Self {
            opening_times,
            servings,
        }
    }

    pub fn days(&self) -> BTreeSet<NaiveDate> {
        self.servings.iter().map(|s| s.day).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Canteen {
    pub id: i64,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dish {
    pub id: i64,
    pub name: String,
    pub vegetarian: bool,
    pub vegan: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Serving {
    pub id: i64,
    pub day: NaiveDate,
    pub canteen_id: i64,
    pub dish_id: i64,
    pub price: Decimal,
    pub price_staff: Decimal,
    pub allergens: BTreeSet<String>,
    pub official: bool,
    pub officially_deprecated: bool,
    pub last_updated: DateTime<Utc>,
    pub notified: bool,
}

/// A serving together with the names it is listed under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedServing {
    pub serving: Serving,
    pub dish_name: String,
    pub canteen_name: String,
}

/// A serving joined with the counters that decide its user-facing state.
#[derive(Debug, Clone, PartialEq)]
pub struct ServingStatus {
    pub serving: Serving,
    pub dish_name: String,
    pub canteen_name: String,
    pub verifications: u32,
    pub deprecation_reports: u32,
    pub average_rating: Option<f64>,
    pub rating_count: u32,
    pub verified: bool,
    pub deprecated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub pattern: String,
    pub active: bool,
    pub last_notified: Option<DateTime<Utc>>,
}

/// Crowd-submitted serving, coming from the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CrowdSubmission {
    pub canteen_id: i64,
    pub day: NaiveDate,
    pub title: String,
    pub vegetarian: bool,
    pub price: Decimal,
    pub price_staff: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousServing {
    pub day: NaiveDate,
    pub title: String,
    pub dish_id: i64,
    pub serving_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub canteen: String,
    pub created: usize,
    pub updated: usize,
    pub newly_deprecated: usize,
    pub new_dishes: usize,
    pub ambiguous: Vec<AmbiguousServing>,
}

impl ReconcileReport {
    pub fn new(canteen: &str) -> Self {
        Self {
            canteen: canteen.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub notification_id: i64,
    pub serving_id: i64,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationReport {
    pub scanned: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedCanteen {
    pub canteen: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub reconciled: Vec<ReconcileReport>,
    pub skipped_inactive: Vec<String>,
    pub failed: Vec<FailedCanteen>,
    pub notifications: Option<NotificationReport>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            reconciled: Vec::new(),
            skipped_inactive: Vec::new(),
            failed: Vec::new(),
            notifications: None,
        }
    }

    pub fn is_partial_failure(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
