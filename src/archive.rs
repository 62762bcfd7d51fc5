//! The menu archive: reconciles parsed canteen results into the database and carries
//! the crowd feedback on top of it.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, ErrorCode};

use crate::config::Thresholds;
use crate::data_types::{
    AmbiguousServing, CanteenResult, CrowdSubmission, Diet, Dish, NamedServing, Notification,
    OpeningTimes, ReconcileReport, ServingStatus,
};
use crate::db_operations::*;
use crate::errors::{ArchiveError, UserActionError};
use crate::fuzzy::token_sort_ratio;

pub struct Archive {
    conn: Connection,
    thresholds: Thresholds,
}

impl Archive {
    pub fn new(conn: Connection, thresholds: Thresholds) -> Result<Self, ArchiveError> {
        check_or_create_db_tables(&conn)?;
        Ok(Self { conn, thresholds })
    }

    pub fn open(path: &Path, thresholds: Thresholds) -> Result<Self, ArchiveError> {
        log::info!("Opening archive at {}", path.display());
        Self::new(Connection::open(path)?, thresholds)
    }

    pub fn open_in_memory(thresholds: Thresholds) -> Result<Self, ArchiveError> {
        Self::new(Connection::open_in_memory()?, thresholds)
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Stores one canteen's parsed result. Nothing is written unless every step succeeds.
    pub fn store_canteen_result(
        &mut self,
        canteen_name: &str,
        result: &CanteenResult,
    ) -> Result<ReconcileReport, ArchiveError> {
        self.reconcile_at(canteen_name, result, Utc::now())
    }

    pub(crate) fn reconcile_at(
        &mut self,
        canteen_name: &str,
        result: &CanteenResult,
        now: DateTime<Utc>,
    ) -> Result<ReconcileReport, ArchiveError> {
        let start = Instant::now();
        let min_ratio = self.thresholds.fuzzy_min_ratio;
        let tx = self.conn.transaction()?;
        let mut report = ReconcileReport::new(canteen_name);

        let canteen_id = get_or_create_canteen(&tx, canteen_name)?;
        for (weekday, (opens, closes)) in &result.opening_times {
            upsert_opening_time(&tx, canteen_id, *weekday, *opens, *closes)?;
        }

        let mut ambiguous_ids = BTreeSet::new();
        for draft in &result.servings {
            let (dish_id, created) = resolve_dish(&tx, &draft.title, draft.diet(), min_ratio)?;
            if created {
                report.new_dishes += 1;
            }

            match find_servings(&tx, draft.day, canteen_id, dish_id)?.as_slice() {
                [] => {
                    insert_serving(
                        &tx,
                        &NewServing {
                            day: draft.day,
                            canteen_id,
                            dish_id,
                            price: draft.price,
                            price_staff: draft.price_staff,
                            allergens: &draft.allergens,
                            official: true,
                            last_updated: now,
                        },
                    )?;
                    report.created += 1;
                }
                [id] => {
                    touch_official_serving(
                        &tx,
                        *id,
                        draft.price,
                        draft.price_staff,
                        &draft.allergens,
                        now,
                    )?;
                    report.updated += 1;
                }
                ids => {
                    log::warn!(
                        "{}: '{}' on {} matches {} servings ({:?}), leaving them untouched",
                        canteen_name,
                        draft.title,
                        draft.day,
                        ids.len(),
                        ids
                    );
                    ambiguous_ids.extend(ids.iter().copied());
                    report.ambiguous.push(AmbiguousServing {
                        day: draft.day,
                        title: draft.title.clone(),
                        dish_id,
                        serving_ids: ids.to_vec(),
                    });
                }
            }
        }

        // official servings that vanished from a day we just saw
        for day in result.days() {
            for id in stale_official_servings(&tx, day, canteen_id, now)? {
                if ambiguous_ids.contains(&id) {
                    continue;
                }
                mark_officially_deprecated(&tx, id)?;
                report.newly_deprecated += 1;
            }
        }

        tx.commit()?;

        log::info!(
            "{}: {} new, {} updated, {} deprecated, {} new dishes ({:.2?})",
            canteen_name,
            report.created,
            report.updated,
            report.newly_deprecated,
            report.new_dishes,
            start.elapsed()
        );
        Ok(report)
    }

    // crowd feedback

    /// Adds a serving seen by a user. Dish matching works as for official results.
    pub fn submit_serving(&mut self, submission: &CrowdSubmission) -> Result<i64, UserActionError> {
        let min_ratio = self.thresholds.fuzzy_min_ratio;
        let tx = self.conn.transaction()?;

        if get_canteen(&tx, submission.canteen_id)?.is_none() {
            return Err(UserActionError::CanteenNotFound(submission.canteen_id));
        }

        let diet = Diet {
            vegetarian: submission.vegetarian,
            vegan: false,
        };
        let (dish_id, _) = resolve_dish(&tx, &submission.title, diet, min_ratio)?;
        if let Some(existing) = find_servings(&tx, submission.day, submission.canteen_id, dish_id)?
            .first()
        {
            return Err(UserActionError::AlreadyListed(*existing));
        }

        let serving_id = insert_serving(
            &tx,
            &NewServing {
                day: submission.day,
                canteen_id: submission.canteen_id,
                dish_id,
                price: submission.price,
                price_staff: submission.price_staff,
                allergens: &BTreeSet::new(),
                official: false,
                last_updated: Utc::now(),
            },
        )?;
        tx.commit()?;

        log::info!(
            "Crowd serving {} '{}' at canteen {} on {}",
            serving_id,
            submission.title,
            submission.canteen_id,
            submission.day
        );
        Ok(serving_id)
    }

    pub fn report_deprecation(&mut self, serving_id: i64, user_id: i64) -> Result<(), UserActionError> {
        self.require_serving(serving_id)?;
        insert_deprecation_report(&self.conn, serving_id, user_id, Utc::now()).map_err(|e| {
            if is_constraint_violation(&e) {
                UserActionError::AlreadyReported
            } else {
                e.into()
            }
        })
    }

    pub fn verify_serving(&mut self, serving_id: i64, user_id: i64) -> Result<(), UserActionError> {
        self.require_serving(serving_id)?;
        insert_verification(&self.conn, serving_id, user_id, Utc::now()).map_err(|e| {
            if is_constraint_violation(&e) {
                UserActionError::AlreadyVerified
            } else {
                e.into()
            }
        })
    }

    pub fn rate_serving(
        &mut self,
        serving_id: i64,
        user_id: i64,
        rating: u8,
    ) -> Result<(), UserActionError> {
        if !(1..=5).contains(&rating) {
            return Err(UserActionError::InvalidRating(rating));
        }

        let limit = self.thresholds.rating_daily_limit;
        let tx = self.conn.transaction()?;
        let serving =
            get_serving(&tx, serving_id)?.ok_or(UserActionError::ServingNotFound(serving_id))?;

        if has_rated(&tx, user_id, serving_id)? {
            return Err(UserActionError::AlreadyRated);
        }
        if count_ratings_for_day(&tx, user_id, serving.day)? >= limit {
            return Err(UserActionError::RatingLimitReached);
        }

        insert_rating(&tx, user_id, serving_id, rating)?;
        tx.commit()?;

        Ok(())
    }

    fn require_serving(&self, serving_id: i64) -> Result<(), UserActionError> {
        match get_serving(&self.conn, serving_id)? {
            Some(_) => Ok(()),
            None => Err(UserActionError::ServingNotFound(serving_id)),
        }
    }

    // read side

    pub fn serving_status(&self, serving_id: i64) -> Result<Option<ServingStatus>, ArchiveError> {
        let Some(serving) = get_serving(&self.conn, serving_id)? else {
            return Ok(None);
        };
        let dish_name = get_dish(&self.conn, serving.dish_id)?
            .map(|d| d.name)
            .unwrap_or_default();
        let canteen_name = get_canteen(&self.conn, serving.canteen_id)?
            .map(|c| c.name)
            .unwrap_or_default();

        Ok(Some(self.status_of(NamedServing {
            serving,
            dish_name,
            canteen_name,
        })?))
    }

    /// Everything served on a day, grouped by canteen, still available dishes first.
    pub fn servings_for_day(&self, day: NaiveDate) -> Result<Vec<ServingStatus>, ArchiveError> {
        let mut listing = servings_with_names(&self.conn, day, false)?
            .into_iter()
            .map(|named| self.status_of(named))
            .collect::<rusqlite::Result<Vec<_>>>()?;

        listing.sort_by(|a, b| {
            (&a.canteen_name, a.deprecated, &a.dish_name).cmp(&(
                &b.canteen_name,
                b.deprecated,
                &b.dish_name,
            ))
        });
        Ok(listing)
    }

    fn status_of(&self, named: NamedServing) -> rusqlite::Result<ServingStatus> {
        let (verifications, deprecation_reports, average_rating, rating_count) =
            serving_counters(&self.conn, named.serving.id)?;
        let min_reports = self.thresholds.min_reports;

        Ok(ServingStatus {
            verified: named.serving.official || verifications >= min_reports,
            deprecated: named.serving.officially_deprecated || deprecation_reports >= min_reports,
            serving: named.serving,
            dish_name: named.dish_name,
            canteen_name: named.canteen_name,
            verifications,
            deprecation_reports,
            average_rating,
            rating_count,
        })
    }

    /// When the archive last saw a serving, official or not.
    pub fn last_updated(&self) -> Result<Option<DateTime<Utc>>, ArchiveError> {
        Ok(last_updated(&self.conn)?)
    }

    pub fn most_frequent_dishes(&self, limit: usize) -> Result<Vec<(Dish, u32)>, ArchiveError> {
        Ok(most_frequent_dishes(&self.conn, limit)?)
    }

    pub fn canteen_id(&self, name: &str) -> Result<Option<i64>, ArchiveError> {
        Ok(get_canteen_by_name(&self.conn, name)?.map(|c| c.id))
    }

    /// Unknown canteens count as active; they are created on first store.
    pub fn canteen_is_active(&self, name: &str) -> Result<bool, ArchiveError> {
        Ok(get_canteen_by_name(&self.conn, name)?.map_or(true, |c| c.active))
    }

    /// Returns false if no canteen has this name.
    pub fn set_canteen_active(&mut self, name: &str, active: bool) -> Result<bool, ArchiveError> {
        let changed = set_canteen_active(&self.conn, name, active)? > 0;
        if changed {
            log::info!("Canteen '{}' active: {}", name, active);
        }
        Ok(changed)
    }

    pub fn opening_times(&self, canteen_name: &str) -> Result<Option<OpeningTimes>, ArchiveError> {
        match get_canteen_by_name(&self.conn, canteen_name)? {
            Some(canteen) => Ok(Some(get_opening_times(&self.conn, canteen.id)?)),
            None => Ok(None),
        }
    }

    // notifications

    pub fn add_notification(
        &mut self,
        user_id: i64,
        email: &str,
        pattern: &str,
    ) -> Result<i64, ArchiveError> {
        Ok(insert_notification(&self.conn, user_id, email, pattern)?)
    }

    pub fn set_notification_active(&mut self, id: i64, active: bool) -> Result<bool, ArchiveError> {
        Ok(set_notification_active(&self.conn, id, active)? > 0)
    }

    pub fn notification(&self, id: i64) -> Result<Option<Notification>, ArchiveError> {
        Ok(get_notification(&self.conn, id)?)
    }

    pub fn active_notifications(&self) -> Result<Vec<Notification>, ArchiveError> {
        Ok(active_notifications(&self.conn)?)
    }

    pub fn unnotified_servings(&self, day: NaiveDate) -> Result<Vec<NamedServing>, ArchiveError> {
        Ok(servings_with_names(&self.conn, day, true)?)
    }

    /// Closes a notification pass: scanned servings are never matched again and
    /// patterns that reached someone get their timestamp.
    pub fn finish_notification_pass(
        &mut self,
        scanned_servings: &[i64],
        notified_patterns: &[i64],
        now: DateTime<Utc>,
    ) -> Result<(), ArchiveError> {
        let tx = self.conn.transaction()?;
        mark_servings_notified(&tx, scanned_servings)?;
        set_last_notified(&tx, notified_patterns, now)?;
        tx.commit()?;

        Ok(())
    }
}

/// Finds the dish a title refers to, creating it when nothing is similar enough.
///
/// Candidates share the vegetarian/vegan flags and are tried in ascending id order.
/// The first one reaching `min_ratio` wins, even if a later one would score higher.
/// Stored names never change, so titles merged once stay merged.
fn resolve_dish(
    conn: &Connection,
    title: &str,
    diet: Diet,
    min_ratio: u8,
) -> rusqlite::Result<(i64, bool)> {
    let found = dishes_in_class(conn, diet)?
        .into_iter()
        .find(|dish| token_sort_ratio(title, &dish.name) >= min_ratio);

    match found {
        Some(dish) => Ok((dish.id, false)),
        None => {
            let id = insert_dish(conn, title, diet)?;
            log::debug!("New dish {} '{}'", id, title);
            Ok((id, true))
        }
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}
