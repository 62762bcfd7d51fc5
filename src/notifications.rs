//! Mails users whose saved search patterns match a dish served today.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::archive::Archive;
use crate::config::Thresholds;
use crate::constants::NOTIFICATION_SUBJECT_PREFIX;
use crate::data_types::{NamedServing, Notification, NotificationReport, PendingNotification};
use crate::errors::ArchiveError;
use crate::fuzzy::partial_token_set_ratio;

/// Outgoing mail. Delivery happens elsewhere; a failed send is not retried.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Writes every message to the log instead of delivering it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        log::info!("Mail to {}: {}", to, subject);
        log::debug!("{}", body);
        Ok(())
    }
}

/// What a notification pass would do, computed without touching the archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationPlan {
    pub scanned_servings: Vec<i64>,
    pub pending: Vec<PendingNotification>,
}

pub struct NotificationMatcher {
    min_ratio: u8,
    mailer: Arc<dyn Mailer>,
}

impl NotificationMatcher {
    pub fn new(thresholds: Thresholds, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            min_ratio: thresholds.fuzzy_min_ratio,
            mailer,
        }
    }

    pub fn plan(&self, archive: &Archive, day: NaiveDate) -> Result<NotificationPlan, ArchiveError> {
        let servings = archive.unnotified_servings(day)?;
        let patterns = archive.active_notifications()?;

        Ok(NotificationPlan {
            scanned_servings: servings.iter().map(|s| s.serving.id).collect(),
            pending: self.match_patterns(&patterns, &servings),
        })
    }

    /// One message per matching (pattern, serving) pair.
    pub fn match_patterns(
        &self,
        patterns: &[Notification],
        servings: &[NamedServing],
    ) -> Vec<PendingNotification> {
        let mut pending = Vec::new();
        for notification in patterns {
            for named in servings {
                if partial_token_set_ratio(&named.dish_name, &notification.pattern) < self.min_ratio
                {
                    continue;
                }
                pending.push(compose(notification, named));
            }
        }
        pending
    }

    /// Plans, sends and records one pass for `day`.
    pub fn run(
        &self,
        archive: &mut Archive,
        day: NaiveDate,
    ) -> Result<NotificationReport, ArchiveError> {
        let plan = self.plan(archive, day)?;
        let mut report = NotificationReport {
            scanned: plan.scanned_servings.len(),
            ..NotificationReport::default()
        };

        let mut reached = BTreeSet::new();
        for message in &plan.pending {
            match self.mailer.send(&message.to, &message.subject, &message.body) {
                Ok(()) => {
                    report.sent += 1;
                    reached.insert(message.notification_id);
                }
                Err(e) => {
                    report.failed += 1;
                    log::warn!(
                        "Notification {} to {} failed: {}",
                        message.notification_id,
                        message.to,
                        e
                    );
                }
            }
        }

        let reached: Vec<i64> = reached.into_iter().collect();
        archive.finish_notification_pass(&plan.scanned_servings, &reached, Utc::now())?;

        log::info!(
            "Notifications for {}: {} servings scanned, {} sent, {} failed",
            day,
            report.scanned,
            report.sent,
            report.failed
        );
        Ok(report)
    }
}

fn compose(notification: &Notification, named: &NamedServing) -> PendingNotification {
    let subject = format!(
        "{}: {} in {}",
        NOTIFICATION_SUBJECT_PREFIX, named.dish_name, named.canteen_name
    );
    let body = format!(
        "Das Gericht {} wird am {} in der Mensa {} zu einem Preis von {} € angeboten.\n\n\
         Du erhältst diese Nachricht, weil Du eine Benachrichtigung mit der Suchregel \"{}\" angelegt hast.",
        named.dish_name,
        named.serving.day.format("%d.%m.%Y"),
        named.canteen_name,
        named.serving.price.to_string().replace('.', ","),
        notification.pattern
    );

    PendingNotification {
        notification_id: notification.id,
        serving_id: named.serving.id,
        to: notification.email.clone(),
        subject,
        body,
    }
}
