//! Delayed re-entry of actors
//!
//! A reminder is a persisted due time. Arming an armed reminder moves it;
//! nothing blocks while waiting for one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What an actor does when a reminder fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReminderKind {
    /// Retry queued updates
    PendingUpdate,
    /// Re-evaluate merge policies of the open PR
    PullRequestCheck,
}

/// Armed reminders of one actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reminders(BTreeMap<ReminderKind, DateTime<Utc>>);

impl Reminders {
    /// Arm `kind` to fire `delay` after `now`
    pub fn arm(&mut self, kind: ReminderKind, now: DateTime<Utc>, delay: Duration) {
        self.0.insert(kind, now + delay);
    }

    /// Disarm `kind`
    pub fn clear(&mut self, kind: ReminderKind) {
        self.0.remove(&kind);
    }

    /// Disarm everything
    pub fn clear_all(&mut self) {
        self.0.clear();
    }

    /// Whether `kind` is armed
    pub fn is_armed(&self, kind: ReminderKind) -> bool {
        self.0.contains_key(&kind)
    }

    /// When `kind` fires, if armed
    pub fn due_at(&self, kind: ReminderKind) -> Option<DateTime<Utc>> {
        self.0.get(&kind).copied()
    }

    /// Reminders due at `now`, earliest first
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ReminderKind> {
        let mut due: Vec<_> = self.0.iter().filter(|(_, at)| **at <= now).collect();
        due.sort_by_key(|(_, at)| **at);
        due.into_iter().map(|(kind, _)| *kind).collect()
    }

    /// Whether no reminder is armed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Armed reminders with their due times
    pub fn iter(&self) -> impl Iterator<Item = (ReminderKind, DateTime<Utc>)> + '_ {
        self.0.iter().map(|(kind, at)| (*kind, *at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rearm_moves_due_time() {
        let now = Utc::now();
        let mut reminders = Reminders::default();
        reminders.arm(ReminderKind::PendingUpdate, now, Duration::minutes(5));
        reminders.arm(ReminderKind::PendingUpdate, now, Duration::minutes(10));

        assert_eq!(
            reminders.due_at(ReminderKind::PendingUpdate),
            Some(now + Duration::minutes(10))
        );
        assert_eq!(reminders.iter().count(), 1);
    }

    #[test]
    fn test_due_orders_by_time() {
        let now = Utc::now();
        let mut reminders = Reminders::default();
        reminders.arm(ReminderKind::PullRequestCheck, now, Duration::minutes(1));
        reminders.arm(ReminderKind::PendingUpdate, now, Duration::minutes(2));

        assert!(reminders.due(now).is_empty());
        assert_eq!(
            reminders.due(now + Duration::minutes(3)),
            vec![ReminderKind::PullRequestCheck, ReminderKind::PendingUpdate]
        );
    }

    #[test]
    fn test_serialized_form() {
        let now = Utc::now();
        let mut reminders = Reminders::default();
        reminders.arm(ReminderKind::PendingUpdate, now, Duration::zero());
        let json = serde_json::to_value(&reminders).unwrap();
        assert!(json.get("pendingUpdate").is_some());
    }
}
