//! Per-session event log

use chrono::{DateTime, Utc};
use dms::FatigueEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// One logged event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub at: DateTime<Utc>,
    pub event: String,
}

/// Everything that happened during one monitoring session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub user_id: Option<Uuid>,
    pub user_code: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub counts: BTreeMap<String, u32>,
    pub events: Vec<SessionEvent>,
}

impl SessionSummary {
    pub fn total_events(&self) -> u32 {
        self.counts.values().sum()
    }
}

/// In-memory log of the active session
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    user_id: Option<Uuid>,
    user_code: Option<String>,
    started_at: Option<DateTime<Utc>>,
    counts: BTreeMap<String, u32>,
    entries: Vec<SessionEvent>,
}

impl SessionLog {
    /// Discard previous entries and start logging for a user
    pub fn start(&mut self, user_id: Uuid, user_code: &str, at: DateTime<Utc>) {
        *self = Self {
            user_id: Some(user_id),
            user_code: Some(user_code.to_string()),
            started_at: Some(at),
            ..Default::default()
        };
        info!("Session log started for {}", user_code);
    }

    pub fn record(&mut self, event: FatigueEvent, at: DateTime<Utc>) {
        let label = event.label().to_string();
        *self.counts.entry(label.clone()).or_insert(0) += 1;
        self.entries.push(SessionEvent { at, event: label });
    }

    pub fn count(&self, event: FatigueEvent) -> u32 {
        self.counts.get(event.label()).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<String, u32> {
        &self.counts
    }

    pub fn entries(&self) -> &[SessionEvent] {
        &self.entries
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Close the session and return its summary; the log is left empty
    pub fn finish(&mut self, ended_at: DateTime<Utc>) -> Option<SessionSummary> {
        let log = std::mem::take(self);
        let started_at = log.started_at?;
        Some(SessionSummary {
            user_id: log.user_id,
            user_code: log.user_code,
            started_at,
            ended_at,
            counts: log.counts,
            events: log.entries,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_summary_counts() {
        let start = Utc::now();
        let mut log = SessionLog::default();
        log.start(Uuid::new_v4(), "USUARIO_0001", start);
        log.record(FatigueEvent::Yawn, start);
        log.record(FatigueEvent::Yawn, start + Duration::seconds(30));
        log.record(FatigueEvent::Nod, start + Duration::seconds(40));

        let summary = log.finish(start + Duration::seconds(60)).unwrap();
        assert_eq!(summary.counts.get("Bostezar"), Some(&2));
        assert_eq!(summary.counts.get("Cabeceo"), Some(&1));
        assert_eq!(summary.total_events(), 3);
        assert_eq!(summary.user_code.as_deref(), Some("USUARIO_0001"));
        assert!(!log.is_active());
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_finish_without_start() {
        let mut log = SessionLog::default();
        assert!(log.finish(Utc::now()).is_none());
    }
}
