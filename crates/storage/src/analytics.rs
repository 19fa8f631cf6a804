//! Behaviour event analytics

use crate::repository::BehaviorEventRecord;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregates over a set of behaviour events. Hours are UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnalytics {
    pub total_events: usize,
    pub counts: BTreeMap<String, u32>,
    /// Most frequent event and its count
    pub most_frequent: Option<(String, u32)>,
    /// Busiest hour of day and its count
    pub peak_hour: Option<(u32, u32)>,
    pub hourly: [u32; 24],
}

impl EventAnalytics {
    /// Ties go to whichever event or hour reached the count first
    pub fn from_events(events: &[BehaviorEventRecord]) -> Self {
        let mut counts = BTreeMap::new();
        let mut hourly = [0u32; 24];
        let mut most_frequent: Option<(String, u32)> = None;
        let mut peak_hour: Option<(u32, u32)> = None;

        for record in events {
            let count = counts.entry(record.event.clone()).or_insert(0u32);
            *count += 1;
            if most_frequent.as_ref().map_or(true, |(_, best)| *count > *best) {
                most_frequent = Some((record.event.clone(), *count));
            }

            let hour = record.at.hour();
            hourly[hour as usize] += 1;
            let in_hour = hourly[hour as usize];
            if peak_hour.map_or(true, |(_, best)| in_hour > best) {
                peak_hour = Some((hour, in_hour));
            }
        }

        Self {
            total_events: events.len(),
            counts,
            most_frequent,
            peak_hour,
            hourly,
        }
    }
}
