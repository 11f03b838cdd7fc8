// ABOUTME: Aggregate telemetry queries: summary, daily time series, top scenarios
// ABOUTME: Property-bag values are scanned application-side since the bags are unstructured JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Telemetry Aggregation
//!
//! Rollups for the analytics dashboard. The independent database counts run
//! concurrently (`tokio::join!`); anything derived from event properties is
//! computed by scanning the raw rows here, because the property bags are
//! free-form JSON the database cannot index.
//!
//! `completion_rate` is defined as `completed / started` with an explicit
//! `0.0` when nothing started — the dashboard never sees NaN or infinity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::TelemetryManager;
use crate::errors::AppResult;
use crate::models::TelemetryEvent;

/// Event recorded when a participant starts a conversation
pub const EVENT_CONVERSATION_STARTED: &str = "conversation_started";
/// Event recorded when a conversation reaches completion
pub const EVENT_CONVERSATION_COMPLETED: &str = "conversation_completed";
/// Event recorded per participant message
pub const EVENT_MESSAGE_SENT: &str = "message_sent";

/// Property key carrying the scenario slug on `conversation_started` events
const PROP_SCENARIO_SLUG: &str = "scenarioSlug";
/// Property key carrying session duration on `conversation_completed` events
const PROP_DURATION_MS: &str = "durationMs";

/// Bucket used when a `conversation_started` event has no scenario slug
const UNKNOWN_SCENARIO: &str = "unknown";

/// Aggregate summary over a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySummary {
    pub total_events: i64,
    pub conversations_started: i64,
    pub conversations_completed: i64,
    pub messages_sent: i64,
    pub distinct_users: i64,
    /// `completed / started`, `0.0` when `started == 0`
    pub completion_rate: f64,
    /// Mean of the `durationMs` property over completed conversations that
    /// carry one; absent when none do
    pub avg_duration_ms: Option<f64>,
}

/// One row of the top-scenarios ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioCount {
    pub scenario_slug: String,
    pub count: i64,
}

/// Dashboard aggregation over a [`TelemetryManager`]
pub struct TelemetryAggregator {
    telemetry: TelemetryManager,
}

impl TelemetryAggregator {
    /// Create an aggregator
    #[must_use]
    pub const fn new(telemetry: TelemetryManager) -> Self {
        Self { telemetry }
    }

    /// Compute the summary for a range
    ///
    /// The count queries run concurrently; the property-derived average runs
    /// over one raw scan of the range.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the underlying queries fail.
    pub async fn summary(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<TelemetrySummary> {
        let (total, started, completed, messages, users, events) = tokio::join!(
            self.telemetry.count_in_range(from, to, None),
            self.telemetry
                .count_in_range(from, to, Some(EVENT_CONVERSATION_STARTED)),
            self.telemetry
                .count_in_range(from, to, Some(EVENT_CONVERSATION_COMPLETED)),
            self.telemetry
                .count_in_range(from, to, Some(EVENT_MESSAGE_SENT)),
            self.telemetry.distinct_users_in_range(from, to),
            self.telemetry.events_in_range(from, to),
        );
        let (started, completed) = (started?, completed?);

        Ok(TelemetrySummary {
            total_events: total?,
            conversations_started: started,
            conversations_completed: completed,
            messages_sent: messages?,
            distinct_users: users?,
            completion_rate: completion_rate(started, completed),
            avg_duration_ms: average_duration_ms(&events?),
        })
    }

    /// Bucket a range's events by UTC calendar day and event name
    ///
    /// # Errors
    ///
    /// Returns an error if the range scan fails.
    pub async fn time_series(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<BTreeMap<String, BTreeMap<String, i64>>> {
        let events = self.telemetry.events_in_range(from, to).await?;
        Ok(build_time_series(&events))
    }

    /// Rank scenarios by `conversation_started` volume
    ///
    /// # Errors
    ///
    /// Returns an error if the range scan fails.
    pub async fn top_scenarios(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ScenarioCount>> {
        let events = self.telemetry.events_in_range(from, to).await?;
        Ok(top_scenarios(&events, limit))
    }
}

/// `completed / started`, with an explicit zero when nothing started
#[must_use]
pub fn completion_rate(started: i64, completed: i64) -> f64 {
    if started == 0 {
        0.0
    } else {
        completed as f64 / started as f64
    }
}

/// Sparse date -> event name -> count table suitable for charting
///
/// Dates are the UTC calendar-day portion of each event's timestamp; days
/// with no events simply do not appear.
#[must_use]
pub fn build_time_series(events: &[TelemetryEvent]) -> BTreeMap<String, BTreeMap<String, i64>> {
    let mut buckets: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for event in events {
        let day = event.created_at.format("%Y-%m-%d").to_string();
        *buckets
            .entry(day)
            .or_default()
            .entry(event.name.clone())
            .or_insert(0) += 1;
    }
    buckets
}

/// Count `conversation_started` events per `scenarioSlug` property
///
/// Events without the property bucket under `"unknown"`. The result is
/// sorted by descending count (slug as tie-break for determinism) and
/// truncated to `limit`.
#[must_use]
pub fn top_scenarios(events: &[TelemetryEvent], limit: usize) -> Vec<ScenarioCount> {
    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for event in events {
        if event.name != EVENT_CONVERSATION_STARTED {
            continue;
        }
        let slug = event
            .properties
            .get(PROP_SCENARIO_SLUG)
            .and_then(serde_json::Value::as_str)
            .unwrap_or(UNKNOWN_SCENARIO);
        *counts.entry(slug.to_owned()).or_insert(0) += 1;
    }

    let mut ranked: Vec<ScenarioCount> = counts
        .into_iter()
        .map(|(scenario_slug, count)| ScenarioCount {
            scenario_slug,
            count,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.scenario_slug.cmp(&b.scenario_slug))
    });
    ranked.truncate(limit);
    ranked
}

fn average_duration_ms(events: &[TelemetryEvent]) -> Option<f64> {
    let durations: Vec<f64> = events
        .iter()
        .filter(|e| e.name == EVENT_CONVERSATION_COMPLETED)
        .filter_map(|e| e.properties.get(PROP_DURATION_MS))
        .filter_map(serde_json::Value::as_f64)
        .collect();
    if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn event(name: &str, properties: serde_json::Value, at: DateTime<Utc>) -> TelemetryEvent {
        TelemetryEvent {
            id: 0,
            name: name.to_owned(),
            properties,
            user_id: None,
            session_id: None,
            created_at: at,
        }
    }

    #[test]
    fn test_completion_rate_zero_started() {
        assert!((completion_rate(0, 0) - 0.0).abs() < f64::EPSILON);
        assert!((completion_rate(0, 5) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completion_rate_ratio() {
        assert!((completion_rate(4, 3) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_time_series_groups_same_day_different_names() {
        let day = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().unwrap();
        let later = Utc
            .with_ymd_and_hms(2026, 3, 14, 22, 30, 0)
            .single()
            .unwrap();
        let events = vec![
            event(EVENT_CONVERSATION_STARTED, json!({}), day),
            event(EVENT_MESSAGE_SENT, json!({}), later),
        ];
        let series = build_time_series(&events);

        assert_eq!(series.len(), 1);
        let bucket = &series["2026-03-14"];
        assert_eq!(bucket[EVENT_CONVERSATION_STARTED], 1);
        assert_eq!(bucket[EVENT_MESSAGE_SENT], 1);
    }

    #[test]
    fn test_time_series_splits_across_utc_midnight() {
        let before = Utc
            .with_ymd_and_hms(2026, 3, 14, 23, 59, 0)
            .single()
            .unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 15, 0, 1, 0).single().unwrap();
        let events = vec![
            event(EVENT_MESSAGE_SENT, json!({}), before),
            event(EVENT_MESSAGE_SENT, json!({}), after),
        ];
        let series = build_time_series(&events);
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_top_scenarios_unknown_bucket_and_ordering() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().unwrap();
        let events = vec![
            event(
                EVENT_CONVERSATION_STARTED,
                json!({"scenarioSlug": "interview"}),
                at,
            ),
            event(
                EVENT_CONVERSATION_STARTED,
                json!({"scenarioSlug": "interview"}),
                at,
            ),
            event(EVENT_CONVERSATION_STARTED, json!({}), at),
            event(
                EVENT_CONVERSATION_STARTED,
                json!({"scenarioSlug": "feedback"}),
                at,
            ),
            // Non-start events never count
            event(EVENT_MESSAGE_SENT, json!({"scenarioSlug": "interview"}), at),
        ];

        let ranked = top_scenarios(&events, 10);
        assert_eq!(ranked[0].scenario_slug, "interview");
        assert_eq!(ranked[0].count, 2);
        assert!(ranked
            .iter()
            .any(|r| r.scenario_slug == UNKNOWN_SCENARIO && r.count == 1));
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn test_top_scenarios_truncates_to_limit() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().unwrap();
        let events: Vec<TelemetryEvent> = (0..5)
            .map(|i| {
                event(
                    EVENT_CONVERSATION_STARTED,
                    json!({"scenarioSlug": format!("scenario-{i}")}),
                    at,
                )
            })
            .collect();
        assert_eq!(top_scenarios(&events, 2).len(), 2);
    }

    #[test]
    fn test_average_duration_scans_property_bags() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).single().unwrap();
        let events = vec![
            event(
                EVENT_CONVERSATION_COMPLETED,
                json!({"durationMs": 1000}),
                at,
            ),
            event(
                EVENT_CONVERSATION_COMPLETED,
                json!({"durationMs": 3000}),
                at,
            ),
            // No duration property: excluded from the mean
            event(EVENT_CONVERSATION_COMPLETED, json!({}), at),
        ];
        let avg = average_duration_ms(&events).unwrap();
        assert!((avg - 2000.0).abs() < f64::EPSILON);
        assert!(average_duration_ms(&[]).is_none());
    }
}
