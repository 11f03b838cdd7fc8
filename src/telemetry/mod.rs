// ABOUTME: Telemetry aggregation module
// ABOUTME: Dashboard-facing rollups computed over the append-only event table
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Telemetry aggregation for the analytics dashboard endpoints.

pub mod aggregate;

pub use aggregate::{
    build_time_series, top_scenarios, ScenarioCount, TelemetryAggregator, TelemetrySummary,
    EVENT_CONVERSATION_COMPLETED, EVENT_CONVERSATION_STARTED, EVENT_MESSAGE_SENT,
};
