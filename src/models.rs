//! Core Data Models
//!
//! This module defines the data structures used throughout the token-usage
//! accuracy analysis pipeline, from raw transcript lines to the final report.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`RawLogEntry`] - one tolerant-parsed line from a transcript
//! 2. **Per-entry delta**: [`EntryObservation`] - normalized, categorized, counted
//! 3. **Aggregation**: [`SessionTokenMetrics`] - running per-session state
//! 4. **Output**: [`EnhancedTokenAnalysis`] - the terminal, serializable report
//!
//! Transcript schemas vary across Claude Code versions, so [`RawLogEntry`]
//! keeps the raw JSON value and exposes probing accessors instead of a rigid
//! serde shape. Reported token fields are clamped at zero; a negative value in
//! the source log is a data error, not a reason to fail the run.

use crate::categorizer::ContentCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// The conversational role of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    User,
    Assistant,
    System,
    ToolUse,
    ToolResult,
    Other,
}

impl EntryKind {
    fn from_str(kind: &str) -> Self {
        match kind {
            "user" | "human" => EntryKind::User,
            "assistant" => EntryKind::Assistant,
            "system" => EntryKind::System,
            "tool_use" => EntryKind::ToolUse,
            "tool_result" => EntryKind::ToolResult,
            _ => EntryKind::Other,
        }
    }
}

/// One parsed transcript line. Ephemeral: created per line, discarded after
/// its [`EntryObservation`] has been folded into the aggregator.
#[derive(Debug, Clone)]
pub struct RawLogEntry {
    kind: EntryKind,
    raw: Value,
}

impl RawLogEntry {
    /// Parse a single JSONL line. Returns `None` for anything that is not a
    /// JSON object; the caller counts it as a skipped line.
    pub fn parse(line: &str) -> Option<Self> {
        let raw: Value = serde_json::from_str(line).ok()?;
        if !raw.is_object() {
            return None;
        }

        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| {
                raw.get("message")
                    .and_then(|m| m.get("role"))
                    .and_then(Value::as_str)
            })
            .map(EntryKind::from_str)
            .unwrap_or(EntryKind::Other);

        Some(Self { kind, raw })
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// The raw JSON value, for field probing by the normalizer.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Collect all human-readable text carried by this entry. The message
    /// payload is either a plain string or a list of structured content
    /// blocks (text, thinking, tool_use, tool_result).
    pub fn message_text(&self) -> String {
        let content = self
            .raw
            .get("message")
            .and_then(|m| m.get("content"))
            .or_else(|| self.raw.get("content"))
            .or_else(|| self.raw.get("text"))
            .or_else(|| self.raw.get("summary"));

        match content {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(blocks)) => {
                let parts: Vec<String> = blocks.iter().filter_map(block_text).collect();
                parts.join("\n")
            }
            _ => String::new(),
        }
    }

    /// The vendor usage block, when this entry carries one. Only a minority
    /// of entries do (chiefly assistant turns); the gap between these and
    /// the full-text calculated count is the undercount this crate measures.
    pub fn reported_usage(&self) -> Option<ReportedTokens> {
        let usage = self
            .raw
            .get("message")
            .and_then(|m| m.get("usage"))
            .or_else(|| self.raw.get("usage"))?;
        if !usage.is_object() {
            return None;
        }
        Some(ReportedTokens::from_value(usage))
    }
}

fn block_text(block: &Value) -> Option<String> {
    match block.get("type").and_then(Value::as_str) {
        Some("text") => block
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some("thinking") => block
            .get("thinking")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some("tool_use") => {
            let name = block.get("name").and_then(Value::as_str).unwrap_or("");
            let input = block
                .get("input")
                .map(|i| i.to_string())
                .unwrap_or_default();
            Some(format!("tool_use {} {}", name, input))
        }
        Some("tool_result") => match block.get("content") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(inner)) => {
                let parts: Vec<String> = inner.iter().filter_map(block_text).collect();
                Some(parts.join("\n"))
            }
            _ => None,
        },
        _ => block
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Token counts copied verbatim from an entry's embedded usage block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedTokens {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl ReportedTokens {
    /// Extract token fields from a usage object, probing snake_case and
    /// camelCase variants. Negative values are clamped to 0 with a warning.
    pub fn from_value(usage: &Value) -> Self {
        Self {
            input_tokens: clamped_field(usage, &["input_tokens", "inputTokens"]),
            output_tokens: clamped_field(usage, &["output_tokens", "outputTokens"]),
            cache_creation_tokens: clamped_field(
                usage,
                &["cache_creation_input_tokens", "cacheCreationInputTokens"],
            ),
            cache_read_tokens: clamped_field(
                usage,
                &["cache_read_input_tokens", "cacheReadInputTokens"],
            ),
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

fn clamped_field(usage: &Value, keys: &[&str]) -> u64 {
    for key in keys {
        if let Some(n) = usage.get(*key).and_then(Value::as_i64) {
            if n < 0 {
                warn!(field = *key, value = n, "negative token count clamped to 0");
                return 0;
            }
            return n as u64;
        }
    }
    0
}

/// The per-entry delta folded into the session aggregator.
#[derive(Debug, Clone)]
pub struct EntryObservation {
    pub session_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub category: ContentCategory,
    pub reported: Option<ReportedTokens>,
    pub calculated_tokens: u64,
    pub sample: Option<String>,
}

/// Running per-session aggregate. Mutated incrementally during one analysis
/// pass; strictly additive so concurrent folds commute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTokenMetrics {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "inputTokens")]
    pub input_tokens: u64,
    #[serde(rename = "outputTokens")]
    pub output_tokens: u64,
    #[serde(rename = "cacheCreationTokens")]
    pub cache_creation_tokens: u64,
    #[serde(rename = "cacheReadTokens")]
    pub cache_read_tokens: u64,
    #[serde(rename = "calculatedTotalTokens")]
    pub calculated_total_tokens: u64,
    #[serde(rename = "userMessageSamples")]
    pub user_message_samples: Vec<String>,
    #[serde(rename = "assistantMessageSamples")]
    pub assistant_message_samples: Vec<String>,
    #[serde(rename = "categoryTokens")]
    pub category_tokens: HashMap<ContentCategory, u64>,
    #[serde(rename = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
}

impl SessionTokenMetrics {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            calculated_total_tokens: 0,
            user_message_samples: Vec::new(),
            assistant_message_samples: Vec::new(),
            category_tokens: HashMap::new(),
            start_time: None,
            end_time: None,
        }
    }

    /// Fold one observation in. Samples are bounded by count and length so
    /// session state stays small regardless of corpus size.
    pub fn fold(&mut self, obs: &EntryObservation, sample_limit: usize, sample_max_chars: usize) {
        if let Some(reported) = &obs.reported {
            self.input_tokens += reported.input_tokens;
            self.output_tokens += reported.output_tokens;
            self.cache_creation_tokens += reported.cache_creation_tokens;
            self.cache_read_tokens += reported.cache_read_tokens;
        }

        self.calculated_total_tokens += obs.calculated_tokens;
        *self.category_tokens.entry(obs.category).or_insert(0) += obs.calculated_tokens;

        if let Some(sample) = &obs.sample {
            let bucket = match obs.category {
                ContentCategory::UserMessages => Some(&mut self.user_message_samples),
                ContentCategory::AssistantMessages => Some(&mut self.assistant_message_samples),
                _ => None,
            };
            if let Some(bucket) = bucket {
                if bucket.len() < sample_limit {
                    bucket.push(sample.chars().take(sample_max_chars).collect());
                }
            }
        }

        if let Some(ts) = obs.timestamp {
            self.start_time = Some(self.start_time.map_or(ts, |s| s.min(ts)));
            self.end_time = Some(self.end_time.map_or(ts, |e| e.max(ts)));
        }
    }

    pub fn total_reported_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }

    /// Calculated ÷ reported; the denominator is floored at 1 so the ratio
    /// is always finite.
    pub fn accuracy_ratio(&self) -> f64 {
        self.calculated_total_tokens as f64 / self.total_reported_tokens().max(1) as f64
    }

    /// Share of calculated usage not captured by reported statistics, in
    /// [0, 100]. Zero when nothing was calculated or reporting is complete.
    pub fn undercount_percentage(&self) -> f64 {
        undercount(self.total_reported_tokens(), self.calculated_total_tokens)
    }
}

pub(crate) fn undercount(reported: u64, calculated: u64) -> f64 {
    if calculated == 0 || reported >= calculated {
        return 0.0;
    }
    let pct = (calculated - reported) as f64 / calculated as f64 * 100.0;
    pct.clamp(0.0, 100.0)
}

/// The terminal, immutable analysis report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedTokenAnalysis {
    #[serde(rename = "totalSessionsAnalyzed")]
    pub total_sessions_analyzed: usize,
    #[serde(rename = "filesProcessed")]
    pub files_processed: usize,
    #[serde(rename = "linesProcessed")]
    pub lines_processed: u64,
    #[serde(rename = "linesSkipped")]
    pub lines_skipped: u64,
    #[serde(rename = "totalReportedTokens")]
    pub total_reported_tokens: u64,
    #[serde(rename = "totalCalculatedTokens")]
    pub total_calculated_tokens: u64,
    #[serde(rename = "globalAccuracyRatio")]
    pub global_accuracy_ratio: f64,
    #[serde(rename = "globalUndercountPercentage")]
    pub global_undercount_percentage: f64,
    #[serde(rename = "apiCallsMade")]
    pub api_calls_made: u64,
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: f64,
    #[serde(rename = "errorsEncountered")]
    pub errors_encountered: Vec<String>,
    pub sessions: HashMap<String, SessionTokenMetrics>,
}
