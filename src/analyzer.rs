//! Analysis Orchestrator
//!
//! Composes discovery, streaming parse, normalization, categorization,
//! token counting, and aggregation into one full-corpus run producing a
//! single [`EnhancedTokenAnalysis`] report.
//!
//! ## Pipeline
//!
//! 1. **DISCOVER**: enumerate transcript files under the configured roots
//! 2. **STREAM_PARSE**: yield entries one line at a time per file
//! 3. **CLASSIFY_AND_COUNT**: normalize identity/time, categorize content,
//!    record reported tokens when a usage block exists, and always compute a
//!    calculated count for the full text (remote validation with local
//!    fallback) - the reported/calculated asymmetry is what exposes the
//!    undercount
//! 4. **AGGREGATE**: fold per-file observations into the session aggregator
//! 5. **SUMMARIZE**: reduce all sessions into the terminal report, computing
//!    global ratios from summed totals rather than averaged per-session
//!    ratios
//!
//! Files are processed with bounded parallelism. Each file carries a
//! wall-clock budget; a file that overruns it is abandoned and its partial
//! observations are discarded, never merged. Any per-file failure is
//! appended to the error list and processing continues - a single bad file
//! never aborts the run.

use crate::aggregator::SessionAggregator;
use crate::categorizer::categorize;
use crate::config::get_config;
use crate::estimator::{CharTokenEstimator, TokenEstimator};
use crate::models::{
    undercount, EnhancedTokenAnalysis, EntryObservation, SessionTokenMetrics,
};
use crate::normalizer;
use crate::reader::{discover_transcript_files, FileStats, LineStream};
use crate::validator::RemoteTokenValidator;
use anyhow::Result;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tunable parameters for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Directories searched recursively for `*.jsonl` transcripts.
    pub roots: Vec<PathBuf>,
    /// Cap on files processed; selection order is stable (mtime, then path).
    pub max_files: Option<usize>,
    /// Cap on lines consumed per file.
    pub max_lines_per_file: Option<usize>,
    /// Master switch for remote validation. Even when true, a missing
    /// credential silently disables it for the run.
    pub use_remote_validation: bool,
    /// Explicit credential; falls back to `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            roots: vec![get_config().paths.claude_home.join("projects")],
            max_files: None,
            max_lines_per_file: None,
            use_remote_validation: true,
            api_key: None,
        }
    }
}

impl AnalysisOptions {
    pub fn for_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }
}

struct FileResult {
    stats: FileStats,
    observations: Vec<EntryObservation>,
}

/// The analysis engine. Construct once, call [`analyze`](Self::analyze) per
/// corpus; each run aggregates into fresh per-run state so re-running over
/// an unchanged corpus yields an identical report.
pub struct TokenAnalyzer {
    estimator: Arc<dyn TokenEstimator>,
}

impl Default for TokenAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenAnalyzer {
    pub fn new() -> Self {
        Self {
            estimator: Arc::new(CharTokenEstimator::from_config()),
        }
    }

    /// Swap the local estimation strategy.
    pub fn with_estimator(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    /// Run one full-corpus analysis. Never fails: every expected error mode
    /// is folded into the report's error list.
    pub async fn analyze(&self, options: AnalysisOptions) -> EnhancedTokenAnalysis {
        let started = Instant::now();
        let config = get_config();

        let mut errors = Vec::new();

        // DISCOVER
        let (files, discovery_errors) =
            discover_transcript_files(&options.roots, options.max_files);
        errors.extend(discovery_errors);
        info!(files = files.len(), "discovered transcript files");

        let validator = self.build_validator(&options, &mut errors);
        let aggregator = SessionAggregator::new();

        let budget = Duration::from_secs(config.analysis.file_budget_secs);
        let max_file_size = config.analysis.max_file_size_mb * 1024 * 1024;
        let max_lines = options.max_lines_per_file;

        // STREAM_PARSE + CLASSIFY_AND_COUNT, fanned out over files
        let tasks: Vec<_> = files
            .iter()
            .cloned()
            .map(|path| {
                let estimator = Arc::clone(&self.estimator);
                let validator = validator.clone();
                async move {
                    let outcome = tokio::time::timeout(
                        budget,
                        process_file(&path, max_file_size, max_lines, estimator, validator),
                    )
                    .await;
                    (path, outcome)
                }
            })
            .collect();

        let mut results: Vec<_> = futures::stream::iter(tasks)
            .buffer_unordered(config.analysis.parallel_files)
            .collect()
            .await;
        // Completion order is arbitrary; sort so the report is reproducible.
        results.sort_by(|a, b| a.0.cmp(&b.0));

        // AGGREGATE
        let mut files_processed = 0usize;
        let mut lines_processed = 0u64;
        let mut lines_skipped = 0u64;

        for (path, outcome) in results {
            match outcome {
                Err(_) => {
                    warn!(file = %path.display(), "file exceeded processing budget");
                    errors.push(format!(
                        "{}: exceeded {}s processing budget, partial results discarded",
                        path.display(),
                        budget.as_secs()
                    ));
                }
                Ok(Err(e)) => {
                    errors.push(format!("{}: {:#}", path.display(), e));
                }
                Ok(Ok(result)) => {
                    files_processed += 1;
                    lines_processed += result.stats.lines_processed;
                    lines_skipped += result.stats.lines_skipped;
                    if result.stats.lines_skipped > 0 {
                        errors.push(format!(
                            "{}: skipped {} unparseable lines",
                            path.display(),
                            result.stats.lines_skipped
                        ));
                    }
                    for obs in &result.observations {
                        aggregator.update(obs);
                    }
                }
            }
        }

        // SUMMARIZE
        let sessions = aggregator.snapshot();
        let api_calls_made = validator.as_ref().map_or(0, |v| v.api_calls_made());
        summarize(
            sessions,
            files_processed,
            lines_processed,
            lines_skipped,
            api_calls_made,
            errors,
            started.elapsed().as_secs_f64(),
        )
    }

    fn build_validator(
        &self,
        options: &AnalysisOptions,
        errors: &mut Vec<String>,
    ) -> Option<Arc<RemoteTokenValidator>> {
        if !options.use_remote_validation {
            return None;
        }

        let api_key = options
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())?;

        match RemoteTokenValidator::new(api_key) {
            Ok(validator) => Some(Arc::new(validator)),
            Err(e) => {
                errors.push(format!("remote validation unavailable: {:#}", e));
                None
            }
        }
    }
}

/// Stream one file into a local observation list. Observations are merged
/// into the aggregator only after the whole file succeeds, so an abandoned
/// file contributes nothing.
async fn process_file(
    path: &std::path::Path,
    max_file_size: u64,
    max_lines: Option<usize>,
    estimator: Arc<dyn TokenEstimator>,
    validator: Option<Arc<RemoteTokenValidator>>,
) -> Result<FileResult> {
    let mut stream = LineStream::open(path, max_file_size, max_lines).await?;
    let mut observations = Vec::new();

    while let Some(entry) = stream.next_entry().await {
        let session_id = normalizer::extract_session_id(entry.raw());
        let timestamp = normalizer::extract_timestamp(entry.raw());
        let text = entry.message_text();
        let category = categorize(&text, entry.kind());
        let reported = entry.reported_usage();
        let calculated_tokens = count_text(&text, &estimator, validator.as_deref()).await;

        let sample = if text.is_empty() { None } else { Some(text) };

        observations.push(EntryObservation {
            session_id,
            timestamp,
            category,
            reported,
            calculated_tokens,
            sample,
        });
    }

    Ok(FileResult {
        stats: stream.stats(),
        observations,
    })
}

/// Calculated count for one entry's text: remote validation when available,
/// local estimation otherwise. Failures are logged, never propagated.
async fn count_text(
    text: &str,
    estimator: &Arc<dyn TokenEstimator>,
    validator: Option<&RemoteTokenValidator>,
) -> u64 {
    if text.is_empty() {
        return 0;
    }

    if let Some(validator) = validator {
        if validator.is_available() {
            match validator.count_tokens(text, None).await {
                Ok(count) => return count,
                Err(e) => {
                    debug!(error = %e, "remote count failed, using local estimate");
                }
            }
        }
    }

    estimator.estimate(text)
}

fn summarize(
    sessions: HashMap<String, SessionTokenMetrics>,
    files_processed: usize,
    lines_processed: u64,
    lines_skipped: u64,
    api_calls_made: u64,
    errors: Vec<String>,
    duration_seconds: f64,
) -> EnhancedTokenAnalysis {
    let total_reported_tokens: u64 = sessions.values().map(|s| s.total_reported_tokens()).sum();
    let total_calculated_tokens: u64 =
        sessions.values().map(|s| s.calculated_total_tokens).sum();

    // Global ratios come from summed totals, not averaged per-session
    // ratios, so small sessions cannot skew the result.
    let global_accuracy_ratio =
        total_calculated_tokens as f64 / total_reported_tokens.max(1) as f64;
    let global_undercount_percentage = undercount(total_reported_tokens, total_calculated_tokens);

    EnhancedTokenAnalysis {
        total_sessions_analyzed: sessions.len(),
        files_processed,
        lines_processed,
        lines_skipped,
        total_reported_tokens,
        total_calculated_tokens,
        global_accuracy_ratio,
        global_undercount_percentage,
        api_calls_made,
        duration_seconds,
        errors_encountered: errors,
        sessions,
    }
}
