//! Token-Usage Accuracy Auditor
//!
//! Reconstructs accurate token-usage accounting from Claude Code
//! conversation transcripts (JSONL, one JSON object per line). Locally
//! recorded usage blocks cover only a minority of entries - chiefly
//! assistant turns - so naive accounting systematically undercounts real
//! consumption. This library re-derives complete token counts from the raw
//! transcript logs and reports the gap between "locally reported" and
//! "actually calculated" usage.
//!
//! ## Architecture Overview
//!
//! - [`models`] - raw entries, per-session metrics, and the final report
//! - [`reader`] - transcript discovery and bounded-memory line streaming
//! - [`normalizer`] - session-id probing and tolerant timestamp parsing
//! - [`categorizer`] - ordered-rule content classification
//! - [`estimator`] - deterministic local token estimation
//! - [`validator`] - remote count-tokens validation with failure backoff
//! - [`aggregator`] - concurrency-safe per-session aggregation
//! - [`analyzer`] - the orchestrator tying the pipeline together
//! - [`config`] / [`logging`] - runtime configuration and structured logging
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use token_audit::{AnalysisOptions, TokenAnalyzer};
//!
//! # async fn example() {
//! let analyzer = TokenAnalyzer::new();
//! let options = AnalysisOptions {
//!     roots: vec!["/home/me/.claude/projects".into()],
//!     max_files: Some(100),
//!     max_lines_per_file: None,
//!     use_remote_validation: false,
//!     api_key: None,
//! };
//!
//! let report = analyzer.analyze(options).await;
//! println!(
//!     "undercount: {:.1}%",
//!     report.global_undercount_percentage
//! );
//! # }
//! ```
//!
//! The run never hard-fails: corrupt lines, unreadable files, and remote
//! validation outages all degrade to recorded errors and local estimation,
//! and the report always reflects best-effort results.

pub mod aggregator;
pub mod analyzer;
pub mod categorizer;
pub mod config;
pub mod estimator;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod reader;
pub mod validator;

pub use aggregator::SessionAggregator;
pub use analyzer::{AnalysisOptions, TokenAnalyzer};
pub use categorizer::ContentCategory;
pub use estimator::{CharTokenEstimator, TokenEstimator};
pub use models::{EnhancedTokenAnalysis, EntryKind, RawLogEntry, ReportedTokens, SessionTokenMetrics};
pub use validator::RemoteTokenValidator;
