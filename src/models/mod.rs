//! Data models for the analyzer and the example counter.
//!
//! - [`AnalyzerSettings`]: raw settings loaded from `android-analyzer.yaml`
//! - [`AnalyzerConfig`]: the validated, immutable form every pipeline step reads from
//! - [`CounterState`]: bounded counter with a lock flag
//!
//! # Architecture Note
//!
//! Settings are only ever turned into an [`AnalyzerConfig`] through
//! [`AnalyzerSettings::validate`], so code holding a config can rely on the
//! required fields being present. Derived values (project key, report paths,
//! exclusion string) are accessor methods rather than stored fields.

pub mod analyzer;
pub mod counter;

pub use analyzer::{
    AnalyzerConfig, AnalyzerSettings, ConfigError, CoverageTarget, DEFAULT_EXCLUSIONS,
    ToolSettings,
};
pub use counter::{BoundPolicy, Bounds, CounterError, CounterState};
