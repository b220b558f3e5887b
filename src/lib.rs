// android-analyzer - SonarQube analysis driver for Android projects
//
// This is the library crate containing the analyzer pipeline, its configuration
// and the bounded counter used by the console front end.
// The binary crate (main.rs) provides the command line entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::{ConfigManager, SettingsOverrides};
pub use models::{AnalyzerConfig, AnalyzerSettings, BoundPolicy, Bounds, CounterState};
pub use services::{AnalyzerPipeline, PipelineError, PipelineReport, Step};
pub use state::{CounterChange, CounterStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
