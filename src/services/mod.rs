//! Services module - the analyzer's side-effecting work.
//!
//! Everything here is independent of the console front end. Network access
//! and external processes sit behind two traits so that the task sequence can
//! be driven against fakes:
//!
//! - [`SonarApi`]: the SonarQube web API ([`SonarQubeClient`] in production)
//! - [`ToolRunner`]: external tools such as Gradle, jacococli, detekt and
//!   sonar-scanner ([`ProcessRunner`] in production)
//!
//! [`AnalyzerPipeline`] sequences the steps on top of those seams. The
//! remaining modules are pure planners that turn an
//! [`AnalyzerConfig`](crate::models::AnalyzerConfig) into paths, command
//! lines and property files.

pub mod coverage;
pub mod detekt;
pub mod git;
pub mod pipeline;
pub mod properties;
pub mod sonarqube;
pub mod tools;

pub use coverage::{CoverageError, CoveragePlan};
pub use pipeline::{
    AnalysisSession, AnalyzerPipeline, PipelineError, PipelineReport, Step, StepError,
    StepOutcome,
};
pub use properties::{PROPERTIES_FILE, SonarProperties};
pub use sonarqube::{AuthToken, ProjectRegistration, SonarApi, SonarError, SonarQubeClient};
pub use tools::{ProcessRunner, ToolError, ToolInvocation, ToolRunner};
