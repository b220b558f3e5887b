//! The analyzer task sequence.
//!
//! Steps run strictly in order and the first failure aborts the run. Nothing
//! done on the server by earlier steps (project creation, token rotation) is
//! rolled back.

use crate::models::AnalyzerConfig;
use crate::services::coverage::{CoverageError, CoveragePlan};
use crate::services::detekt;
use crate::services::properties::{PROPERTIES_FILE, SonarProperties};
use crate::services::sonarqube::{AuthToken, SonarApi, SonarError, TOKEN_NAME};
use crate::services::tools::{ToolError, ToolInvocation, ToolRunner};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// One unit of work in the analyzer sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    RegisterProject,
    RequestAuth,
    UnitTestCoverage,
    DetektConfig,
    Detekt,
    SonarqubeConfig,
    Sonarqube,
}

impl Step {
    /// Stable identifier used in logs and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Step::RegisterProject => "register-project",
            Step::RequestAuth => "request-auth",
            Step::UnitTestCoverage => "unit-test-coverage",
            Step::DetektConfig => "detekt-config",
            Step::Detekt => "detekt",
            Step::SonarqubeConfig => "sonarqube-config",
            Step::Sonarqube => "sonarqube",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Step::RegisterProject => "Creates a SonarQube project",
            Step::RequestAuth => "Generates a SonarQube user token",
            Step::UnitTestCoverage => "Runs unit tests and generates a Jacoco coverage report",
            Step::DetektConfig => "Writes the default detekt configuration if missing",
            Step::Detekt => "Runs detekt inspection",
            Step::SonarqubeConfig => "Writes SonarQube analysis properties",
            Step::Sonarqube => "Runs sonar-scanner",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a single step failed
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Sonar(#[from] SonarError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Coverage(#[from] CoverageError),

    #[error("{0:#}")]
    File(anyhow::Error),

    #[error("no auth token in session; {0} must run first")]
    MissingToken(Step),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Step {step} failed: {source}")]
    StepFailed {
        step: Step,
        #[source]
        source: StepError,
    },
}

impl PipelineError {
    pub fn step(&self) -> Step {
        match self {
            PipelineError::StepFailed { step, .. } => *step,
        }
    }
}

/// State carried between steps of one run
#[derive(Debug, Default)]
pub struct AnalysisSession {
    token: Option<AuthToken>,
}

impl AnalysisSession {
    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    fn require_token(&self) -> Result<&AuthToken, StepError> {
        self.token
            .as_ref()
            .ok_or(StepError::MissingToken(Step::RequestAuth))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub duration: Duration,
}

/// Steps completed by a successful run, in order
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub completed: Vec<StepOutcome>,
}

impl PipelineReport {
    pub fn steps(&self) -> Vec<Step> {
        self.completed.iter().map(|o| o.step).collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.completed.iter().map(|o| o.duration).sum()
    }
}

/// Drives the analyzer steps for one project
pub struct AnalyzerPipeline<'a> {
    config: &'a AnalyzerConfig,
    project_dir: Utf8PathBuf,
    server: &'a dyn SonarApi,
    tools: &'a dyn ToolRunner,
    branch: Option<String>,
}

impl<'a> AnalyzerPipeline<'a> {
    pub fn new(
        config: &'a AnalyzerConfig,
        project_dir: &Utf8Path,
        server: &'a dyn SonarApi,
        tools: &'a dyn ToolRunner,
    ) -> Self {
        Self {
            config,
            project_dir: project_dir.to_path_buf(),
            server,
            tools,
            branch: None,
        }
    }

    /// Branch reported as `sonar.branch.name` when branch analysis is enabled
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    /// Ordered steps for a full run with this configuration
    pub fn plan(config: &AnalyzerConfig) -> Vec<Step> {
        let mut steps = vec![Step::RegisterProject, Step::RequestAuth];
        if config.coverage().is_some() {
            steps.push(Step::UnitTestCoverage);
        }
        if config.detekt_enabled() {
            steps.push(Step::DetektConfig);
            steps.push(Step::Detekt);
        }
        steps.push(Step::SonarqubeConfig);
        steps.push(Step::Sonarqube);
        steps
    }

    pub fn properties_path(&self) -> Utf8PathBuf {
        self.project_dir.join(PROPERTIES_FILE)
    }

    /// Run every planned step, stopping at the first failure
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let steps = Self::plan(self.config);
        let mut session = AnalysisSession::default();
        let mut report = PipelineReport::default();

        tracing::info!(
            "Running {} analyzer steps for {}",
            steps.len(),
            self.config.project_key()
        );

        for step in steps {
            let start = Instant::now();
            tracing::info!("> {}: {}", step, step.description());

            self.run_step(step, &mut session).await.map_err(|source| {
                tracing::error!("Step {} failed: {}", step, source);
                PipelineError::StepFailed { step, source }
            })?;

            report.completed.push(StepOutcome {
                step,
                duration: start.elapsed(),
            });
        }

        tracing::info!(
            "Analyzer finished in {:.2}s",
            report.total_duration().as_secs_f32()
        );
        Ok(report)
    }

    /// Run a single step against an existing session
    pub async fn run_step(
        &self,
        step: Step,
        session: &mut AnalysisSession,
    ) -> Result<(), StepError> {
        match step {
            Step::RegisterProject => self.register_project().await,
            Step::RequestAuth => {
                session.token = Some(self.request_auth().await?);
                Ok(())
            }
            Step::UnitTestCoverage => self.unit_test_coverage().await,
            Step::DetektConfig => self.detekt_config(),
            Step::Detekt => self.detekt().await,
            Step::SonarqubeConfig => self.sonarqube_config(session.require_token()?),
            Step::Sonarqube => self.sonarqube(session.require_token()?).await,
        }
    }

    async fn register_project(&self) -> Result<(), StepError> {
        self.server
            .register_project(&self.config.project_key(), self.config.project_name())
            .await?;
        Ok(())
    }

    async fn request_auth(&self) -> Result<AuthToken, StepError> {
        if let Err(e) = self.server.revoke_token(TOKEN_NAME).await {
            tracing::warn!("Ignoring failed token revocation: {}", e);
        }

        Ok(self.server.generate_token(TOKEN_NAME).await?)
    }

    async fn unit_test_coverage(&self) -> Result<(), StepError> {
        let Some(target) = self.config.coverage() else {
            tracing::info!("Unit test coverage disabled, nothing to do");
            return Ok(());
        };

        let plan = CoveragePlan::new(self.config, target, &self.project_dir)?;

        self.tools.run(&plan.test_invocation()).await?;
        plan.ensure_execution_data()?;

        let class_files = plan.collect_class_files()?;
        if class_files.is_empty() {
            tracing::warn!("No class files left after exclusions; skipping coverage report");
            return Ok(());
        }

        self.tools.run(&plan.report_invocation(&class_files)).await?;
        tracing::info!("Coverage report written to {}", plan.xml_report());
        Ok(())
    }

    fn detekt_config(&self) -> Result<(), StepError> {
        let path = self
            .project_dir
            .join(self.config.detekt_config_file_name());
        detekt::ensure_config_file(&path).map_err(StepError::File)?;
        Ok(())
    }

    async fn detekt(&self) -> Result<(), StepError> {
        let invocation = detekt::detekt_invocation(self.config, &self.project_dir);
        self.tools.run(&invocation).await?;
        Ok(())
    }

    fn sonarqube_config(&self, token: &AuthToken) -> Result<(), StepError> {
        let props = SonarProperties::build(self.config, token, self.branch.as_deref());
        props
            .write_to(&self.properties_path())
            .map_err(StepError::File)
    }

    async fn sonarqube(&self, token: &AuthToken) -> Result<(), StepError> {
        let invocation = ToolInvocation::new(&self.config.tools().sonar_scanner)
            .arg(format!("-Dproject.settings={}", self.properties_path()))
            .env("SONAR_TOKEN", token.expose())
            .current_dir(&self.project_dir);

        self.tools.run(&invocation).await?;
        Ok(())
    }
}
