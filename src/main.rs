//! android-analyzer - command line entry point.
//!
//! # Overview
//!
//! Loads `android-analyzer.yaml` from the project directory, then either runs
//! the full analysis sequence or one of its steps:
//!
//! 1. Register the project on the SonarQube server
//! 2. Rotate the analyzer's user token
//! 3. Run unit tests and build a Jacoco report (if enabled)
//! 4. Write the detekt config and run detekt (if enabled)
//! 5. Write `sonar-project.properties` and run sonar-scanner
//!
//! The `counter` subcommand drives the bounded counter from stdin.
//!
//! All network calls and subprocesses run on a single-threaded tokio runtime,
//! one at a time.

use android_analyzer::logging::{self, LogOptions};
use android_analyzer::models::counter::{DEFAULT_MAX, DEFAULT_MIN};
use android_analyzer::models::{AnalyzerConfig, DEFAULT_EXCLUSIONS};
use android_analyzer::services::detekt::DEFAULT_DETEKT_CONFIG;
use android_analyzer::services::pipeline::AnalysisSession;
use android_analyzer::services::{ProcessRunner, SonarQubeClient, git};
use android_analyzer::ui::ConsoleController;
use android_analyzer::{
    APP_NAME, AnalyzerPipeline, AnalyzerSettings, BoundPolicy, Bounds, ConfigManager,
    CounterState, CounterStore, SettingsOverrides, Step, VERSION,
};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "android-analyzer", version, about)]
struct Cli {
    /// Root of the Android module to analyze
    #[arg(long, global = true, default_value = ".")]
    project_dir: Utf8PathBuf,

    /// Settings file (default: <project-dir>/android-analyzer.yaml)
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// SonarQube server URL, overriding the settings file
    #[arg(long, global = true, env = "ANDROID_ANALYZER_SERVER_URL")]
    server_url: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write daily log files into this directory
    #[arg(long, global = true)]
    log_dir: Option<Utf8PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the complete analysis
    Run,
    /// Create the SonarQube project
    RegisterProject,
    /// Rotate the analyzer's SonarQube user token
    RequestAuth,
    /// Print the default exclusion globs
    DefaultExclusions,
    /// Print the default detekt configuration
    DefaultDetektConfig,
    /// Write a starter settings file
    Init {
        #[arg(long)]
        application_id: Option<String>,
        #[arg(long)]
        project_name: Option<String>,
        /// Replace an existing settings file
        #[arg(long)]
        force: bool,
    },
    /// Print the branch that would be reported for branch analysis
    Branch,
    /// Interactive bounded counter on stdin
    Counter {
        #[arg(long, default_value_t = DEFAULT_MIN, allow_hyphen_values = true)]
        min: i64,
        #[arg(long, default_value_t = DEFAULT_MAX, allow_hyphen_values = true)]
        max: i64,
        /// Starting value (default: --min)
        #[arg(long, allow_hyphen_values = true)]
        initial: Option<i64>,
        /// Clamp steps that would cross a bound
        #[arg(long)]
        clamp: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = logging::init(&LogOptions {
        verbose: cli.verbose,
        json: cli.json,
        log_dir: cli.log_dir.clone(),
    })?;

    tracing::debug!("Starting {} v{}", APP_NAME, VERSION);

    let result = run(cli);
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

fn run(cli: Cli) -> Result<()> {
    let manager = ConfigManager::new(&cli.project_dir, cli.config.clone());
    let overrides = SettingsOverrides {
        server_url: cli.server_url.clone(),
    };

    match cli.command {
        Commands::Run => {
            let config = manager.load_config(&overrides)?;
            block_on(run_pipeline(&config, manager.project_dir()))
        }
        Commands::RegisterProject => {
            let config = manager.load_config(&overrides)?;
            block_on(run_single_step(&config, manager.project_dir(), Step::RegisterProject))
        }
        Commands::RequestAuth => {
            let config = manager.load_config(&overrides)?;
            block_on(run_single_step(&config, manager.project_dir(), Step::RequestAuth))
        }
        Commands::DefaultExclusions => {
            for exclusion in DEFAULT_EXCLUSIONS {
                println!("{}", exclusion);
            }
            Ok(())
        }
        Commands::DefaultDetektConfig => {
            print!("{}", DEFAULT_DETEKT_CONFIG);
            Ok(())
        }
        Commands::Init {
            application_id,
            project_name,
            force,
        } => {
            let settings = AnalyzerSettings {
                application_id,
                project_name,
                ..manager.load_settings(&overrides)?
            };
            manager.write_template(&settings, force)
        }
        Commands::Branch => {
            match git::branch_name(|k| std::env::var(k).ok(), manager.project_dir()) {
                Some(branch) => println!("{}", branch),
                None => tracing::warn!("No branch name could be determined"),
            }
            Ok(())
        }
        Commands::Counter {
            min,
            max,
            initial,
            clamp,
        } => run_counter(min, max, initial, clamp),
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(future)
}

fn tool_runner(config: &AnalyzerConfig) -> ProcessRunner {
    ProcessRunner::new(config.tools().timeout_secs.map(Duration::from_secs))
}

async fn run_pipeline(config: &AnalyzerConfig, project_dir: &Utf8Path) -> Result<()> {
    let server = SonarQubeClient::from_config(config)?;
    let tools = tool_runner(config);

    let branch = if config.branch_analysis() {
        git::branch_name(|k| std::env::var(k).ok(), project_dir)
    } else {
        None
    };

    let report = AnalyzerPipeline::new(config, project_dir, &server, &tools)
        .with_branch(branch)
        .run()
        .await?;

    for outcome in &report.completed {
        tracing::info!(
            "{:<20} {:>8.2}s",
            outcome.step.name(),
            outcome.duration.as_secs_f32()
        );
    }
    Ok(())
}

async fn run_single_step(config: &AnalyzerConfig, project_dir: &Utf8Path, step: Step) -> Result<()> {
    let server = SonarQubeClient::from_config(config)?;
    let tools = tool_runner(config);
    let pipeline = AnalyzerPipeline::new(config, project_dir, &server, &tools);

    let mut session = AnalysisSession::default();
    pipeline
        .run_step(step, &mut session)
        .await
        .with_context(|| format!("Step {} failed", step))?;

    tracing::info!("Step {} completed", step);
    Ok(())
}

fn run_counter(min: i64, max: i64, initial: Option<i64>, clamp: bool) -> Result<()> {
    let bounds = Bounds::new(min, max)?;
    let policy = if clamp {
        BoundPolicy::Clamp
    } else {
        BoundPolicy::PreCheck
    };
    let state = CounterState::new(bounds, initial.unwrap_or(min))?.with_policy(policy);

    let mut controller = ConsoleController::new(CounterStore::new(state), |s: &str| {
        println!("{}", s)
    });
    controller.run(std::io::stdin().lock())
}
