use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Errors from running an external tool
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code}")]
    NonZeroExit { program: String, code: i32 },

    #[error("{program} timed out after {elapsed:?}")]
    Timeout { program: String, elapsed: Duration },
}

/// A fully described external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<Utf8PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

/// Renders the command line; environment values are masked
impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, _) in &self.envs {
            write!(f, "{}=*** ", key)?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Seam for executing external tools
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the tool to completion; any non-zero exit is an error
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError>;
}

/// Runs tools as child processes, inheriting stdio
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), ToolError> {
        tracing::info!("Executing: {}", invocation);

        let start = Instant::now();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let wait_error = |source| ToolError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        let status = match self.timeout {
            Some(limit) => timeout(limit, child.wait())
                .await
                .map_err(|_| {
                    tracing::warn!("{} timed out after {:?}", invocation.program, limit);
                    ToolError::Timeout {
                        program: invocation.program.clone(),
                        elapsed: limit,
                    }
                })?
                .map_err(wait_error)?,
            None => child.wait().await.map_err(wait_error)?,
        };

        let exit_code = status.code().unwrap_or(-1);
        tracing::info!(
            "{} completed in {:.2}s with exit code {}",
            invocation.program,
            start.elapsed().as_secs_f32(),
            exit_code
        );

        if status.success() {
            Ok(())
        } else {
            Err(ToolError::NonZeroExit {
                program: invocation.program.clone(),
                code: exit_code,
            })
        }
    }
}
