use crate::models::analyzer::{PASSWORD_ENV_KEY, USERNAME_ENV_KEY};
use crate::models::{AnalyzerConfig, AnalyzerSettings};
use anyhow::{Context, Result, bail};
use ::config::{Config, File, FileFormat};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::fs;

/// Settings file looked up in the project directory
pub const CONFIG_FILE_NAME: &str = "android-analyzer.yaml";

/// Credential fields left out of generated templates so the environment stays in charge
const TEMPLATE_OMITTED_KEYS: &[&str] = &["sonarqube_username", "sonarqube_password"];

/// Values given on the command line; these beat every other source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverrides {
    pub server_url: Option<String>,
}

/// Configuration manager for the analyzer settings file.
///
/// Settings are layered, later sources winning:
/// 1. built-in defaults
/// 2. credentials seeded from the environment
/// 3. the YAML settings file (optional)
/// 4. command-line overrides
#[derive(Debug, Clone)]
pub struct ConfigManager {
    project_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a manager for `project_dir`.
    ///
    /// # Arguments
    /// * `project_dir` - Root of the Android module being analyzed
    /// * `config_path` - Explicit settings file; defaults to `android-analyzer.yaml`
    ///   inside the project directory
    pub fn new<P: AsRef<Utf8Path>>(project_dir: P, config_path: Option<Utf8PathBuf>) -> Self {
        let project_dir = project_dir.as_ref().to_path_buf();
        let config_path = config_path.unwrap_or_else(|| project_dir.join(CONFIG_FILE_NAME));

        Self {
            project_dir,
            config_path,
        }
    }

    pub fn project_dir(&self) -> &Utf8Path {
        &self.project_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Load settings using the process environment
    pub fn load_settings(&self, overrides: &SettingsOverrides) -> Result<AnalyzerSettings> {
        self.load_settings_with(|key| std::env::var(key).ok(), overrides)
    }

    /// Load settings with an explicit environment lookup.
    ///
    /// A missing settings file is not an error; every field has a default.
    pub fn load_settings_with<F>(
        &self,
        env: F,
        overrides: &SettingsOverrides,
    ) -> Result<AnalyzerSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();

        for (field, env_key) in [
            ("sonarqube_username", USERNAME_ENV_KEY),
            ("sonarqube_password", PASSWORD_ENV_KEY),
        ] {
            if let Some(value) = env(env_key) {
                tracing::debug!("Seeding {} from {}", field, env_key);
                builder = builder
                    .set_default(field, value)
                    .with_context(|| format!("Failed to seed {} from environment", field))?;
            }
        }

        if self.config_path.exists() {
            tracing::info!("Loading settings from {}", self.config_path);
        } else {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.config_path
            );
        }

        builder = builder
            .add_source(File::new(self.config_path.as_str(), FileFormat::Yaml).required(false))
            .set_override_option("server_url", overrides.server_url.clone())
            .context("Failed to apply command line overrides")?;

        let settings: AnalyzerSettings = builder
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.config_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.config_path))?;

        Ok(settings)
    }

    /// Load and validate in one go
    pub fn load_config(&self, overrides: &SettingsOverrides) -> Result<AnalyzerConfig> {
        let settings = self.load_settings(overrides)?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", self.config_path))
    }

    /// Save settings to the settings file.
    pub fn save_settings(&self, settings: &AnalyzerSettings) -> Result<()> {
        self.write_yaml(settings)
    }

    /// Write a starter settings file, refusing to replace one unless `force` is set.
    ///
    /// Credentials are never written: a value in the file would shadow
    /// `ANDROID_ANALYZER_SONARQUBE_USERNAME` and `ANDROID_ANALYZER_SONARQUBE_PASSWORD`.
    pub fn write_template(&self, settings: &AnalyzerSettings, force: bool) -> Result<()> {
        if self.config_path.exists() && !force {
            bail!(
                "Settings file already exists at {}; pass --force to replace it",
                self.config_path
            );
        }

        let mut template =
            serde_yaml_ng::to_value(settings).context("Failed to serialize settings to YAML")?;
        if let serde_yaml_ng::Value::Mapping(fields) = &mut template {
            for key in TEMPLATE_OMITTED_KEYS {
                fields.remove(*key);
            }
        }

        self.write_yaml(&template)
    }

    fn write_yaml<T: Serialize>(&self, value: &T) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(value).context("Failed to serialize settings to YAML")?;

        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent))?;
        }

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.config_path))?;

        tracing::info!("Saved settings to {}", self.config_path);
        Ok(())
    }
}
