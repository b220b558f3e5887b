use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Environment variable that seeds the SonarQube username
pub const USERNAME_ENV_KEY: &str = "ANDROID_ANALYZER_SONARQUBE_USERNAME";

/// Environment variable that seeds the SonarQube password
pub const PASSWORD_ENV_KEY: &str = "ANDROID_ANALYZER_SONARQUBE_PASSWORD";

pub const DEFAULT_SONARQUBE_USERNAME: &str = "admin";
pub const DEFAULT_SONARQUBE_PASSWORD: &str = "admin";
pub const DEFAULT_PROJECT_VERSION: &str = "undefined";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:9000";
pub const DEFAULT_DETEKT_CONFIG_FILE_NAME: &str = "detekt-config.yml";
pub const DETEKT_REPORT_PATH: &str = "build/reports/detekt/detekt.xml";
pub const COVERAGE_PLUGIN: &str = "jacoco";

/// Name of the coverage report, also used as its output directory
pub const JACOCO_REPORT_NAME: &str = "androidAnalyzerJacoco";

/// Paths excluded from analysis and coverage unless `use_default_exclusions` is off
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "**/databinding/**/*.*",
    "**/android/databinding/*Binding.*",
    "**/BR.*",
    "**/R.*",
    "**/R$*.*",
    "**/BuildConfig.*",
    "**/Manifest*.*",
    "**/*_MembersInjector.*",
    "**/Dagger*Component.*",
    "**/Dagger*Component$Builder.*",
    "**/*Module_*Factory.*",
    "**/*Module*.*",
    "**/*apollo*.*",
    "**/*.xml",
    "**/*.html",
    "**/*.css",
    "**/res/**/*",
    "**/assets/**/*",
];

static PROJECT_KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.:\-]*[A-Za-z_.:\-][A-Za-z0-9_.:\-]*$")
        .expect("Invalid project key regex")
});

/// Configuration errors, all fatal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "application_id and project_name must be specified in android-analyzer.yaml\n\
         E.g.\n\
         application_id: nl.pinch.myproject\n\
         project_name: My Project"
    )]
    MissingProjectIdentity,

    #[error("{0} must be specified when unit_test_coverage = true")]
    MissingCoverageField(&'static str),

    #[error(
        "Project key '{0}' is derived from application_id and SonarQube would reject it. \
         Keys may only contain letters, digits, '-', '_', '.' and ':', with at least one non-digit"
    )]
    InvalidProjectKey(String),
}

/// Commands used to launch the external tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub gradle: String,
    pub java: String,
    pub jacoco_cli_jar: String,
    pub detekt: String,
    pub sonar_scanner: String,

    /// Upper bound for a single tool run; unlimited when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            gradle: "./gradlew".to_string(),
            java: "java".to_string(),
            jacoco_cli_jar: "jacococli.jar".to_string(),
            detekt: "detekt".to_string(),
            sonar_scanner: "sonar-scanner".to_string(),
            timeout_secs: None,
        }
    }
}

/// Raw analyzer settings as read from `android-analyzer.yaml`.
///
/// Nothing here is checked; call [`AnalyzerSettings::validate`] to obtain an
/// [`AnalyzerConfig`] before running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub application_id: Option<String>,
    pub project_name: Option<String>,
    pub project_version: String,

    pub sonarqube_username: String,
    pub sonarqube_password: String,
    pub server_url: String,

    pub use_default_exclusions: bool,
    pub custom_exclusions: Vec<String>,

    pub detekt: bool,
    pub detekt_baseline: Option<String>,
    pub detekt_config_file_name: String,

    pub unit_test_coverage: bool,
    pub build_flavor: Option<String>,
    pub package_name: Option<String>,

    pub branch_analysis: bool,

    pub tools: ToolSettings,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            application_id: None,
            project_name: None,
            project_version: DEFAULT_PROJECT_VERSION.to_string(),
            sonarqube_username: DEFAULT_SONARQUBE_USERNAME.to_string(),
            sonarqube_password: DEFAULT_SONARQUBE_PASSWORD.to_string(),
            server_url: DEFAULT_SERVER_URL.to_string(),
            use_default_exclusions: true,
            custom_exclusions: Vec::new(),
            detekt: false,
            detekt_baseline: None,
            detekt_config_file_name: DEFAULT_DETEKT_CONFIG_FILE_NAME.to_string(),
            unit_test_coverage: false,
            build_flavor: None,
            package_name: None,
            branch_analysis: false,
            tools: ToolSettings::default(),
        }
    }
}

impl AnalyzerSettings {
    /// Check required fields and produce the immutable configuration.
    pub fn validate(self) -> Result<AnalyzerConfig, ConfigError> {
        let application_id = non_blank(self.application_id);
        let project_name = non_blank(self.project_name);

        let (Some(application_id), Some(project_name)) = (application_id, project_name) else {
            return Err(ConfigError::MissingProjectIdentity);
        };

        let coverage = if self.unit_test_coverage {
            let build_flavor = non_blank(self.build_flavor)
                .ok_or(ConfigError::MissingCoverageField("build_flavor"))?;
            let package_name = non_blank(self.package_name)
                .ok_or(ConfigError::MissingCoverageField("package_name"))?;
            Some(CoverageTarget {
                build_flavor,
                package_name,
            })
        } else {
            None
        };

        let config = AnalyzerConfig {
            application_id,
            project_name,
            project_version: self.project_version,
            sonarqube_username: self.sonarqube_username,
            sonarqube_password: self.sonarqube_password,
            server_url: self.server_url,
            use_default_exclusions: self.use_default_exclusions,
            custom_exclusions: self.custom_exclusions,
            detekt: self.detekt,
            detekt_baseline: non_blank(self.detekt_baseline),
            detekt_config_file_name: self.detekt_config_file_name,
            coverage,
            branch_analysis: self.branch_analysis,
            tools: self.tools,
        };

        let key = config.project_key();
        if !PROJECT_KEY_PATTERN.is_match(&key) {
            return Err(ConfigError::InvalidProjectKey(key));
        }

        tracing::debug!(
            "Validated analyzer config: key={}, coverage={}, detekt={}",
            key,
            config.coverage.is_some(),
            config.detekt
        );

        Ok(config)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Build variant whose unit tests feed the coverage report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageTarget {
    build_flavor: String,
    package_name: String,
}

impl CoverageTarget {
    pub fn build_flavor(&self) -> &str {
        &self.build_flavor
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Gradle unit test task, e.g. `testDebugUnitTest`
    pub fn test_task(&self) -> String {
        format!("test{}UnitTest", capitalize(&self.build_flavor))
    }

    pub fn test_execution_data(&self) -> String {
        format!("build/jacoco/{}.exec", self.test_task())
    }

    pub fn test_results_dir(&self) -> String {
        format!("build/test-results/{}", self.test_task())
    }

    fn package_dirs(&self) -> String {
        self.package_name.replace('.', "/")
    }

    pub fn java_class_dir(&self) -> String {
        format!(
            "build/intermediates/javac/{}/compile{}JavaWithJavac/classes/{}",
            self.build_flavor,
            capitalize(&self.build_flavor),
            self.package_dirs()
        )
    }

    pub fn kotlin_class_dir(&self) -> String {
        format!(
            "build/tmp/kotlin-classes/{}/{}",
            self.build_flavor,
            self.package_dirs()
        )
    }

    pub fn source_dir(&self) -> String {
        format!("src/main/java/{}", self.package_dirs())
    }
}

/// Validated, immutable analyzer configuration.
///
/// Derived values (project key, report paths, exclusion string) are computed
/// on demand from the stored fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    application_id: String,
    project_name: String,
    project_version: String,
    sonarqube_username: String,
    sonarqube_password: String,
    server_url: String,
    use_default_exclusions: bool,
    custom_exclusions: Vec<String>,
    detekt: bool,
    detekt_baseline: Option<String>,
    detekt_config_file_name: String,
    coverage: Option<CoverageTarget>,
    branch_analysis: bool,
    tools: ToolSettings,
}

impl AnalyzerConfig {
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn project_version(&self) -> &str {
        &self.project_version
    }

    pub fn sonarqube_username(&self) -> &str {
        &self.sonarqube_username
    }

    pub fn sonarqube_password(&self) -> &str {
        &self.sonarqube_password
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn detekt_enabled(&self) -> bool {
        self.detekt
    }

    pub fn detekt_baseline(&self) -> Option<&str> {
        self.detekt_baseline.as_deref()
    }

    pub fn detekt_config_file_name(&self) -> &str {
        &self.detekt_config_file_name
    }

    pub fn detekt_report_path(&self) -> &str {
        DETEKT_REPORT_PATH
    }

    pub fn coverage(&self) -> Option<&CoverageTarget> {
        self.coverage.as_ref()
    }

    pub fn coverage_plugin(&self) -> &str {
        COVERAGE_PLUGIN
    }

    pub fn branch_analysis(&self) -> bool {
        self.branch_analysis
    }

    pub fn tools(&self) -> &ToolSettings {
        &self.tools
    }

    pub fn project_key(&self) -> String {
        format!("{}-android", self.application_id)
    }

    /// Custom exclusions first, followed by the defaults when enabled
    pub fn exclusions(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.custom_exclusions.iter().map(String::as_str).collect();
        if self.use_default_exclusions {
            all.extend_from_slice(DEFAULT_EXCLUSIONS);
        }
        all
    }

    pub fn exclusions_string(&self) -> String {
        self.exclusions().join(",")
    }

    pub fn jacoco_xml_report(&self) -> String {
        format!("build/reports/jacoco/{0}/{0}.xml", JACOCO_REPORT_NAME)
    }

    pub fn jacoco_html_report(&self) -> String {
        format!("build/reports/jacoco/{}/html", JACOCO_REPORT_NAME)
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
