use crate::models::AnalyzerConfig;
use crate::services::sonarqube::AuthToken;
use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;
use java_properties::PropertiesWriter;
use std::fs::{self, File};
use std::io::BufWriter;

/// Keys whose values must never be written to disk
const SECRET_KEYS: &[&str] = &["sonar.login", "sonar.token"];

/// Where the generated scanner settings are written, relative to the project
pub const PROPERTIES_FILE: &str = "build/android-analyzer/sonar-project.properties";

/// Ordered SonarQube analysis properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SonarProperties {
    entries: IndexMap<String, String>,
}

impl SonarProperties {
    /// Assemble the analysis properties for a project.
    ///
    /// Coverage and detekt properties are only present when those features are
    /// enabled; `sonar.branch.name` only when branch analysis is on and a
    /// branch was found.
    pub fn build(config: &AnalyzerConfig, token: &AuthToken, branch: Option<&str>) -> Self {
        let mut props = Self::default();

        // project settings
        props.set("sonar.projectKey", config.project_key());
        props.set("sonar.projectName", config.project_name());
        props.set("sonar.projectVersion", config.project_version());

        // server settings
        props.set("sonar.login", token.expose());
        props.set("sonar.host.url", config.server_url());

        // sources and binaries
        props.set("sonar.sources", "src/main");
        props.set(
            "sonar.java.binaries",
            "build/intermediates/javac,build/tmp/kotlin-classes",
        );

        // analysis exclusion settings
        let exclusions = config.exclusions_string();
        props.set("sonar.exclusions", &exclusions);
        props.set("sonar.coverage.exclusions", &exclusions);

        if let Some(target) = config.coverage() {
            props.set("sonar.java.coveragePlugin", config.coverage_plugin());
            props.set("sonar.jacoco.reportPaths", target.test_execution_data());
            props.set("sonar.junit.reportsPath", target.test_results_dir());
            props.set("sonar.coverage.jacoco.xmlReportPaths", config.jacoco_xml_report());
        }

        if config.detekt_enabled() {
            props.set("sonar.kotlin.detekt.reportPaths", config.detekt_report_path());
        }

        if config.branch_analysis() {
            match branch {
                Some(branch) => props.set("sonar.branch.name", branch),
                None => tracing::warn!("Branch analysis enabled but no branch name was found"),
            }
        }

        props
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write all non-secret properties as a Java properties file.
    pub fn write_to(&self, path: &Utf8Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent))?;
        }

        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path))?;
        let mut writer = PropertiesWriter::new(BufWriter::new(file));

        writer
            .write_comment("Generated by android-analyzer; do not edit")
            .context("Failed to write properties header")?;

        for (key, value) in self.iter() {
            if SECRET_KEYS.contains(&key) {
                continue;
            }
            writer
                .write(key, value)
                .with_context(|| format!("Failed to write property {}", key))?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", path))?;

        tracing::info!("Wrote {} analysis properties to {}", self.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalyzerSettings;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn base() -> AnalyzerSettings {
        AnalyzerSettings {
            application_id: Some("nl.pinch.app".to_string()),
            project_name: Some("App".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_properties() {
        let config = base().validate().unwrap();
        let props = SonarProperties::build(&config, &AuthToken::new("tok"), None);

        assert_eq!(props.get("sonar.projectKey"), Some("nl.pinch.app-android"));
        assert_eq!(props.get("sonar.projectName"), Some("App"));
        assert_eq!(props.get("sonar.projectVersion"), Some("undefined"));
        assert_eq!(props.get("sonar.login"), Some("tok"));
        assert_eq!(props.get("sonar.host.url"), Some("http://localhost:9000"));
        assert_eq!(props.get("sonar.java.coveragePlugin"), None);
        assert_eq!(props.get("sonar.kotlin.detekt.reportPaths"), None);
        assert_eq!(props.get("sonar.branch.name"), None);

        let keys: Vec<&str> = props.iter().map(|(k, _)| k).take(3).collect();
        assert_eq!(keys, vec!["sonar.projectKey", "sonar.projectName", "sonar.projectVersion"]);
    }

    #[test]
    fn test_optional_properties() {
        let config = AnalyzerSettings {
            unit_test_coverage: true,
            build_flavor: Some("debug".to_string()),
            package_name: Some("nl.pinch.app".to_string()),
            detekt: true,
            branch_analysis: true,
            ..base()
        }
        .validate()
        .unwrap();
        let props = SonarProperties::build(&config, &AuthToken::new("tok"), Some("feature/x"));

        assert_eq!(props.get("sonar.java.coveragePlugin"), Some("jacoco"));
        assert_eq!(
            props.get("sonar.jacoco.reportPaths"),
            Some("build/jacoco/testDebugUnitTest.exec")
        );
        assert_eq!(
            props.get("sonar.junit.reportsPath"),
            Some("build/test-results/testDebugUnitTest")
        );
        assert_eq!(
            props.get("sonar.kotlin.detekt.reportPaths"),
            Some("build/reports/detekt/detekt.xml")
        );
        assert_eq!(props.get("sonar.branch.name"), Some("feature/x"));
    }

    #[test]
    fn test_write_skips_secrets() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let path = root.join(PROPERTIES_FILE);

        let config = base().validate().unwrap();
        let props = SonarProperties::build(&config, &AuthToken::new("top-secret"), None);
        props.write_to(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("top-secret"));

        let read = java_properties::read(File::open(&path).unwrap()).unwrap();
        assert_eq!(read.get("sonar.projectKey").map(String::as_str), Some("nl.pinch.app-android"));
        assert!(!read.contains_key("sonar.login"));
        assert_eq!(read.len(), props.len() - 1);
    }
}
