//! Jacoco coverage report planning.
//!
//! A [`CoveragePlan`] resolves every path the coverage step touches against the
//! project directory:
//! - the Gradle unit test task that produces the execution data
//! - compiled class files under the Java and Kotlin output directories,
//!   filtered through the exclusion globs
//! - the `jacococli report` command producing XML and HTML output

use crate::models::{AnalyzerConfig, CoverageTarget};
use crate::services::tools::ToolInvocation;
use camino::{Utf8Path, Utf8PathBuf};
use glob::{MatchOptions, Pattern};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Execution data not found at {0}; did the unit tests run with coverage enabled?")]
    MissingExecutionData(Utf8PathBuf),

    #[error("Invalid exclusion pattern '{pattern}': {message}")]
    InvalidExclusion { pattern: String, message: String },

    #[error("Failed to scan {dir}: {message}")]
    Scan { dir: Utf8PathBuf, message: String },
}

/// Ant-style matching: `*` stays within one path segment, `**` spans several
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct CoveragePlan {
    project_dir: Utf8PathBuf,
    test_task: String,
    gradle: String,
    java: String,
    jacoco_cli_jar: String,
    execution_data: Utf8PathBuf,
    class_dirs: Vec<Utf8PathBuf>,
    source_dir: Utf8PathBuf,
    xml_report: Utf8PathBuf,
    html_report: Utf8PathBuf,
    exclusions: Vec<Pattern>,
}

impl CoveragePlan {
    pub fn new(
        config: &AnalyzerConfig,
        target: &CoverageTarget,
        project_dir: &Utf8Path,
    ) -> Result<Self, CoverageError> {
        let exclusions = config
            .exclusions()
            .into_iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| CoverageError::InvalidExclusion {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tools = config.tools();

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            test_task: target.test_task(),
            gradle: tools.gradle.clone(),
            java: tools.java.clone(),
            jacoco_cli_jar: tools.jacoco_cli_jar.clone(),
            execution_data: project_dir.join(target.test_execution_data()),
            class_dirs: vec![
                project_dir.join(target.java_class_dir()),
                project_dir.join(target.kotlin_class_dir()),
            ],
            source_dir: project_dir.join(target.source_dir()),
            xml_report: project_dir.join(config.jacoco_xml_report()),
            html_report: project_dir.join(config.jacoco_html_report()),
            exclusions,
        })
    }

    pub fn execution_data(&self) -> &Utf8Path {
        &self.execution_data
    }

    pub fn xml_report(&self) -> &Utf8Path {
        &self.xml_report
    }

    pub fn html_report(&self) -> &Utf8Path {
        &self.html_report
    }

    /// Gradle task run before the report so that execution data exists
    pub fn test_invocation(&self) -> ToolInvocation {
        ToolInvocation::new(&self.gradle)
            .arg(&self.test_task)
            .current_dir(&self.project_dir)
    }

    pub fn ensure_execution_data(&self) -> Result<(), CoverageError> {
        if self.execution_data.is_file() {
            Ok(())
        } else {
            Err(CoverageError::MissingExecutionData(self.execution_data.clone()))
        }
    }

    /// Whether `relative` (a path below a class directory) matches an exclusion
    pub fn is_excluded(&self, relative: &Utf8Path) -> bool {
        self.exclusions
            .iter()
            .any(|pattern| pattern.matches_with(relative.as_str(), MATCH_OPTIONS))
    }

    /// Every `.class` file under the class directories that is not excluded.
    ///
    /// Missing class directories are skipped: a pure Kotlin module has no
    /// javac output and vice versa.
    pub fn collect_class_files(&self) -> Result<Vec<Utf8PathBuf>, CoverageError> {
        let mut files = Vec::new();

        for dir in &self.class_dirs {
            if !dir.is_dir() {
                tracing::debug!("Class directory {} does not exist, skipping", dir);
                continue;
            }

            for entry in WalkDir::new(dir).sort_by_file_name() {
                let entry = entry.map_err(|e| CoverageError::Scan {
                    dir: dir.clone(),
                    message: e.to_string(),
                })?;

                if !entry.file_type().is_file() {
                    continue;
                }

                let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
                    tracing::warn!("Skipping non UTF-8 path under {}", dir);
                    continue;
                };

                if path.extension() != Some("class") {
                    continue;
                }

                let relative = path.strip_prefix(dir).unwrap_or(&path);
                if self.is_excluded(relative) {
                    tracing::trace!("Excluded from coverage: {}", relative);
                    continue;
                }

                files.push(path);
            }
        }

        tracing::debug!("Collected {} class files for coverage", files.len());
        Ok(files)
    }

    /// `java -jar jacococli.jar report ...` over the given class files
    pub fn report_invocation(&self, class_files: &[Utf8PathBuf]) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(&self.java)
            .current_dir(&self.project_dir)
            .args(["-jar", self.jacoco_cli_jar.as_str(), "report"])
            .arg(self.execution_data.as_str());

        for file in class_files {
            invocation = invocation.args(["--classfiles", file.as_str()]);
        }

        invocation
            .args(["--sourcefiles", self.source_dir.as_str()])
            .args(["--xml", self.xml_report.as_str()])
            .args(["--html", self.html_report.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalyzerSettings;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> AnalyzerConfig {
        AnalyzerSettings {
            application_id: Some("nl.pinch.app".to_string()),
            project_name: Some("App".to_string()),
            unit_test_coverage: true,
            build_flavor: Some("debug".to_string()),
            package_name: Some("nl.pinch.app".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap()
    }

    fn plan(project_dir: &Utf8Path) -> CoveragePlan {
        let config = config();
        CoveragePlan::new(&config, config.coverage().unwrap(), project_dir).unwrap()
    }

    #[test]
    fn test_default_exclusions_match_generated_classes() {
        let plan = plan(Utf8Path::new("/work"));

        assert!(plan.is_excluded(Utf8Path::new("R.class")));
        assert!(plan.is_excluded(Utf8Path::new("R$string.class")));
        assert!(plan.is_excluded(Utf8Path::new("BuildConfig.class")));
        assert!(plan.is_excluded(Utf8Path::new("di/AppModule_ProvideFooFactory.class")));
        assert!(plan.is_excluded(Utf8Path::new("databinding/ActivityMainBinding.class")));
        assert!(plan.is_excluded(Utf8Path::new("DaggerAppComponent.class")));

        assert!(!plan.is_excluded(Utf8Path::new("counter/CounterImpl.class")));
        assert!(!plan.is_excluded(Utf8Path::new("MainActivity.class")));
    }

    #[test]
    fn test_collect_class_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let plan = plan(&root);

        let kotlin_dir = root.join("build/tmp/kotlin-classes/debug/nl/pinch/app");
        fs::create_dir_all(kotlin_dir.join("counter")).unwrap();
        fs::write(kotlin_dir.join("counter/CounterImpl.class"), b"").unwrap();
        fs::write(kotlin_dir.join("R.class"), b"").unwrap();
        fs::write(kotlin_dir.join("notes.txt"), b"").unwrap();

        let files = plan.collect_class_files().unwrap();
        assert_eq!(files, vec![kotlin_dir.join("counter/CounterImpl.class")]);
    }

    #[test]
    fn test_missing_execution_data() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let plan = plan(&root);

        assert!(matches!(
            plan.ensure_execution_data(),
            Err(CoverageError::MissingExecutionData(_))
        ));

        fs::create_dir_all(root.join("build/jacoco")).unwrap();
        fs::write(root.join("build/jacoco/testDebugUnitTest.exec"), b"").unwrap();
        assert!(plan.ensure_execution_data().is_ok());
    }

    #[test]
    fn test_invocations() {
        let plan = plan(Utf8Path::new("/work"));

        let test = plan.test_invocation();
        assert_eq!(test.program, "./gradlew");
        assert_eq!(test.args, vec!["testDebugUnitTest"]);

        let report = plan.report_invocation(&[Utf8PathBuf::from("/work/A.class")]);
        assert_eq!(report.program, "java");
        assert_eq!(
            report.args,
            vec![
                "-jar",
                "jacococli.jar",
                "report",
                "/work/build/jacoco/testDebugUnitTest.exec",
                "--classfiles",
                "/work/A.class",
                "--sourcefiles",
                "/work/src/main/java/nl/pinch/app",
                "--xml",
                "/work/build/reports/jacoco/androidAnalyzerJacoco/androidAnalyzerJacoco.xml",
                "--html",
                "/work/build/reports/jacoco/androidAnalyzerJacoco/html",
            ]
        );
    }

    #[test]
    fn test_invalid_custom_exclusion() {
        let config = AnalyzerSettings {
            application_id: Some("nl.pinch.app".to_string()),
            project_name: Some("App".to_string()),
            unit_test_coverage: true,
            build_flavor: Some("debug".to_string()),
            package_name: Some("nl.pinch.app".to_string()),
            custom_exclusions: vec!["[unclosed".to_string()],
            ..Default::default()
        }
        .validate()
        .unwrap();

        let err = CoveragePlan::new(&config, config.coverage().unwrap(), Utf8Path::new("/"))
            .unwrap_err();
        assert!(matches!(err, CoverageError::InvalidExclusion { .. }));
    }
}
