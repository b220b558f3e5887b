//! Current branch lookup for branch-aware analysis.
//!
//! CI systems check out detached heads, so their environment variables are
//! consulted first; a local `git` call is the fallback.

use camino::Utf8Path;
use std::process::Command;

/// Branch variables in lookup order: GitLab, Jenkins, CircleCI, Travis
pub const CI_BRANCH_VARS: &[&str] = &[
    "CI_COMMIT_REF_NAME",
    "GIT_BRANCH",
    "CIRCLE_BRANCH",
    "TRAVIS_BRANCH",
];

/// Resolve the current branch name.
///
/// `env` looks up an environment variable; pass `|k| std::env::var(k).ok()`
/// outside of tests. Never fails: `None` means no branch could be determined.
pub fn branch_name<F>(env: F, repo_dir: &Utf8Path) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(branch) = branch_from_env(&env) {
        return Some(branch);
    }

    let output = match Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(repo_dir)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("Error occurred while reading git branch name: {}", e);
            return None;
        }
    };

    if !output.status.success() {
        tracing::warn!(
            "Error occurred while reading git branch name: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!branch.is_empty()).then_some(branch)
}

/// First non-empty CI branch variable
pub fn branch_from_env<F>(env: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    CI_BRANCH_VARS.iter().find_map(|&var| {
        env(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .inspect(|value| tracing::debug!("Branch {} taken from {}", value, var))
    })
}
