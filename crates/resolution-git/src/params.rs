//! Parameter and config keys of the git resolver, and their merged view.

use std::path::{Component, Path};

use resolution_config::ResolverConfig;
use resolution_framework::{Params, ResolverError, optional};

/// Repository URL to clone.
pub const PARAM_URL: &str = "url";
/// Path of the file within the repository.
pub const PARAM_PATH: &str = "path";
/// Commit (or any revision) to read the file at.
pub const PARAM_COMMIT: &str = "commit";
/// Branch to read the file from.
pub const PARAM_BRANCH: &str = "branch";

/// Config key overriding the resolution timeout.
pub const CONFIG_FETCH_TIMEOUT: &str = "fetch-timeout";
/// Config key supplying a URL when the request has none.
pub const CONFIG_DEFAULT_URL: &str = "default-url";
/// Config key supplying a branch when the request names neither branch nor
/// commit.
pub const CONFIG_DEFAULT_BRANCH: &str = "default-branch";

/// A validated fetch: request parameters with config defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitParams {
    pub url: String,
    pub path: String,
    pub commit: Option<String>,
    pub branch: Option<String>,
}

impl GitParams {
    /// Merge `params` over `config` and validate the result.
    pub fn from_params(params: &Params, config: &ResolverConfig) -> Result<Self, ResolverError> {
        let url = optional(params, PARAM_URL).or_else(|| config.get(CONFIG_DEFAULT_URL));
        let path = optional(params, PARAM_PATH);
        let missing: Vec<&str> = [(PARAM_URL, url.is_none()), (PARAM_PATH, path.is_none())]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
        let (Some(url), Some(path)) = (url, path) else {
            return Err(ResolverError::invalid_params(format!(
                "missing {}",
                missing.join(", ")
            )));
        };

        let commit = optional(params, PARAM_COMMIT);
        let branch = optional(params, PARAM_BRANCH);
        if commit.is_some() && branch.is_some() {
            return Err(ResolverError::invalid_params(format!(
                "supplied both \"{PARAM_COMMIT}\" and \"{PARAM_BRANCH}\""
            )));
        }
        let path = normalize_path(path)?;

        let branch = match (commit, branch) {
            (None, None) => config.get(CONFIG_DEFAULT_BRANCH),
            (_, branch) => branch,
        };

        Ok(Self {
            url: url.to_string(),
            path,
            commit: commit.map(str::to_string),
            branch: branch.map(str::to_string),
        })
    }
}

/// Reject paths that leave the repository and drop `.` segments.
fn normalize_path(path: &str) -> Result<String, ResolverError> {
    let mut segments = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_string_lossy()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ResolverError::invalid_params(format!(
                    "{PARAM_PATH} '{path}' must be relative to the repository root"
                )));
            }
        }
    }
    if segments.is_empty() {
        return Err(ResolverError::invalid_params(format!(
            "{PARAM_PATH} '{path}' does not name a file"
        )));
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_params() {
        let p = GitParams::from_params(
            &params(&[("url", "https://example.com/repo.git"), ("path", "task.yaml")]),
            &ResolverConfig::new(),
        )
        .unwrap();
        assert_eq!(p.url, "https://example.com/repo.git");
        assert_eq!(p.commit, None);
        assert_eq!(p.branch, None);
    }

    #[test]
    fn test_missing_params_are_named() {
        let err = GitParams::from_params(&Params::new(), &ResolverConfig::new()).unwrap_err();
        assert_eq!(err.to_string(), "invalid parameters: missing url, path");

        let err = GitParams::from_params(&params(&[("url", "r")]), &ResolverConfig::new())
            .unwrap_err();
        assert!(err.to_string().ends_with("missing path"));

        let err = GitParams::from_params(&params(&[("path", "p"), ("url", "")]), &ResolverConfig::new())
            .unwrap_err();
        assert!(err.to_string().ends_with("missing url"));
    }

    #[test]
    fn test_commit_and_branch_conflict() {
        let err = GitParams::from_params(
            &params(&[("url", "r"), ("path", "p"), ("commit", "c1"), ("branch", "b1")]),
            &ResolverConfig::new(),
        )
        .unwrap_err();
        assert!(err.is_validation());
        let msg = err.to_string();
        assert!(msg.contains("commit") && msg.contains("branch"), "{msg}");
    }

    #[test]
    fn test_config_defaults_fill_gaps() {
        let config = ResolverConfig::new()
            .with(CONFIG_DEFAULT_URL, "https://example.com/catalog.git")
            .with(CONFIG_DEFAULT_BRANCH, "main");

        let p = GitParams::from_params(&params(&[("path", "p")]), &config).unwrap();
        assert_eq!(p.url, "https://example.com/catalog.git");
        assert_eq!(p.branch.as_deref(), Some("main"));

        let p = GitParams::from_params(&params(&[("path", "p"), ("commit", "abc")]), &config)
            .unwrap();
        assert_eq!(p.branch, None, "default branch must not apply when a commit is pinned");

        let p = GitParams::from_params(
            &params(&[("path", "p"), ("url", "r"), ("branch", "dev")]),
            &config,
        )
        .unwrap();
        assert_eq!(p.url, "r");
        assert_eq!(p.branch.as_deref(), Some("dev"));
    }

    #[test]
    fn test_path_must_stay_inside_repository() {
        for bad in ["../secret", "/etc/passwd", "a/../../b", "."] {
            let err = GitParams::from_params(&params(&[("url", "r"), ("path", bad)]), &ResolverConfig::new())
                .unwrap_err();
            assert!(err.is_validation(), "{bad}");
        }
        let p = GitParams::from_params(
            &params(&[("url", "r"), ("path", "./tasks/a.yaml")]),
            &ResolverConfig::new(),
        )
        .unwrap();
        assert_eq!(p.path, "tasks/a.yaml");
    }
}
