//! Image reference parsing.
//!
//! Accepts the familiar docker forms:
//!
//! - `ubuntu` → `index.docker.io/library/ubuntu:latest`
//! - `gcr.io/tekton/catalog:v1`
//! - `localhost:5000/bundles/build@sha256:<hex>`
//! - `registry.example.com/team/app:v2@sha256:<hex>` (digest wins)

use std::fmt;
use std::str::FromStr;

use crate::error::{BundleError, Result};

/// Registry assumed when a reference names none.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Tag assumed when a reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, with port when one was given.
    pub registry: String,
    /// Repository path within the registry.
    pub repository: String,
    /// Tag, when the reference pins one.
    pub tag: Option<String>,
    /// Content digest (`algorithm:hex`), when the reference pins one.
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference string.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| BundleError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };
        if reference.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest).map_err(|r| invalid(&r))?;
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let tag = &name[last_slash + i + 1..];
                validate_tag(tag).map_err(|r| invalid(&r))?;
                (&name[..last_slash + i], Some(tag.to_string()))
            }
            None => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((head, rest)) if is_registry_host(head) => (head.to_string(), rest.to_string()),
            _ => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };
        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository
        };
        validate_repository(&repository).map_err(|r| invalid(&r))?;

        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The manifest reference: the digest when pinned, the tag otherwise.
    pub fn reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Host serving the distribution API for this registry.
    pub fn api_host(&self) -> &str {
        if self.registry == DEFAULT_REGISTRY {
            DOCKER_HUB_API_HOST
        } else {
            &self.registry
        }
    }

    /// `http` for loopback and `.local` registries, `https` otherwise.
    pub fn scheme(&self) -> &'static str {
        let host = self
            .registry
            .rsplit_once(':')
            .map_or(self.registry.as_str(), |(host, _)| host);
        if host == "localhost" || host == "127.0.0.1" || host.ends_with(".local") {
            "http"
        } else {
            "https"
        }
    }

    /// Base URL of the distribution API (`<scheme>://<host>/v2/`).
    pub fn api_base(&self) -> String {
        format!("{}://{}/v2/", self.scheme(), self.api_host())
    }
}

impl FromStr for ImageReference {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_digest(digest: &str) -> std::result::Result<(), String> {
    let Some((algorithm, hex)) = digest.split_once(':') else {
        return Err(format!("digest '{digest}' must be algorithm:hex"));
    };
    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
    {
        return Err(format!("digest algorithm '{algorithm}' is invalid"));
    }
    if algorithm == "sha256" && (hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit())) {
        return Err("sha256 digest must be 64 hex characters".to_string());
    }
    if hex.is_empty() {
        return Err("digest is empty".to_string());
    }
    Ok(())
}

fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && !tag.starts_with(['.', '-'])
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-".contains(c));
    if valid {
        Ok(())
    } else {
        Err(format!("tag '{tag}' is invalid"))
    }
}

fn validate_repository(repository: &str) -> std::result::Result<(), String> {
    let valid = !repository.is_empty()
        && repository.split('/').all(|component| {
            !component.is_empty()
                && component
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c))
                && component.starts_with(|c: char| c.is_ascii_alphanumeric())
        });
    if valid {
        Ok(())
    } else {
        Err(format!(
            "repository '{repository}' must be lowercase alphanumeric path components"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_docker_hub_shorthand() {
        let r = ImageReference::parse("ubuntu").unwrap();
        assert_eq!(r.registry, "index.docker.io");
        assert_eq!(r.repository, "library/ubuntu");
        assert_eq!(r.tag.as_deref(), Some("latest"));
        assert_eq!(r.api_base(), "https://registry-1.docker.io/v2/");

        let r = ImageReference::parse("tektoncd/catalog:v1").unwrap();
        assert_eq!(r.repository, "tektoncd/catalog");
        assert_eq!(r.reference(), "v1");
    }

    #[test]
    fn test_registry_with_port_and_digest() {
        let r = ImageReference::parse(&format!("localhost:5000/bundles/build@{DIGEST}")).unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "bundles/build");
        assert_eq!(r.tag, None);
        assert_eq!(r.reference(), DIGEST);
        assert_eq!(r.api_base(), "http://localhost:5000/v2/");
    }

    #[test]
    fn test_digest_wins_over_tag() {
        let r = ImageReference::parse(&format!("gcr.io/tekton/catalog:v2@{DIGEST}")).unwrap();
        assert_eq!(r.tag.as_deref(), Some("v2"));
        assert_eq!(r.reference(), DIGEST);
        assert_eq!(r.to_string(), format!("gcr.io/tekton/catalog:v2@{DIGEST}"));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "Gcr.io/UPPER/case",
            "gcr.io/repo:",
            "gcr.io/repo@sha256:abc",
            "gcr.io//double",
            "gcr.io/repo:-tag",
        ] {
            let err = ImageReference::parse(bad).unwrap_err();
            assert!(matches!(err, BundleError::InvalidReference { .. }), "{bad}");
        }
    }
}
