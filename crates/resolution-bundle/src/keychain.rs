//! Registry pull credentials.
//!
//! A [`Keychain`] maps a registry host to the credentials used for it.
//! [`ServiceAccountKeychain`] reads the image pull secrets attached to the
//! service account named by the request, in the request's namespace, the
//! same way the kubelet does.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::Api;
use serde::Deserialize;

use crate::error::{BundleError, Result};

const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
const DOCKER_CFG_KEY: &str = ".dockercfg";
const DOCKER_HUB_LEGACY_KEY: &str = "https://index.docker.io/v1/";

/// Username/password pair presented to a registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of registry credentials.
#[async_trait]
pub trait Keychain: Send + Sync {
    /// Credentials for `registry`, or `None` to pull anonymously.
    async fn credentials(&self, registry: &str) -> Result<Option<Credentials>>;
}

/// Always pulls anonymously.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl Keychain for Anonymous {
    async fn credentials(&self, _registry: &str) -> Result<Option<Credentials>> {
        Ok(None)
    }
}

/// Fixed per-registry credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticKeychain {
    entries: BTreeMap<String, Credentials>,
}

impl StaticKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register credentials for a registry host.
    pub fn with(mut self, registry: impl Into<String>, credentials: Credentials) -> Self {
        self.entries.insert(registry.into(), credentials);
        self
    }
}

#[async_trait]
impl Keychain for StaticKeychain {
    async fn credentials(&self, registry: &str) -> Result<Option<Credentials>> {
        Ok(self.entries.get(registry).cloned())
    }
}

/// Reads pull secrets of a service account.
#[derive(Clone)]
pub struct ServiceAccountKeychain {
    client: kube::Client,
    namespace: String,
    service_account: String,
}

impl ServiceAccountKeychain {
    pub fn new(
        client: kube::Client,
        namespace: impl Into<String>,
        service_account: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            service_account: service_account.into(),
        }
    }
}

#[async_trait]
impl Keychain for ServiceAccountKeychain {
    async fn credentials(&self, registry: &str) -> Result<Option<Credentials>> {
        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), &self.namespace);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);

        let account = accounts.get(&self.service_account).await?;
        for secret_ref in account.image_pull_secrets.unwrap_or_default() {
            if secret_ref.name.is_empty() {
                continue;
            }
            let Some(secret) = secrets.get_opt(&secret_ref.name).await? else {
                tracing::debug!(secret = %secret_ref.name, "pull secret not found, skipping");
                continue;
            };
            let Some(data) = secret.data else { continue };
            let config = if let Some(raw) = data.get(DOCKER_CONFIG_JSON_KEY) {
                DockerConfig::from_config_json(&raw.0)?
            } else if let Some(raw) = data.get(DOCKER_CFG_KEY) {
                DockerConfig::from_legacy_cfg(&raw.0)?
            } else {
                continue;
            };
            if let Some(credentials) = config.credentials_for(registry)? {
                return Ok(Some(credentials));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    auth: Option<String>,
}

/// The `auths` map of a docker config file.
#[derive(Debug, Clone, Default)]
pub struct DockerConfig {
    auths: BTreeMap<String, AuthEntry>,
}

impl DockerConfig {
    /// Parse a `.dockerconfigjson` document (`{"auths": {...}}`).
    pub fn from_config_json(raw: &[u8]) -> Result<Self> {
        #[derive(Deserialize)]
        struct ConfigJson {
            #[serde(default)]
            auths: BTreeMap<String, AuthEntry>,
        }
        let parsed: ConfigJson = serde_json::from_slice(raw)
            .map_err(|e| BundleError::credentials(format!("{DOCKER_CONFIG_JSON_KEY}: {e}")))?;
        Ok(Self {
            auths: parsed.auths,
        })
    }

    /// Parse a legacy `.dockercfg` document (the bare `auths` map).
    pub fn from_legacy_cfg(raw: &[u8]) -> Result<Self> {
        let auths = serde_json::from_slice(raw)
            .map_err(|e| BundleError::credentials(format!("{DOCKER_CFG_KEY}: {e}")))?;
        Ok(Self { auths })
    }

    /// Credentials for `registry`. Keys may be bare hosts or URLs.
    pub fn credentials_for(&self, registry: &str) -> Result<Option<Credentials>> {
        let entry = self
            .auths
            .iter()
            .find(|(key, _)| key_matches(key, registry))
            .map(|(_, entry)| entry);
        entry.map(decode_entry).transpose()
    }
}

fn key_matches(key: &str, registry: &str) -> bool {
    if registry == crate::reference::DEFAULT_REGISTRY && key == DOCKER_HUB_LEGACY_KEY {
        return true;
    }
    let host = key
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = host.split('/').next().unwrap_or(host);
    host == registry
}

fn decode_entry(entry: &AuthEntry) -> Result<Credentials> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Ok(Credentials {
            username: username.clone(),
            password: password.clone(),
        });
    }
    let auth = entry
        .auth
        .as_deref()
        .ok_or_else(|| BundleError::credentials("auth entry has no credentials"))?;
    let decoded = STANDARD
        .decode(auth)
        .map_err(|e| BundleError::credentials(format!("auth is not base64: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| BundleError::credentials("auth is not UTF-8"))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| BundleError::credentials("auth must be username:password"))?;
    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_json_with_auth_field() {
        let auth = STANDARD.encode("robot:s3cret");
        let raw = format!(r#"{{"auths":{{"https://gcr.io":{{"auth":"{auth}"}}}}}}"#);
        let config = DockerConfig::from_config_json(raw.as_bytes()).unwrap();
        let creds = config.credentials_for("gcr.io").unwrap().unwrap();
        assert_eq!(creds.username, "robot");
        assert_eq!(creds.password, "s3cret");
        assert!(config.credentials_for("quay.io").unwrap().is_none());
    }

    #[test]
    fn test_legacy_cfg_and_docker_hub_key() {
        let raw = br#"{"https://index.docker.io/v1/":{"username":"u","password":"p"}}"#;
        let config = DockerConfig::from_legacy_cfg(raw).unwrap();
        let creds = config.credentials_for("index.docker.io").unwrap().unwrap();
        assert_eq!(creds.username, "u");
    }

    #[test]
    fn test_bad_auth_is_error() {
        let raw = br#"{"auths":{"gcr.io":{"auth":"bm9jb2xvbg=="}}}"#;
        let config = DockerConfig::from_config_json(raw).unwrap();
        assert!(config.credentials_for("gcr.io").is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials {
            username: "u".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_static_and_anonymous() {
        let keychain = StaticKeychain::new().with(
            "registry.local:5000",
            Credentials {
                username: "u".into(),
                password: "p".into(),
            },
        );
        assert!(keychain.credentials("registry.local:5000").await.unwrap().is_some());
        assert!(keychain.credentials("gcr.io").await.unwrap().is_none());
        assert!(Anonymous.credentials("gcr.io").await.unwrap().is_none());
    }
}
