//! OCI distribution API client.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{BundleError, Result};
use crate::keychain::Credentials;
use crate::reference::ImageReference;

/// OCI image manifest media type.
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
/// Docker schema 2 manifest media type.
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

const INDEX_MEDIA_TYPES: [&str; 2] = [
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
];

/// A content descriptor inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// An image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    /// Decode a manifest body, rejecting indexes and old schemas.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let manifest: Manifest =
            serde_json::from_slice(body).map_err(|e| BundleError::manifest(e.to_string()))?;
        if let Some(media_type) = manifest
            .media_type
            .as_deref()
            .filter(|m| INDEX_MEDIA_TYPES.contains(m))
        {
            return Err(BundleError::manifest(format!(
                "{media_type} is an index, not an image manifest"
            )));
        }
        if manifest.schema_version != 2 {
            return Err(BundleError::manifest(format!(
                "unsupported schema version {}",
                manifest.schema_version
            )));
        }
        Ok(manifest)
    }
}

/// Pulls manifests and blobs from a registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the manifest `image` points at.
    async fn manifest(
        &self,
        image: &ImageReference,
        credentials: Option<&Credentials>,
    ) -> Result<Manifest>;

    /// Fetch a blob of `image`'s repository, verified against `digest`.
    async fn blob(
        &self,
        image: &ImageReference,
        digest: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>>;
}

/// [`RegistryClient`] over HTTP with bearer-token negotiation.
///
/// A 401 carrying a `Bearer` challenge is answered by fetching a token from
/// the challenge's realm (with basic auth when credentials are present) and
/// retrying once. A `Basic` challenge is answered with the credentials
/// directly. Tokens are cached per repository.
#[derive(Debug, Default)]
pub struct HttpRegistryClient {
    http: reqwest::Client,
    tokens: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl HttpRegistryClient {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(image: &ImageReference) -> String {
        format!("{}/{}", image.registry, image.repository)
    }

    async fn get(
        &self,
        image: &ImageReference,
        url: &str,
        accept: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> Result<Response> {
        let cached = self.tokens.lock().get(&Self::cache_key(image)).cloned();
        let response = self.send(url, accept, cached.as_deref().map(bearer)).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response);
        }

        let challenge = Challenge::from_headers(response.headers())
            .ok_or_else(|| BundleError::Auth(format!("{url} returned 401 without a challenge")))?;
        let authorization = match challenge {
            Challenge::Basic => {
                let creds = credentials.ok_or_else(|| {
                    BundleError::Auth(format!("{} requires credentials", image.registry))
                })?;
                basic(creds)
            }
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let scope = scope.unwrap_or_else(|| format!("repository:{}:pull", image.repository));
                let token = self
                    .token(&realm, service.as_deref(), &scope, credentials)
                    .await?;
                self.tokens
                    .lock()
                    .insert(Self::cache_key(image), token.clone());
                bearer(&token)
            }
        };
        check(self.send(url, accept, Some(authorization)).await?)
    }

    async fn send(
        &self,
        url: &str,
        accept: Option<&str>,
        authorization: Option<String>,
    ) -> Result<Response> {
        let mut request = self.http.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        Ok(request.send().await?)
    }

    async fn token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        credentials: Option<&Credentials>,
    ) -> Result<String> {
        let mut query = vec![("scope", scope)];
        if let Some(service) = service {
            query.push(("service", service));
        }
        let mut request = self.http.get(realm).query(&query);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(BundleError::Auth(format!(
                "token endpoint {realm} returned {}",
                response.status().as_u16()
            )));
        }
        let body: TokenResponse = response.json().await?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BundleError::Auth(format!("token endpoint {realm} returned no token")))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn manifest(
        &self,
        image: &ImageReference,
        credentials: Option<&Credentials>,
    ) -> Result<Manifest> {
        let url = format!(
            "{}{}/manifests/{}",
            image.api_base(),
            image.repository,
            image.reference()
        );
        let accept = format!("{OCI_MANIFEST_MEDIA_TYPE}, {DOCKER_MANIFEST_MEDIA_TYPE}");
        let response = self.get(image, &url, Some(&accept), credentials).await?;
        let body = response.bytes().await?;
        tracing::debug!(image = %image, bytes = body.len(), "manifest fetched");
        Manifest::from_slice(&body)
    }

    async fn blob(
        &self,
        image: &ImageReference,
        digest: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Vec<u8>> {
        let url = format!("{}{}/blobs/{digest}", image.api_base(), image.repository);
        let response = self.get(image, &url, None, credentials).await?;
        let body = response.bytes().await?.to_vec();
        verify_digest(digest, &body)?;
        Ok(body)
    }
}

/// Check `body` against a `sha256:` digest. Other algorithms pass unchecked.
pub fn verify_digest(digest: &str, body: &[u8]) -> Result<()> {
    let Some(expected) = digest.strip_prefix("sha256:") else {
        tracing::debug!(digest, "skipping verification of non-sha256 digest");
        return Ok(());
    };
    let computed = hex::encode(Sha256::digest(body));
    if computed.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(BundleError::DigestMismatch {
            expected: digest.to_string(),
            computed: format!("sha256:{computed}"),
        })
    }
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BundleError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn basic(creds: &Credentials) -> String {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", creds.username, creds.password));
    format!("Basic {encoded}")
}

/// A parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = headers.get(WWW_AUTHENTICATE)?.to_str().ok()?;
        Self::parse(value)
    }

    fn parse(value: &str) -> Option<Self> {
        let (scheme, rest) = value.trim().split_once(' ').unwrap_or((value.trim(), ""));
        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Self::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let params = parse_auth_params(rest);
        Some(Self::Bearer {
            realm: params.get("realm")?.clone(),
            service: params.get("service").cloned(),
            scope: params.get("scope").cloned(),
        })
    }
}

/// Split `k="v",k2="v,2"` into a map, honouring quotes.
fn parse_auth_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();
    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();
        let (value, remainder) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };
        params.insert(key, value.to_string());
        rest = remainder.trim_start_matches(',').trim();
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bearer_challenge() {
        let challenge = Challenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:a/b:pull,push""#,
        )
        .unwrap();
        assert_eq!(
            challenge,
            Challenge::Bearer {
                realm: "https://auth.example.com/token".into(),
                service: Some("registry.example.com".into()),
                scope: Some("repository:a/b:pull,push".into()),
            }
        );
        assert_eq!(Challenge::parse(r#"Basic realm="x""#), Some(Challenge::Basic));
        assert_eq!(Challenge::parse("Negotiate"), None);
        assert_eq!(Challenge::parse(r#"Bearer service="s""#), None);
    }

    #[test]
    fn test_manifest_rejects_index() {
        let body = br#"{"schemaVersion":2,"mediaType":"application/vnd.oci.image.index.v1+json","manifests":[]}"#;
        assert!(matches!(
            Manifest::from_slice(body),
            Err(BundleError::Manifest(_))
        ));
        assert!(Manifest::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_manifest_layers() {
        let body = br#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar",
                "digest": "sha256:abc",
                "size": 10,
                "annotations": {"dev.tekton.image.kind": "task"}
            }]
        }"#;
        let manifest = Manifest::from_slice(body).unwrap();
        assert_eq!(manifest.layers.len(), 1);
        assert_eq!(manifest.layers[0].annotations["dev.tekton.image.kind"], "task");
    }

    #[test]
    fn test_verify_digest() {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(b"hello")));
        assert!(verify_digest(&digest, b"hello").is_ok());
        assert!(matches!(
            verify_digest(&digest, b"world"),
            Err(BundleError::DigestMismatch { .. })
        ));
        assert!(verify_digest("sha512:whatever", b"x").is_ok());
    }
}
