//! Bundle resolver against a mock OCI registry.

use std::sync::Arc;

use resolution_bundle::{BundleResolver, Credentials, StaticKeychain};
use resolution_framework::{Params, Resolver, ResolverContext, ResolverError};
use serde_json::json;
use sha2::{Digest, Sha256};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TASK_YAML: &[u8] = b"apiVersion: tekton.dev/v1beta1\nkind: Task\nmetadata:\n  name: build\n";

fn tarball(name: &str, content: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_ustar();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, content).unwrap();
    builder.into_inner().unwrap()
}

fn digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

fn layer(digest: &str, kind: &str, name: &str) -> serde_json::Value {
    json!({
        "mediaType": "application/vnd.oci.image.layer.v1.tar",
        "digest": digest,
        "size": 0,
        "annotations": {
            "dev.tekton.image.kind": kind,
            "dev.tekton.image.name": name,
            "dev.tekton.image.apiVersion": "tekton.dev/v1beta1",
        }
    })
}

fn manifest(layers: Vec<serde_json::Value>) -> serde_json::Value {
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
            "size": 2
        },
        "layers": layers,
    })
}

fn params(bundle: &str, kind: &str, name: &str) -> Params {
    [
        ("bundle", bundle),
        ("kind", kind),
        ("name", name),
        ("serviceAccount", "default"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[tokio::test]
async fn test_pulls_matching_layer_with_bearer_token() {
    let server = MockServer::start().await;
    let host = server.address().to_string();
    let task = tarball("task.yaml", TASK_YAML);
    let task_digest = digest(&task);
    let body = manifest(vec![
        layer(&digest(b"other"), "pipeline", "ci"),
        layer(&task_digest, "task", "build"),
    ]);

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(header("authorization", "Basic dTpw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/bundles/catalog/manifests/v1"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/bundles/catalog/blobs/{task_digest}")))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(task.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/bundles/catalog/manifests/v1"))
        .respond_with(ResponseTemplate::new(401).insert_header(
            "WWW-Authenticate",
            format!(r#"Bearer realm="{}/token",service="test-registry""#, server.uri()),
        ))
        .mount(&server)
        .await;

    let keychain = StaticKeychain::new().with(
        host.clone(),
        Credentials {
            username: "u".into(),
            password: "p".into(),
        },
    );
    let resolver = BundleResolver::new().with_keychain(Arc::new(keychain));
    let resource = resolver
        .resolve(
            &ResolverContext::default(),
            &params(&format!("{host}/bundles/catalog:v1"), "task", "build"),
        )
        .await
        .unwrap();

    assert_eq!(resource.data(), TASK_YAML);
    let annotations = resource.annotations();
    assert_eq!(annotations["dev.tekton.image.kind"], "task");
    assert_eq!(annotations["dev.tekton.image.name"], "build");
    assert_eq!(annotations["dev.tekton.image.apiVersion"], "tekton.dev/v1beta1");
}

#[tokio::test]
async fn test_unannotated_layer_fails() {
    let server = MockServer::start().await;
    let host = server.address().to_string();
    let body = json!({
        "schemaVersion": 2,
        "layers": [{"mediaType": "application/vnd.oci.image.layer.v1.tar", "digest": "sha256:00", "size": 1}],
    });
    Mock::given(method("GET"))
        .and(path("/v2/bundles/catalog/manifests/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = BundleResolver::new()
        .resolve(
            &ResolverContext::default(),
            &params(&format!("{host}/bundles/catalog"), "task", "build"),
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolverError::Fetch(_)), "{err}");
    assert_eq!(err.to_string(), "kind annotation not found in bundle layer 0");
}

#[tokio::test]
async fn test_tampered_blob_is_rejected() {
    let server = MockServer::start().await;
    let host = server.address().to_string();
    let task = tarball("task.yaml", TASK_YAML);
    let task_digest = digest(&task);
    Mock::given(method("GET"))
        .and(path("/v2/bundles/catalog/manifests/v1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(manifest(vec![layer(&task_digest, "task", "build")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v2/bundles/catalog/blobs/{task_digest}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball("task.yaml", b"evil")))
        .mount(&server)
        .await;

    let err = BundleResolver::new()
        .resolve(
            &ResolverContext::default(),
            &params(&format!("{host}/bundles/catalog:v1"), "task", "build"),
        )
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("digest mismatch"), "{err}");
}

#[tokio::test]
async fn test_no_matching_layer() {
    let server = MockServer::start().await;
    let host = server.address().to_string();
    Mock::given(method("GET"))
        .and(path("/v2/bundles/catalog/manifests/v1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(manifest(vec![layer(&digest(b"x"), "pipeline", "ci")])),
        )
        .mount(&server)
        .await;

    let err = BundleResolver::new()
        .resolve(
            &ResolverContext::default(),
            &params(&format!("{host}/bundles/catalog:v1"), "task", "build"),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.reason(), "ResolutionFailed");
    assert!(err.to_string().contains("no matching image layer"));
}
