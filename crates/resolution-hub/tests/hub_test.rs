//! Hub resolver against a mock catalog API.

use resolution_config::ResolverConfig;
use resolution_framework::{Params, Resolver, ResolverContext, ResolverError};
use resolution_hub::HubResolver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TASK_PATH: &str = "/v1/resource/Tekton/task/git-clone/0.6/yaml";

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn git_clone() -> Params {
    params(&[("kind", "task"), ("name", "git-clone"), ("version", "0.6")])
}

#[tokio::test]
async fn test_returns_yaml_field_without_annotations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{"yaml":"x"}}"#))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = HubResolver::from_api_base(&server.uri());
    let resource = resolver
        .resolve(&ResolverContext::default(), &git_clone())
        .await
        .unwrap();
    assert_eq!(resource.data(), b"x");
    assert!(resource.annotations().is_empty());
}

#[tokio::test]
async fn test_non_json_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("value"))
        .mount(&server)
        .await;

    let resolver = HubResolver::from_api_base(&server.uri());
    let err = resolver
        .resolve(&ResolverContext::default(), &git_clone())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolverError::Parse(_)), "{err}");
    assert_eq!(err.reason(), "ResolutionFailed");
}

#[tokio::test]
async fn test_missing_resource_is_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let resolver = HubResolver::from_api_base(&server.uri());
    let err = resolver
        .resolve(&ResolverContext::default(), &git_clone())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolverError::Fetch(_)), "{err}");
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_config_supplies_catalog_and_kind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resource/Community/pipeline/build/1.0/yaml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"data":{"yaml":"kind: Pipeline"}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ctx = ResolverContext::new(
        ResolverConfig::new()
            .with("default-catalog", "Community")
            .with("default-kind", "pipeline"),
    );
    let resource = HubResolver::from_api_base(&server.uri())
        .resolve(&ctx, &params(&[("name", "build"), ("version", "1.0")]))
        .await
        .unwrap();
    assert_eq!(resource.data(), b"kind: Pipeline");
}

#[tokio::test]
async fn test_reserved_characters_stay_in_the_name_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/resource/Tekton/task/git-clone%23/0.6/yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{"yaml":"odd"}}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TASK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{"yaml":"x"}}"#))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = HubResolver::from_api_base(&server.uri());
    let resource = resolver
        .resolve(
            &ResolverContext::default(),
            &params(&[("kind", "task"), ("name", "git-clone#"), ("version", "0.6")]),
        )
        .await
        .unwrap();
    assert_eq!(resource.data(), b"odd");
}
