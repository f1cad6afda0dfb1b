//! The kube-runtime controller against a mock API server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use resolution_config::{ConfigStore, FrameworkConfig};
use resolution_framework::{
    ClusterController, KubeRecordStore, Params, Resolver, ResolverContext, ResolverError,
    type_selector,
};
use resolution_types::{
    LABEL_KEY_RESOLVER_TYPE, ObjectKey, ResolvedResource, Resource, ResourceRequest,
    ResourceRequestSpec,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const RECORD_PATH: &str =
    "/apis/resolution.tekton.dev/v1alpha1/namespaces/default/resourcerequests/rr";

struct Static;

#[async_trait]
impl Resolver for Static {
    fn name(&self) -> &str {
        "Static"
    }

    fn selector(&self) -> Params {
        type_selector(LABEL_KEY_RESOLVER_TYPE, "static")
    }

    fn validate_params(&self, _: &ResolverContext, _: &Params) -> Result<(), ResolverError> {
        Ok(())
    }

    async fn resolve(
        &self,
        _: &ResolverContext,
        _: &Params,
    ) -> Result<Box<dyn ResolvedResource>, ResolverError> {
        Ok(Box::new(Resource::new("kind: Task")))
    }
}

/// Answers a status write with the record it was sent.
struct EchoBody;

impl Respond for EchoBody {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(request.body.clone(), "application/json")
    }
}

fn record(age: chrono::Duration) -> ResourceRequest {
    let mut rr = ResourceRequest::new("rr", ResourceRequestSpec::default());
    rr.metadata.namespace = Some("default".into());
    rr.metadata.resource_version = Some("7".into());
    rr.metadata.creation_timestamp = Some(Time(Utc::now() - age));
    rr.metadata.labels = Some(BTreeMap::from([(
        LABEL_KEY_RESOLVER_TYPE.to_string(),
        "static".to_string(),
    )]));
    rr
}

async fn serve(record: &ResourceRequest) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RECORD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(record))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("{RECORD_PATH}/status")))
        .respond_with(EchoBody)
        .mount(&server)
        .await;
    server
}

async fn controller(server: &MockServer) -> anyhow::Result<ClusterController> {
    let client = kube::Client::try_from(kube::Config::new(server.uri().parse()?))?;
    Ok(ClusterController::new(
        Static,
        Arc::new(KubeRecordStore::new(client)),
        ConfigStore::new("static"),
        &FrameworkConfig::default(),
    )
    .await?)
}

async fn status_writes(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "PUT")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_in_progress_is_written_before_resolving_and_requeued() -> anyhow::Result<()> {
    let server = serve(&record(chrono::Duration::seconds(20))).await;
    let controller = controller(&server).await?;

    let requeue = controller
        .reconcile(&ObjectKey::new("default", "rr"))
        .await?
        .expect("in-progress record schedules a re-check");
    // Creation timestamps are stored with second precision.
    assert!(requeue <= Duration::from_secs(40), "{requeue:?}");
    assert!(requeue > Duration::from_secs(38), "{requeue:?}");

    let writes = status_writes(&server).await;
    assert_eq!(writes.len(), 2);
    let first = &writes[0]["status"]["conditions"][0];
    assert_eq!(first["status"], "Unknown");
    assert_eq!(first["message"], "waiting for resolver");
    assert_eq!(writes[0]["metadata"]["resourceVersion"], "7");
    assert_eq!(writes[1]["status"]["conditions"][0]["status"], "True");
    assert_eq!(writes[1]["status"]["data"], "a2luZDogVGFzaw==");
    Ok(())
}

#[tokio::test]
async fn test_expired_record_fails_without_requeue() -> anyhow::Result<()> {
    let server = serve(&record(chrono::Duration::minutes(5))).await;
    let controller = controller(&server).await?;

    let requeue = controller
        .reconcile(&ObjectKey::new("default", "rr"))
        .await?;
    assert_eq!(requeue, None);

    let writes = status_writes(&server).await;
    assert_eq!(writes.len(), 1);
    let cond = &writes[0]["status"]["conditions"][0];
    assert_eq!(cond["status"], "False");
    assert_eq!(cond["reason"], "ResolutionTimedOut");
    Ok(())
}
