//! Integration tests for the functions framework.

use functions_framework::event::{background_event_to_cloud_event, EventData};
use functions_framework::execution::{LogCorrelator, EXECUTION_ID_HEADER, TRACE_CONTEXT_HEADER};
use functions_framework::prelude::*;
use functions_framework::runtime::respond;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

#[derive(Debug, Serialize, Deserialize)]
struct Person {
    name: String,
    age: u32,
}

fn app(registry: &FunctionRegistry, config: FrameworkConfig) -> FunctionApp {
    assert_ok!(FunctionApp::build(&config, registry, None))
}

fn post_json(body: Value) -> FunctionRequest {
    FunctionRequest::new(Method::Post, "/")
        .header("Content-Type", "application/json")
        .body(body.to_string())
}

fn storage_cloud_event() -> CloudEvent {
    CloudEvent::new(
        "aaaaaa-1111-bbbb-2222-cccccccccccc",
        "//storage.googleapis.com/projects/_/buckets/some-bucket",
        "google.cloud.storage.object.v1.finalized",
    )
    .time("2020-09-29T11:32:00.000Z")
    .subject("objects/folder/Test.cs")
    .data(json!({
        "bucket": "some-bucket",
        "kind": "storage#object",
        "name": "folder/Test.cs",
        "size": "352",
    }))
}

#[tokio::test]
async fn test_http_function_serves_text() {
    let mut registry = FunctionRegistry::new();
    registry
        .http("hello", |req: FunctionRequest| {
            Ok(format!("Hello, {}!", req.text().unwrap_or_else(|| "World".into())))
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("hello"));

    let response = app.handle(FunctionRequest::new(Method::Get, "/")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text_body().unwrap(), "Hello, World!");

    let response = app
        .handle(FunctionRequest::new(Method::Post, "/").body("Rust"))
        .await;
    assert_eq!(response.text_body().unwrap(), "Hello, Rust!");
}

#[tokio::test]
async fn test_generated_execution_id_is_stable_across_await() {
    let mut registry = FunctionRegistry::new();
    registry
        .http_async("ids", |req: FunctionRequest| async move {
            let before = current_context().map(|c| c.execution_id().to_string());
            tokio::time::sleep(Duration::from_millis(10)).await;
            let after = current_context().map(|c| c.execution_id().to_string());
            HandlerOutput::json(&json!({
                "header": req.get_header(EXECUTION_ID_HEADER),
                "before": before,
                "after": after,
            }))
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("ids"));

    let response = app.handle(FunctionRequest::new(Method::Get, "/")).await;
    let body: Value = response.json_body().unwrap().unwrap();
    let id = body["header"].as_str().unwrap();
    assert_eq!(id.len(), 12);
    assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(body["before"], id);
    assert_eq!(body["after"], id);
}

#[tokio::test]
async fn test_inbound_execution_id_is_kept() {
    let mut registry = FunctionRegistry::new();
    registry
        .http("id", |_req: FunctionRequest| {
            Ok(current_context()
                .map(|c| c.execution_id().to_string())
                .unwrap_or_default())
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("id"));

    let request = FunctionRequest::new(Method::Get, "/").header(EXECUTION_ID_HEADER, "inbound-id");
    let response = app.handle(request).await;
    assert_eq!(response.text_body().unwrap(), "inbound-id");
}

async fn assert_concurrent_ids_are_isolated(app: Arc<FunctionApp>) {
    let requests = ["first", "second", "third"].map(|id| {
        let app = app.clone();
        tokio::spawn(async move {
            let request = FunctionRequest::new(Method::Get, "/").header(EXECUTION_ID_HEADER, id);
            (id, app.handle(request).await)
        })
    });
    for request in requests {
        let (id, response) = request.await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text_body().unwrap(), format!("{id}/{id}"));
    }
}

fn async_id_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .http_async("ids", |_req: FunctionRequest| async move {
            let before = current_context().unwrap().execution_id().to_string();
            tokio::time::sleep(Duration::from_millis(50)).await;
            let after = current_context().unwrap().execution_id().to_string();
            Ok(format!("{before}/{after}"))
        })
        .unwrap();
    registry
}

fn blocking_id_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .http("ids", |_req: FunctionRequest| {
            let before = current_context().unwrap().execution_id().to_string();
            std::thread::sleep(Duration::from_millis(50));
            let after = current_context().unwrap().execution_id().to_string();
            Ok(format!("{before}/{after}"))
        })
        .unwrap();
    registry
}

#[tokio::test(flavor = "current_thread")]
async fn test_async_backend_isolates_concurrent_async_functions() {
    let config = FrameworkConfig::new("ids").backend(ServerBackend::Async);
    assert_concurrent_ids_are_isolated(Arc::new(app(&async_id_registry(), config))).await;
}

#[tokio::test(flavor = "current_thread")]
async fn test_async_backend_isolates_offloaded_blocking_functions() {
    let config = FrameworkConfig::new("ids").backend(ServerBackend::Async);
    assert_concurrent_ids_are_isolated(Arc::new(app(&blocking_id_registry(), config))).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_threaded_backend_isolates_concurrent_requests() {
    let config = FrameworkConfig::new("ids").backend(ServerBackend::Threaded);
    assert_concurrent_ids_are_isolated(Arc::new(app(&blocking_id_registry(), config.clone()))).await;
    assert_concurrent_ids_are_isolated(Arc::new(app(&async_id_registry(), config))).await;
}

#[tokio::test]
async fn test_typed_function_round_trips_record() {
    let mut registry = FunctionRegistry::new();
    registry
        .typed("increment_age", |person: Person| {
            Ok(TypedReturn::record(Person {
                name: person.name,
                age: person.age + 1,
            }))
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("increment_age"));
    assert_eq!(app.kind(), SignatureKind::Typed);

    let response = app.handle(post_json(json!({"name": "john", "age": 30}))).await;
    assert_eq!(response.status, StatusCode::OK);
    let body: Value = response.json_body().unwrap().unwrap();
    assert_eq!(body, json!({"name": "john", "age": 31}));

    let response = app.handle(post_json(json!({"name": "john"}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!response.is_crash());
}

#[tokio::test]
async fn test_failing_function_answers_crash() {
    let mut registry = FunctionRegistry::new();
    registry
        .http("fragile", |req: FunctionRequest| {
            match req.text().as_deref() {
                Some("fail") => Err(FunctionError::new("asked to fail")),
                Some("panic") => panic!("asked to panic"),
                _ => Ok("fine"),
            }
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("fragile"));

    let ok = app.handle(FunctionRequest::new(Method::Post, "/").body("hello")).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert!(!ok.is_crash());

    for input in ["fail", "panic"] {
        let response = app.handle(FunctionRequest::new(Method::Post, "/").body(input)).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.get_header("X-Google-Status").unwrap(), "crash");
        assert_eq!(response.text_body().unwrap(), "Internal Server Error");
    }

    let again = app.handle(FunctionRequest::new(Method::Post, "/").body("hello")).await;
    assert_eq!(again.text_body().unwrap(), "fine");
}

#[tokio::test]
async fn test_failing_cloud_event_function_answers_crash() {
    let mut registry = FunctionRegistry::new();
    registry
        .cloud_event("broken", |_event: CloudEvent| Err(FunctionError::new("no luck")))
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("broken"));

    let request = FunctionRequest::new(Method::Post, "/")
        .header("Content-Type", "application/cloudevents+json")
        .body(storage_cloud_event().to_structured().to_string());
    let response = app.handle(request).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.is_crash());
    assert!(response.text_body().unwrap().contains("no luck"));
}

#[tokio::test]
async fn test_legacy_event_is_delivered() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut registry = FunctionRegistry::new();
    registry
        .event("legacy", move |event: BackgroundEvent| {
            sink.lock().unwrap().push(event);
            Ok(())
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("legacy"));

    let response = app
        .handle(post_json(json!({
            "context": {
                "eventId": "e1",
                "timestamp": "2020-09-29T11:32:00.000Z",
                "eventType": "google.pubsub.topic.publish",
                "resource": "projects/p/topics/t"
            },
            "data": {"message": "hi"}
        })))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text_body().unwrap(), "OK");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].context.event_id.as_deref(), Some("e1"));
    assert_eq!(seen[0].data, json!({"message": "hi"}));
}

#[tokio::test]
async fn test_cloud_event_to_legacy_and_back() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let mut registry = FunctionRegistry::new();
    registry
        .event("legacy", move |event: BackgroundEvent| {
            *sink.lock().unwrap() = Some(event);
            Ok(())
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("legacy"));

    let original = storage_cloud_event();
    let (headers, body) = original.to_binary();
    let mut request = FunctionRequest::new(Method::Post, "/").body(body);
    for (name, value) in headers {
        request.set_header(name, value);
    }
    let response = app.handle(request).await;
    assert_eq!(response.status, StatusCode::OK);

    let legacy = seen.lock().unwrap().take().unwrap();
    assert_eq!(legacy.context.event_type.as_deref(), Some("google.storage.object.finalize"));
    assert_eq!(
        legacy.context.resource.as_ref().unwrap().name(),
        "projects/_/buckets/some-bucket/objects/folder/Test.cs"
    );

    let converted = assert_ok!(background_event_to_cloud_event(legacy));
    assert_eq!(converted.id, original.id);
    assert_eq!(converted.source, original.source);
    assert_eq!(converted.event_type, original.event_type);
    assert_eq!(converted.subject, original.subject);
    assert_eq!(converted.time, original.time);
    assert_eq!(converted.data_json(), original.data_json());
}

#[tokio::test]
async fn test_legacy_event_reaches_cloud_event_function() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let mut registry = FunctionRegistry::new();
    registry
        .cloud_event_async("on_event", move |event: CloudEvent| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(event);
                Ok(())
            }
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("on_event"));

    let response = app
        .handle(post_json(json!({
            "context": {
                "eventId": "1215011316659232",
                "timestamp": "2020-05-18T12:13:19Z",
                "eventType": "providers/cloud.pubsub/eventTypes/topic.publish",
                "resource": "projects/sample-project/topics/gcf-test"
            },
            "data": {"data": "10"}
        })))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let event = seen.lock().unwrap().take().unwrap();
    assert_eq!(event.id, "1215011316659232");
    assert_eq!(event.event_type, "google.cloud.pubsub.topic.v1.messagePublished");
    assert_eq!(
        event.source,
        "//pubsub.googleapis.com/projects/sample-project/topics/gcf-test"
    );
    match event.data {
        Some(EventData::Json(data)) => {
            assert_eq!(data["message"]["data"], "10");
            assert_eq!(data["message"]["messageId"], "1215011316659232");
        }
        other => panic!("unexpected data: {:?}", other),
    }
}

#[tokio::test]
async fn test_unparseable_cloud_event_is_bad_request() {
    let mut registry = FunctionRegistry::new();
    registry.cloud_event("on_event", |_event: CloudEvent| Ok(())).unwrap();
    let app = app(&registry, FrameworkConfig::new("on_event"));

    let response = app.handle(post_json(json!({"some": "thing"}))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!response.is_crash());
}

fn logging_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    for (name, enabled) in [("logged", true), ("plain", false)] {
        registry
            .http(name, move |_req: FunctionRequest| {
                let mut out = LogCorrelator::with_enabled(Vec::new(), enabled);
                writeln!(out, "some message")?;
                Ok(String::from_utf8_lossy(&out.into_inner()).into_owned())
            })
            .unwrap();
    }
    registry
}

#[tokio::test]
async fn test_log_lines_carry_execution_id_when_enabled() {
    let app = app(&logging_registry(), FrameworkConfig::new("logged"));
    let request = FunctionRequest::new(Method::Get, "/")
        .header(EXECUTION_ID_HEADER, "test-execution-id")
        .header(TRACE_CONTEXT_HEADER, "0123456789abcdef/42;o=1");

    let response = app.handle(request).await;
    let text = response.text_body().unwrap();
    assert!(text.ends_with('\n'));
    let line: Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(line["message"], "some message");
    assert_eq!(
        line["logging.googleapis.com/labels"]["execution_id"],
        "test-execution-id"
    );
    assert_eq!(line["logging.googleapis.com/spanId"], "42");
}

#[tokio::test]
async fn test_log_lines_are_untouched_when_disabled() {
    let app = app(&logging_registry(), FrameworkConfig::new("plain"));
    let request = FunctionRequest::new(Method::Get, "/").header(EXECUTION_ID_HEADER, "test-execution-id");

    let response = app.handle(request).await;
    assert_eq!(response.text_body().unwrap(), "some message\n");
}

#[tokio::test]
async fn test_routing_by_signature_kind() {
    let mut registry = FunctionRegistry::new();
    registry
        .http("web", |_req: FunctionRequest| Ok("page"))
        .unwrap()
        .event("legacy", |_event: BackgroundEvent| Ok(()))
        .unwrap()
        .typed("typed", |person: Person| Ok(TypedReturn::text(person.name)))
        .unwrap();

    let web = app(&registry, FrameworkConfig::new("web"));
    for path in ["/robots.txt", "/favicon.ico"] {
        let response = web.handle(FunctionRequest::new(Method::Get, path)).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
    let response = web.handle(FunctionRequest::new(Method::Put, "/nested/path")).await;
    assert_eq!(response.text_body().unwrap(), "page");

    let legacy = app(&registry, FrameworkConfig::new("legacy"));
    let response = legacy.handle(FunctionRequest::new(Method::Get, "/")).await;
    assert_eq!(response.status, StatusCode::OK);
    let response = legacy.handle(FunctionRequest::new(Method::Put, "/")).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);

    let typed = app(&registry, FrameworkConfig::new("typed"));
    let response = typed.handle(FunctionRequest::new(Method::Get, "/")).await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    let response = typed.handle(post_json(json!({"name": "jane", "age": 5}))).await;
    assert_eq!(response.text_body().unwrap(), "jane");
}

#[tokio::test]
async fn test_debug_mode_defers_missing_function() {
    let registry = FunctionRegistry::new();
    let config = FrameworkConfig::new("nowhere").debug(true);
    let app = app(&registry, config);

    let response = app.handle(FunctionRequest::new(Method::Get, "/")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.is_crash());

    let err = FunctionApp::build(&FrameworkConfig::new("nowhere"), &registry, None).unwrap_err();
    assert!(matches!(err, FrameworkError::FunctionNotFound(_)));
}

#[tokio::test]
async fn test_signature_precedence() {
    let mut registry = FunctionRegistry::new();
    registry.http("web", |_req: FunctionRequest| Ok("page")).unwrap();

    let app = assert_ok!(FunctionApp::build(
        &FrameworkConfig::new("web"),
        &registry,
        Some(SignatureKind::Http)
    ));
    assert_eq!(app.kind(), SignatureKind::Http);

    let err = FunctionApp::build(
        &FrameworkConfig::new("web").signature_type(SignatureKind::CloudEvent),
        &registry,
        Some(SignatureKind::Http),
    )
    .unwrap_err();
    assert!(matches!(err, FrameworkError::SignatureMismatch { .. }));
}

#[tokio::test]
async fn test_respond_without_timeout_runs_to_completion() {
    let mut registry = FunctionRegistry::new();
    registry
        .http_async("slow", |_req: FunctionRequest| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok("done")
        })
        .unwrap();
    let app = app(&registry, FrameworkConfig::new("slow"));

    let response = respond(Arc::new(app), FunctionRequest::new(Method::Get, "/"), 0).await;
    assert_eq!(response.text_body().unwrap(), "done");
}

#[test]
fn test_handle_from_blocking_caller() {
    let mut registry = FunctionRegistry::new();
    registry.http("hello", |_req: FunctionRequest| Ok("hi")).unwrap();
    let app = app(&registry, FrameworkConfig::new("hello").backend(ServerBackend::Async));

    let response = tokio_test::block_on(app.handle(FunctionRequest::new(Method::Get, "/")));
    assert_eq!(response.text_body().unwrap(), "hi");
}
