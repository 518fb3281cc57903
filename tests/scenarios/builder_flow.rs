//! Request construction scenarios: URLs, headers, bodies, interceptors.

use bytes::Bytes;
use granite_client::Client;
use granite_core::{Error, HttpRequest, HttpResponse};
use http::StatusCode;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// A transport that records every request it sees and answers 200.
fn recording_transport(
    seen: Arc<Mutex<Vec<HttpRequest>>>,
) -> granite_core::BoxTransport {
    granite_core::BoxTransport::new(tower::service_fn(move |req: HttpRequest| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(req);
            Ok::<_, Error>(HttpResponse::new(StatusCode::OK))
        }
    }))
}

fn client_with(seen: Arc<Mutex<Vec<HttpRequest>>>) -> Client {
    Client::builder()
        .transport_boxed(recording_transport(seen))
        .base_url("https://api.example.com")
        .default_header("user-agent", "granite-tests")
        .default_header("x-team", "platform")
        .build()
        .unwrap()
}

#[tokio::test]
async fn path_params_are_substituted_and_encoded() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    client
        .op("get_user")
        .path_param("id", "alice/bob")
        .path_param("tab", "a b")
        .get("/users/{id}/tabs/{tab}")
        .await
        .unwrap();

    let requests = seen.lock().unwrap();
    assert_eq!(
        requests[0].url.path(),
        "/users/alice%2Fbob/tabs/a%20b"
    );
}

#[tokio::test]
async fn queries_support_multiple_values_per_key() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    client
        .op("search")
        .query("tag", "rust")
        .query("tag", "http")
        .query("page", "2")
        .get("/search")
        .await
        .unwrap();

    let requests = seen.lock().unwrap();
    assert_eq!(
        requests[0].url.query(),
        Some("tag=rust&tag=http&page=2")
    );
}

#[tokio::test]
async fn per_request_headers_replace_client_defaults() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    client
        .op("custom")
        .header("x-team", "search")
        .header("x-trace", "abc")
        .get("/x")
        .await
        .unwrap();

    let requests = seen.lock().unwrap();
    let headers = &requests[0].headers;
    assert_eq!(headers.get("user-agent").unwrap(), "granite-tests");
    assert_eq!(headers.get("x-team").unwrap(), "search");
    assert_eq!(headers.get("x-trace").unwrap(), "abc");
}

#[tokio::test]
async fn json_body_sets_content_type_and_bytes() {
    #[derive(Serialize)]
    struct NewUser {
        name: &'static str,
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    client
        .op("create_user")
        .body_json(&NewUser { name: "ada" })
        .post("/users")
        .await
        .unwrap();

    let requests = seen.lock().unwrap();
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(
        requests[0].body.buffered().unwrap().as_ref(),
        br#"{"name":"ada"}"#
    );
}

#[tokio::test]
async fn form_body_is_urlencoded() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    client
        .op("token")
        .body_form(&[("grant_type", "client_credentials"), ("scope", "read write")])
        .post("/oauth/token")
        .await
        .unwrap();

    let requests = seen.lock().unwrap();
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/x-www-form-urlencoded"
    );
    assert_eq!(
        requests[0].body.buffered().unwrap().as_ref(),
        b"grant_type=client_credentials&scope=read+write"
    );
}

#[tokio::test]
async fn explicit_content_type_wins_over_encoder_default() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    client
        .op("vendor")
        .header("content-type", "application/vnd.example+json")
        .body_json(&serde_json::json!({"k": "v"}))
        .post("/things")
        .await
        .unwrap();

    let requests = seen.lock().unwrap();
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/vnd.example+json"
    );
}

#[tokio::test]
async fn multipart_builds_fields_and_files() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    let content = futures::StreamExt::boxed(futures::stream::iter(vec![Ok(
        Bytes::from_static(b"file-content"),
    )]));

    client
        .op("upload")
        .form_field("kind", "report")
        .file_reader("doc", "report.txt", content)
        .post("/uploads")
        .await
        .unwrap();

    let requests = seen.lock().unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data; boundary="));

    let body = String::from_utf8(requests[0].body.buffered().unwrap().to_vec()).unwrap();
    assert!(body.contains("name=\"kind\"\r\n\r\nreport"));
    assert!(body.contains("filename=\"report.txt\""));
    assert!(body.contains("file-content"));
}

#[tokio::test]
async fn builder_errors_are_deferred_to_send() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    let result = client
        .op("bad")
        .header("not a header\n", "x")
        .get("/x")
        .await;

    assert!(matches!(result, Err(Error::InvalidHeader { .. })));
    assert!(seen.lock().unwrap().is_empty(), "nothing was dispatched");
}

#[tokio::test]
async fn request_interceptor_can_rewrite_and_reject() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = Client::builder()
        .transport_boxed(recording_transport(Arc::clone(&seen)))
        .base_url("https://api.example.com")
        .intercept_request(|req| {
            req.headers
                .insert("authorization", "Bearer token".parse().unwrap());
            Ok(())
        })
        .build()
        .unwrap();

    client.op("authed").get("/x").await.unwrap();
    assert_eq!(
        seen.lock().unwrap()[0].headers.get("authorization").unwrap(),
        "Bearer token"
    );

    // A per-request interceptor rejection aborts before dispatch.
    let result = client
        .op("blocked")
        .intercept(|_req| {
            Err(Error::Config {
                reason: "blocked by interceptor".to_string(),
            })
        })
        .get("/x")
        .await;
    assert!(matches!(result, Err(Error::Config { .. })));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn trace_info_is_captured_when_enabled() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    let plain = client.op("plain").get("/x").await.unwrap();
    assert!(plain.trace_info().is_none());

    let traced = client.op("traced").enable_trace().get("/x").await.unwrap();
    let trace = traced.trace_info().unwrap();
    assert_eq!(trace.operation, "traced");
}

#[tokio::test]
async fn curl_command_round_trips_the_request_line() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let client = client_with(Arc::clone(&seen));

    let envelope = client
        .op("create")
        .body_json(&serde_json::json!({"a": 1}))
        .post("/things")
        .await
        .unwrap();

    let curl = envelope.curl_command();
    assert!(curl.starts_with("curl -X POST 'https://api.example.com/things'"));
    assert!(curl.contains(r#"-d '{"a":1}'"#));
}
