//! End-to-end tests for the HTTP surface, driven against stub connections.

use actix_web::http::{Method, StatusCode};
use actix_web::{test, web, App};
use async_trait::async_trait;
use clickhouse_proxy::client::{
    ColumnMeta, Connection, ConnectionError, ConnectionFactory, Credentials, ExecuteOptions,
    NativeOutput,
};
use clickhouse_proxy::config::ProxyConfig;
use clickhouse_proxy::handlers::AppState;
use clickhouse_proxy::routes;
use clickhouse_proxy::session::SessionCache;
use clickhouse_proxy::trace::TraceSink;
use clickhouse_proxy::value::Value;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct StubConnection {
    output: NativeOutput,
    execute_error: Option<String>,
}

#[async_trait]
impl Connection for StubConnection {
    async fn execute(
        &mut self,
        _sql: &str,
        opts: ExecuteOptions,
        sink: Option<&TraceSink>,
    ) -> Result<NativeOutput, ConnectionError> {
        if let Some(message) = &self.execute_error {
            return Err(ConnectionError::new(message.clone()));
        }
        if opts.trace {
            if let Some(sink) = sink {
                sink.emit("DEBUG", "stub.connection", "query executed");
            }
        }
        Ok(self.output.clone())
    }

    async fn disconnect(&mut self) {}
}

#[derive(Default)]
struct StubFactory {
    connects: AtomicUsize,
    execute_error: Option<String>,
    connect_error: Option<String>,
}

impl StubFactory {
    fn count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for StubFactory {
    async fn connect(
        &self,
        _credentials: &Credentials,
        _sink: Option<&TraceSink>,
    ) -> Result<Box<dyn Connection>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.connect_error {
            return Err(ConnectionError::new(message.clone()));
        }
        Ok(Box::new(StubConnection {
            output: one_row_output(),
            execute_error: self.execute_error.clone(),
        }))
    }
}

fn one_row_output() -> NativeOutput {
    NativeOutput {
        columns: vec![ColumnMeta {
            name: "1".to_string(),
            type_name: "UInt8".to_string(),
        }],
        rows: vec![vec![Value::UInt(1)]],
        progress: None,
        elapsed_ns: None,
    }
}

fn app_state(factory: Arc<StubFactory>) -> web::Data<AppState> {
    web::Data::new(AppState {
        config: ProxyConfig::default(),
        sessions: Arc::new(SessionCache::new()),
        factory: factory as Arc<dyn ConnectionFactory>,
    })
}

macro_rules! init_app {
    ($factory:expr) => {
        test::init_service(
            App::new()
                .app_data(app_state($factory))
                .configure(routes::configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_get_query_returns_envelope() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201&user=default")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Access-Control-Allow-Origin").unwrap(),
        "*"
    );

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["data"], json!([[1]]));
    assert_eq!(body["meta"], json!([{"name": "1", "type": "UInt8"}]));
    assert_eq!(body["rows"], json!(1));
    assert_eq!(body["rows_before_limit_at_least"], json!(1));
    assert_eq!(body["statistics"]["result_rows"], json!(1));
    assert_eq!(body["statistics"]["result_bytes"], json!(1));
    assert!(body.get("trace").is_none());
    assert!(body.get("error").is_none());

    // Non-session request used (and released) exactly one fresh connection
    assert_eq!(factory.count(), 1);
}

#[actix_web::test]
async fn test_post_json_body_query() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    let req = test::TestRequest::post()
        .uri("/query")
        .set_payload(r#"{"query": "SELECT 1", "user": "default"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["data"], json!([[1]]));
}

#[actix_web::test]
async fn test_post_raw_sql_body() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    let req = test::TestRequest::post()
        .uri("/?user=default")
        .set_payload("SELECT 1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_missing_user_is_400_with_empty_envelope() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"], json!([]));
    assert_eq!(body["rows"], json!(0));
    assert!(body["error"].as_str().unwrap().contains("User credentials"));

    // No connection was ever attempted
    assert_eq!(factory.count(), 0);
}

#[actix_web::test]
async fn test_missing_query_is_400() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory);

    let req = test::TestRequest::get().uri("/query?user=default").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_authentication_error_maps_to_401() {
    let factory = Arc::new(StubFactory {
        execute_error: Some("Code: 516. Authentication failed: wrong password".to_string()),
        ..StubFactory::default()
    });
    let app = init_app!(factory);

    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201&user=default")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body: JsonValue = test::read_body_json(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Authentication failed"));
}

#[actix_web::test]
async fn test_connection_refused_maps_to_503() {
    let factory = Arc::new(StubFactory {
        connect_error: Some("Connection refused (os error 111)".to_string()),
        ..StubFactory::default()
    });
    let app = init_app!(factory);

    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201&user=default")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: JsonValue = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[actix_web::test]
async fn test_session_affinity_reuses_connection() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/query?q=SELECT%201&user=default&session_id=abc&session_timeout=120")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(factory.count(), 1);

    // A different session id gets its own connection
    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201&user=default&session_id=other")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(factory.count(), 2);
}

#[actix_web::test]
async fn test_non_session_requests_never_share() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    for _ in 0..3 {
        let req = test::TestRequest::get()
            .uri("/query?q=SELECT%201&user=default")
            .to_request();
        test::call_service(&app, req).await;
    }
    assert_eq!(factory.count(), 3);
}

#[actix_web::test]
async fn test_session_error_keeps_connection_cached() {
    let factory = Arc::new(StubFactory {
        execute_error: Some("Syntax error".to_string()),
        ..StubFactory::default()
    });
    let app = init_app!(factory.clone());

    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/query?q=BROKEN&user=default&session_id=abc")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    // The failing query did not evict the session connection
    assert_eq!(factory.count(), 1);
}

#[actix_web::test]
async fn test_trace_requested_and_isolated() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201&user=default&trace=1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: JsonValue = test::read_body_json(resp).await;
    let trace = body["trace"].as_array().expect("trace field expected");
    assert!(!trace.is_empty());
    assert!(trace[0].as_str().unwrap().contains("stub.connection"));

    // An interleaved non-trace request sees no trace field
    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201&user=default")
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: JsonValue = test::read_body_json(resp).await;
    assert!(body.get("trace").is_none());
}

#[actix_web::test]
async fn test_health_endpoints() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    for uri in ["/health", "/"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", uri);

        let body: JsonValue = test::read_body_json(resp).await;
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["service"], json!("clickhouse-proxy"));
    }
    assert_eq!(factory.count(), 0);
}

#[actix_web::test]
async fn test_root_with_query_param_executes() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory.clone());

    let req = test::TestRequest::get()
        .uri("/?q=SELECT%201&user=default")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["data"], json!([[1]]));
    assert_eq!(factory.count(), 1);
}

#[actix_web::test]
async fn test_options_preflight_anywhere() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory);

    for uri in ["/query", "/", "/anything/else"] {
        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri(uri)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Methods").unwrap(),
            "GET, POST, OPTIONS"
        );
        let body = test::read_body(resp).await;
        assert!(body.is_empty());
    }
}

#[actix_web::test]
async fn test_unmatched_path_is_404_envelope() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory);

    let req = test::TestRequest::get().uri("/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: JsonValue = test::read_body_json(resp).await;
    assert_eq!(body["data"], json!([]));
    assert!(body["error"].as_str().unwrap().contains("/nope"));
}

#[actix_web::test]
async fn test_query_prefix_paths_match() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory);

    let req = test::TestRequest::get()
        .uri("/query/extra?q=SELECT%201&user=default")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_query_prefix_without_slash_matches() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory);

    let req = test::TestRequest::get()
        .uri("/queryextra?q=SELECT%201&user=default")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_unsupported_method_gets_404_envelope() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory);

    for uri in ["/health", "/query"] {
        let req = test::TestRequest::default()
            .method(Method::PUT)
            .uri(uri)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        let body: JsonValue = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains(uri));
    }

    // POST to /health is not a query endpoint either
    let req = test::TestRequest::post().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_header_credentials_beat_query_string_end_to_end() {
    let factory = Arc::new(StubFactory::default());
    let app = init_app!(factory);

    // Both sources present; header wins, so the request is authorized as
    // header_user and still succeeds.
    let req = test::TestRequest::get()
        .uri("/query?q=SELECT%201&user=qs_user")
        .insert_header(("X-ClickHouse-User", "header_user"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
