//! HTTP surface of the gateway.
//!
//! The default service intercepts every request and runs it through the
//! worker; the `/_offcast` scope is the control channel (messages, push,
//! sync, notifications). Mutating requests that fail while offline are
//! queued for background sync and acknowledged with 202.

use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, Scope, http::StatusCode, web};
use bytes::Bytes;
use serde::Deserialize;
use url::Url;

use crate::error::GatewayError;
use offcast_core::AppConfig;
use offcast_worker::{ControlMessage, RequestMode, Worker, WorkerRequest, WorkerResponse};

/// Shared state handed to every handler.
pub struct GatewayState {
    pub worker: Arc<Worker>,
    pub upstream: Url,
}

impl GatewayState {
    pub fn new(worker: Arc<Worker>, cfg: &AppConfig) -> Result<Self, GatewayError> {
        let upstream = Url::parse(&cfg.upstream).map_err(|e| GatewayError::BadUrl(e.to_string()))?;
        Ok(Self { worker, upstream })
    }
}

/// The `/_offcast` control scope.
pub fn control_scope() -> Scope {
    web::scope("/_offcast")
        .route("/message", web::post().to(message))
        .route("/push", web::post().to(push))
        .route("/sync", web::post().to(sync_now))
        .route("/notifications", web::get().to(notifications))
        .route("/notifications/click", web::post().to(notification_click))
}

/// Catch-all interception handler.
pub async fn intercept(req: HttpRequest, body: Bytes, state: web::Data<GatewayState>) -> HttpResponse {
    let worker_req = match to_worker_request(&req, body, &state.upstream) {
        Ok(worker_req) => worker_req,
        Err(e) => {
            return HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() }));
        }
    };

    let resp = state.worker.handle_fetch(&worker_req).await;

    // A mutation that could not reach the upstream is deferred for
    // background sync instead of being lost. A real upstream 502 passes
    // through untouched; only the synthesized one means "offline".
    if resp.status == 502
        && resp.served_from == offcast_worker::ServedFrom::Fallback
        && is_mutation(&worker_req.method)
    {
        let body = worker_req.body.as_ref().map(|b| b.to_vec());
        match state
            .worker
            .defer_action(&worker_req.method, worker_req.url.as_str(), &worker_req.headers_json, body)
            .await
        {
            Ok(id) => {
                return HttpResponse::Accepted()
                    .json(serde_json::json!({ "queued": true, "id": id, "offline": true }));
            }
            Err(e) => tracing::warn!("failed to queue offline action: {e}"),
        }
    }

    to_http_response(resp)
}

fn is_mutation(method: &str) -> bool {
    matches!(method.to_uppercase().as_str(), "POST" | "PUT" | "PATCH" | "DELETE")
}

fn to_worker_request(req: &HttpRequest, body: Bytes, upstream: &Url) -> Result<WorkerRequest, GatewayError> {
    let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = upstream
        .join(path_and_query)
        .map_err(|e| GatewayError::BadUrl(format!("{path_and_query}: {e}")))?;

    let headers: serde_json::Map<String, serde_json::Value> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), serde_json::Value::String(v.to_string())))
        })
        .collect();

    Ok(WorkerRequest {
        method: req.method().to_string(),
        url,
        mode: request_mode(req),
        headers_json: serde_json::Value::Object(headers).to_string(),
        body: if body.is_empty() { None } else { Some(body) },
    })
}

/// Navigation detection: trust `Sec-Fetch-Mode` where present, fall back to
/// the Accept header for clients that do not send fetch metadata.
fn request_mode(req: &HttpRequest) -> RequestMode {
    if let Some(mode) = req.headers().get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
        return if mode == "navigate" { RequestMode::Navigate } else { RequestMode::Subresource };
    }

    let accepts_html = req
        .headers()
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));

    if req.method() == actix_web::http::Method::GET && accepts_html {
        RequestMode::Navigate
    } else {
        RequestMode::Subresource
    }
}

fn to_http_response(resp: WorkerResponse) -> HttpResponse {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &resp.headers {
        builder.insert_header((name.as_str(), value.as_str()));
    }
    builder.insert_header(("x-offcast-source", resp.served_from.as_str()));
    builder.body(resp.body)
}

async fn message(
    state: web::Data<GatewayState>, msg: web::Json<ControlMessage>,
) -> Result<HttpResponse, GatewayError> {
    let reply = state.worker.handle_message(msg.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reply))
}

async fn push(state: web::Data<GatewayState>, body: Bytes) -> HttpResponse {
    let payload = if body.is_empty() { None } else { Some(&body[..]) };
    let notification = state.worker.on_push(payload);
    HttpResponse::Ok().json(notification)
}

async fn sync_now(state: web::Data<GatewayState>) -> Result<HttpResponse, GatewayError> {
    let report = state.worker.sync_now().await?;
    Ok(HttpResponse::Ok().json(report))
}

async fn notifications(state: web::Data<GatewayState>) -> HttpResponse {
    HttpResponse::Ok().json(state.worker.bridge().recent())
}

#[derive(Debug, Deserialize)]
struct ClickRequest {
    action: Option<String>,
    url: String,
}

async fn notification_click(state: web::Data<GatewayState>, click: web::Json<ClickRequest>) -> HttpResponse {
    match state.worker.on_notification_click(click.action.as_deref(), &click.url) {
        Some(command) => HttpResponse::Ok().json(command),
        None => HttpResponse::Ok().json(serde_json::json!({ "command": null })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use offcast_core::CacheDb;
    use wiremock::matchers::{method as wm_method, path as wm_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn started_worker(upstream: &str) -> Arc<Worker> {
        let cfg = AppConfig { upstream: upstream.to_string(), precache: vec!["/".into(), "/offline.html".into()], ..Default::default() };
        let cache = CacheDb::open_in_memory().await.unwrap();
        let worker = Arc::new(Worker::new(&cfg, cache).unwrap());
        worker.start().await.unwrap();
        worker
    }

    fn state_for(worker: Arc<Worker>, upstream: &str) -> web::Data<GatewayState> {
        let cfg = AppConfig { upstream: upstream.to_string(), ..Default::default() };
        web::Data::new(GatewayState::new(worker, &cfg).unwrap())
    }

    fn mock_ok(p: &str, body: &str) -> Mock {
        Mock::given(wm_method("GET"))
            .and(wm_path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
    }

    #[tokio::test]
    async fn test_api_request_degrades_through_gateway() {
        let server = MockServer::start().await;
        mock_ok("/", "<html>shell</html>").mount(&server).await;
        mock_ok("/offline.html", "<html>offline</html>").mount(&server).await;

        let upstream = server.uri();
        let worker = started_worker(&upstream).await;
        drop(server);

        let app = test::init_service(
            App::new()
                .app_data(state_for(worker, &upstream))
                .service(control_scope())
                .default_service(web::route().to(intercept)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/videos?limit=12").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let source = resp.headers().get("x-offcast-source").unwrap();
        assert_eq!(source, "fallback");

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["offline"], true);
        assert_eq!(body["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_offline_mutation_is_queued() {
        let server = MockServer::start().await;
        mock_ok("/", "x").mount(&server).await;
        mock_ok("/offline.html", "x").mount(&server).await;

        let upstream = server.uri();
        let worker = started_worker(&upstream).await;
        drop(server);

        let app = test::init_service(
            App::new()
                .app_data(state_for(worker, &upstream))
                .default_service(web::route().to(intercept)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/comments")
            .set_payload("offline comment")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["queued"], true);
    }

    #[tokio::test]
    async fn test_version_message_roundtrip() {
        let server = MockServer::start().await;
        mock_ok("/", "x").mount(&server).await;
        mock_ok("/offline.html", "x").mount(&server).await;

        let upstream = server.uri();
        let worker = started_worker(&upstream).await;

        let app = test::init_service(
            App::new()
                .app_data(state_for(worker, &upstream))
                .service(control_scope()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/_offcast/message")
            .set_json(serde_json::json!({"type": "version"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["type"], "version");
        assert_eq!(body["version"], "offcast-v1.0.0");
    }

    #[tokio::test]
    async fn test_push_and_click_endpoints() {
        let server = MockServer::start().await;
        mock_ok("/", "x").mount(&server).await;
        mock_ok("/offline.html", "x").mount(&server).await;

        let upstream = server.uri();
        let worker = started_worker(&upstream).await;

        let app = test::init_service(
            App::new()
                .app_data(state_for(worker, &upstream))
                .service(control_scope()),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/_offcast/push")
            .set_payload(r#"{"title":"Live now","url":"/live/42"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["title"], "Live now");

        let req = test::TestRequest::post()
            .uri("/_offcast/notifications/click")
            .set_json(serde_json::json!({"action": "view", "url": "/live/42"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["command"], "open-window");
        assert_eq!(body["url"], "/live/42");

        let req = test::TestRequest::get().uri("/_offcast/notifications").to_request();
        let resp = test::call_service(&app, req).await;
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }
}
