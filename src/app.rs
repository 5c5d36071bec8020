use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, resources, time_entries};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(resources::router())
                .merge(time_entries::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod app_tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let (status, _) = call(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, Method::GET, "/api/v1/projects", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn register_then_track_time() {
        let app = build_app(AppState::fake());
        let (status, auth) = call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "name": "Ana", "email": "ana@example.com", "password": "password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = auth["token"].as_str().unwrap().to_string();
        let token = Some(token.as_str());

        let (_, projects) = call(&app, Method::GET, "/api/v1/projects", token, None).await;
        assert_eq!(projects[0]["name"], "Focus");
        let project = projects[0]["id"].as_str().unwrap().to_string();

        let (status, entry) = call(
            &app,
            Method::POST,
            "/api/v1/time-entries",
            token,
            Some(json!({ "project": project, "isRunning": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = entry["id"].as_str().unwrap().to_string();

        let (_, running) = call(&app, Method::GET, "/api/v1/time-entries/running", token, None).await;
        assert_eq!(running["id"], id.as_str());

        let (status, stopped) = call(
            &app,
            Method::POST,
            &format!("/api/v1/time-entries/{id}/stop"),
            token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stopped["isRunning"], false);

        let (_, count) = call(&app, Method::GET, "/api/v1/time-entries/count", token, None).await;
        assert_eq!(count["count"], 1);
    }

    #[tokio::test]
    async fn oversized_page_numbers_are_bad_requests() {
        let app = build_app(AppState::fake());
        let (_, auth) = call(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "name": "Pat", "email": "pat@example.com", "password": "password123" })),
        )
        .await;
        let token = auth["token"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::GET,
            "/api/v1/projects?page=18446744073709551615&limit=100",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn malformed_bodies_and_foreign_ids() {
        let app = build_app(AppState::fake());
        let mut tokens = Vec::new();
        for email in ["a@example.com", "b@example.com"] {
            let (_, auth) = call(
                &app,
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({ "name": "U", "email": email, "password": "password123" })),
            )
            .await;
            tokens.push(auth["token"].as_str().unwrap().to_string());
        }

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/tags",
            Some(&tokens[0]),
            Some(json!({ "name": "x", "color": 7 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");

        let (_, tag) = call(
            &app,
            Method::POST,
            "/api/v1/tags",
            Some(&tokens[0]),
            Some(json!({ "name": "mine" })),
        )
        .await;
        let uri = format!("/api/v1/tags/{}", tag["id"].as_str().unwrap());
        let (status, _) = call(&app, Method::GET, &uri, Some(&tokens[1]), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, &uri, Some(&tokens[1]), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
