pub mod auth;
pub mod error;
pub mod metrics;
mod organisations;
mod users;
mod validation;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/session", get(auth::get_session))
        .route("/sessions", get(auth::list_sessions))
        .route("/sessions/:id", delete(auth::revoke_session));

    // Bootstrap routes take the external user id in the body and need no session
    let organisation_routes = Router::new()
        .route("/sync", post(organisations::sync_organisation))
        .route("/sync/bootstrap", post(organisations::sync_organisation_bootstrap))
        .route("/session", get(organisations::organisation_session))
        .route(
            "/session/bootstrap",
            post(organisations::organisation_session_bootstrap),
        )
        .route("/external/:external_id", get(organisations::get_by_external_id));

    let user_routes = Router::new()
        .route("/external/:external_user_id", get(users::get_by_external_id))
        .route("/link", post(users::link_user));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api/organisations", organisation_routes)
        .nest("/api/users", user_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::resolver::test_clock::FixedClock;
    use crate::auth::LegacySessionStore;
    use crate::config::Config;
    use crate::db::test_support::{insert_user, test_db, TestDb};
    use crate::db::SessionMetadata;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        db: TestDb,
    }

    async fn test_app() -> TestApp {
        let db = test_db().await;
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let state = AppState::new(Config::default(), db.pool.clone(), Arc::new(clock))
            .with_metrics(handle);
        TestApp {
            router: create_router(Arc::new(state)),
            db,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_as(uri: &str, external_user_id: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-external-user-id", external_user_id)
            .header("x-external-session-id", "sess_test")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let app = test_app().await;

        let (status, body) = send(
            &app.router,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("OK".to_string()));

        let (status, _) = send(
            &app.router,
            Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_anonymous_session_context() {
        let app = test_app().await;

        let request = Request::builder()
            .uri("/api/auth/session")
            .header("x-team-id", "7")
            .header("x-forwarded-for", "203.0.113.5")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["session"].is_null());
        assert!(body["user"].is_null());
        assert_eq!(body["team_id"], json!(7));
        assert_eq!(body["metadata"]["ip_address"], json!("203.0.113.5"));
    }

    #[tokio::test]
    async fn test_external_session_context() {
        let app = test_app().await;
        insert_user(&app.db.pool, "seven@example.com", Some("user_7"), Utc::now()).await;

        let (status, body) = send(&app.router, get_as("/api/auth/session", "user_7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["id"], json!("sess_test"));
        assert_eq!(body["session"]["source"], json!("external"));
        assert!(body["session"].get("token").is_none());
        assert_eq!(body["user"]["email"], json!("seven@example.com"));
    }

    #[tokio::test]
    async fn test_link_sync_then_project() {
        let app = test_app().await;

        let (status, body) = send(
            &app.router,
            post_json(
                "/api/users/link",
                json!({"external_user_id": "user_7", "email": "seven@example.com", "name": "Seven"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["external_user_id"], json!("user_7"));

        let sync_body = json!({
            "external_organisation_id": "org_42",
            "name": "Acme",
            "url": "acme",
            "external_user_id": "user_7",
        });
        let (status, body) = send(
            &app.router,
            post_json("/api/organisations/sync/bootstrap", sync_body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["organisation"]["url"], json!("acme"));
        assert_eq!(body["created"], json!(true));

        let (status, body) = send(
            &app.router,
            post_json("/api/organisations/sync/bootstrap", sync_body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(false));

        let (status, body) =
            send(&app.router, get_as("/api/organisations/session", "user_7")).await;
        assert_eq!(status, StatusCode::OK);
        let sessions = body.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["name"], json!("Acme"));
        assert_eq!(sessions[0]["type"], json!("ORGANISATION"));
        assert_eq!(sessions[0]["current_organisation_role"], json!("ADMIN"));

        let (status, body) = send(
            &app.router,
            get_as("/api/organisations/external/org_42", "user_7"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["members"].as_array().unwrap().len(), 1);

        let (status, body) =
            send(&app.router, get_as("/api/users/external/user_7", "user_7")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["organisations"][0]["current_organisation_role"], json!("ADMIN"));
    }

    #[tokio::test]
    async fn test_link_to_existing_email_requires_owner_session() {
        let app = test_app().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let owner = insert_user(&app.db.pool, "owner@example.com", None, now).await;
        let link_body = json!({"external_user_id": "user_9", "email": "owner@example.com"});

        let (status, body) = send(&app.router, post_json("/api/users/link", link_body.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], json!("conflict"));

        let (_, body) = send(&app.router, get_as("/api/auth/session", "user_9")).await;
        assert!(body["user"].is_null());

        let (token, _) = LegacySessionStore::new(app.db.pool.clone())
            .issue(owner, SessionMetadata::default(), now, chrono::Duration::days(7))
            .await
            .unwrap();
        let mut request = post_json("/api/users/link", link_body);
        request.headers_mut().insert(
            "authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(owner));
        assert_eq!(body["external_user_id"], json!("user_9"));
    }

    #[tokio::test]
    async fn test_authenticated_sync_uses_session_user() {
        let app = test_app().await;
        insert_user(&app.db.pool, "seven@example.com", Some("user_7"), Utc::now()).await;

        let mut request = post_json(
            "/api/organisations/sync",
            json!({"external_organisation_id": "org_42", "name": "Acme"}),
        );
        request
            .headers_mut()
            .insert("x-external-user-id", "user_7".parse().unwrap());
        request
            .headers_mut()
            .insert("x-external-session-id", "sess_1".parse().unwrap());

        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::CREATED);
        // No url supplied, so the generated id is used
        assert_eq!(body["organisation"]["url"], body["organisation"]["id"]);

        let (status, body) = send(
            &app.router,
            post_json(
                "/api/organisations/sync",
                json!({"external_organisation_id": "org_42", "name": "Acme"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], json!("unauthorized"));
    }

    #[tokio::test]
    async fn test_unlinked_bootstrap_sync_is_precondition_failed() {
        let app = test_app().await;

        let (status, body) = send(
            &app.router,
            post_json(
                "/api/organisations/sync/bootstrap",
                json!({
                    "external_organisation_id": "org_42",
                    "name": "Acme",
                    "url": "acme",
                    "external_user_id": "user_unknown",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(body["error"]["code"], json!("user_not_linked"));
    }

    #[tokio::test]
    async fn test_invalid_sync_request_is_rejected() {
        let app = test_app().await;

        let (status, body) = send(
            &app.router,
            post_json(
                "/api/organisations/sync/bootstrap",
                json!({
                    "external_organisation_id": "",
                    "name": "",
                    "external_user_id": "user_7",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("validation_error"));
    }

    #[tokio::test]
    async fn test_session_bootstrap_for_unknown_user_is_empty() {
        let app = test_app().await;

        let (status, body) = send(
            &app.router,
            post_json(
                "/api/organisations/session/bootstrap",
                json!({"external_user_id": "user_unknown"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, _) = send(
            &app.router,
            Request::builder()
                .uri("/api/organisations/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_legacy_sessions_listing() {
        let app = test_app().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let user_id = insert_user(&app.db.pool, "legacy@example.com", None, now).await;
        let (token, issued) = LegacySessionStore::new(app.db.pool.clone())
            .issue(user_id, SessionMetadata::default(), now, chrono::Duration::days(7))
            .await
            .unwrap();

        let request = Request::builder()
            .uri("/api/auth/sessions")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], json!(issued.id));
        assert!(body[0].get("token_hash").is_none());

        let request = Request::builder()
            .uri("/api/auth/session")
            .header("cookie", format!("session_token={}", token))
            .body(Body::empty())
            .unwrap();
        let (_, body) = send(&app.router, request).await;
        assert_eq!(body["session"]["source"], json!("legacy"));
    }

    #[tokio::test]
    async fn test_revoke_legacy_session() {
        let app = test_app().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let user_id = insert_user(&app.db.pool, "revoke@example.com", None, now).await;
        let store = LegacySessionStore::new(app.db.pool.clone());
        let (token, _) = store
            .issue(user_id, SessionMetadata::default(), now, chrono::Duration::days(7))
            .await
            .unwrap();
        let (_, other) = store
            .issue(user_id, SessionMetadata::default(), now, chrono::Duration::days(7))
            .await
            .unwrap();

        let revoke = |id: &str| {
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/auth/sessions/{}", id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap()
        };

        let (status, _) = send(&app.router, revoke(&other.id)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app.router, revoke(&other.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
