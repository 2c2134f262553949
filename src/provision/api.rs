//! HTTP API for bootstrap configurations.

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::provision::service::ServiceError;
use crate::provision::store::{BootstrapConfig, ConfigStore};

/// State injected into handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: ConfigStore,
    pub api_key: Option<Arc<str>>,
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub configs: usize,
}

/// Build the provisioning router.
///
/// `/configs*` routes require `Authorization: Bearer <api_key>` when a key is set.
pub fn router(store: ConfigStore, api_key: Option<String>) -> Router {
    let state = ApiState {
        store,
        api_key: api_key.map(Arc::from),
    };

    let configs = Router::new()
        .route("/configs", get(list_configs).post(create_config))
        .route("/configs/{thing_id}", get(get_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .route("/health", get(health))
        .merge(configs)
        .with_state(state)
}

async fn api_key_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    if let Some(auth_val) = auth_header {
        if auth_val.strip_prefix("Bearer ") == Some(expected) {
            return Ok(next.run(request).await);
        }
    }

    Err(StatusCode::UNAUTHORIZED)
}

async fn health(State(state): State<ApiState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "pass",
        version: env!("CARGO_PKG_VERSION"),
        configs: state.store.len(),
    })
}

async fn list_configs(State(state): State<ApiState>) -> Json<Vec<BootstrapConfig>> {
    Json(state.store.list())
}

async fn get_config(
    State(state): State<ApiState>,
    Path(thing_id): Path<String>,
) -> Result<Json<BootstrapConfig>, ApiError> {
    state
        .store
        .get(&thing_id)
        .map(Json)
        .ok_or(ApiError(ServiceError::NotFound))
}

async fn create_config(
    State(state): State<ApiState>,
    Json(config): Json<BootstrapConfig>,
) -> Result<(StatusCode, Json<BootstrapConfig>), ApiError> {
    state.store.save(config.clone())?;
    tracing::info!(thing_id = %config.thing_id, "Bootstrap config saved");
    Ok((StatusCode::CREATED, Json(config)))
}

/// Maps service errors onto HTTP statuses.
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Malformed(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "thing_id": "t1",
            "external_id": "ext-1",
            "external_key": "key-1",
            "name": "sensor",
            "state": "active",
            "channels": [{ "id": "c1", "name": "temp" }]
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = router(ConfigStore::new(), Some("secret".into()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "pass");
    }

    #[tokio::test]
    async fn configs_require_bearer_key() {
        let app = router(ConfigStore::new(), Some("secret".into()));

        let denied = app
            .clone()
            .oneshot(Request::get("/configs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::get("/configs")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_then_fetch_config() {
        let store = ConfigStore::new();
        let app = router(store.clone(), None);

        let created = app
            .clone()
            .oneshot(
                Request::post("/configs")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(sample().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert_eq!(store.get("t1").unwrap().external_key, "key-1");

        let fetched = app
            .clone()
            .oneshot(Request::get("/configs/t1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        let body = body_json(fetched).await;
        assert_eq!(body["channels"][0]["id"], "c1");
        assert!(body.get("external_key").is_none());

        let missing = app
            .oneshot(Request::get("/configs/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_config_is_bad_request() {
        let app = router(ConfigStore::new(), None);
        let response = app
            .oneshot(
                Request::post("/configs")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"thing_id":"","external_id":"e"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
