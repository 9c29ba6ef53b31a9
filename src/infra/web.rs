use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::domain::{
    model::{Application, ApplicationStatus, NewApplication},
    ApplicationError, ApplicationService,
};

pub fn router(service: ApplicationService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/applications",
            get(list_applications).post(create_application),
        )
        .route("/api/v1/applications/:id", get(get_application))
        .route("/api/v1/applications/:id/deploy", post(deploy_application))
        .route("/api/v1/applications/:id/status", get(application_status))
        .route("/api/v1/applications/:id/stop", post(stop_application))
        .route(
            "/api/v1/applications/:id/container",
            delete(remove_application_container),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(service))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub repository: RepositoryInput,
    #[serde(default)]
    pub docker: DockerInput,
    #[serde(default)]
    pub environments: Vec<EnvironmentInput>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepositoryInput {
    pub url: Option<String>,
    pub branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerInput {
    pub compose_file: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInput {
    pub name: Option<String>,
    pub docker_host: Option<String>,
}

impl From<CreateApplicationRequest> for NewApplication {
    fn from(request: CreateApplicationRequest) -> Self {
        // Only one target host is stored; extra environments are dropped.
        let docker_host = request
            .environments
            .into_iter()
            .next()
            .and_then(|environment| environment.docker_host);
        NewApplication {
            name: request.name.unwrap_or_default(),
            namespace: request.namespace,
            repository_url: request.repository.url,
            repository_branch: request.repository.branch,
            compose_file: request.docker.compose_file,
            context: request.docker.context,
            docker_host,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApplicationView {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub repository: RepositoryView,
    pub docker: DockerView,
    pub environments: Vec<EnvironmentView>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RepositoryView {
    pub url: Option<String>,
    pub branch: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerView {
    pub compose_file: Option<String>,
    pub context: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentView {
    pub name: String,
    pub docker_host: String,
}

impl From<Application> for ApplicationView {
    fn from(application: Application) -> Self {
        ApplicationView {
            id: application.id,
            name: application.name,
            namespace: application.namespace,
            repository: RepositoryView {
                url: application.repository_url,
                branch: application.repository_branch,
            },
            docker: DockerView {
                compose_file: application.compose_file,
                context: application.context,
            },
            environments: vec![EnvironmentView {
                name: "development".to_string(),
                docker_host: application.docker_host,
            }],
            status: application.status,
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApplicationError::Validation(_) => StatusCode::BAD_REQUEST,
            ApplicationError::NotFound(id) => {
                debug!("Application {} not found", id);
                StatusCode::NOT_FOUND
            }
            ApplicationError::Registry(e) => {
                error!("Application registry failure {:?}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn list_applications(
    State(service): State<Arc<ApplicationService>>,
) -> Result<Json<Vec<ApplicationView>>, ApplicationError> {
    let applications = service.list().await?;
    Ok(Json(applications.into_iter().map(ApplicationView::from).collect()))
}

async fn create_application(
    State(service): State<Arc<ApplicationService>>,
    payload: Result<Json<CreateApplicationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApplicationView>), ApplicationError> {
    let Json(request) =
        payload.map_err(|rejection| ApplicationError::Validation(rejection.body_text()))?;
    let application = service.create(request.into()).await?;
    Ok((StatusCode::CREATED, Json(application.into())))
}

async fn get_application(
    State(service): State<Arc<ApplicationService>>,
    Path(id): Path<String>,
) -> Result<Json<ApplicationView>, ApplicationError> {
    Ok(Json(service.get(&id).await?.into()))
}

async fn deploy_application(
    State(service): State<Arc<ApplicationService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApplicationError> {
    Ok(Json(service.deploy(&id).await?))
}

async fn application_status(
    State(service): State<Arc<ApplicationService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApplicationError> {
    Ok(Json(service.status(&id).await?))
}

async fn stop_application(
    State(service): State<Arc<ApplicationService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApplicationError> {
    Ok(Json(service.stop(&id).await?))
}

async fn remove_application_container(
    State(service): State<Arc<ApplicationService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApplicationError> {
    Ok(Json(service.remove(&id).await?))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        domain::tests::{orchestrator, FakeRuntime},
        infra::memory::MemoryRegistry,
    };

    fn app(runtime: FakeRuntime) -> Router {
        router(ApplicationService {
            registry: Box::new(MemoryRegistry::default()),
            orchestrator: orchestrator(runtime),
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn create_payload(compose_file: &str) -> Value {
        json!({
            "name": "test-app",
            "namespace": "default",
            "repository": { "url": "https://github.com/test/repo", "branch": "main" },
            "docker": { "composeFile": compose_file, "context": "." },
            "environments": [
                { "name": "development", "dockerHost": "localhost" },
                { "name": "staging", "dockerHost": "staging.internal" }
            ]
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = app(FakeRuntime::default());
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "healthy" }));
    }

    #[tokio::test]
    async fn test_create_application() {
        let app = app(FakeRuntime::default());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/applications",
            Some(create_payload("test-compose.yml")),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "test-app");
        assert_eq!(body["status"], "created");
        assert_eq!(body["repository"], json!({ "url": "https://github.com/test/repo", "branch": "main" }));
        assert_eq!(body["docker"], json!({ "composeFile": "test-compose.yml", "context": "." }));
        assert_eq!(
            body["environments"],
            json!([{ "name": "development", "dockerHost": "localhost" }])
        );
        assert!(body["created_at"].is_string());
        assert!(body["updated_at"].is_string());

        let id = body["id"].as_str().unwrap();
        let (status, fetched) = send(&app, Method::GET, &format!("/api/v1/applications/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, body);
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let app = app(FakeRuntime::default());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/applications",
            Some(json!({ "name": "orphan" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["namespace"], "default");
        assert_eq!(body["repository"], json!({ "url": null, "branch": "main" }));
        assert_eq!(body["docker"], json!({ "composeFile": null, "context": "." }));
        assert_eq!(
            body["environments"],
            json!([{ "name": "development", "dockerHost": "localhost" }])
        );
    }

    #[tokio::test]
    async fn test_error_handling() {
        let app = app(FakeRuntime::default());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/applications",
            Some(json!({ "name": "", "namespace": "default" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Application name is required" }));

        let (status, body) = send(&app, Method::POST, "/api/v1/applications", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(&app, Method::GET, "/api/v1/applications/non-existent/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Application not found" }));

        let (status, _) = send(&app, Method::POST, "/api/v1/applications/non-existent/deploy", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unparseable_body_is_bad_request() {
        let app = app(FakeRuntime::default());
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/applications")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deploy_application() {
        let runtime = FakeRuntime::default();
        let app = app(runtime.clone());
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/applications",
            Some(json!({ "name": "orphan" })),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = send(&app, Method::POST, &format!("/api/v1/applications/{}/deploy", id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "id": id, "status": "running", "message": "Container orphan deployed successfully" })
        );

        let (_, status_body) = send(&app, Method::GET, &format!("/api/v1/applications/{}/status", id), None).await;
        assert_eq!(status_body["status"], "running");
        assert_eq!(status_body["name"], "orphan");
        assert_eq!(status_body["containers"][0]["image"], "nginx:alpine");
        assert_eq!(status_body["containers"][0]["ports"], "0.0.0.0:8080->80/tcp");
    }

    #[tokio::test]
    async fn test_failed_deployment_is_not_a_server_error() {
        let compose = tempfile::NamedTempFile::new().unwrap();
        let app = app(FakeRuntime::unreachable());
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/applications",
            Some(create_payload(compose.path().to_str().unwrap())),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, body) = send(&app, Method::POST, &format!("/api/v1/applications/{}/deploy", id), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert!(body["message"].as_str().unwrap().contains("Failed to deploy test-app"));

        let (status, status_body) = send(&app, Method::GET, &format!("/api/v1/applications/{}/status", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(status_body["status"], "failed");
        assert_eq!(status_body["containers"].as_array().unwrap().len(), 1);
        assert!(status_body["containers"][0]["error"].is_string());
    }

    #[tokio::test]
    async fn test_list_applications() {
        let app = app(FakeRuntime::default());
        let (_, body) = send(&app, Method::GET, "/api/v1/applications", None).await;
        assert_eq!(body, json!([]));

        send(&app, Method::POST, "/api/v1/applications", Some(json!({ "name": "first" }))).await;
        send(&app, Method::POST, "/api/v1/applications", Some(json!({ "name": "second" }))).await;

        let (status, body) = send(&app, Method::GET, "/api/v1/applications", None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|application| application["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_stop_and_remove_container() {
        let app = app(FakeRuntime::default());
        let (_, created) = send(
            &app,
            Method::POST,
            "/api/v1/applications",
            Some(json!({ "name": "orphan" })),
        )
        .await;
        let id = created["id"].as_str().unwrap();
        send(&app, Method::POST, &format!("/api/v1/applications/{}/deploy", id), None).await;

        let (status, body) = send(&app, Method::POST, &format!("/api/v1/applications/{}/stop", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "id": id, "success": true, "message": "Container orphan stopped successfully" })
        );

        let (_, body) = send(&app, Method::DELETE, &format!("/api/v1/applications/{}/container", id), None).await;
        assert_eq!(body["success"], true);

        let (_, body) = send(&app, Method::DELETE, &format!("/api/v1/applications/{}/container", id), None).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Failed to remove container orphan: No such container");
    }
}
