//! HTTP router.
//!
//! Layers (outermost → innermost): CORS → trace → body limit → handler.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::config::ServiceConfig;
use crate::graduation::RequirementPolicy;

/// Build the service router for `policy` under `config`.
pub fn api_router(policy: Arc<RequirementPolicy>, config: ServiceConfig) -> Router {
    build_router(ApiContext::new(policy, config))
}

pub(crate) fn build_router(ctx: ApiContext) -> Router {
    let body_limit = ctx.config.max_request_bytes;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(endpoints::health::root))
        .route("/health", get(endpoints::health::check))
        .route("/extract-grades", post(endpoints::grades::extract))
        .route("/check-graduation", post(endpoints::batch::check_graduation))
        .route("/batch", post(endpoints::batch::run))
        .route("/chart", post(endpoints::batch::chart))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::models::{Course, GradeYear, LetterGrade, Student};
    use crate::pipeline::extraction::fixtures::{transcript_pdf, transcript_text};

    const BOUNDARY: &str = "gradlens-test-boundary";

    fn app() -> Router {
        app_with(ServiceConfig::default())
    }

    fn app_with(config: ServiceConfig) -> Router {
        let policy = Arc::new(RequirementPolicy::builtin().unwrap());
        api_router(policy, config)
    }

    fn student(id: &str, average: Option<f64>) -> Student {
        Student {
            identifier: id.into(),
            grade_years: vec![GradeYear {
                grade_level: 9,
                year: "2020-2021".into(),
                term_gpas: vec![3.2, 3.4],
                year_average: average,
                courses: vec![
                    Course::new("EN101 English 9", LetterGrade::A),
                    Course::new("MA101 Algebra I", LetterGrade::B),
                ],
            }],
        }
    }

    /// `(field, filename, content type, bytes)` parts.
    fn multipart_request(uri: &str, parts: &[(&str, &str, &str, Vec<u8>)]) -> Request<Body> {
        let mut body = Vec::new();
        for (field, filename, content_type, bytes) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn pdf_part(field: &'static str, id: &str) -> (&'static str, String, Vec<u8>) {
        (field, format!("{id}.pdf"), transcript_pdf(&student(id, Some(3.3))))
    }

    #[tokio::test]
    async fn root_reports_server_up() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"SERVER IS UP");
    }

    #[tokio::test]
    async fn health_reports_policy_version() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["policy_version"], crate::graduation::policy::BUILTIN_POLICY_VERSION);
    }

    #[tokio::test]
    async fn extract_grades_returns_record_verdict_and_diagnostics() {
        let text = transcript_text(&student("jane_doe", Some(3.3)));
        let req = multipart_request(
            "/extract-grades",
            &[("file", "jane_doe.txt", "text/plain", text.into_bytes())],
        );
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let years = json["grades"]["Grades"].as_array().unwrap();
        assert_eq!(years.len(), 1);
        assert!(json.get("graduation_check").is_some());
        assert!(json.get("error").is_none());
        assert_eq!(json["diagnostics"]["format"], "plain_text");
    }

    #[tokio::test]
    async fn extract_grades_keeps_catalogue_order_in_the_body() {
        let text = transcript_text(&student("jane_doe", Some(3.3)));
        let req = multipart_request(
            "/extract-grades",
            &[("file", "jane_doe.txt", "text/plain", text.into_bytes())],
        );
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = String::from_utf8(body_bytes(response).await).unwrap();
        let at = |needle: &str| body.find(needle).unwrap();
        // Catalogue order, which is not alphabetical.
        assert!(at("\"Humanities-English\"") < at("\"History\""));
        assert!(at("\"requirements\"") < at("\"progress\""));
        assert!(at("\"met_all_requirements\"") < at("\"details\""));
        assert!(at("\"grades\"") < at("\"graduation_check\""));
    }

    #[tokio::test]
    async fn extract_grades_rejects_corrupt_pdf_with_422() {
        let req = multipart_request(
            "/extract-grades",
            &[("file", "broken.pdf", "application/pdf", b"%PDF-1.7\n garbage".to_vec())],
        );
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["code"], "UNREADABLE_DOCUMENT");
    }

    #[tokio::test]
    async fn check_graduation_with_one_corrupt_among_eleven() {
        let mut parts: Vec<(&str, String, Vec<u8>)> =
            (0..10).map(|i| pdf_part("files", &format!("student_{i}"))).collect();
        parts.insert(
            3,
            ("files", "broken.pdf".into(), b"%PDF-1.7\n garbage".to_vec()),
        );
        let parts: Vec<(&str, &str, &str, Vec<u8>)> = parts
            .iter()
            .map(|(f, n, b)| (*f, n.as_str(), "application/pdf", b.clone()))
            .collect();

        let response = app()
            .oneshot(multipart_request("/check-graduation", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let map = json.as_object().unwrap();
        assert_eq!(map.len(), 11);
        assert_eq!(json["broken.pdf"]["error"]["kind"], "unreadable_document");
        let succeeded = map.values().filter(|v| v.get("graduation_check").is_some()).count();
        assert_eq!(succeeded, 10);
    }

    #[tokio::test]
    async fn batch_combined_returns_results_and_statistics() {
        let parts: Vec<(&str, String, Vec<u8>)> =
            vec![pdf_part("files", "a"), pdf_part("files", "b")];
        let parts: Vec<(&str, &str, &str, Vec<u8>)> = parts
            .iter()
            .map(|(f, n, b)| (*f, n.as_str(), "application/pdf", b.clone()))
            .collect();

        let response = app()
            .oneshot(multipart_request("/batch", &parts))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["mode"], "combined");
        assert_eq!(json["results"].as_object().unwrap().len(), 2);
        assert_eq!(json["statistics"]["count"], 2);
        assert_eq!(json["timed_out"], false);
    }

    #[tokio::test]
    async fn batch_rejects_unknown_mode() {
        let text = transcript_text(&student("a", Some(3.0)));
        let req = multipart_request(
            "/batch?mode=everything",
            &[("files", "a.txt", "text/plain", text.into_bytes())],
        );
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn chart_returns_png() {
        let text = transcript_text(&student("a", Some(3.0)));
        let req = multipart_request(
            "/chart",
            &[("files", "a.txt", "text/plain", text.into_bytes())],
        );
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(&body_bytes(response).await[..4], b"\x89PNG");
    }

    #[tokio::test]
    async fn missing_file_is_400() {
        let req = multipart_request("/check-graduation", &[]);
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "NO_FILE");
    }

    #[tokio::test]
    async fn empty_filename_is_400() {
        let req = multipart_request("/extract-grades", &[("file", "", "text/plain", b"x".to_vec())]);
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "NO_SELECTED_FILE");
    }

    #[tokio::test]
    async fn unsupported_type_is_415_before_processing() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10];
        let text = transcript_text(&student("a", Some(3.0)));
        let req = multipart_request(
            "/check-graduation",
            &[
                ("files", "a.txt", "text/plain", text.into_bytes()),
                ("files", "scan.jpg", "image/jpeg", jpeg),
            ],
        );
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(response).await["code"], "UNSUPPORTED_MEDIA_TYPE");
    }

    #[tokio::test]
    async fn too_many_files_is_413() {
        let config = ServiceConfig {
            max_files_per_batch: 2,
            ..ServiceConfig::default()
        };
        let text = transcript_text(&student("a", Some(3.0))).into_bytes();
        let req = multipart_request(
            "/check-graduation",
            &[
                ("files", "a.txt", "text/plain", text.clone()),
                ("files", "b.txt", "text/plain", text.clone()),
                ("files", "c.txt", "text/plain", text),
            ],
        );
        let response = app_with(config).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["code"], "TOO_MANY_FILES");
    }

    #[tokio::test]
    async fn file_size_limit_is_inclusive() {
        let text = transcript_text(&student("a", Some(3.0))).into_bytes();
        let upload = |limit: usize| {
            let config = ServiceConfig {
                max_file_bytes: limit,
                ..ServiceConfig::default()
            };
            let req = multipart_request(
                "/extract-grades",
                &[("file", "a.txt", "text/plain", text.clone())],
            );
            app_with(config).oneshot(req)
        };

        let at_limit = upload(text.len()).await.unwrap();
        assert_eq!(at_limit.status(), StatusCode::OK);

        let over = upload(text.len() - 1).await.unwrap();
        assert_eq!(over.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(over).await["code"], "FILE_TOO_LARGE");
    }

    #[tokio::test]
    async fn oversized_file_is_413() {
        let config = ServiceConfig {
            max_file_bytes: 16,
            ..ServiceConfig::default()
        };
        let text = transcript_text(&student("a", Some(3.0)));
        let req = multipart_request(
            "/extract-grades",
            &[("file", "a.txt", "text/plain", text.into_bytes())],
        );
        let response = app_with(config).oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["code"], "FILE_TOO_LARGE");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
