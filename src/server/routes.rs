//! Route handlers and shared state

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::vision::PlateReader;

/// Uploads above this size are rejected before decoding
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared server state: the pipeline, loaded once at startup.
///
/// Each request locks the reader for its full run, so the model handles are
/// never used concurrently.
#[derive(Clone)]
pub struct AppState {
    reader: Arc<Mutex<PlateReader>>,
}

impl AppState {
    pub fn new(reader: PlateReader) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/alpr", post(recognize_plates))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct AlprResponse {
    texts: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Client- or server-side failure mapped to a JSON error body
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "plate recognition failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /v1/alpr - recognize license plates in an uploaded image
///
/// Accepts a multipart form with an `image` file field and returns every
/// recognized plate string in detection order. An empty list is a valid
/// answer, not an error.
async fn recognize_plates(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AlprResponse>, ApiError> {
    let mut image_bytes = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("malformed multipart body"))?
    {
        if field.name() != Some("image") {
            continue;
        }
        if field.file_name().is_some_and(str::is_empty) {
            return Err(ApiError::bad_request("empty filename"));
        }
        image_bytes = Some(
            field
                .bytes()
                .await
                .map_err(|_| ApiError::bad_request("malformed multipart body"))?,
        );
        break;
    }

    let bytes = image_bytes.ok_or_else(|| ApiError::bad_request("no image uploaded"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("invalid image"));
    }

    // Reject undecodable uploads before the pipeline ever runs
    let image = image::load_from_memory(&bytes).map_err(|e| {
        warn!("rejected upload: {}", e);
        ApiError::bad_request("invalid image")
    })?;

    let reader = state.reader.clone();
    let texts = tokio::task::spawn_blocking(move || reader.lock().read_plates(&image))
        .await
        .map_err(|e| {
            error!("recognition task panicked: {}", e);
            ApiError::internal()
        })?
        .map_err(|e| {
            error!("pipeline fault: {}", e);
            ApiError::internal()
        })?;

    Ok(Json(AlprResponse { texts }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use image::DynamicImage;
    use tower::ServiceExt;

    use crate::vision::{
        PlateDetector, RawDetection, TextFragment, TextRecognizer, VisionError,
    };

    struct StubDetector {
        boxes: Vec<RawDetection>,
        fail: bool,
    }

    impl PlateDetector for StubDetector {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<RawDetection>, VisionError> {
            if self.fail {
                return Err(VisionError::Inference("boom".to_string()));
            }
            Ok(self.boxes.clone())
        }
    }

    struct StubRecognizer {
        fragments: Vec<TextFragment>,
    }

    impl TextRecognizer for StubRecognizer {
        fn read_text(&mut self, _crop: &DynamicImage) -> Result<Vec<TextFragment>, VisionError> {
            Ok(self.fragments.clone())
        }
    }

    fn app(boxes: Vec<RawDetection>, fragments: Vec<TextFragment>, fail: bool) -> Router {
        let reader = PlateReader::new(
            Box::new(StubDetector { boxes, fail }),
            Box::new(StubRecognizer { fragments }),
        );
        router(AppState::new(reader))
    }

    fn png_bytes() -> Vec<u8> {
        let image = image::RgbImage::from_pixel(32, 32, image::Rgb([0, 0, 0]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let boundary = "plate-scout-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/v1/alpr")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(vec![], vec![], false);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_image_field_is_client_error() {
        // Detector would fail if invoked; validation must reject first
        let app = app(vec![], vec![], true);
        let response = app
            .oneshot(multipart_request("file", "car.png", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "no image uploaded");
    }

    #[tokio::test]
    async fn test_empty_filename_is_client_error() {
        let app = app(vec![], vec![], true);
        let response = app
            .oneshot(multipart_request("image", "", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "empty filename");
    }

    #[tokio::test]
    async fn test_undecodable_upload_never_reaches_core() {
        let app = app(vec![], vec![], true);
        let response = app
            .oneshot(multipart_request("image", "car.png", b"not an image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid image");
    }

    #[tokio::test]
    async fn test_no_detections_yields_empty_texts() {
        let app = app(vec![], vec![], false);
        let response = app
            .oneshot(multipart_request("image", "black.png", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["texts"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_detection_produces_normalized_texts() {
        let boxes = vec![RawDetection {
            x_min: 2.0,
            y_min: 2.0,
            x_max: 30.0,
            y_max: 20.0,
            confidence: 0.9,
        }];
        let fragments = vec![
            TextFragment {
                text: "ab 12".to_string(),
                confidence: 0.9,
            },
            TextFragment {
                text: "cd".to_string(),
                confidence: 0.8,
            },
        ];
        let app = app(boxes, fragments, false);
        let response = app
            .oneshot(multipart_request("image", "car.png", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["texts"], serde_json::json!(["AB12CD"]));
    }

    #[tokio::test]
    async fn test_pipeline_fault_maps_to_generic_server_error() {
        let app = app(vec![], vec![], true);
        let response = app
            .oneshot(multipart_request("image", "car.png", &png_bytes()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "plate recognition failed"
        );
    }
}
