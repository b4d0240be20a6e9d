use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{AppState, utils::error_response};

use super::model::{HealthResponse, PredictRequest, PredictResponse};

pub async fn index() -> &'static str {
    "URL Checker Service is running!"
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[axum::debug_handler]
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        // 没有请求体时按缺少 url 处理
        Err(JsonRejection::MissingJsonContentType(_)) => PredictRequest { url: None },
        Err(rejection) => {
            tracing::warn!("Rejected predict payload: {}", rejection.body_text());
            return error_response(rejection.status(), rejection.body_text()).into_response();
        }
    };

    let Some(url) = req.url.filter(|url| !url.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "URL is required").into_response();
    };

    let assessment = state.classifier.classify(&url);
    tracing::debug!(
        "Classified {}: malicious={} confidence={:.3}",
        url,
        assessment.is_malicious,
        assessment.confidence
    );

    Json(PredictResponse {
        url,
        is_malicious: assessment.is_malicious,
        confidence: assessment.confidence,
    })
    .into_response()
}
