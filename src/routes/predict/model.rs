use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub url: Option<String>,
}

// 与原 url-checker 服务保持一致的响应格式
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub url: String,
    pub is_malicious: bool,
    pub confidence: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
