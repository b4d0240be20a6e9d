use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Safe,
    Malicious,
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Safe => "Safe",
            Verdict::Malicious => "Malicious",
            Verdict::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// 分类接口的响应，兼容三种返回格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Scored {
        malicious: bool,
        malicious_prob: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cached: Option<bool>,
    },
    /// url-checker 桩服务的格式
    Stub {
        url: String,
        is_malicious: bool,
        confidence: f64,
    },
    Label {
        prediction: String,
    },
}

impl Prediction {
    pub fn verdict(&self) -> Verdict {
        match self {
            Prediction::Scored { malicious, .. } | Prediction::Stub { is_malicious: malicious, .. } => {
                if *malicious {
                    Verdict::Malicious
                } else {
                    Verdict::Safe
                }
            }
            Prediction::Label { prediction } => match prediction.trim().to_lowercase().as_str() {
                "benign" | "safe" | "legitimate" => Verdict::Safe,
                "malicious" | "phishing" | "malware" | "defacement" => Verdict::Malicious,
                _ => Verdict::Unknown,
            },
        }
    }

    /// 恶意概率或置信度，标签格式没有
    pub fn score(&self) -> Option<f64> {
        match self {
            Prediction::Scored { malicious_prob, .. } => Some(*malicious_prob),
            Prediction::Stub { confidence, .. } => Some(*confidence),
            Prediction::Label { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckRecord {
    pub url: String,
    pub prediction: Prediction,
    pub checked_at: DateTime<Utc>,
}

impl CheckRecord {
    pub fn verdict(&self) -> Verdict {
        self.prediction.verdict()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckStats {
    pub total: usize,
    pub malicious: usize,
    pub safe: usize,
}
