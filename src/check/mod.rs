use std::collections::VecDeque;

use chrono::Utc;
use reqwest::Url;

use crate::api::{endpoints, models::PredictRequest};
use crate::error::{Error, Result, ValidationError};
use crate::session::SessionManager;

mod model;

pub use model::{CheckRecord, CheckStats, Prediction, Verdict};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const CHECK_FAILED: &str = "check failed";

/// 只接受带主机名的 http/https 绝对地址
pub fn validate_url(input: &str) -> std::result::Result<Url, ValidationError> {
    let url = Url::parse(input.trim()).map_err(|_| ValidationError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(url),
        _ => Err(ValidationError::InvalidUrl),
    }
}

/// 最近的检查记录，新记录在前，超出上限的旧记录被丢弃
#[derive(Debug, Clone)]
pub struct History {
    records: VecDeque<CheckRecord>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            records: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, record: CheckRecord) -> &CheckRecord {
        self.records.push_front(record);
        self.records.truncate(self.limit);
        &self.records[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CheckRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&CheckRecord> {
        self.records.front()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

pub struct UrlChecker {
    session: SessionManager,
    history: History,
    stats: CheckStats,
}

impl UrlChecker {
    pub fn new(session: SessionManager, history_limit: usize) -> Self {
        Self {
            session,
            history: History::new(history_limit),
            stats: CheckStats::default(),
        }
    }

    /// 校验并提交地址。失败不重试，只返回统一的错误提示
    pub async fn check(&mut self, input: &str) -> Result<&CheckRecord> {
        let url = input.trim();
        validate_url(url)?;

        let prediction: Prediction = match self
            .session
            .post_json::<_, Prediction>(endpoints::PREDICT, &PredictRequest { url })
            .await
        {
            Ok(prediction) => prediction,
            Err(Error::Authentication(message)) => return Err(Error::Authentication(message)),
            Err(e) => {
                tracing::warn!("URL check for {} failed: {}", url, e);
                return Err(Error::Network(CHECK_FAILED.to_string()));
            }
        };

        let record = CheckRecord {
            url: url.to_string(),
            prediction,
            checked_at: Utc::now(),
        };

        self.stats.total += 1;
        match record.verdict() {
            Verdict::Malicious => self.stats.malicious += 1,
            Verdict::Safe => self.stats.safe += 1,
            Verdict::Unknown => {}
        }
        tracing::info!("Checked {}: {}", record.url, record.verdict());

        Ok(self.history.push(record))
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn stats(&self) -> CheckStats {
        self.stats
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}
