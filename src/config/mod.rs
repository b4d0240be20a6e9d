use std::env;
use std::path::PathBuf;

use crate::check::DEFAULT_HISTORY_LIMIT;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000/api";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub api_base: String,
    pub server_host: String,
    pub server_port: u16,
    pub token_store_path: PathBuf,
    pub history_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源构建配置，缺失或无法解析的值使用默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let history_limit = lookup("HISTORY_LIMIT")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT);

        Config {
            api_base: lookup("API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: lookup("SERVER_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(8080),
            token_store_path: lookup("TOKEN_STORE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".urlguard/session.json")),
            history_limit,
        }
    }
}
