use std::sync::Arc;

use classifier::Classifier;
use config::Config;

pub mod api;
pub mod check;
pub mod classifier;
pub mod config;
pub mod error;
pub mod forms;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod utils;

pub use error::{Error, Result};

/// url-checker 服务的共享状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub classifier: Arc<dyn Classifier>,
}
