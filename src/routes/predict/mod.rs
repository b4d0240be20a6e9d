mod handler;
mod model;

pub use handler::{health, index, predict};
pub use model::{HealthResponse, PredictRequest, PredictResponse};
