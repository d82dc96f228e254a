mod classification;
mod inference_service;
mod model_service;
mod ort_service;
mod preprocess;
mod routes;
mod server;
mod state;
mod telemetry;

#[cfg(test)]
mod test_utils;

pub mod app;
pub mod config;

pub use app::start_app;
