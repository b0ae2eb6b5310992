mod routes;
mod server;

pub mod app;
pub mod assets;
pub mod config;
pub mod detection;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod telemetry;

pub use app::{run_once, start_app};
