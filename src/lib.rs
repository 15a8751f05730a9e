//! Banana ripeness service: uploads an image, asks a hosted classifier how
//! ripe the banana is, and keeps a browsable history of the results.

pub mod config;
pub mod detection;
pub mod error;
pub mod model;
pub mod routes;
pub mod storage;
pub mod upload;
pub mod views;

pub use config::Config;
pub use routes::{router, AppState};
