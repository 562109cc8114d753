pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod proto;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};
