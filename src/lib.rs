pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod market;
pub mod pipelines;
pub mod prompts;
pub mod types;

pub use error::{AppError, Result};
