//! HTTP surface: axum handlers and their request/response models.

pub mod handlers;
pub mod models;
