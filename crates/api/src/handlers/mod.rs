//! Request handlers.
//!
//! Handlers parse and validate path parameters themselves so malformed ids
//! and amounts surface as `VALIDATION_ERROR` rather than axum's plain-text
//! rejections.

pub mod accounts;
