//! HTTP handlers, grouped by resource.

pub mod asset_handlers;
pub mod health_handlers;
pub mod upload_handlers;
pub mod video_handlers;
