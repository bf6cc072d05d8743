//! Service layer: the ingestion pipeline and its collaborators.

pub mod asset_service;
pub mod ingest_service;
pub mod media_service;
pub mod storage_service;
