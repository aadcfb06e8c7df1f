// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod coverage_catalog;
pub mod file_snapshot_store;
pub mod m2m_repository;
