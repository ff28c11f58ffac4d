pub mod adapters;
pub mod config;
pub mod diff;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod snapshots;
pub mod sqlite;
pub mod stream;
pub mod tasks;
pub mod telemetry;
pub mod vault;
