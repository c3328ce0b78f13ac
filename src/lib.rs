pub mod auth;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod org;
pub mod pricing;
pub mod reaper;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
