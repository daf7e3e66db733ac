pub mod compactor;
pub mod config;
pub mod engine;
pub mod gate;
pub mod limits;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod store;
pub mod tenant;
pub mod wal;
pub mod wire;
