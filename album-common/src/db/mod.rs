//! SQLite pool helpers shared by the ephemeral scan catalog and the durable store

pub mod init;

pub use init::{open_pool, PoolSettings};
