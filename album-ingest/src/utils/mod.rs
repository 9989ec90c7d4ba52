//! Utility modules for album-ingest

pub mod db_retry;
pub mod hashing;
pub mod paths;
pub mod pool_monitor;
pub mod rate_limiter;
pub mod relocation;

pub use db_retry::retry_on_lock;
pub use hashing::{sha256_bytes, sha256_file, sha256_parts};
pub use pool_monitor::{begin_monitored, MonitoredTransaction};
pub use rate_limiter::MoveRateLimiter;
pub use relocation::{RelocationError, RelocationOutcome, RelocationStrategy, Relocator, RenameOp};
