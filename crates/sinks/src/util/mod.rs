//! Building blocks of the file exporter
//!
//! - **rotation**: pure rotation and retention decisions
//! - **rotating_file**: one open destination, rotates inside `write`
//! - **handle_pool**: bounded LRU cache of open destinations
//! - **encode**: marshal → compress → frame, plus `FrameReader`
//! - **flush_scheduler**: periodic `flush_all` and retention sweep
//! - **buffer_pool**: scratch buffers for encoding
//! - **rate_limited_logger**: log spam protection for hot-path failures
//!
//! ```text
//! [Group] → [EncodePipeline] → [HandlePool] → [RotatingFile] → [Disk]
//!                                   ↑
//!                           [FlushScheduler]
//! ```

pub mod buffer_pool;
pub mod encode;
pub mod flush_scheduler;
pub mod handle_pool;
pub mod rate_limited_logger;
pub mod rotating_file;
pub mod rotation;

pub use buffer_pool::{BufferPool, DEFAULT_BUFFER_CAPACITY, DEFAULT_POOL_SIZE};
pub use encode::{EncodePipeline, FrameReader, Framing, LENGTH_FIELD_SIZE, compress, decompress};
pub use flush_scheduler::{FlushScheduler, RETENTION_SWEEP_INTERVAL};
pub use handle_pool::{Handle, HandlePool, PoolOptions};
pub use rate_limited_logger::{DEFAULT_LOG_INTERVAL, RateLimitedLogger};
pub use rotating_file::{DEFAULT_WRITE_BUFFER, RotatingFile, WriteReport};
pub use rotation::{BACKUP_TIME_FORMAT, BackupFile, RotationPolicy, list_backups, parse_backup};
