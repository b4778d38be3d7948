//! EduAI common library: configuration, logging, persistence, task queues
//! and the engines that tie them together.

pub mod config;
pub mod engine;
pub mod logging;
pub mod queue;
pub mod store;

pub use config::EduConfig;
pub use engine::{CertificateIssuer, ProgressEngine, RoadmapSequencer};
pub use queue::{ChannelQueue, MemoryQueue, TaskQueue};
pub use store::{MemoryStore, SqliteOutbox, SqliteStore, Store, StoreTx};
