//! QueueLoop - closed-loop throughput rig for a message queue.
//!
//! This library provides shared modules for the two QueueLoop binaries:
//! - `queueloop-generator`: Spawns many publishers that flood a queue with random messages
//! - `queueloop-relay`: Consumes the queue and re-publishes every message back onto it
//!
//! ## Architecture
//!
//! ```text
//! Generator ──► queue ──► Relay
//!                 ▲         │
//!                 └─────────┘  (same queue, on purpose)
//! ```

pub mod config;
pub mod counter;
pub mod generator;
pub mod payload;
pub mod queue;
pub mod relay;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ConfigError, GeneratorConfig, RelayConfig};
pub use counter::ThroughputCounter;
pub use generator::{run_generator, GeneratorReport, RateSample};
pub use payload::random_payload;
pub use queue::{
    AmqpQueueClient, DeliveredMessage, InMemoryQueue, QueueClient, QueueError, QueueHandle,
};
pub use relay::{settle_batch, RelayError, Relayer, Settlement};
