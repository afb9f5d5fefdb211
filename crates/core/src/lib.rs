//! # ShopGraph Core
//!
//! Shared building blocks for the ShopGraph recommendation platform:
//! the error taxonomy, configuration loaders, the interaction event
//! envelope and its wire format, vector math, health types, and the
//! shutdown coordinator used by long-running workers.

pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod math;
pub mod shutdown;

// Re-export commonly used types
pub use config::{
    load_dotenv, BrokerConfig, ConfigLoader, EmbeddingConfig, GraphConfig, QueueConfig,
    RecommendConfig, ServiceConfig, VectorConfig, WorkerConfig,
};
pub use error::{Result, ShopGraphError};
pub use events::{
    format_event_time, parse_event_time, truncate_to_second, EventEnvelope, EventType,
    EVENT_TIME_FORMAT,
};
pub use health::{AggregatedHealth, ComponentHealth, HealthStatus};
pub use math::{cosine_similarity, dot_product, normalize_vector};
pub use shutdown::{ShutdownCoordinator, ShutdownHandle};
