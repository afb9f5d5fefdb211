//! Event ingestion: admission and projector workers
//!
//! Admission validates and normalizes incoming events, then either
//! publishes them to the broker's fanout exchange or writes them straight
//! to the graph store. Projector workers consume the bound queues and
//! apply events to their projections with bounded, delayed retries and a
//! dead-letter sink for poison messages.

pub mod admission;
pub mod batch;
pub mod projector;
pub mod worker;

pub use admission::{
    Admitted, AdmissionService, AdmissionStatus, BatchAdmitted, CallerIdentity, EventDraft,
    GraphWriter, NoAuthIdentity,
};
pub use batch::BatchProjector;
pub use projector::{handle_message, GraphProjector, MessageOutcome, Projector, VectorProjector};
pub use worker::ProjectorWorker;
