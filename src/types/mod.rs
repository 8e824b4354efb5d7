//! Data types for the document store
//!
//! Core data structures shared by the store, the delivery pipeline and
//! the API surface.

mod document;
mod event;
mod sink;

pub use document::{strip_reserved, Document, DocumentPage, MutationContext, RESERVED_FIELDS};
pub use event::{ChangeEvent, EventBatch, EventDraft, Operation};
pub use sink::{FailedDelivery, SinkConfig};
