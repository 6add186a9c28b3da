//! Core of the pipeline CRM: the identity merge resolver, the action-log
//! metrics engine, and the presentation model (listing, validation, board)
//! that the server and CLI render.

pub mod board;
pub mod clock;
pub mod debounce;
pub mod error;
pub mod format;
pub mod history;
pub mod listing;
pub mod merge;
pub mod metrics;
pub mod seed;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod validation;

pub use board::Board;
pub use clock::Clock;
pub use error::{CrmError, CrmResult};
pub use history::HistoryEntry;
pub use merge::{MergePlan, resolve_merge};
pub use snapshot::{Dashboard, PipelineRow, Snapshot};
pub use store::{CrmStore, SeaOrmStore};
