pub mod config;
pub mod controller;
pub mod dedup;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod protocol;
pub mod router;
pub mod storage;

pub use config::RelayConfig;
pub use controller::{RelayController, RelayState};
pub use dedup::DuplicateFilter;
pub use error::{RelayError, Result};
pub use events::{DropReason, EventBroadcaster, EventStream, RelayEvent};
pub use ingestion::HttpIngestionClient;
pub use protocol::{InboundMessage, OutboundResponse, UNKNOWN_MESSAGE_TYPE};
pub use router::{MessageHandler, MessageRouter, Responder, RouterHandle};
pub use storage::{JsonFileStore, MemoryStore, PersistentState, StateEntries};
