//! Durable, idempotent history for finalized turn messages.
//!
//! [`HistoryLedger::persist`] performs a create-only write keyed by
//! (conversation id, message id) and then updates the per-conversation
//! [`ConversationAggregate`] on a best-effort basis. Storage sits behind the
//! [`StoragePort`] trait with in-memory, SQLite, filesystem, and PostgreSQL
//! backends.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use scommon::Role;
//! use sledger::{HistoryLedger, InMemoryStorage, PersistedMessage};
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .build()
//!     .expect("runtime should build");
//! let ledger = HistoryLedger::new(Arc::new(InMemoryStorage::new()));
//! let message = PersistedMessage::new("conv-1", 1, "msg-1", Role::Assistant, "Done.");
//!
//! runtime.block_on(async {
//!     assert!(ledger.persist(&message).await.expect("first write").stored);
//!     assert!(!ledger.persist(&message).await.expect("retry").stored);
//! });
//! ```

mod backends;
mod error;
mod ledger;
mod observer;
mod storage;
mod types;

pub use error::{LedgerError, LedgerErrorKind};
pub use ledger::{BatchReport, HistoryLedger, PersistOutcome};
pub use observer::{LedgerObserver, NoopLedgerObserver};
pub use storage::{
    FilesystemStorage, InMemoryStorage, PostgresStorage, PostgresStorageConfig, SqliteStorage,
    StorageConfig, StoragePort, create_default_storage, create_storage,
};
pub use types::{
    AggregateDelta, ConversationAggregate, CreateOutcome, LedgerKey, MessageQuery,
    PersistedMessage, ordering_key,
};

pub mod prelude {
    pub use crate::{
        BatchReport, ConversationAggregate, HistoryLedger, InMemoryStorage, LedgerError,
        LedgerErrorKind, LedgerObserver, MessageQuery, PersistOutcome, PersistedMessage,
        SqliteStorage, StorageConfig, StoragePort, create_storage,
    };
}
