//! Storage port and the in-memory backend.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use scommon::{BoxFuture, ConversationId, MessageId};

use crate::backends::sqlite::default_sqlite_path;
use crate::error::LedgerError;
use crate::types::{
    AggregateDelta, ConversationAggregate, CreateOutcome, LedgerKey, MessageQuery,
    PersistedMessage,
};

pub use crate::backends::filesystem::FilesystemStorage;
pub use crate::backends::postgres::{PostgresStorage, PostgresStorageConfig};
pub use crate::backends::sqlite::SqliteStorage;

/// Durable store with create-only writes and aggregate updates.
///
/// Implementations must keep concurrent `create_if_absent` calls for the same key safe:
/// exactly one observes `Created`.
pub trait StoragePort: Send + Sync {
    fn create_if_absent<'a>(
        &'a self,
        key: &'a LedgerKey,
        record: &'a PersistedMessage,
    ) -> BoxFuture<'a, Result<CreateOutcome, LedgerError>>;

    fn apply_aggregate_delta<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        delta: AggregateDelta,
    ) -> BoxFuture<'a, Result<(), LedgerError>>;

    fn load_aggregate<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, Result<Option<ConversationAggregate>, LedgerError>>;

    fn load_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        query: MessageQuery,
    ) -> BoxFuture<'a, Result<Vec<PersistedMessage>, LedgerError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Sqlite { path: PathBuf },
    Filesystem { root: PathBuf },
    Postgres(PostgresStorageConfig),
    InMemory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

pub fn create_storage(config: StorageConfig) -> Result<Arc<dyn StoragePort>, LedgerError> {
    match config {
        StorageConfig::Sqlite { path } => Ok(Arc::new(SqliteStorage::new(path)?)),
        StorageConfig::Filesystem { root } => Ok(Arc::new(FilesystemStorage::new(root)?)),
        StorageConfig::Postgres(config) => Ok(Arc::new(PostgresStorage::new(config)?)),
        StorageConfig::InMemory => Ok(Arc::new(InMemoryStorage::new())),
    }
}

pub fn create_default_storage() -> Result<Arc<dyn StoragePort>, LedgerError> {
    create_storage(StorageConfig::default())
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    conversations: Mutex<HashMap<ConversationId, ConversationState>>,
}

#[derive(Debug, Default)]
struct ConversationState {
    by_id: HashMap<MessageId, String>,
    by_ordering: BTreeMap<String, PersistedMessage>,
    aggregate: Option<ConversationAggregate>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ConversationId, ConversationState>>, LedgerError>
    {
        self.conversations
            .lock()
            .map_err(|_| LedgerError::storage("in-memory storage lock poisoned"))
    }
}

impl StoragePort for InMemoryStorage {
    fn create_if_absent<'a>(
        &'a self,
        key: &'a LedgerKey,
        record: &'a PersistedMessage,
    ) -> BoxFuture<'a, Result<CreateOutcome, LedgerError>> {
        Box::pin(async move {
            let mut conversations = self.lock()?;
            let state = conversations.entry(key.conversation_id.clone()).or_default();
            if state.by_id.contains_key(&key.message_id) {
                return Ok(CreateOutcome::Exists);
            }

            let ordering = record.ordering_key();
            state.by_id.insert(key.message_id.clone(), ordering.clone());
            state.by_ordering.insert(ordering, record.clone());
            Ok(CreateOutcome::Created)
        })
    }

    fn apply_aggregate_delta<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        delta: AggregateDelta,
    ) -> BoxFuture<'a, Result<(), LedgerError>> {
        Box::pin(async move {
            let mut conversations = self.lock()?;
            let state = conversations.entry(conversation_id.clone()).or_default();
            state
                .aggregate
                .get_or_insert_with(|| ConversationAggregate::empty(conversation_id.clone(), delta.at))
                .apply(&delta);
            Ok(())
        })
    }

    fn load_aggregate<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, Result<Option<ConversationAggregate>, LedgerError>> {
        Box::pin(async move {
            let conversations = self.lock()?;
            Ok(conversations
                .get(conversation_id)
                .and_then(|state| state.aggregate.clone()))
        })
    }

    fn load_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        query: MessageQuery,
    ) -> BoxFuture<'a, Result<Vec<PersistedMessage>, LedgerError>> {
        Box::pin(async move {
            let conversations = self.lock()?;
            let sorted = conversations
                .get(conversation_id)
                .map(|state| state.by_ordering.values().cloned().collect())
                .unwrap_or_default();
            Ok(query.select(sorted))
        })
    }
}
