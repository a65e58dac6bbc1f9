use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use scommon::{BoxFuture, ConversationId, MessageId, Role, TokenUsage};
use serde::{Deserialize, Serialize};

use super::{decode_role, decode_system_time, encode_system_time};
use crate::error::LedgerError;
use crate::storage::StoragePort;
use crate::types::{
    AggregateDelta, ConversationAggregate, CreateOutcome, LedgerKey, MessageQuery,
    PersistedMessage,
};

/// One JSON file per message under `conversations/<hex id>/messages/`, created with a
/// hard link so a second writer for the same key observes `AlreadyExists`.
#[derive(Debug)]
pub struct FilesystemStorage {
    root: PathBuf,
    aggregate_lock: Mutex<()>,
}

impl FilesystemStorage {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("conversations")).map_err(|error| {
            LedgerError::storage(format!("failed to create filesystem storage root: {error}"))
        })?;
        Ok(Self {
            root,
            aggregate_lock: Mutex::new(()),
        })
    }

    fn conversation_dir(&self, conversation_id: &ConversationId) -> PathBuf {
        self.root
            .join("conversations")
            .join(hex_encode(conversation_id.as_str().as_bytes()))
    }

    fn message_path(&self, key: &LedgerKey) -> PathBuf {
        self.conversation_dir(&key.conversation_id)
            .join("messages")
            .join(format!("{}.json", hex_encode(key.message_id.as_str().as_bytes())))
    }

    fn aggregate_path(&self, conversation_id: &ConversationId) -> PathBuf {
        self.conversation_dir(conversation_id).join("aggregate.json")
    }

    fn read_aggregate(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<StoredAggregate>, LedgerError> {
        let path = self.aggregate_path(conversation_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).map_err(|error| {
            LedgerError::storage(format!("failed to read aggregate file: {error}"))
        })?;
        let aggregate = serde_json::from_slice::<StoredAggregate>(&bytes).map_err(|error| {
            LedgerError::storage(format!("failed to deserialize aggregate: {error}"))
        })?;
        Ok(Some(aggregate))
    }
}

impl StoragePort for FilesystemStorage {
    fn create_if_absent<'a>(
        &'a self,
        key: &'a LedgerKey,
        record: &'a PersistedMessage,
    ) -> BoxFuture<'a, Result<CreateOutcome, LedgerError>> {
        Box::pin(async move {
            let path = self.message_path(key);
            if path.exists() {
                return Ok(CreateOutcome::Exists);
            }

            let bytes = serde_json::to_vec_pretty(&StoredMessage::from_message(record)?)
                .map_err(|error| {
                    LedgerError::storage(format!("failed to serialize ledger message: {error}"))
                })?;
            create_new(&path, &bytes)
        })
    }

    fn apply_aggregate_delta<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        delta: AggregateDelta,
    ) -> BoxFuture<'a, Result<(), LedgerError>> {
        Box::pin(async move {
            let _guard = self
                .aggregate_lock
                .lock()
                .map_err(|_| LedgerError::storage("filesystem storage lock poisoned"))?;

            let mut aggregate = match self.read_aggregate(conversation_id)? {
                Some(stored) => stored.into_aggregate(conversation_id)?,
                None => ConversationAggregate::empty(conversation_id.clone(), delta.at),
            };
            aggregate.apply(&delta);

            let bytes = serde_json::to_vec_pretty(&StoredAggregate::from_aggregate(&aggregate)?)
                .map_err(|error| {
                    LedgerError::storage(format!("failed to serialize aggregate: {error}"))
                })?;
            write_atomic(&self.aggregate_path(conversation_id), &bytes)
        })
    }

    fn load_aggregate<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, Result<Option<ConversationAggregate>, LedgerError>> {
        Box::pin(async move {
            let _guard = self
                .aggregate_lock
                .lock()
                .map_err(|_| LedgerError::storage("filesystem storage lock poisoned"))?;
            self.read_aggregate(conversation_id)?
                .map(|stored| stored.into_aggregate(conversation_id))
                .transpose()
        })
    }

    fn load_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        query: MessageQuery,
    ) -> BoxFuture<'a, Result<Vec<PersistedMessage>, LedgerError>> {
        Box::pin(async move {
            let dir = self.conversation_dir(conversation_id).join("messages");
            if !dir.exists() {
                return Ok(Vec::new());
            }

            let entries = fs::read_dir(&dir).map_err(|error| {
                LedgerError::storage(format!("failed to list message files: {error}"))
            })?;

            let mut by_ordering = BTreeMap::new();
            for entry in entries {
                let entry = entry.map_err(|error| {
                    LedgerError::storage(format!("failed to read message directory entry: {error}"))
                })?;
                let path = entry.path();
                if path.extension().is_none_or(|extension| extension != "json") {
                    continue;
                }

                let bytes = fs::read(&path).map_err(|error| {
                    LedgerError::storage(format!("failed to read message file: {error}"))
                })?;
                let stored = serde_json::from_slice::<StoredMessage>(&bytes).map_err(|error| {
                    LedgerError::storage(format!("failed to deserialize message file: {error}"))
                })?;
                let message = stored.into_message()?;
                by_ordering.insert(message.ordering_key(), message);
            }

            Ok(query.select(by_ordering.into_values().collect()))
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    conversation_id: ConversationId,
    sequence: u64,
    message_id: MessageId,
    role: Role,
    text: String,
    usage: TokenUsage,
    cost_usd: f64,
    created_at_secs: i64,
    created_at_nanos: i64,
}

impl StoredMessage {
    fn from_message(message: &PersistedMessage) -> Result<Self, LedgerError> {
        let (created_at_secs, created_at_nanos) = encode_system_time(message.created_at)?;
        Ok(Self {
            conversation_id: message.conversation_id.clone(),
            sequence: message.sequence,
            message_id: message.message_id.clone(),
            role: message.role,
            text: message.text.clone(),
            usage: message.usage,
            cost_usd: message.cost_usd,
            created_at_secs,
            created_at_nanos,
        })
    }

    fn into_message(self) -> Result<PersistedMessage, LedgerError> {
        Ok(PersistedMessage {
            conversation_id: self.conversation_id,
            sequence: self.sequence,
            message_id: self.message_id,
            role: self.role,
            text: self.text,
            usage: self.usage,
            cost_usd: self.cost_usd,
            created_at: decode_system_time(self.created_at_secs, self.created_at_nanos)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAggregate {
    last_activity_secs: i64,
    last_activity_nanos: i64,
    last_sequence: u64,
    counts_by_role: BTreeMap<String, u64>,
    total: u64,
}

impl StoredAggregate {
    fn from_aggregate(aggregate: &ConversationAggregate) -> Result<Self, LedgerError> {
        let (last_activity_secs, last_activity_nanos) = encode_system_time(aggregate.last_activity)?;
        Ok(Self {
            last_activity_secs,
            last_activity_nanos,
            last_sequence: aggregate.last_sequence,
            counts_by_role: aggregate
                .counts_by_role
                .iter()
                .map(|(role, count)| (role.as_str().to_string(), *count))
                .collect(),
            total: aggregate.total,
        })
    }

    fn into_aggregate(
        self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationAggregate, LedgerError> {
        let mut counts_by_role = BTreeMap::new();
        for (role, count) in self.counts_by_role {
            counts_by_role.insert(decode_role(&role)?, count);
        }

        Ok(ConversationAggregate {
            conversation_id: conversation_id.clone(),
            last_activity: decode_system_time(self.last_activity_secs, self.last_activity_nanos)?,
            last_sequence: self.last_sequence,
            counts_by_role,
            total: self.total,
        })
    }
}

fn create_new(path: &Path, bytes: &[u8]) -> Result<CreateOutcome, LedgerError> {
    let Some(parent) = path.parent() else {
        return Err(LedgerError::storage("message file missing parent directory"));
    };
    fs::create_dir_all(parent).map_err(|error| {
        LedgerError::storage(format!("failed to create parent directory: {error}"))
    })?;

    let tmp = path.with_extension(format!("{}.tmp", scommon::MessageId::generate()));
    fs::write(&tmp, bytes).map_err(|error| {
        LedgerError::storage(format!("failed to write temporary message file: {error}"))
    })?;

    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);
    match linked {
        Ok(()) => Ok(CreateOutcome::Created),
        Err(error) if error.kind() == ErrorKind::AlreadyExists => Ok(CreateOutcome::Exists),
        Err(error) => Err(LedgerError::storage(format!(
            "failed to finalize message file: {error}"
        ))),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let Some(parent) = path.parent() else {
        return Err(LedgerError::storage("aggregate file missing parent directory"));
    };
    fs::create_dir_all(parent).map_err(|error| {
        LedgerError::storage(format!("failed to create parent directory: {error}"))
    })?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|error| {
        LedgerError::storage(format!("failed to write temporary aggregate file: {error}"))
    })?;
    fs::rename(&tmp, path)
        .map_err(|error| LedgerError::storage(format!("failed to finalize aggregate file: {error}")))
}

fn hex_encode(input: &[u8]) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    for byte in input {
        output.push(nibble_to_hex(byte >> 4));
        output.push(nibble_to_hex(byte & 0x0f));
    }
    output
}

fn nibble_to_hex(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        10..=15 => (b'a' + (nibble - 10)) as char,
        _ => '0',
    }
}
