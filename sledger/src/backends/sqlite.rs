use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use scommon::{BoxFuture, ConversationId, MessageId, Role, TokenUsage};

use super::{
    decode_count, decode_role, decode_sequence, decode_system_time, encode_sequence,
    encode_system_time, role_increments,
};
use crate::error::LedgerError;
use crate::storage::StoragePort;
use crate::types::{
    AggregateDelta, ConversationAggregate, CreateOutcome, LedgerKey, MessageQuery,
    PersistedMessage,
};

#[derive(Debug)]
pub struct SqliteStorage {
    connection: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                LedgerError::storage(format!(
                    "failed to create sqlite parent directory: {error}"
                ))
            })?;
        }

        let connection = Connection::open(path).map_err(|error| {
            LedgerError::storage(format!("failed to open sqlite database: {error}"))
        })?;
        Self::from_connection(connection)
    }

    pub fn new_in_memory() -> Result<Self, LedgerError> {
        let connection = Connection::open_in_memory().map_err(|error| {
            LedgerError::storage(format!("failed to open in-memory sqlite database: {error}"))
        })?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, LedgerError> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|error| {
                LedgerError::storage(format!("failed to configure sqlite busy timeout: {error}"))
            })?;
        let storage = Self {
            connection: Mutex::new(connection),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LedgerError> {
        self.connection
            .lock()
            .map_err(|_| LedgerError::storage("sqlite storage lock poisoned"))
    }

    fn initialize_schema(&self) -> Result<(), LedgerError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS ledger_messages (
                conversation_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                ordering_key TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL,
                PRIMARY KEY (conversation_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_messages_ordering
            ON ledger_messages(conversation_id, ordering_key);

            CREATE TABLE IF NOT EXISTS ledger_aggregates (
                conversation_id TEXT PRIMARY KEY,
                last_activity_secs INTEGER NOT NULL,
                last_activity_nanos INTEGER NOT NULL,
                last_sequence INTEGER NOT NULL,
                total INTEGER NOT NULL,
                user_count INTEGER NOT NULL,
                assistant_count INTEGER NOT NULL,
                system_count INTEGER NOT NULL
            );
            ",
        )
        .map_err(|error| {
            LedgerError::storage(format!("failed to initialize sqlite schema: {error}"))
        })?;

        Ok(())
    }
}

impl StoragePort for SqliteStorage {
    fn create_if_absent<'a>(
        &'a self,
        key: &'a LedgerKey,
        record: &'a PersistedMessage,
    ) -> BoxFuture<'a, Result<CreateOutcome, LedgerError>> {
        Box::pin(async move {
            let (secs, nanos) = encode_system_time(record.created_at)?;
            let sequence = encode_sequence(record.sequence)?;
            let conn = self.connection()?;
            let inserted = conn
                .execute(
                    "
                    INSERT INTO ledger_messages (
                        conversation_id,
                        message_id,
                        sequence,
                        ordering_key,
                        role,
                        text,
                        input_tokens,
                        output_tokens,
                        cost_usd,
                        created_at_secs,
                        created_at_nanos
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    ON CONFLICT(conversation_id, message_id) DO NOTHING
                    ",
                    params![
                        key.conversation_id.as_str(),
                        key.message_id.as_str(),
                        sequence,
                        record.ordering_key(),
                        record.role.as_str(),
                        &record.text,
                        i64::from(record.usage.input_tokens),
                        i64::from(record.usage.output_tokens),
                        record.cost_usd,
                        secs,
                        nanos,
                    ],
                )
                .map_err(|error| {
                    LedgerError::storage(format!("failed to insert ledger message: {error}"))
                })?;

            Ok(if inserted == 0 {
                CreateOutcome::Exists
            } else {
                CreateOutcome::Created
            })
        })
    }

    fn apply_aggregate_delta<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        delta: AggregateDelta,
    ) -> BoxFuture<'a, Result<(), LedgerError>> {
        Box::pin(async move {
            let (secs, nanos) = encode_system_time(delta.at)?;
            let sequence = encode_sequence(delta.sequence)?;
            let (user, assistant, system) = role_increments(delta.role);
            let conn = self.connection()?;
            conn.execute(
                "
                INSERT INTO ledger_aggregates (
                    conversation_id,
                    last_activity_secs,
                    last_activity_nanos,
                    last_sequence,
                    total,
                    user_count,
                    assistant_count,
                    system_count
                )
                VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7)
                ON CONFLICT(conversation_id) DO UPDATE SET
                    last_activity_secs = excluded.last_activity_secs,
                    last_activity_nanos = excluded.last_activity_nanos,
                    last_sequence = MAX(ledger_aggregates.last_sequence, excluded.last_sequence),
                    total = ledger_aggregates.total + 1,
                    user_count = ledger_aggregates.user_count + excluded.user_count,
                    assistant_count = ledger_aggregates.assistant_count + excluded.assistant_count,
                    system_count = ledger_aggregates.system_count + excluded.system_count
                ",
                params![
                    conversation_id.as_str(),
                    secs,
                    nanos,
                    sequence,
                    user,
                    assistant,
                    system
                ],
            )
            .map_err(|error| {
                LedgerError::storage(format!("failed to upsert conversation aggregate: {error}"))
            })?;
            Ok(())
        })
    }

    fn load_aggregate<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, Result<Option<ConversationAggregate>, LedgerError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let row = conn
                .query_row(
                    "
                    SELECT last_activity_secs, last_activity_nanos, last_sequence, total,
                           user_count, assistant_count, system_count
                    FROM ledger_aggregates
                    WHERE conversation_id = ?1
                    ",
                    params![conversation_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                        ))
                    },
                )
                .optional()
                .map_err(|error| {
                    LedgerError::storage(format!("failed to query conversation aggregate: {error}"))
                })?;

            let Some((secs, nanos, last_sequence, total, user, assistant, system)) = row else {
                return Ok(None);
            };

            let mut counts_by_role = BTreeMap::new();
            for (role, count) in [
                (Role::User, user),
                (Role::Assistant, assistant),
                (Role::System, system),
            ] {
                if count > 0 {
                    counts_by_role.insert(role, decode_sequence(count)?);
                }
            }

            Ok(Some(ConversationAggregate {
                conversation_id: conversation_id.clone(),
                last_activity: decode_system_time(secs, nanos)?,
                last_sequence: decode_sequence(last_sequence)?,
                counts_by_role,
                total: decode_sequence(total)?,
            }))
        })
    }

    fn load_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        query: MessageQuery,
    ) -> BoxFuture<'a, Result<Vec<PersistedMessage>, LedgerError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let mut statement = conn
                .prepare(
                    "
                    SELECT message_id, sequence, role, text, input_tokens, output_tokens,
                           cost_usd, created_at_secs, created_at_nanos
                    FROM ledger_messages
                    WHERE conversation_id = ?1
                    ORDER BY ordering_key ASC
                    ",
                )
                .map_err(|error| {
                    LedgerError::storage(format!("failed to prepare message query: {error}"))
                })?;

            let rows = statement
                .query_map(params![conversation_id.as_str()], |row| {
                    Ok(StoredRow {
                        message_id: row.get(0)?,
                        sequence: row.get(1)?,
                        role: row.get(2)?,
                        text: row.get(3)?,
                        input_tokens: row.get(4)?,
                        output_tokens: row.get(5)?,
                        cost_usd: row.get(6)?,
                        created_at_secs: row.get(7)?,
                        created_at_nanos: row.get(8)?,
                    })
                })
                .map_err(|error| {
                    LedgerError::storage(format!("failed to query ledger messages: {error}"))
                })?;

            let mut sorted = Vec::new();
            for row in rows {
                let row = row.map_err(|error| {
                    LedgerError::storage(format!("failed to read ledger message row: {error}"))
                })?;
                sorted.push(row.into_message(conversation_id)?);
            }

            Ok(query.select(sorted))
        })
    }
}

struct StoredRow {
    message_id: String,
    sequence: i64,
    role: String,
    text: String,
    input_tokens: i64,
    output_tokens: i64,
    cost_usd: f64,
    created_at_secs: i64,
    created_at_nanos: i64,
}

impl StoredRow {
    fn into_message(self, conversation_id: &ConversationId) -> Result<PersistedMessage, LedgerError> {
        Ok(PersistedMessage {
            conversation_id: conversation_id.clone(),
            sequence: decode_sequence(self.sequence)?,
            message_id: MessageId::from(self.message_id),
            role: decode_role(&self.role)?,
            text: self.text,
            usage: TokenUsage::new(
                decode_count(self.input_tokens)?,
                decode_count(self.output_tokens)?,
            ),
            cost_usd: self.cost_usd,
            created_at: decode_system_time(self.created_at_secs, self.created_at_nanos)?,
        })
    }
}

pub(crate) fn default_sqlite_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("SLEDGER_SQLITE_PATH") {
        return PathBuf::from(explicit);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".sleuth").join("ledger.sqlite3");
    }

    PathBuf::from("ledger.sqlite3")
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[tokio::test]
    async fn insert_conflict_reports_exists() {
        let storage = SqliteStorage::new_in_memory().expect("sqlite");
        let message = PersistedMessage::new("c", 1, "m", Role::Assistant, "hi")
            .with_usage(TokenUsage::new(10, 2))
            .with_cost(0.25)
            .with_created_at(UNIX_EPOCH + Duration::new(1_700_000_000, 42));

        let key = message.key();
        assert_eq!(
            storage.create_if_absent(&key, &message).await,
            Ok(CreateOutcome::Created)
        );
        assert_eq!(
            storage.create_if_absent(&key, &message).await,
            Ok(CreateOutcome::Exists)
        );

        let stored = storage
            .load_messages(&ConversationId::from("c"), MessageQuery::all())
            .await
            .expect("load");
        assert_eq!(stored, vec![message]);
    }

    #[tokio::test]
    async fn aggregate_upsert_keeps_max_sequence() {
        let storage = SqliteStorage::new_in_memory().expect("sqlite");
        let conversation = ConversationId::from("c");
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        for (role, sequence) in [(Role::User, 8), (Role::Assistant, 3), (Role::Assistant, 5)] {
            storage
                .apply_aggregate_delta(&conversation, AggregateDelta { role, sequence, at })
                .await
                .expect("delta");
        }

        let aggregate = storage
            .load_aggregate(&conversation)
            .await
            .expect("load")
            .expect("aggregate exists");
        assert_eq!(aggregate.total, 3);
        assert_eq!(aggregate.last_sequence, 8);
        assert_eq!(aggregate.count(Role::Assistant), 2);
        assert_eq!(aggregate.count(Role::System), 0);
        assert_eq!(aggregate.last_activity, at);

        assert_eq!(
            storage.load_aggregate(&ConversationId::from("other")).await,
            Ok(None)
        );
    }
}
