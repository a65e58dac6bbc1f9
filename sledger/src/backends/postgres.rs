use std::collections::BTreeMap;

use scommon::{BoxFuture, ConversationId, MessageId, Role, TokenUsage};
use tokio_postgres::NoTls;

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

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresStorageConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct PostgresStorage {
    config: PostgresStorageConfig,
}

impl PostgresStorage {
    pub fn new(config: PostgresStorageConfig) -> Result<Self, LedgerError> {
        if config.host.trim().is_empty() {
            return Err(LedgerError::invalid_request("postgres host cannot be empty"));
        }
        if config.database.trim().is_empty() {
            return Err(LedgerError::invalid_request(
                "postgres database cannot be empty",
            ));
        }
        if config.username.trim().is_empty() {
            return Err(LedgerError::invalid_request(
                "postgres username cannot be empty",
            ));
        }
        Ok(Self { config })
    }

    async fn connect_client(&self) -> Result<tokio_postgres::Client, LedgerError> {
        let mut config = tokio_postgres::Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.dbname(&self.config.database);
        config.user(&self.config.username);
        config.password(&self.config.password);

        let (client, connection) = config.connect(NoTls).await.map_err(|error| {
            LedgerError::storage(format!("failed to connect to postgres: {error}"))
        })?;

        tokio::spawn(async move {
            if let Err(error) = connection.await {
                eprintln!("sledger postgres connection error: {error}");
            }
        });

        client
            .batch_execute(
                "
                CREATE TABLE IF NOT EXISTS sledger_messages (
                    conversation_id TEXT NOT NULL,
                    message_id TEXT NOT NULL,
                    sequence BIGINT NOT NULL,
                    ordering_key TEXT NOT NULL,
                    role TEXT NOT NULL,
                    text TEXT NOT NULL,
                    input_tokens BIGINT NOT NULL,
                    output_tokens BIGINT NOT NULL,
                    cost_usd DOUBLE PRECISION NOT NULL,
                    created_at_secs BIGINT NOT NULL,
                    created_at_nanos BIGINT NOT NULL,
                    PRIMARY KEY (conversation_id, message_id)
                );

                CREATE INDEX IF NOT EXISTS idx_sledger_messages_ordering
                ON sledger_messages(conversation_id, ordering_key);

                CREATE TABLE IF NOT EXISTS sledger_aggregates (
                    conversation_id TEXT PRIMARY KEY,
                    last_activity_secs BIGINT NOT NULL,
                    last_activity_nanos BIGINT NOT NULL,
                    last_sequence BIGINT NOT NULL,
                    total BIGINT NOT NULL,
                    user_count BIGINT NOT NULL,
                    assistant_count BIGINT NOT NULL,
                    system_count BIGINT NOT NULL
                );
                ",
            )
            .await
            .map_err(|error| {
                LedgerError::storage(format!("failed to initialize postgres schema: {error}"))
            })?;

        Ok(client)
    }
}

impl StoragePort for PostgresStorage {
    fn create_if_absent<'a>(
        &'a self,
        key: &'a LedgerKey,
        record: &'a PersistedMessage,
    ) -> BoxFuture<'a, Result<CreateOutcome, LedgerError>> {
        Box::pin(async move {
            let (secs, nanos) = encode_system_time(record.created_at)?;
            let sequence = encode_sequence(record.sequence)?;
            let ordering_key = record.ordering_key();
            let input_tokens = i64::from(record.usage.input_tokens);
            let output_tokens = i64::from(record.usage.output_tokens);

            let client = self.connect_client().await?;
            let inserted = client
                .execute(
                    "
                    INSERT INTO sledger_messages (
                        conversation_id, message_id, sequence, ordering_key, role, text,
                        input_tokens, output_tokens, cost_usd, created_at_secs, created_at_nanos
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    ON CONFLICT (conversation_id, message_id) DO NOTHING
                    ",
                    &[
                        &key.conversation_id.as_str(),
                        &key.message_id.as_str(),
                        &sequence,
                        &ordering_key,
                        &record.role.as_str(),
                        &record.text,
                        &input_tokens,
                        &output_tokens,
                        &record.cost_usd,
                        &secs,
                        &nanos,
                    ],
                )
                .await
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

            let client = self.connect_client().await?;
            client
                .execute(
                    "
                    INSERT INTO sledger_aggregates (
                        conversation_id, last_activity_secs, last_activity_nanos, last_sequence,
                        total, user_count, assistant_count, system_count
                    )
                    VALUES ($1, $2, $3, $4, 1, $5, $6, $7)
                    ON CONFLICT (conversation_id) DO UPDATE SET
                        last_activity_secs = EXCLUDED.last_activity_secs,
                        last_activity_nanos = EXCLUDED.last_activity_nanos,
                        last_sequence = GREATEST(sledger_aggregates.last_sequence, EXCLUDED.last_sequence),
                        total = sledger_aggregates.total + 1,
                        user_count = sledger_aggregates.user_count + EXCLUDED.user_count,
                        assistant_count = sledger_aggregates.assistant_count + EXCLUDED.assistant_count,
                        system_count = sledger_aggregates.system_count + EXCLUDED.system_count
                    ",
                    &[
                        &conversation_id.as_str(),
                        &secs,
                        &nanos,
                        &sequence,
                        &user,
                        &assistant,
                        &system,
                    ],
                )
                .await
                .map_err(|error| {
                    LedgerError::storage(format!(
                        "failed to upsert conversation aggregate: {error}"
                    ))
                })?;
            Ok(())
        })
    }

    fn load_aggregate<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, Result<Option<ConversationAggregate>, LedgerError>> {
        Box::pin(async move {
            let client = self.connect_client().await?;
            let row = client
                .query_opt(
                    "
                    SELECT last_activity_secs, last_activity_nanos, last_sequence, total,
                           user_count, assistant_count, system_count
                    FROM sledger_aggregates
                    WHERE conversation_id = $1
                    ",
                    &[&conversation_id.as_str()],
                )
                .await
                .map_err(|error| {
                    LedgerError::storage(format!("failed to query conversation aggregate: {error}"))
                })?;

            let Some(row) = row else {
                return Ok(None);
            };

            let mut counts_by_role = BTreeMap::new();
            for (role, index) in [(Role::User, 4), (Role::Assistant, 5), (Role::System, 6)] {
                let count = row.get::<usize, i64>(index);
                if count > 0 {
                    counts_by_role.insert(role, decode_sequence(count)?);
                }
            }

            Ok(Some(ConversationAggregate {
                conversation_id: conversation_id.clone(),
                last_activity: decode_system_time(
                    row.get::<usize, i64>(0),
                    row.get::<usize, i64>(1),
                )?,
                last_sequence: decode_sequence(row.get::<usize, i64>(2))?,
                counts_by_role,
                total: decode_sequence(row.get::<usize, i64>(3))?,
            }))
        })
    }

    fn load_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        query: MessageQuery,
    ) -> BoxFuture<'a, Result<Vec<PersistedMessage>, LedgerError>> {
        Box::pin(async move {
            let client = self.connect_client().await?;
            let rows = client
                .query(
                    "
                    SELECT message_id, sequence, role, text, input_tokens, output_tokens,
                           cost_usd, created_at_secs, created_at_nanos
                    FROM sledger_messages
                    WHERE conversation_id = $1
                    ORDER BY ordering_key ASC
                    ",
                    &[&conversation_id.as_str()],
                )
                .await
                .map_err(|error| {
                    LedgerError::storage(format!("failed to query ledger messages: {error}"))
                })?;

            let mut sorted = Vec::with_capacity(rows.len());
            for row in rows {
                let role = row.get::<usize, String>(2);
                sorted.push(PersistedMessage {
                    conversation_id: conversation_id.clone(),
                    sequence: decode_sequence(row.get::<usize, i64>(1))?,
                    message_id: MessageId::from(row.get::<usize, String>(0)),
                    role: decode_role(&role)?,
                    text: row.get::<usize, String>(3),
                    usage: TokenUsage::new(
                        decode_count(row.get::<usize, i64>(4))?,
                        decode_count(row.get::<usize, i64>(5))?,
                    ),
                    cost_usd: row.get::<usize, f64>(6),
                    created_at: decode_system_time(
                        row.get::<usize, i64>(7),
                        row.get::<usize, i64>(8),
                    )?,
                });
            }

            Ok(query.select(sorted))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PostgresStorageConfig {
        PostgresStorageConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "sleuth".to_string(),
            username: "sleuth".to_string(),
            password: String::new(),
        }
    }

    #[test]
    fn new_rejects_blank_connection_fields() {
        assert!(PostgresStorage::new(config()).is_ok());

        let mut blank_host = config();
        blank_host.host = "  ".to_string();
        let error = PostgresStorage::new(blank_host).expect_err("blank host");
        assert_eq!(error.kind, crate::LedgerErrorKind::InvalidRequest);

        let mut blank_user = config();
        blank_user.username = String::new();
        assert!(PostgresStorage::new(blank_user).is_err());
    }
}
