//! Idempotent message persistence with best-effort aggregate maintenance.

use std::sync::Arc;
use std::time::SystemTime;

use scommon::{ConversationId, MessageId, Utterance};

use crate::{
    AggregateDelta, ConversationAggregate, CreateOutcome, LedgerError, LedgerObserver,
    MessageQuery, NoopLedgerObserver, PersistedMessage, StoragePort,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOutcome {
    /// `false` when the message was already present.
    pub stored: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub stored: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub failures: Vec<(MessageId, LedgerError)>,
}

#[derive(Clone)]
pub struct HistoryLedger {
    storage: Arc<dyn StoragePort>,
    observer: Arc<dyn LedgerObserver>,
}

impl HistoryLedger {
    pub fn new(storage: Arc<dyn StoragePort>) -> Self {
        Self {
            storage,
            observer: Arc::new(NoopLedgerObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LedgerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn storage(&self) -> Arc<dyn StoragePort> {
        Arc::clone(&self.storage)
    }

    /// Stores `message` once per (conversation, message id). Only primary-write
    /// failures other than "already exists" are returned as errors.
    pub async fn persist(&self, message: &PersistedMessage) -> Result<PersistOutcome, LedgerError> {
        validate(message)?;

        let key = message.key();
        match self.storage.create_if_absent(&key, message).await {
            Ok(CreateOutcome::Created) => {
                self.observer.on_stored(&key, message.sequence);
                let delta = AggregateDelta::for_message(message, SystemTime::now());
                if let Err(error) = self
                    .storage
                    .apply_aggregate_delta(&message.conversation_id, delta)
                    .await
                {
                    self.observer.on_aggregate_failure(&key, &error);
                }
                Ok(PersistOutcome { stored: true })
            }
            Ok(CreateOutcome::Exists) => {
                self.observer.on_duplicate(&key);
                Ok(PersistOutcome { stored: false })
            }
            Err(error) => {
                self.observer.on_write_failure(&key, &error);
                Err(error)
            }
        }
    }

    /// Persists each message independently; one failure never blocks the rest.
    pub async fn persist_batch(&self, messages: &[PersistedMessage]) -> BatchReport {
        let mut report = BatchReport::default();
        for message in messages {
            match self.persist(message).await {
                Ok(PersistOutcome { stored: true }) => report.stored += 1,
                Ok(PersistOutcome { stored: false }) => report.duplicates += 1,
                Err(error) => {
                    report.failed += 1;
                    report.failures.push((message.message_id.clone(), error));
                }
            }
        }
        report
    }

    pub async fn aggregate(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationAggregate, LedgerError> {
        self.storage
            .load_aggregate(conversation_id)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!(
                    "no aggregate recorded for conversation '{conversation_id}'"
                ))
            })
    }

    pub async fn messages(
        &self,
        conversation_id: &ConversationId,
        query: MessageQuery,
    ) -> Result<Vec<PersistedMessage>, LedgerError> {
        self.storage.load_messages(conversation_id, query).await
    }

    /// Last `limit` stored messages, oldest first, ready to feed the next turn's history.
    pub async fn recent_utterances(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Utterance>, LedgerError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let messages = self
            .storage
            .load_messages(conversation_id, MessageQuery::latest(limit))
            .await?;
        Ok(messages.iter().map(PersistedMessage::to_utterance).collect())
    }
}

fn validate(message: &PersistedMessage) -> Result<(), LedgerError> {
    if message.conversation_id.is_blank() {
        return Err(LedgerError::invalid_request("conversation id must not be blank"));
    }
    if message.message_id.is_blank() {
        return Err(LedgerError::invalid_request("message id must not be blank"));
    }
    Ok(())
}
