use std::sync::Arc;

use sleuth::prelude::*;
use sleuth::sledger::{
    AggregateDelta, ConversationAggregate, CreateOutcome, InMemoryStorage, LedgerKey,
    PersistedMessage,
};
use sleuth::{
    BoxFuture, LedgerError, MessageQuery, PersistOutcome, ScriptedFragmentSource, StoragePort,
};
use tokio::sync::mpsc::Receiver;

/// Fails the first `failures` create-only writes, then behaves like memory storage.
struct FlakyWrites {
    inner: InMemoryStorage,
    failures: std::sync::Mutex<u32>,
}

impl FlakyWrites {
    fn failing(failures: u32) -> Self {
        Self {
            inner: InMemoryStorage::new(),
            failures: std::sync::Mutex::new(failures),
        }
    }
}

impl StoragePort for FlakyWrites {
    fn create_if_absent<'a>(
        &'a self,
        key: &'a LedgerKey,
        record: &'a PersistedMessage,
    ) -> BoxFuture<'a, Result<CreateOutcome, LedgerError>> {
        let fail = {
            let mut failures = self.failures.lock().expect("failures lock");
            let fail = *failures > 0;
            *failures = failures.saturating_sub(1);
            fail
        };
        if fail {
            return Box::pin(async { Err(LedgerError::storage("write throttled")) });
        }
        self.inner.create_if_absent(key, record)
    }

    fn apply_aggregate_delta<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        delta: AggregateDelta,
    ) -> BoxFuture<'a, Result<(), LedgerError>> {
        self.inner.apply_aggregate_delta(conversation_id, delta)
    }

    fn load_aggregate<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
    ) -> BoxFuture<'a, Result<Option<ConversationAggregate>, LedgerError>> {
        self.inner.load_aggregate(conversation_id)
    }

    fn load_messages<'a>(
        &'a self,
        conversation_id: &'a ConversationId,
        query: MessageQuery,
    ) -> BoxFuture<'a, Result<Vec<PersistedMessage>, LedgerError>> {
        self.inner.load_messages(conversation_id, query)
    }
}

fn drain(inbox: &mut Receiver<WireMessage>) -> Vec<WireMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = inbox.try_recv() {
        messages.push(message);
    }
    messages
}

#[tokio::test]
async fn config_file_drives_a_full_turn() {
    let config = PipelineConfig::from_json_str(
        r#"{
            "model": "model-a",
            "pricePerKTokensIn": 1.0,
            "pricePerKTokensOut": 2.0,
            "deliveryRetry": { "attempts": 2, "baseDelayMs": 1, "maxDelayMs": 2 }
        }"#,
    )
    .expect("config parses");
    let delivery = Arc::new(ChannelDelivery::new());
    let pipeline = build_pipeline(
        &config,
        &ProviderConfig::scripted(["Check ", "host-7."]),
        &StorageConfig::InMemory,
        delivery.clone(),
    )
    .expect("pipeline builds");
    let target = target("conn-1");
    let mut inbox = delivery.register(&target);

    let report = pipeline
        .run_turn(turn("conv-1", 1, "Where should I look?"), &target, None)
        .await
        .expect("turn succeeds");

    let messages = drain(&mut inbox);
    let indices: Vec<u64> = messages.iter().map(|m| m.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    let terminal = &messages[2];
    assert!(terminal.is_final);
    assert_eq!(terminal.payload.text, "Check host-7.");
    let usage = terminal.payload.usage.expect("usage on final");
    assert_eq!(usage.input, report.usage.input_tokens);
    assert_eq!(usage.output, report.usage.output_tokens);
    assert!(terminal.payload.cost_estimate_usd.unwrap_or(-1.0) > 0.0);

    let stored = pipeline
        .ledger()
        .messages(&ConversationId::new("conv-1"), MessageQuery::all())
        .await
        .expect("messages load");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].text, "Check host-7.");
}

#[tokio::test]
async fn provider_only_sees_the_redacted_prompt() {
    let source = Arc::new(ScriptedFragmentSource::new(["ok"]));
    let pipeline = pipeline_with(
        &PipelineConfig::new("model-a"),
        source.clone(),
        Arc::new(ChannelDelivery::new()),
        Arc::new(InMemoryStorage::new()),
        PipelineObservers::default(),
    )
    .expect("pipeline builds");

    let turn = sl_turn!("conv-2", 1, "Token is password=hunter2, what now?", [
        user => "My phone is +1 415-555-0100",
        assistant => "Noted.",
    ]);
    pipeline
        .run_turn(turn, &target("conn-2"), None)
        .await
        .expect("turn succeeds");

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "model-a");
    assert!(!requests[0].prompt.contains("hunter2"));
    assert!(!requests[0].prompt.contains("555-0100"));
    assert!(requests[0].prompt.contains("[REDACTED_SECRET]"));
    assert!(requests[0].prompt.contains("[REDACTED_PHONE]"));
}

#[tokio::test]
async fn storage_failure_is_retried_by_the_caller_with_the_same_message_id() {
    let delivery = Arc::new(ChannelDelivery::new());
    let pipeline = pipeline_with(
        &PipelineConfig::new("model-a"),
        Arc::new(ScriptedFragmentSource::new(["answer"])),
        delivery.clone(),
        Arc::new(FlakyWrites::failing(1)),
        PipelineObservers::default(),
    )
    .expect("pipeline builds");
    let target = target("conn-1");
    let mut inbox = delivery.register(&target);

    let error = pipeline
        .run_turn(turn("conv-5", 3, "question"), &target, Some(MessageId::new("msg-5")))
        .await
        .expect_err("first persist fails");
    assert_eq!(error.kind, GenerationErrorKind::Storage);
    assert_eq!(drain(&mut inbox).last().map(|m| m.is_final), Some(true));

    let retried = pipeline
        .run_turn(turn("conv-5", 3, "question"), &target, Some(MessageId::new("msg-5")))
        .await
        .expect("retry succeeds");
    assert_eq!(retried.persisted, Some(PersistOutcome { stored: true }));

    let duplicate = pipeline
        .run_turn(turn("conv-5", 3, "question"), &target, Some(MessageId::new("msg-5")))
        .await
        .expect("duplicate run succeeds");
    assert_eq!(duplicate.persisted, Some(PersistOutcome { stored: false }));

    let aggregate = pipeline
        .ledger()
        .aggregate(&ConversationId::new("conv-5"))
        .await
        .expect("aggregate");
    assert_eq!(aggregate.total, 1);
    assert_eq!(aggregate.count(Role::Assistant), 1);
}

#[tokio::test]
async fn recipient_gone_policy_is_configurable() {
    let mut config = PipelineConfig::new("model-a");
    config.stop_on_recipient_gone = true;
    let pipeline = pipeline_with(
        &config,
        Arc::new(ScriptedFragmentSource::new(["a", "b"])),
        Arc::new(ChannelDelivery::new()),
        Arc::new(InMemoryStorage::new()),
        PipelineObservers::default(),
    )
    .expect("pipeline builds");

    let report = pipeline
        .run_turn(turn("conv-6", 1, "hello"), &target("gone"), None)
        .await
        .expect("discarded run is not an error");

    assert!(report.recipient_gone);
    assert_eq!(report.persisted, None);
    let stored = pipeline
        .ledger()
        .messages(&ConversationId::new("conv-6"), MessageQuery::all())
        .await
        .expect("messages load");
    assert!(stored.is_empty());
}
