use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use scommon::{BoxFuture, ConversationId, NoopSleeper, RetryPolicy, Role, Turn, Utterance};
use sgen::DeliveryError;
use sgen::prelude::*;
use sledger::{HistoryLedger, MessageQuery, SqliteStorage};
use sprompt::{PromptConfig, prepare};
use sprovider::ScriptedFragmentSource;

fn sqlite_ledger() -> HistoryLedger {
    HistoryLedger::new(Arc::new(
        SqliteStorage::new_in_memory().expect("in-memory sqlite opens"),
    ))
}

#[tokio::test]
async fn prepared_turn_streams_in_order_and_lands_in_the_ledger() {
    let delivery = Arc::new(ChannelDelivery::new());
    let target = DeliveryTarget::new("conn-9");
    let mut inbox = delivery.register(&target);
    let source = Arc::new(ScriptedFragmentSource::new(["The spike ", "came from ", "host-7."]));
    let generator = StreamGenerator::new(source.clone(), delivery, sqlite_ledger())
        .with_sleeper(Arc::new(NoopSleeper));

    let turn = Turn::new("conv-42", 5, "Where did the spike come from? mail me at a@b.com")
        .with_history(vec![
            Utterance::user("show alerts"),
            Utterance::assistant("Three alerts fired."),
        ]);
    let prepared = prepare(&turn, &PromptConfig::default()).expect("prepare");
    let request = GenerationRequest::prepared(turn, prepared.clone()).with_message_id("msg-42");

    let report = generator
        .generate(request, &target, &GenerationConfig::new("model-a").with_pricing(1.0, 2.0))
        .await
        .expect("generation succeeds");

    let mut received = Vec::new();
    while let Ok(message) = inbox.try_recv() {
        received.push(message);
    }

    let indices: Vec<u64> = received.iter().map(|m| m.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(received.iter().filter(|m| m.is_final).count(), 1);
    let terminal = received.last().expect("terminal event");
    assert_eq!(terminal.message_type, StreamEventKind::Final);
    assert_eq!(terminal.payload.text, "The spike came from host-7.");
    assert_eq!(terminal.correlation_id, "conv-42");

    let requests = source.requests();
    assert_eq!(requests[0].prompt, prepared.composite);
    assert!(!requests[0].prompt.contains("a@b.com"));
    assert!(report.usage.input_tokens <= prepared.budget.prompt_tokens());

    let stored = generator
        .ledger()
        .messages(&ConversationId::new("conv-42"), MessageQuery::all())
        .await
        .expect("load");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sequence, 5);
    assert_eq!(stored[0].role, Role::Assistant);
    assert!((stored[0].cost_usd - report.cost_usd).abs() < 1e-12);
}

#[tokio::test]
async fn concurrent_turns_in_one_conversation_keep_independent_ordering() {
    let delivery = Arc::new(ChannelDelivery::new());
    let left = DeliveryTarget::new("left");
    let right = DeliveryTarget::new("right");
    let mut left_inbox = delivery.register(&left);
    let mut right_inbox = delivery.register(&right);
    let generator = StreamGenerator::new(
        Arc::new(ScriptedFragmentSource::new(["a", "b", "c", "d"])),
        delivery,
        sqlite_ledger(),
    )
    .with_sleeper(Arc::new(NoopSleeper));
    let config = GenerationConfig::new("model-a");

    let first = GenerationRequest::from_turn(Turn::new("conv-1", 1, "one"));
    let second = GenerationRequest::from_turn(Turn::new("conv-1", 2, "two"));
    let (first, second) = tokio::join!(
        generator.generate(first, &left, &config),
        generator.generate(second, &right, &config),
    );
    let first = first.expect("first run");
    let second = second.expect("second run");
    assert_ne!(first.message_id, second.message_id);

    for inbox in [&mut left_inbox, &mut right_inbox] {
        let mut indices = Vec::new();
        while let Ok(message) = inbox.try_recv() {
            indices.push(message.chunk_index);
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    let aggregate = generator
        .ledger()
        .aggregate(&ConversationId::new("conv-1"))
        .await
        .expect("aggregate");
    assert_eq!(aggregate.total, 2);
    assert_eq!(aggregate.last_sequence, 2);
    assert_eq!(aggregate.count(Role::Assistant), 2);
}

#[tokio::test]
async fn unregistered_recipient_does_not_block_persistence() {
    let generator = StreamGenerator::new(
        Arc::new(ScriptedFragmentSource::new(["still ", "stored"])),
        Arc::new(ChannelDelivery::new()),
        sqlite_ledger(),
    )
    .with_sleeper(Arc::new(NoopSleeper));

    let report = generator
        .generate(
            GenerationRequest::from_turn(Turn::new("conv-2", 1, "hello")),
            &DeliveryTarget::new("nobody"),
            &GenerationConfig::new("model-a"),
        )
        .await
        .expect("gone is not fatal");

    assert!(report.recipient_gone);
    assert_eq!(report.delivered_chunks, 0);
    assert_eq!(report.text, "still stored");
    assert!(report.persisted.is_some_and(|outcome| outcome.stored));
}

#[derive(Default)]
struct StallingDelivery {
    sends: AtomicU32,
}

impl DeliveryPort for StallingDelivery {
    fn send<'a>(
        &'a self,
        _target: &'a DeliveryTarget,
        _message: &'a WireMessage,
    ) -> BoxFuture<'a, Result<(), DeliveryError>> {
        Box::pin(async move {
            self.sends.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(300)).await;
            Err(DeliveryError::transient("recipient is slow"))
        })
    }
}

#[tokio::test]
async fn slow_recipient_gets_one_attempt_per_event_within_delivery_budget() {
    let delivery = Arc::new(StallingDelivery::default());
    let generator = StreamGenerator::new(
        Arc::new(ScriptedFragmentSource::new(["a", "b"])),
        delivery.clone(),
        sqlite_ledger(),
    )
    .with_sleeper(Arc::new(NoopSleeper));
    let config = GenerationConfig::new("model-a").with_delivery_retry(
        RetryPolicy::new(3)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(1))
            .with_soft_budget(Duration::from_millis(100)),
    );
    let started = Instant::now();

    let report = generator
        .generate(
            GenerationRequest::from_turn(Turn::new("conv-3", 1, "hello")),
            &DeliveryTarget::new("slow"),
            &config,
        )
        .await
        .expect("degraded delivery is not fatal");

    assert_eq!(delivery.sends.load(Ordering::SeqCst), 3);
    assert_eq!(report.degraded_chunks, 3);
    assert!(!report.final_delivered);
    assert!(report.persisted.is_some_and(|outcome| outcome.stored));
    assert!(started.elapsed() < Duration::from_millis(1500));
}
