//! Ledger records, keys, aggregates, and range queries.
//!
//! ```rust
//! use scommon::Role;
//! use sledger::{LedgerKey, PersistedMessage};
//!
//! let message = PersistedMessage::new("conv-1", 7, "msg-a", Role::Assistant, "Hello");
//! assert_eq!(message.key(), LedgerKey::new("conv-1", "msg-a"));
//! assert_eq!(message.ordering_key(), "00000000000000000007#msg-a");
//! ```

use std::collections::BTreeMap;
use std::time::SystemTime;

use scommon::{ConversationId, MessageId, Role, TokenUsage, Utterance};

/// Finalized message. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedMessage {
    pub conversation_id: ConversationId,
    pub sequence: u64,
    pub message_id: MessageId,
    pub role: Role,
    pub text: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub created_at: SystemTime,
}

impl PersistedMessage {
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        sequence: u64,
        message_id: impl Into<MessageId>,
        role: Role,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sequence,
            message_id: message_id.into(),
            role,
            text: text.into(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            created_at: SystemTime::now(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.conversation_id.clone(), self.message_id.clone())
    }

    pub fn ordering_key(&self) -> String {
        ordering_key(self.sequence, &self.message_id)
    }

    pub fn to_utterance(&self) -> Utterance {
        Utterance::new(self.role, self.text.clone())
    }
}

/// Zero-padded sequence followed by the message id; sorts in arrival-priority order.
pub fn ordering_key(sequence: u64, message_id: &MessageId) -> String {
    format!("{sequence:020}#{}", message_id.as_str())
}

/// Primary identity of a stored message. Sequence is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

impl LedgerKey {
    pub fn new(conversation_id: impl Into<ConversationId>, message_id: impl Into<MessageId>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        }
    }

    pub fn storage_key(&self) -> String {
        format!(
            "{}#{}",
            self.conversation_id.as_str(),
            self.message_id.as_str()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Exists,
}

/// Change applied to a conversation aggregate after one successful create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateDelta {
    pub role: Role,
    pub sequence: u64,
    pub at: SystemTime,
}

impl AggregateDelta {
    pub fn for_message(message: &PersistedMessage, at: SystemTime) -> Self {
        Self {
            role: message.role,
            sequence: message.sequence,
            at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationAggregate {
    pub conversation_id: ConversationId,
    pub last_activity: SystemTime,
    pub last_sequence: u64,
    pub counts_by_role: BTreeMap<Role, u64>,
    pub total: u64,
}

impl ConversationAggregate {
    pub fn empty(conversation_id: impl Into<ConversationId>, at: SystemTime) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            last_activity: at,
            last_sequence: 0,
            counts_by_role: BTreeMap::new(),
            total: 0,
        }
    }

    pub fn apply(&mut self, delta: &AggregateDelta) {
        self.total += 1;
        *self.counts_by_role.entry(delta.role).or_insert(0) += 1;
        self.last_sequence = self.last_sequence.max(delta.sequence);
        self.last_activity = delta.at;
    }

    pub fn count(&self, role: Role) -> u64 {
        self.counts_by_role.get(&role).copied().unwrap_or(0)
    }
}

/// Range over one conversation's messages in ordering-key order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageQuery {
    pub from_sequence: Option<u64>,
    pub to_sequence: Option<u64>,
    pub limit: Option<usize>,
    /// With a limit, keep the newest matches instead of the oldest.
    pub from_end: bool,
}

impl MessageQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            from_end: true,
            ..Self::default()
        }
    }

    pub fn with_from_sequence(mut self, from_sequence: u64) -> Self {
        self.from_sequence = Some(from_sequence);
        self
    }

    pub fn with_to_sequence(mut self, to_sequence: u64) -> Self {
        self.to_sequence = Some(to_sequence);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.from_sequence.is_none_or(|from| sequence >= from)
            && self.to_sequence.is_none_or(|to| sequence <= to)
    }

    /// Filters and limits messages that are already sorted by ordering key.
    pub fn select(&self, sorted: Vec<PersistedMessage>) -> Vec<PersistedMessage> {
        let mut matching = sorted
            .into_iter()
            .filter(|message| self.contains(message.sequence))
            .collect::<Vec<_>>();

        if let Some(limit) = self.limit
            && matching.len() > limit
        {
            if self.from_end {
                matching.drain(..matching.len() - limit);
            } else {
                matching.truncate(limit);
            }
        }

        matching
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn message(sequence: u64, id: &str) -> PersistedMessage {
        PersistedMessage::new("c", sequence, id, Role::Assistant, format!("text {id}"))
    }

    #[test]
    fn ordering_key_sorts_numerically() {
        let low = ordering_key(9, &MessageId::from("z"));
        let high = ordering_key(10, &MessageId::from("a"));
        assert!(low < high);
        assert_eq!(high.len(), 22);
    }

    #[test]
    fn aggregate_apply_tracks_max_sequence_and_role_counts() {
        let start = UNIX_EPOCH + Duration::from_secs(10);
        let mut aggregate = ConversationAggregate::empty("c", start);

        aggregate.apply(&AggregateDelta {
            role: Role::User,
            sequence: 5,
            at: start + Duration::from_secs(1),
        });
        aggregate.apply(&AggregateDelta {
            role: Role::Assistant,
            sequence: 3,
            at: start + Duration::from_secs(2),
        });

        assert_eq!(aggregate.total, 2);
        assert_eq!(aggregate.last_sequence, 5);
        assert_eq!(aggregate.count(Role::User), 1);
        assert_eq!(aggregate.count(Role::System), 0);
        assert_eq!(aggregate.last_activity, start + Duration::from_secs(2));
    }

    #[test]
    fn query_select_applies_range_and_limit_direction() {
        let sorted = (1..=6).map(|n| message(n, &format!("m{n}"))).collect::<Vec<_>>();

        let ranged = MessageQuery::all()
            .with_from_sequence(2)
            .with_to_sequence(5)
            .with_limit(2)
            .select(sorted.clone());
        assert_eq!(
            ranged.iter().map(|m| m.sequence).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let latest = MessageQuery::latest(2).select(sorted);
        assert_eq!(
            latest.iter().map(|m| m.sequence).collect::<Vec<_>>(),
            vec![5, 6]
        );
    }
}
