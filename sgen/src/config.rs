use std::time::Duration;

use scommon::RetryPolicy;

use crate::GenerationError;

/// What a run does once the Delivery Port reports the recipient gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecipientGonePolicy {
    /// Keep consuming fragments and persist the full answer; deliver nothing more.
    #[default]
    ContinueAndPersist,
    /// Stop consuming immediately and persist nothing.
    StopAndDiscard,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub price_per_k_tokens_in: f64,
    pub price_per_k_tokens_out: f64,
    pub provider_retry: RetryPolicy,
    pub delivery_retry: RetryPolicy,
    /// Used for usage estimation when no prepared budget is available.
    pub tokens_per_char: f64,
    pub persist_partial_on_provider_failure: bool,
    pub recipient_gone_policy: RecipientGonePolicy,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            price_per_k_tokens_in: 0.0,
            price_per_k_tokens_out: 0.0,
            provider_retry: RetryPolicy::new(3),
            delivery_retry: RetryPolicy::new(3)
                .with_backoff(Duration::from_millis(50), Duration::from_secs(1))
                .with_soft_budget(Duration::from_secs(5)),
            tokens_per_char: 4.0,
            persist_partial_on_provider_failure: false,
            recipient_gone_policy: RecipientGonePolicy::default(),
        }
    }
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_pricing(mut self, per_k_in: f64, per_k_out: f64) -> Self {
        self.price_per_k_tokens_in = per_k_in;
        self.price_per_k_tokens_out = per_k_out;
        self
    }

    pub fn with_provider_retry(mut self, policy: RetryPolicy) -> Self {
        self.provider_retry = policy;
        self
    }

    pub fn with_delivery_retry(mut self, policy: RetryPolicy) -> Self {
        self.delivery_retry = policy;
        self
    }

    pub fn with_tokens_per_char(mut self, tokens_per_char: f64) -> Self {
        self.tokens_per_char = tokens_per_char;
        self
    }

    pub fn with_partial_persistence(mut self, enabled: bool) -> Self {
        self.persist_partial_on_provider_failure = enabled;
        self
    }

    pub fn with_recipient_gone_policy(mut self, policy: RecipientGonePolicy) -> Self {
        self.recipient_gone_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.model.trim().is_empty() {
            return Err(GenerationError::invalid_config("model must not be empty"));
        }

        for (name, price) in [
            ("price_per_k_tokens_in", self.price_per_k_tokens_in),
            ("price_per_k_tokens_out", self.price_per_k_tokens_out),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(GenerationError::invalid_config(format!(
                    "{name} must be a finite non-negative number"
                )));
            }
        }

        if !self.tokens_per_char.is_finite() || self.tokens_per_char <= 0.0 {
            return Err(GenerationError::invalid_config(
                "tokens_per_char must be positive",
            ));
        }

        if self.provider_retry.max_attempts == 0 || self.delivery_retry.max_attempts == 0 {
            return Err(GenerationError::invalid_config(
                "retry policies need at least one attempt",
            ));
        }

        Ok(())
    }

    pub fn cost_for(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (f64::from(input_tokens) / 1000.0) * self.price_per_k_tokens_in
            + (f64::from(output_tokens) / 1000.0) * self.price_per_k_tokens_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerationErrorKind;

    #[test]
    fn defaults_continue_after_gone_and_discard_partials() {
        let config = GenerationConfig::new("model-a");

        assert_eq!(
            config.recipient_gone_policy,
            RecipientGonePolicy::ContinueAndPersist
        );
        assert!(!config.persist_partial_on_provider_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_blank_model_and_negative_prices() {
        let blank = GenerationConfig::default().validate().expect_err("blank model");
        assert_eq!(blank.kind, GenerationErrorKind::InvalidConfig);

        let negative = GenerationConfig::new("m")
            .with_pricing(-1.0, 0.0)
            .validate()
            .expect_err("negative price");
        assert!(negative.message.contains("price_per_k_tokens_in"));
    }

    #[test]
    fn cost_is_linear_in_tokens() {
        let config = GenerationConfig::new("m").with_pricing(0.5, 1.5);
        let cost = config.cost_for(2000, 1000);

        assert!((cost - 2.5).abs() < 1e-9);
        assert_eq!(config.cost_for(0, 0), 0.0);
    }
}
