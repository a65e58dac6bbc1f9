//! Production-friendly observers for retry, generation, and ledger phases.
//!
//! ```rust
//! use sobserve::{MetricsObservabilityHooks, SafeGenerationObserver, TracingObservabilityHooks};
//!
//! let _generation = SafeGenerationObserver::new(TracingObservabilityHooks);
//! let _metrics = MetricsObservabilityHooks;
//! ```

mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use metrics_hooks::MetricsObservabilityHooks;
pub use safe_hooks::{SafeGenerationObserver, SafeLedgerObserver, SafeRetryHooks};
pub use tracing_hooks::TracingObservabilityHooks;

pub mod prelude {
    pub use crate::{
        MetricsObservabilityHooks, SafeGenerationObserver, SafeLedgerObserver, SafeRetryHooks,
        TracingObservabilityHooks,
    };
}
