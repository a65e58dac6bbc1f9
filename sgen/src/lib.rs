//! Ordered streaming generation for one turn: provider fragments are delivered
//! as numbered chunk events, closed by exactly one final event, then recorded
//! in the history ledger.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use scommon::Turn;
//! use sgen::{ChannelDelivery, DeliveryTarget, GenerationConfig, GenerationRequest, StreamGenerator};
//! use sledger::{HistoryLedger, InMemoryStorage};
//! use sprovider::ScriptedFragmentSource;
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .build()
//!     .expect("runtime builds");
//!
//! runtime.block_on(async {
//!     let delivery = Arc::new(ChannelDelivery::new());
//!     let target = DeliveryTarget::new("conn-1");
//!     let mut inbox = delivery.register(&target);
//!
//!     let generator = StreamGenerator::new(
//!         Arc::new(ScriptedFragmentSource::new(["Hel", "lo"])),
//!         delivery,
//!         HistoryLedger::new(Arc::new(InMemoryStorage::new())),
//!     );
//!     let request = GenerationRequest::from_turn(Turn::new("conv-1", 1, "greet me"));
//!
//!     let report = generator
//!         .generate(request, &target, &GenerationConfig::new("model-a"))
//!         .await
//!         .expect("generation succeeds");
//!
//!     assert_eq!(report.text, "Hello");
//!     assert_eq!(inbox.recv().await.map(|m| m.payload.text), Some("Hel".to_string()));
//! });
//! ```

mod config;
mod error;
mod event;
mod generator;
mod observer;

pub mod delivery;

pub use config::{GenerationConfig, RecipientGonePolicy};
pub use delivery::{
    ChannelDelivery, DeliveryError, DeliveryErrorKind, DeliveryPort, DeliveryTarget,
    HttpCallbackDelivery,
};
pub use error::{GenerationError, GenerationErrorKind};
pub use event::{StreamEvent, StreamEventKind, WireMessage, WirePayload, WireUsage};
pub use generator::{GenerationReport, GenerationRequest, StreamGenerator, fallback_prompt};
pub use observer::{GenerationObserver, NoopGenerationObserver};

pub mod prelude {
    pub use crate::{
        ChannelDelivery, DeliveryPort, DeliveryTarget, GenerationConfig, GenerationError,
        GenerationErrorKind, GenerationObserver, GenerationReport, GenerationRequest,
        RecipientGonePolicy, StreamEvent, StreamEventKind, StreamGenerator, WireMessage,
    };
}
