//! Fragment sources for streamed text generation.
//!
//! A [`FragmentSource`] opens a generation run for a model and prompt and hands
//! back a [`FragmentStream`] of text fragments. Two HTTP variants ship behind
//! cargo features, and [`ScriptedFragmentSource`] replays a fixed script for tests
//! and offline runs.
//!
//! ```rust
//! use sprovider::prelude::*;
//!
//! let source = ScriptedFragmentSource::new(["Hel", "lo"]);
//! assert_eq!(source.kind(), ProviderKind::Scripted);
//! ```

pub mod adapters;
mod config;
mod error;
mod secret;
mod source;

pub use config::{ProviderConfig, ProviderKind, create_fragment_source};
pub use error::{ProviderError, ProviderErrorKind};
pub use secret::SecretString;
pub use source::{
    FragmentSource, FragmentStream, ScriptedFragmentSource, ScriptedRequest, VecFragmentStream,
};

pub mod prelude {
    pub use crate::{
        FragmentSource, FragmentStream, ProviderConfig, ProviderError, ProviderErrorKind,
        ProviderKind, ScriptedFragmentSource, create_fragment_source,
    };
}
