#[cfg(any(feature = "provider-openai-compatible", feature = "provider-anthropic"))]
pub mod http;
#[cfg(any(feature = "provider-openai-compatible", feature = "provider-anthropic"))]
pub mod sse;

#[cfg(feature = "provider-anthropic")]
pub mod anthropic;
#[cfg(feature = "provider-openai-compatible")]
pub mod openai_compatible;
