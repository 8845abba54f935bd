//! Hosted model backends
//!
//! Each backend is compiled in behind its own cargo feature.

#[cfg(feature = "anthropic")]
pub mod anthropic;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
