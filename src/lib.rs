//! wikirag: wiki-to-vector-index synchronization and confidence-gated answers
//!
//! The crate has two halves that share an index:
//! - [`sync`] reconciles wiki spaces into a vector collection, keeping
//!   exactly one generation of chunks per page
//! - [`answer`] retrieves context, generates an answer, and widens the
//!   context once when the answer's self-reported confidence is too low
//!
//! Collaborators sit behind traits ([`source::ContentSource`],
//! [`store::VectorIndex`], [`embed::Embedder`], [`generate::Generator`],
//! [`extract::TextExtractor`]) and [`runtime::Runtime`] wires the shipped
//! implementations for one configured profile.

pub mod answer;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod generate;
pub mod metadata;
pub mod progress;
pub mod retrieval;
pub mod retry;
pub mod runtime;
pub mod source;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
