//! Retrieval-augmented answering.
//!
//! [`HybridRetriever`] finds passages for a query by fusing vector and
//! lexical search; [`AnswerGenerator`] turns them into a cited answer.

pub mod fusion;
pub mod generator;
pub mod retriever;

pub use fusion::{weighted_fusion, FusedChunk, FusionWeights};
pub use generator::{AnswerGenerator, GeneratorSettings};
pub use retriever::{rank_relevance, HybridRetriever};
