//! Faithfulness checking: does an answer say only what its sources say?

pub mod extractor;
pub mod verifier;

pub use extractor::{
    extract_with_chain, ClaimExtractor, HeuristicClaimExtractor, LlmClaimExtractor,
};
pub use verifier::FaithfulnessVerifier;
