//! Rating oracle layer: the oracle contract, its error taxonomy, prompt and
//! verdict handling, and classification of raw verdicts before persistence.

pub mod classifier;
mod error;
mod oracle;
pub mod prompt;
pub mod verdict;

pub use classifier::{ChunkClassification, RejectionKind, VerdictClass, classify_chunk};
pub use error::OracleError;
pub use oracle::{RatingOracle, RatingRequest, TypedOracle, UntypedOracle};
pub use verdict::{ParsedVerdict, parse_verdict};

#[cfg(feature = "http")]
mod openai;
#[cfg(feature = "http")]
pub use openai::{DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiOracle};
