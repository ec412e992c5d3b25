//! Sentence-level vector indices.
//!
//! Each index entry is one sentence tagged with the `course_id` it came from and, for review
//! sentences, the `review_id` of its parent review. The retriever only ever talks to the
//! [`SentenceIndex`] trait.

pub mod embedding;
pub mod memory;
pub mod qdrant;
pub mod similarity;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::types::{SentenceHit, SentenceMetadata};
use crate::Result;

pub use embedding::{Embedder, OllamaEmbedder};
pub use memory::MemoryIndex;
pub use qdrant::QdrantSentenceIndex;

pub const TARGET_VECTOR: &str = "vector";
pub const QDRANT_URL_ENV: &str = "QDRANT_URL";

/// Payload keys shared by every sentence index.
pub const COURSE_ID_KEY: &str = "course_id";
pub const REVIEW_ID_KEY: &str = "review_id";

#[async_trait]
pub trait SentenceIndex: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Nearest neighbours for each text, in the order of `texts`.
    ///
    /// Every inner list holds at most `n_results` hits sorted by ascending distance. When
    /// `allowed_course_ids` is given only sentences of those courses are searched.
    async fn query(
        &self,
        texts: &[String],
        n_results: u64,
        allowed_course_ids: Option<&HashSet<String>>,
    ) -> Result<Vec<Vec<SentenceHit>>>;

    /// Stored metadata for the given sentence ids. Unknown ids are left out.
    async fn get(&self, sentence_ids: &[String]) -> Result<Vec<SentenceMetadata>>;
}
