// Course and review records used to hydrate recommendations.
pub mod core;
mod records;
mod schema;

pub use self::core::Database;

use async_trait::async_trait;

use crate::types::{CourseRecord, ReviewRecord, ReviewStat};
use crate::Result;

/// Read-only lookups of full records. Never consulted for ranking.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_course(&self, course_id: &str) -> Result<Option<CourseRecord>>;

    /// Returns the reviews that exist, in the order requested. Unknown ids are skipped.
    async fn get_reviews(&self, review_ids: &[String]) -> Result<Vec<ReviewRecord>>;

    async fn get_review_stat(&self, course_id: &str) -> Result<Option<ReviewStat>>;
}
