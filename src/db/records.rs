use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

use super::core::Database;
use super::RecordStore;
use crate::types::{CourseDump, CourseRecord, ReviewRecord, ReviewStat};
use crate::{Result, TARGET_DB};

impl Database {
    pub async fn add_course(&self, course: &CourseRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO courses (
                id, course_name, course_no, course_class, department, credit, course_type,
                instructor, timeslot, room, course_intro, prerequisite, syllabus
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&course.id)
        .bind(&course.course_name)
        .bind(&course.course_no)
        .bind(&course.course_class)
        .bind(&course.department)
        .bind(course.credit)
        .bind(&course.course_type)
        .bind(&course.instructor)
        .bind(&course.timeslot)
        .bind(&course.room)
        .bind(&course.course_intro)
        .bind(&course.prerequisite)
        .bind(&course.syllabus)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn add_review(&self, review: &ReviewRecord) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO reviews (id, course_id, text) VALUES (?1, ?2, ?3)")
            .bind(&review.id)
            .bind(&review.course_id)
            .bind(&review.text)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn add_review_stat(&self, stat: &ReviewStat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO review_stats (
                course_id, satisfaction, workload, difficulty, delivery, achievement, grade,
                attendance
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&stat.course_id)
        .bind(stat.satisfaction)
        .bind(stat.workload)
        .bind(stat.difficulty)
        .bind(stat.delivery)
        .bind(stat.achievement)
        .bind(stat.grade)
        .bind(stat.attendance)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Loads every record in the dump, replacing rows that share an id.
    pub async fn import(&self, dump: &CourseDump) -> Result<()> {
        for course in &dump.courses {
            self.add_course(course).await?;
        }
        for review in &dump.reviews {
            self.add_review(review).await?;
        }
        for stat in &dump.review_stats {
            self.add_review_stat(stat).await?;
        }
        info!(target: TARGET_DB,
            "Imported {} courses, {} reviews and {} review stats",
            dump.courses.len(),
            dump.reviews.len(),
            dump.review_stats.len()
        );
        Ok(())
    }

    pub async fn count_courses(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn get_course(&self, course_id: &str) -> Result<Option<CourseRecord>> {
        let course = sqlx::query_as::<_, CourseRecord>(
            r#"
            SELECT id, course_name, course_no, course_class, department, credit, course_type,
                   instructor, timeslot, room, course_intro, prerequisite, syllabus
            FROM courses
            WHERE id = ?1
            "#,
        )
        .bind(course_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(course)
    }

    async fn get_reviews(&self, review_ids: &[String]) -> Result<Vec<ReviewRecord>> {
        if review_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; review_ids.len()].join(", ");
        let query = format!(
            "SELECT id, course_id, text FROM reviews WHERE id IN ({})",
            placeholders
        );
        let mut query_builder = sqlx::query_as::<_, ReviewRecord>(&query);
        for id in review_ids {
            query_builder = query_builder.bind(id);
        }
        let rows = query_builder.fetch_all(self.pool()).await?;
        debug!(target: TARGET_DB, "Fetched {} of {} reviews", rows.len(), review_ids.len());

        let mut by_id: HashMap<String, ReviewRecord> =
            rows.into_iter().map(|r| (r.id.clone(), r)).collect();
        Ok(review_ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn get_review_stat(&self, course_id: &str) -> Result<Option<ReviewStat>> {
        let stat = sqlx::query_as::<_, ReviewStat>(
            r#"
            SELECT course_id, satisfaction, workload, difficulty, delivery, achievement, grade,
                   attendance
            FROM review_stats
            WHERE course_id = ?1
            "#,
        )
        .bind(course_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(stat)
    }
}
