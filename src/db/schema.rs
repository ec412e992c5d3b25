use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                course_name TEXT NOT NULL,
                course_no TEXT NOT NULL,
                course_class TEXT NOT NULL,
                department TEXT NOT NULL,
                credit INTEGER NOT NULL,
                course_type TEXT NOT NULL,
                instructor TEXT NOT NULL,
                timeslot TEXT,
                room TEXT,
                course_intro TEXT,
                prerequisite TEXT,
                syllabus TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_courses_course_no ON courses (course_no);

            CREATE TABLE IF NOT EXISTS reviews (
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                text TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_course_id ON reviews (course_id);

            -- Ratings are averaged on a 1-5 scale
            CREATE TABLE IF NOT EXISTS review_stats (
                course_id TEXT PRIMARY KEY,
                satisfaction REAL NOT NULL,
                workload REAL NOT NULL,
                difficulty REAL NOT NULL,
                delivery REAL NOT NULL,
                achievement REAL NOT NULL,
                grade REAL NOT NULL,
                attendance REAL NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Database schema initialized");
        Ok(())
    }
}
