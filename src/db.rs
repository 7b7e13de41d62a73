use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, types::Json, Pool, Postgres};
use uuid::Uuid;

use crate::{
    config::Config,
    models::{Course, CourseFilter},
    store::{CourseStore, StoreResult},
};

pub type Db = Pool<Postgres>;

pub struct Connection {
    pub pool: Db,
    /// Startup never reached the database; the pool connects on first use.
    pub degraded: bool,
}

/// Connects with a fixed number of attempts and a fixed delay. Exhausting the
/// attempts is not fatal: a lazy pool is returned and startup carries on.
pub async fn connect(config: &Config) -> Result<Connection, sqlx::Error> {
    let options = PgPoolOptions::new().max_connections(config.db_max_connections);
    let attempts = config.db_connect_attempts;

    for attempt in 1..=attempts {
        match options.clone().connect(&config.database_url).await {
            Ok(pool) => {
                tracing::info!(attempt, "connected to database");
                return Ok(Connection { pool, degraded: false });
            }
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "database connection failed");
                if attempt < attempts {
                    tokio::time::sleep(config.db_connect_delay).await;
                }
            }
        }
    }

    tracing::error!(attempts, "database unreachable, continuing in degraded state");
    let pool = options.connect_lazy(&config.database_url)?;
    Ok(Connection { pool, degraded: true })
}

#[derive(Clone)]
pub struct PgCourseStore {
    pool: Db,
}

impl PgCourseStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CourseRow {
    doc: Json<Course>,
}

#[async_trait]
impl CourseStore for PgCourseStore {
    async fn insert(&self, course: &Course) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO courses (id, doc, created_at, updated_at) VALUES ($1, $2, $3, $4)"#,
        )
        .bind(course.id)
        .bind(Json(course))
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> StoreResult<Option<Course>> {
        let row = sqlx::query_as::<_, CourseRow>("SELECT doc FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.doc.0))
    }

    async fn list(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>> {
        let rows = sqlx::query_as::<_, CourseRow>(
            r#"
            SELECT doc FROM courses
            WHERE ($1::text IS NULL OR doc->>'category' = $1)
              AND ($2::text IS NULL OR doc->>'instructor' = $2)
              AND ($3::text IS NULL OR doc->>'status' = $3)
              AND ($4::text IS NULL OR doc->'enrolledStudents' @> jsonb_build_array($4::text))
            ORDER BY created_at
            "#,
        )
        .bind(filter.category.as_deref())
        .bind(filter.instructor.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.student.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.doc.0).collect())
    }

    async fn replace(&self, course: &Course) -> StoreResult<bool> {
        let res = sqlx::query("UPDATE courses SET doc = $2, updated_at = $3 WHERE id = $1")
            .bind(course.id)
            .bind(Json(course))
            .bind(course.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn migrate(&self) -> StoreResult<()> {
        // crate-relative path for sqlx migrations
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
