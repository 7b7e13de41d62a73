use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Course, CourseFilter};

pub type StoreResult<T> = Result<T, sqlx::Error>;

/// Whole-document persistence for courses. Writers replace the full document;
/// there is no field-level update and no concurrency token.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn insert(&self, course: &Course) -> StoreResult<()>;

    async fn fetch(&self, id: Uuid) -> StoreResult<Option<Course>>;

    async fn list(&self, filter: &CourseFilter) -> StoreResult<Vec<Course>>;

    /// Returns false when no course with that id exists.
    async fn replace(&self, course: &Course) -> StoreResult<bool>;

    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;

    /// Brings the schema up to date. Safe to call more than once.
    async fn migrate(&self) -> StoreResult<()>;

    async fn close(&self) {}
}
