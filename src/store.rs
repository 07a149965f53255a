//! Read-side data access consumed by the aggregator.

use uuid::Uuid;

use crate::models::{LogRecord, Requirement, User};

/// Queries the aggregator needs from persistence.
///
/// Implementations report any failure through `anyhow`; the aggregator
/// turns it into a retrieval failure without retrying.
#[allow(async_fn_in_trait)]
pub trait ProgressStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn list_interns(&self) -> anyhow::Result<Vec<User>>;

    /// Requirements whose rotation is active.
    async fn active_requirements(&self) -> anyhow::Result<Vec<Requirement>>;

    async fn logs_for_intern(&self, intern_id: Uuid) -> anyhow::Result<Vec<LogRecord>>;

    async fn all_logs(&self) -> anyhow::Result<Vec<LogRecord>>;
}
