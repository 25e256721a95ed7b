pub mod pool;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{BillingTransition, FileRecord, NewFile, User};

pub use pool::{create_pool, run_migrations};
pub use postgres::PgStore;

/// Data access for users, files and billing state
///
/// Every file method takes the owning user's id and only ever matches rows
/// belonging to that user, so ownership is enforced here rather than in
/// each handler.
#[async_trait]
pub trait Store: Send + Sync {
    /// Connectivity check for the health endpoint
    async fn ping(&self) -> Result<()>;

    // ---- users ------------------------------------------------------------

    /// Insert a `pending` user for `email`, or return the existing one
    async fn upsert_user_by_email(&self, email: &str) -> Result<User>;

    /// Resolve an authenticated principal to its user row
    ///
    /// Finds the user by `auth_id`; otherwise attaches `auth_id` to the row
    /// for `email`, creating it when needed.
    async fn link_auth(&self, auth_id: &str, email: &str) -> Result<User>;

    /// Record the billing customer unless one is already set, returning the
    /// customer id that is stored afterwards
    async fn claim_billing_customer(&self, user_id: i64, customer_id: &str) -> Result<String>;

    /// Take one credit; false when the balance is already zero
    async fn deduct_credit(&self, user_id: i64) -> Result<bool>;

    async fn refund_credit(&self, user_id: i64) -> Result<()>;

    /// Apply `transition` unless `idempotency_key` was applied before
    ///
    /// Returns false for an already-applied key. Key and state change are
    /// committed together.
    async fn apply_billing_transition(
        &self,
        idempotency_key: &str,
        transition: &BillingTransition,
    ) -> Result<bool>;

    // ---- files ------------------------------------------------------------

    async fn insert_file(&self, file: &NewFile) -> Result<FileRecord>;

    /// Newest first
    async fn list_files(&self, owner_id: i64) -> Result<Vec<FileRecord>>;

    async fn get_file(&self, owner_id: i64, file_id: i64) -> Result<Option<FileRecord>>;

    /// Returns false when no such file belongs to `owner_id`
    async fn delete_file(&self, owner_id: i64, file_id: i64) -> Result<bool>;

    /// Store `analysis_json` on the file and append it to the history
    ///
    /// Returns false when no such file belongs to `owner_id`.
    async fn save_analysis(
        &self,
        owner_id: i64,
        file_id: i64,
        analysis_json: &str,
        model: &str,
    ) -> Result<bool>;
}
