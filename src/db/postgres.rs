use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::Store;
use crate::error::{AppError, Result};
use crate::models::{BillingTransition, FileRecord, NewFile, SubscriptionStatus, User};

const USER_COLUMNS: &str = "id, auth_id, email, subscription_status, stripe_customer_id, \
     stripe_subscription_id, credits, created_at";

// ai_analysis is JSONB; read it back as the text we stored
const FILE_COLUMNS: &str = "id, user_id, storage_path, original_name, size_bytes, mime_type, \
     text_content, ai_analysis::text AS ai_analysis, created_at";

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn upsert_subscription_mirror(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    customer_id: Option<&str>,
    subscription_id: &str,
    status: SubscriptionStatus,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO subscriptions (user_id, stripe_customer_id, stripe_subscription_id, status) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (user_id) DO UPDATE SET \
             stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id), \
             stripe_subscription_id = EXCLUDED.stripe_subscription_id, \
             status = EXCLUDED.status, \
             updated_at = NOW()",
    )
    .bind(user_id)
    .bind(customer_id)
    .bind(subscription_id)
    .bind(status.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_user_by_email(&self, email: &str) -> Result<User> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email) VALUES ($1) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn link_auth(&self, auth_id: &str, email: &str) -> Result<User> {
        let existing = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE auth_id = $1",
            USER_COLUMNS
        ))
        .bind(auth_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(user) = existing {
            return Ok(user);
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, auth_id) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET \
                 auth_id = COALESCE(users.auth_id, EXCLUDED.auth_id), \
                 updated_at = NOW() \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(auth_id)
        .fetch_one(&self.pool)
        .await?;

        // The email row is already linked to a different identity
        if user.auth_id.as_deref() != Some(auth_id) {
            tracing::warn!(
                "Refusing to link auth id to user {}: already linked to another identity",
                user.id
            );
            return Err(AppError::Unauthorized);
        }

        tracing::info!("Linked auth identity to user {}", user.id);
        Ok(user)
    }

    async fn claim_billing_customer(&self, user_id: i64, customer_id: &str) -> Result<String> {
        let stored: String = sqlx::query_scalar(
            "UPDATE users SET \
                 stripe_customer_id = COALESCE(stripe_customer_id, $2), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING stripe_customer_id",
        )
        .bind(user_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        if stored != customer_id {
            tracing::warn!(
                "User {} already had billing customer {}, discarding {}",
                user_id,
                stored,
                customer_id
            );
        }

        Ok(stored)
    }

    async fn deduct_credit(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET credits = credits - 1, updated_at = NOW() \
             WHERE id = $1 AND credits > 0",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn refund_credit(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET credits = credits + 1, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_billing_transition(
        &self,
        idempotency_key: &str,
        transition: &BillingTransition,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            "INSERT INTO billing_events (idempotency_key) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(idempotency_key)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if recorded == 0 {
            tx.rollback().await?;
            tracing::info!("Billing transition {} already applied", idempotency_key);
            return Ok(false);
        }

        let affected = match transition {
            BillingTransition::SubscriptionActivated {
                user_id,
                customer_id,
                subscription_id,
            } => {
                let affected = sqlx::query(
                    "UPDATE users SET \
                         stripe_customer_id = $2, \
                         stripe_subscription_id = $3, \
                         subscription_status = $4, \
                         updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(user_id)
                .bind(customer_id)
                .bind(subscription_id)
                .bind(SubscriptionStatus::Active.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if affected > 0 {
                    upsert_subscription_mirror(
                        &mut tx,
                        *user_id,
                        Some(customer_id),
                        subscription_id,
                        SubscriptionStatus::Active,
                    )
                    .await?;
                }
                affected
            }
            BillingTransition::CreditsPurchased {
                user_id,
                customer_id,
                credits,
            } => sqlx::query(
                "UPDATE users SET \
                     credits = credits + $2, \
                     stripe_customer_id = COALESCE(stripe_customer_id, $3), \
                     updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(user_id)
            .bind(credits)
            .bind(customer_id.as_deref())
            .execute(&mut *tx)
            .await?
            .rows_affected(),
            BillingTransition::SubscriptionStatusChanged {
                subscription_id,
                status,
            } => {
                let affected = sqlx::query(
                    "UPDATE users SET subscription_status = $2, updated_at = NOW() \
                     WHERE stripe_subscription_id = $1",
                )
                .bind(subscription_id)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();

                sqlx::query(
                    "UPDATE subscriptions SET status = $2, updated_at = NOW() \
                     WHERE stripe_subscription_id = $1",
                )
                .bind(subscription_id)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?;

                affected
            }
        };

        if affected == 0 {
            tracing::warn!(
                "Billing transition {} matched no user: {:?}",
                idempotency_key,
                transition
            );
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_file(&self, file: &NewFile) -> Result<FileRecord> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "INSERT INTO files \
                 (user_id, storage_path, original_name, size_bytes, mime_type, text_content) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {}",
            FILE_COLUMNS
        ))
        .bind(file.user_id)
        .bind(&file.storage_path)
        .bind(&file.original_name)
        .bind(file.size_bytes)
        .bind(&file.mime_type)
        .bind(file.text_content.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_files(&self, owner_id: i64) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM files WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            FILE_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    async fn get_file(&self, owner_id: i64, file_id: i64) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {} FROM files WHERE id = $1 AND user_id = $2",
            FILE_COLUMNS
        ))
        .bind(file_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    async fn delete_file(&self, owner_id: i64, file_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1 AND user_id = $2")
            .bind(file_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn save_analysis(
        &self,
        owner_id: i64,
        file_id: i64,
        analysis_json: &str,
        model: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE files SET ai_analysis = $3::jsonb, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(file_id)
        .bind(owner_id)
        .bind(analysis_json)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO file_analyses (file_id, analysis, model) VALUES ($1, $2::jsonb, $3)")
            .bind(file_id)
            .bind(analysis_json)
            .bind(model)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
