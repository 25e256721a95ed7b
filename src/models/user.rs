use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};

use crate::constants::MAX_EMAIL_LEN;

/// Local mirror of the billing provider's subscription state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Email captured, never paid
    Pending,
    Active,
    Canceled,
    /// Lapsed at the provider (unpaid, incomplete, expired)
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(SubscriptionStatus::Pending),
            "active" => Some(SubscriptionStatus::Active),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "inactive" => Some(SubscriptionStatus::Inactive),
            _ => None,
        }
    }

    /// Map a Stripe subscription status onto the local status set
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" | "trialing" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Inactive,
        }
    }
}

/// User row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    /// Identity provider uid, set once the account is linked
    pub auth_id: Option<String>,
    pub email: String,
    pub subscription_status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether a cancel request can be forwarded to the provider
    pub fn cancellable_subscription(&self) -> Option<&str> {
        match (&self.subscription_status, &self.stripe_subscription_id) {
            (SubscriptionStatus::Active, Some(id)) if !id.is_empty() => Some(id.as_str()),
            _ => None,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("subscription_status")?;
        let subscription_status =
            SubscriptionStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
                index: "subscription_status".to_string(),
                source: format!("unknown subscription status '{}'", status).into(),
            })?;

        Ok(User {
            id: row.try_get("id")?,
            auth_id: row.try_get("auth_id")?,
            email: row.try_get("email")?,
            subscription_status,
            stripe_customer_id: row.try_get("stripe_customer_id")?,
            stripe_subscription_id: row.try_get("stripe_subscription_id")?,
            credits: row.try_get("credits")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Trim and lowercase an email, returning None when it is not plausibly valid
///
/// Accepts one `@`, a non-empty local part, a dotted domain and no whitespace.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();

    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return None;
    }
    if email.chars().any(char::is_whitespace) {
        return None;
    }

    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return None;
    }

    Some(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email_valid() {
        assert_eq!(
            normalize_email("  Buyer@Example.COM "),
            Some("buyer@example.com".to_string())
        );
        assert_eq!(
            normalize_email("first.last+homes@mail.example.co.uk"),
            Some("first.last+homes@mail.example.co.uk".to_string())
        );
    }

    #[test]
    fn test_normalize_email_invalid() {
        assert!(normalize_email("").is_none());
        assert!(normalize_email("no-at-sign").is_none());
        assert!(normalize_email("@example.com").is_none());
        assert!(normalize_email("a@b@example.com").is_none());
        assert!(normalize_email("user@localhost").is_none());
        assert!(normalize_email("user@example..com").is_none());
        assert!(normalize_email("us er@example.com").is_none());

        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(normalize_email(&too_long).is_none());
    }

    #[test]
    fn test_status_round_trip_and_provider_mapping() {
        for status in [
            SubscriptionStatus::Pending,
            SubscriptionStatus::Active,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Inactive,
        ] {
            assert_eq!(SubscriptionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SubscriptionStatus::parse("paused"), None);

        assert_eq!(
            SubscriptionStatus::from_provider("trialing"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("canceled"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            SubscriptionStatus::Inactive
        );
    }

    #[test]
    fn test_cancellable_subscription() {
        let mut user = User {
            id: 1,
            auth_id: Some("uid-1".to_string()),
            email: "buyer@example.com".to_string(),
            subscription_status: SubscriptionStatus::Active,
            stripe_customer_id: Some("cus_1".to_string()),
            stripe_subscription_id: Some("sub_1".to_string()),
            credits: 0,
            created_at: Utc::now(),
        };
        assert_eq!(user.cancellable_subscription(), Some("sub_1"));

        user.subscription_status = SubscriptionStatus::Canceled;
        assert_eq!(user.cancellable_subscription(), None);

        user.subscription_status = SubscriptionStatus::Active;
        user.stripe_subscription_id = None;
        assert_eq!(user.cancellable_subscription(), None);
    }
}
