pub mod analysis;
pub mod auth;
pub mod billing;
pub mod files;
pub mod health;
pub mod users;
pub mod webhook;

pub use analysis::{analyze_file, get_analysis, get_report};
pub use auth::require_auth;
pub use billing::{
    cancel_subscription, create_checkout_session, create_one_time_checkout, session_status,
};
pub use files::{delete_file, get_file, list_files, upload_file};
pub use health::health_check;
pub use users::{link_auth, save_email, subscription_status};
pub use webhook::stripe_webhook;
