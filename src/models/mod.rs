pub mod analysis;
pub mod billing;
pub mod file;
pub mod report;
pub mod user;

pub use analysis::{Category, Finding, InspectionAnalysis};
pub use billing::{BillingTransition, CheckoutMode, CheckoutSession};
pub use file::{FileRecord, FileSummary, NewFile};
pub use report::ReportView;
pub use user::{SubscriptionStatus, User};
