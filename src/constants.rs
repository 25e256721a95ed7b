/// Default maximum upload size in bytes (25MB)
/// Inspection reports with photos are typically 2-15MB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 26_214_400;

/// Default maximum extracted text sent to the model, in characters
/// Roughly the largest report that fits the model's context window
pub const DEFAULT_MAX_ANALYSIS_CHARS: usize = 400_000;

/// Default timeout for calls to third-party APIs
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 120;

/// Default chat model; must support strict structured outputs
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-2024-08-06";

/// Maximum age of a webhook signature timestamp in seconds (5 minutes)
/// Prevents replay of captured deliveries
pub const MAX_WEBHOOK_TIMESTAMP_AGE_SECS: i64 = 300;

/// How long identity provider signing keys are cached
pub const SIGNING_KEY_CACHE_SECS: u64 = 3600;

/// Minimum age of the key cache before an unknown `kid` triggers a refetch
pub const SIGNING_KEY_MIN_REFRESH_SECS: u64 = 60;

/// Maximum length of an email address (RFC 5321 path limit)
pub const MAX_EMAIL_LEN: usize = 254;

pub const PDF_MIME_TYPE: &str = "application/pdf";

/// Multipart field carrying the uploaded report
pub const UPLOAD_FIELD_NAME: &str = "file";

// =============================================================================
// Error Messages
// =============================================================================

pub const ERR_INVALID_EMAIL: &str = "Invalid email address";

pub const ERR_NO_FILE: &str = "No file uploaded";

pub const ERR_MULTIPLE_FILES: &str = "Exactly one file must be uploaded";

pub const ERR_NO_TEXT_CONTENT: &str = "File has no extracted text to analyze";

pub const ERR_PRINCIPAL_WITHOUT_EMAIL: &str = "Authenticated account has no email address";

pub const ERR_MISSING_SESSION_ID: &str = "session_id is required";
