//! In-memory stand-ins for the database and the managed services.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::{json, Value};
use tower::ServiceExt;

use homeinspect_server::config::{FirebaseConfig, OpenAiConfig, StripeConfig};
use homeinspect_server::models::{
    BillingTransition, CheckoutMode, CheckoutSession, FileRecord, NewFile, SubscriptionStatus,
    User,
};
use homeinspect_server::services::identity::AuthError;
use homeinspect_server::services::{
    BillingProvider, NewCheckout, ObjectStore, Principal, ProviderError, ReportAnalyzer,
    StoredObject, TokenVerifier,
};
use homeinspect_server::{build_router, AppError, AppState, Config, Store};

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const BOUNDARY: &str = "----homeinspect-test-boundary";

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
struct MemoryData {
    users: Vec<User>,
    files: Vec<FileRecord>,
    analyses: Vec<(i64, String, String)>,
    billing_keys: HashSet<String>,
    next_user_id: i64,
    next_file_id: i64,
}

/// `Store` over plain vectors, mirroring the Postgres semantics
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    pub fail_inserts: bool,
}

impl MemoryStore {
    pub fn user_by_email(&self, email: &str) -> Option<User> {
        let data = self.data.lock().unwrap();
        data.users.iter().find(|u| u.email == email).cloned()
    }

    pub fn update_user(&self, email: &str, update: impl FnOnce(&mut User)) {
        let mut data = self.data.lock().unwrap();
        let user = data.users.iter_mut().find(|u| u.email == email).unwrap();
        update(user);
    }

    pub fn analysis_count(&self, file_id: i64) -> usize {
        let data = self.data.lock().unwrap();
        data.analyses.iter().filter(|(id, _, _)| *id == file_id).count()
    }

    pub fn billing_key_count(&self) -> usize {
        self.data.lock().unwrap().billing_keys.len()
    }
}

fn new_user(data: &mut MemoryData, email: &str, auth_id: Option<&str>) -> User {
    data.next_user_id += 1;
    let user = User {
        id: data.next_user_id,
        auth_id: auth_id.map(str::to_string),
        email: email.to_string(),
        subscription_status: SubscriptionStatus::Pending,
        stripe_customer_id: None,
        stripe_subscription_id: None,
        credits: 0,
        created_at: Utc::now(),
    };
    data.users.push(user.clone());
    user
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> homeinspect_server::Result<()> {
        Ok(())
    }

    async fn upsert_user_by_email(&self, email: &str) -> homeinspect_server::Result<User> {
        let mut data = self.data.lock().unwrap();
        if let Some(user) = data.users.iter().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        Ok(new_user(&mut data, email, None))
    }

    async fn link_auth(&self, auth_id: &str, email: &str) -> homeinspect_server::Result<User> {
        let mut data = self.data.lock().unwrap();
        if let Some(user) = data
            .users
            .iter()
            .find(|u| u.auth_id.as_deref() == Some(auth_id))
        {
            return Ok(user.clone());
        }

        if let Some(user) = data.users.iter_mut().find(|u| u.email == email) {
            return match &user.auth_id {
                None => {
                    user.auth_id = Some(auth_id.to_string());
                    Ok(user.clone())
                }
                Some(_) => Err(AppError::Unauthorized),
            };
        }

        Ok(new_user(&mut data, email, Some(auth_id)))
    }

    async fn claim_billing_customer(
        &self,
        user_id: i64,
        customer_id: &str,
    ) -> homeinspect_server::Result<String> {
        let mut data = self.data.lock().unwrap();
        let user = data.users.iter_mut().find(|u| u.id == user_id).unwrap();
        Ok(user
            .stripe_customer_id
            .get_or_insert_with(|| customer_id.to_string())
            .clone())
    }

    async fn deduct_credit(&self, user_id: i64) -> homeinspect_server::Result<bool> {
        let mut data = self.data.lock().unwrap();
        let user = data.users.iter_mut().find(|u| u.id == user_id).unwrap();
        if user.credits > 0 {
            user.credits -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn refund_credit(&self, user_id: i64) -> homeinspect_server::Result<()> {
        let mut data = self.data.lock().unwrap();
        let user = data.users.iter_mut().find(|u| u.id == user_id).unwrap();
        user.credits += 1;
        Ok(())
    }

    async fn apply_billing_transition(
        &self,
        idempotency_key: &str,
        transition: &BillingTransition,
    ) -> homeinspect_server::Result<bool> {
        let mut data = self.data.lock().unwrap();
        if !data.billing_keys.insert(idempotency_key.to_string()) {
            return Ok(false);
        }

        match transition {
            BillingTransition::SubscriptionActivated {
                user_id,
                customer_id,
                subscription_id,
            } => {
                if let Some(user) = data.users.iter_mut().find(|u| u.id == *user_id) {
                    user.stripe_customer_id = Some(customer_id.clone());
                    user.stripe_subscription_id = Some(subscription_id.clone());
                    user.subscription_status = SubscriptionStatus::Active;
                }
            }
            BillingTransition::CreditsPurchased {
                user_id,
                customer_id,
                credits,
            } => {
                if let Some(user) = data.users.iter_mut().find(|u| u.id == *user_id) {
                    user.credits += credits;
                    if user.stripe_customer_id.is_none() {
                        user.stripe_customer_id = customer_id.clone();
                    }
                }
            }
            BillingTransition::SubscriptionStatusChanged {
                subscription_id,
                status,
            } => {
                for user in data
                    .users
                    .iter_mut()
                    .filter(|u| u.stripe_subscription_id.as_deref() == Some(subscription_id.as_str()))
                {
                    user.subscription_status = *status;
                }
            }
        }

        Ok(true)
    }

    async fn insert_file(&self, file: &NewFile) -> homeinspect_server::Result<FileRecord> {
        if self.fail_inserts {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut data = self.data.lock().unwrap();
        data.next_file_id += 1;
        let record = FileRecord {
            id: data.next_file_id,
            user_id: file.user_id,
            storage_path: file.storage_path.clone(),
            original_name: file.original_name.clone(),
            size_bytes: file.size_bytes,
            mime_type: file.mime_type.clone(),
            text_content: file.text_content.clone(),
            ai_analysis: None,
            created_at: Utc::now(),
        };
        data.files.push(record.clone());
        Ok(record)
    }

    async fn list_files(&self, owner_id: i64) -> homeinspect_server::Result<Vec<FileRecord>> {
        let data = self.data.lock().unwrap();
        let mut files: Vec<FileRecord> = data
            .files
            .iter()
            .filter(|f| f.user_id == owner_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(files)
    }

    async fn get_file(
        &self,
        owner_id: i64,
        file_id: i64,
    ) -> homeinspect_server::Result<Option<FileRecord>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .files
            .iter()
            .find(|f| f.id == file_id && f.user_id == owner_id)
            .cloned())
    }

    async fn delete_file(&self, owner_id: i64, file_id: i64) -> homeinspect_server::Result<bool> {
        let mut data = self.data.lock().unwrap();
        let before = data.files.len();
        data.files
            .retain(|f| !(f.id == file_id && f.user_id == owner_id));
        let deleted = data.files.len() < before;
        if deleted {
            data.analyses.retain(|(id, _, _)| *id != file_id);
        }
        Ok(deleted)
    }

    async fn save_analysis(
        &self,
        owner_id: i64,
        file_id: i64,
        analysis_json: &str,
        model: &str,
    ) -> homeinspect_server::Result<bool> {
        let mut data = self.data.lock().unwrap();
        let Some(file) = data
            .files
            .iter_mut()
            .find(|f| f.id == file_id && f.user_id == owner_id)
        else {
            return Ok(false);
        };
        file.ai_analysis = Some(analysis_json.to_string());
        data.analyses
            .push((file_id, analysis_json.to_string(), model.to_string()));
        Ok(true)
    }
}

// =============================================================================
// Services
// =============================================================================

/// Accepts `token-<uid>` and derives the email from the uid
pub struct FakeVerifier;

#[async_trait]
impl TokenVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let uid = token
            .strip_prefix("token-")
            .ok_or_else(|| AuthError::InvalidToken("unknown test token".to_string()))?;

        let email = if uid.starts_with("noemail") {
            None
        } else {
            Some(format!("{}@example.com", uid))
        };

        Ok(Principal {
            uid: uid.to_string(),
            email,
        })
    }
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_delete: bool,
    pub delete_calls: AtomicUsize,
}

impl FakeStorage {
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for FakeStorage {
    async fn put(
        &self,
        path: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> Result<StoredObject, ProviderError> {
        self.objects.lock().unwrap().insert(path.to_string(), data);
        Ok(StoredObject {
            path: path.to_string(),
            url: format!("https://storage.test/{}", path),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ProviderError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(ProviderError::Api {
                service: "storage",
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }
}

pub struct FakeAnalyzer {
    pub response: Result<String, String>,
    pub calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn returning(json: String) -> Self {
        Self {
            response: Ok(json),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err("model unavailable".to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportAnalyzer for FakeAnalyzer {
    async fn analyze(&self, _report_text: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response
            .clone()
            .map_err(ProviderError::InvalidResponse)
    }

    fn model(&self) -> &str {
        "test-model"
    }
}

#[derive(Default)]
pub struct FakeBilling {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    checkouts: Mutex<Vec<NewCheckout>>,
    pub customer_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
}

impl FakeBilling {
    pub fn insert_session(&self, session: CheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn last_checkout(&self) -> Option<NewCheckout> {
        self.checkouts.lock().unwrap().last().cloned()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingProvider for FakeBilling {
    async fn create_customer(
        &self,
        _email: &str,
        idempotency_key: &str,
    ) -> Result<String, ProviderError> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cus_{}", idempotency_key))
    }

    async fn create_checkout_session(
        &self,
        checkout: &NewCheckout,
    ) -> Result<CheckoutSession, ProviderError> {
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(checkout.clone());
        let session = CheckoutSession {
            id: format!("cs_test_{}", checkouts.len()),
            mode: checkout.mode,
            status: Some("open".to_string()),
            payment_status: Some("unpaid".to_string()),
            client_secret: Some(format!("secret_{}", checkouts.len())),
            client_reference_id: Some(checkout.client_reference_id.clone()),
            customer_id: Some(checkout.customer_id.clone()),
            subscription_id: None,
            customer_email: None,
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                service: "billing",
                status: 404,
                message: "No such checkout.session".to_string(),
            })
    }

    async fn cancel_subscription(&self, _subscription_id: &str) -> Result<(), ProviderError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// App
// =============================================================================

pub fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        database_url: "postgres://unused".to_string(),
        allowed_origins: vec!["http://localhost:5173".to_string()],
        environment: "test".to_string(),
        frontend_url: "http://localhost:5173".to_string(),
        static_dir: None,
        max_upload_bytes: 1024 * 1024,
        max_analysis_chars: 10_000,
        http_timeout_secs: 5,
        credits_per_purchase: 3,
        analysis_requires_credit: false,
        firebase: FirebaseConfig {
            project_id: "test-project".to_string(),
            client_email: "svc@test-project.iam.gserviceaccount.com".to_string(),
            private_key: String::new(),
            storage_bucket: "test-project.appspot.com".to_string(),
        },
        stripe: StripeConfig {
            secret_key: "sk_test".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            price_id: "price_sub".to_string(),
            one_time_price_id: "price_once".to_string(),
        },
        openai: OpenAiConfig {
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub billing: Arc<FakeBilling>,
}

pub struct TestAppBuilder {
    config: Config,
    store: MemoryStore,
    storage: FakeStorage,
    analyzer: FakeAnalyzer,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
            store: MemoryStore::default(),
            storage: FakeStorage::default(),
            analyzer: FakeAnalyzer::returning(sample_analysis_json()),
        }
    }

    pub fn config(mut self, update: impl FnOnce(&mut Config)) -> Self {
        update(&mut self.config);
        self
    }

    pub fn analyzer(mut self, analyzer: FakeAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn failing_storage_delete(mut self) -> Self {
        self.storage.fail_delete = true;
        self
    }

    pub fn failing_inserts(mut self) -> Self {
        self.store.fail_inserts = true;
        self
    }

    pub fn build(self) -> TestApp {
        let store = Arc::new(self.store);
        let storage = Arc::new(self.storage);
        let analyzer = Arc::new(self.analyzer);
        let billing = Arc::new(FakeBilling::default());

        let state = AppState {
            store: store.clone(),
            identity: Arc::new(FakeVerifier),
            storage: storage.clone(),
            analyzer: analyzer.clone(),
            billing: billing.clone(),
            config: self.config,
        };

        TestApp {
            router: build_router(state),
            store,
            storage,
            analyzer,
            billing,
        }
    }
}

pub fn test_app() -> TestApp {
    TestAppBuilder::new().build()
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Upload `data` as `name` for `uid`, returning the created file id
    pub async fn upload(&self, uid: &str, name: &str, mime: &str, data: &[u8]) -> i64 {
        let (status, body) = self.send(upload_request(uid, &[(name, mime, data)])).await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {}", body);
        body["file"]["id"].as_i64().unwrap()
    }
}

// =============================================================================
// Requests
// =============================================================================

pub fn bearer(uid: &str) -> String {
    format!("Bearer token-{}", uid)
}

pub fn json_request(method: &str, uri: &str, uid: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(uid) = uid {
        builder = builder.header("authorization", bearer(uid));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn authed(method: &str, uri: &str, uid: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", bearer(uid))
        .body(Body::empty())
        .unwrap()
}

/// Multipart body with one part per `(file name, content type, bytes)`
pub fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, mime, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(uid: &str, parts: &[(&str, &str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/files")
        .header("authorization", bearer(uid))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Webhook request signed the way the billing provider signs deliveries
pub fn signed_webhook(event: &Value, secret: &str, timestamp: i64) -> Request<Body> {
    let payload = event.to_string();
    let signed = format!("{}.{}", timestamp, payload);
    let signature = homeinspect_server::security::sign_hmac(signed.as_bytes(), secret).unwrap();

    Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", format!("t={},v1={}", timestamp, signature))
        .body(Body::from(payload))
        .unwrap()
}

pub fn completed_session(id: &str, mode: CheckoutMode, user_id: i64) -> CheckoutSession {
    CheckoutSession {
        id: id.to_string(),
        mode,
        status: Some("complete".to_string()),
        payment_status: Some("paid".to_string()),
        client_secret: None,
        client_reference_id: Some(user_id.to_string()),
        customer_id: Some(format!("cus_{}", user_id)),
        subscription_id: match mode {
            CheckoutMode::Subscription => Some(format!("sub_{}", user_id)),
            CheckoutMode::Payment => None,
        },
        customer_email: Some("buyer@example.com".to_string()),
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Minimal PDF with one page per entry, each showing the given strings
pub fn build_pdf(pages: &[&[&str]]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for strings in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(11)]),
            Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
        ];
        for text in strings.iter() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

pub fn sample_analysis_json() -> String {
    json!({
        "property": {
            "address": "48 Harbor View Rd",
            "inspection_date": "2026-10-01",
            "property_type": "Townhouse",
            "year_built": 1994,
            "square_footage": 1650
        },
        "inspector": {
            "name": "Sam Rivera",
            "company": "Keystone Inspections",
            "license_number": "KI-5521"
        },
        "summary": {
            "overall_condition": "Good",
            "major_concerns": "Water heater past service life",
            "maintenance_outlook": "Routine maintenance expected"
        },
        "findings": [
            {
                "item": "Water heater",
                "issue": "Unit is 16 years old with corrosion at fittings",
                "recommendation": "Replace water heater",
                "category": "plumbing",
                "urgency": 4,
                "estimate": 1800
            },
            {
                "item": "Gutters",
                "issue": "Debris buildup",
                "recommendation": "Clean gutters",
                "category": "exterior",
                "urgency": 2,
                "estimate": 150
            }
        ]
    })
    .to_string()
}
