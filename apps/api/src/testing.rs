//! In-memory fakes for every external collaborator, plus request helpers for
//! router-level tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::auth::identity::{normalize_email, IdentityStore, NewUser, UserRow};
use crate::auth::passwords::hash_password;
use crate::auth::sessions::{new_token, Session, SessionError, SessionStore};
use crate::config::Config;
use crate::llm_client::{ChatModel, ChatRequest, LlmError};
use crate::reports::store::{ReportStore, StoredReport};
use crate::routes::build_router;
use crate::screening::models::{
    Author, CandidateEvaluation, CriteriaMatrix, Report, ReportSummary, ShortlistProbability,
};
use crate::state::AppState;
use crate::storage::{object_key, FileStore, StorageError};

pub const TEST_PASSWORD: &str = "password1";

// ────────────────────────────────────────────────────────────────────────────
// Chat model
// ────────────────────────────────────────────────────────────────────────────

/// Replies with a fixed script, in order, and records every prompt it sees.
/// An exhausted script answers `EmptyContent`.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    available: bool,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, request: ChatRequest<'_>) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stores
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail: bool,
}

impl MemoryFileStore {
    /// Every operation fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.files.lock().unwrap().contains_key(file_id)
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Upload("bucket unreachable".to_string()));
        }
        let key = object_key("reports", Uuid::new_v4(), filename);
        self.files.lock().unwrap().insert(key.clone(), bytes);
        Ok(key)
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Delete("bucket unreachable".to_string()));
        }
        self.files.lock().unwrap().remove(file_id);
        Ok(())
    }

    async fn link(&self, file_id: &str) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Link("bucket unreachable".to_string()));
        }
        Ok(format!("memory://{file_id}"))
    }
}

#[derive(Default)]
pub struct MemoryReportStore {
    records: Mutex<Vec<StoredReport>>,
    fail_inserts: bool,
}

impl MemoryReportStore {
    pub fn failing() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn insert(&self, report: &Report) -> Result<Uuid, sqlx::Error> {
        if self.fail_inserts {
            return Err(sqlx::Error::Protocol("database unreachable".to_string()));
        }
        let id = Uuid::new_v4();
        self.records.lock().unwrap().push(StoredReport {
            id,
            report: report.clone(),
        });
        Ok(id)
    }

    async fn list(&self, author_email: Option<&str>) -> Result<Vec<StoredReport>, sqlx::Error> {
        let mut records: Vec<StoredReport> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| author_email.map_or(true, |e| r.report.author.email == e))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.report.created_at.cmp(&a.report.created_at));
        Ok(records)
    }

    async fn get(&self, id: Uuid) -> Result<Option<StoredReport>, sqlx::Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    users: Mutex<Vec<UserRow>>,
}

impl MemoryIdentityStore {
    fn update(&self, id: Uuid, apply: impl FnOnce(&mut UserRow)) -> bool {
        match self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            Some(user) => {
                apply(user);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRow>, sqlx::Error> {
        let email = normalize_email(email);
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRow>, sqlx::Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<UserRow>, sqlx::Error> {
        let mut users = self.users.lock().unwrap().clone();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn create(&self, user: NewUser) -> Result<UserRow, sqlx::Error> {
        let email = normalize_email(&user.email);
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(sqlx::Error::Protocol("duplicate email".to_string()));
        }
        let row = UserRow {
            id: Uuid::new_v4(),
            email,
            display_name: None,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
            disabled: false,
            has_set_profile: false,
            created_at: Utc::now(),
        };
        users.push(row.clone());
        Ok(row)
    }

    async fn complete_profile(
        &self,
        id: Uuid,
        display_name: &str,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        Ok(self.update(id, |u| {
            u.display_name = Some(display_name.to_string());
            u.password_hash = password_hash.to_string();
            u.has_set_profile = true;
        }))
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<bool, sqlx::Error> {
        Ok(self.update(id, |u| u.is_admin = is_admin))
    }

    async fn set_disabled(&self, id: Uuid, disabled: bool) -> Result<bool, sqlx::Error> {
        Ok(self.update(id, |u| u.disabled = disabled))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn contains(&self, token: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(token)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<String, SessionError> {
        let token = new_token();
        self.sessions
            .lock()
            .unwrap()
            .insert(token.clone(), session.clone());
        Ok(token)
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, SessionError> {
        Ok(self.sessions.lock().unwrap().get(token).cloned())
    }

    async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        self.sessions.lock().unwrap().remove(token);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Fixtures
// ────────────────────────────────────────────────────────────────────────────

pub fn sample_report() -> Report {
    let evaluation = CandidateEvaluation {
        candidate_name: "Amy".to_string(),
        match_percent: 85,
        ranking: 1,
        shortlist_probability: ShortlistProbability::High,
        key_strengths: "Python".to_string(),
        key_gaps: "Go".to_string(),
        location_suitability: None,
        comments: "Strong".to_string(),
        original_filename: "amy.pdf".to_string(),
    };
    Report {
        jd_filename: "backend.pdf".to_string(),
        cv_filenames: vec!["amy.pdf".to_string()],
        author: Author {
            email: "rita@example.com".to_string(),
            display_name: Some("Rita".to_string()),
        },
        created_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        evaluations: vec![evaluation],
        criteria_matrix: CriteriaMatrix::all_gaps(&["Education".to_string()], &["Amy".to_string()]),
        summary: ReportSummary {
            general_observations: "One applicant.".to_string(),
            shortlisted_candidates: vec!["Amy".to_string()],
        },
        storage_file_id: None,
    }
}

/// A minimal DOCX with one paragraph per entry.
pub fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
    use docx_rs::{Docx, Paragraph, Run};

    let mut doc = Docx::new();
    for p in paragraphs {
        doc = doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*p)));
    }
    let mut cursor = std::io::Cursor::new(Vec::new());
    doc.build().pack(&mut cursor).unwrap();
    cursor.into_inner()
}

/// A minimal uncompressed PDF, one page per entry. `None` is a page with no
/// content stream at all. Text is drawn with the standard Helvetica font.
pub fn pdf_bytes(pages: &[Option<&str>]) -> Vec<u8> {
    // 1: catalog, 2: page tree, 3: font, then (page, content) pairs from 4.
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];
    for (i, page) in pages.iter().enumerate() {
        let resources = "/Resources << /Font << /F1 3 0 R >> >>";
        match page {
            Some(text) => {
                objects.push(format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] {resources} /Contents {} 0 R >>",
                    5 + 2 * i
                ));
                let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
                objects.push(format!(
                    "<< /Length {} >>\nstream\n{stream}\nendstream",
                    stream.len()
                ));
            }
            None => {
                objects.push(format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] {resources} >>"
                ));
                // Unreferenced filler so object numbering stays regular.
                objects.push("<< >>".to_string());
            }
        }
    }

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref_at = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

/// One part of a multipart/form-data body.
pub enum FormPart<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        bytes: Vec<u8>,
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub const BOUNDARY: &str = "screening-test-boundary";

pub fn multipart_body(parts: Vec<FormPart<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            FormPart::File {
                name,
                filename,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
            }
            FormPart::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

// ────────────────────────────────────────────────────────────────────────────
// Harness
// ────────────────────────────────────────────────────────────────────────────

/// An `AppState` wired to fakes, with handles on each fake for assertions.
pub struct TestApp {
    pub state: AppState,
    pub llm: Arc<ScriptedModel>,
    pub files: Arc<MemoryFileStore>,
    pub reports: Arc<MemoryReportStore>,
    pub identity: Arc<MemoryIdentityStore>,
    pub sessions: Arc<MemorySessionStore>,
}

impl TestApp {
    pub fn new(llm: ScriptedModel) -> Self {
        Self::with_stores(llm, MemoryFileStore::default(), MemoryReportStore::default())
    }

    pub fn with_stores(
        llm: ScriptedModel,
        files: MemoryFileStore,
        reports: MemoryReportStore,
    ) -> Self {
        let llm = Arc::new(llm);
        let files = Arc::new(files);
        let reports = Arc::new(reports);
        let identity = Arc::new(MemoryIdentityStore::default());
        let sessions = Arc::new(MemorySessionStore::default());
        let state = AppState {
            llm: llm.clone(),
            files: files.clone(),
            reports: reports.clone(),
            identity: identity.clone(),
            sessions: sessions.clone(),
            config: Config::for_tests(),
        };
        Self {
            state,
            llm,
            files,
            reports,
            identity,
            sessions,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Creates an account with `TEST_PASSWORD`. `display_name` set means the
    /// profile is already complete.
    pub async fn user(&self, email: &str, is_admin: bool, display_name: Option<&str>) -> UserRow {
        let password_hash = hash_password(TEST_PASSWORD).await.unwrap();
        let user = self
            .identity
            .create(NewUser {
                email: email.to_string(),
                password_hash: password_hash.clone(),
                is_admin,
            })
            .await
            .unwrap();
        if let Some(name) = display_name {
            self.identity
                .complete_profile(user.id, name, &password_hash)
                .await
                .unwrap();
        }
        self.identity.find_by_id(user.id).await.unwrap().unwrap()
    }

    /// Opens a session directly in the store and returns its token.
    pub async fn session_for(&self, user: &UserRow) -> String {
        self.sessions
            .create(&Session {
                user_id: user.id,
                admin_mode: user.is_admin,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn delete_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn multipart_request(uri: &str, token: &str, parts: Vec<FormPart<'_>>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
