use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::context::{AdminContext, SessionContext};
use crate::errors::AppError;
use crate::extract::{extract_text_blocking, DocumentKind};
use crate::report::{render_docx_blocking, report_filename, DOCX_MIME};
use crate::reports::gateway::{delete_report, persist_report};
use crate::screening::{generate_report, CandidateDocument, Report, ScreeningInput};
use crate::state::AppState;
use crate::storage::attachment_disposition;

/// Criteria offered for comparison, all selected by default.
pub const DEFAULT_CRITERIA: [&str; 6] = [
    "Education",
    "Relevant Experience",
    "Certifications",
    "Location Suitability",
    "Technical Skills",
    "Soft Skills",
];

/// GET /api/v1/criteria
pub async fn handle_list_criteria(_ctx: SessionContext) -> Json<Vec<&'static str>> {
    Json(DEFAULT_CRITERIA.to_vec())
}

// ────────────────────────────────────────────────────────────────────────────
// Generation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

impl UploadedFile {
    /// Declared MIME type first; the extension only when nothing useful was declared.
    fn kind(&self) -> Option<DocumentKind> {
        match self.content_type.as_deref() {
            Some(mime) if mime != "application/octet-stream" => DocumentKind::from_mime(mime),
            _ => DocumentKind::from_filename(&self.filename),
        }
    }
}

#[derive(Debug, Default)]
struct GenerateForm {
    jd: Option<UploadedFile>,
    cvs: Vec<UploadedFile>,
    criteria: Vec<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<GenerateForm, AppError> {
    let mut form = GenerateForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "jd" | "cvs" => {
                let filename = field.file_name().unwrap_or("unnamed").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?;
                let file = UploadedFile {
                    filename,
                    content_type,
                    bytes,
                };
                if name == "jd" {
                    form.jd = Some(file);
                } else {
                    form.cvs.push(file);
                }
            }
            "criteria" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?;
                let criterion = text.trim();
                if !criterion.is_empty() && !form.criteria.iter().any(|c| c == criterion) {
                    form.criteria.push(criterion.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub record_id: Option<Uuid>,
    pub filename: String,
    pub content_type: &'static str,
    pub storage_file_id: Option<String>,
    pub warnings: Vec<String>,
    pub report: Report,
    pub document_base64: String,
}

/// POST /api/v1/reports
///
/// multipart: `jd` (one file), `cvs` (one or more files), `criteria` (one text
/// field per selected criterion).
pub async fn handle_generate_report(
    State(state): State<AppState>,
    ctx: SessionContext,
    multipart: Multipart,
) -> Result<Json<GenerateResponse>, AppError> {
    if !ctx.user.has_set_profile {
        return Err(AppError::Forbidden(
            "Please complete your profile before generating reports".to_string(),
        ));
    }
    if !state.llm.is_available() {
        return Err(AppError::LlmUnavailable(
            "LLM client has no credentials".to_string(),
        ));
    }

    let form = read_form(multipart).await?;

    let jd = match form.jd {
        Some(jd) if !form.cvs.is_empty() => jd,
        _ => {
            return Err(AppError::Validation(
                "Please upload both a Job Description and at least one CV to generate a report."
                    .to_string(),
            ))
        }
    };
    if form.criteria.is_empty() {
        return Err(AppError::Validation(
            "Please select at least one criterion for comparison.".to_string(),
        ));
    }
    let jd_kind = jd
        .kind()
        .ok_or_else(|| AppError::Validation("Unsupported JD file type.".to_string()))?;

    let mut warnings = Vec::new();

    let jd_text = extract_text_blocking(jd.bytes, jd_kind)
        .await
        .map_err(|e| AppError::UnprocessableEntity(format!("{}: {e}", jd.filename)))?;

    let mut candidates = Vec::with_capacity(form.cvs.len());
    for cv in form.cvs {
        let Some(kind) = cv.kind() else {
            warnings.push(format!("Skipping unsupported CV file type: {}", cv.filename));
            continue;
        };
        match extract_text_blocking(cv.bytes, kind).await {
            Ok(text) => candidates.push(CandidateDocument {
                filename: cv.filename,
                text,
            }),
            Err(e) => {
                warn!(candidate = %cv.filename, "Text extraction failed: {e}");
                warnings.push(format!("Skipping unreadable CV {}: {e}", cv.filename));
            }
        }
    }
    if candidates.is_empty() {
        return Err(AppError::Validation(
            "No supported CV files found to analyze.".to_string(),
        ));
    }

    info!(
        "Generating report for {} on {} ({} candidates)",
        ctx.user.email,
        jd.filename,
        candidates.len()
    );

    let outcome = generate_report(
        state.llm.as_ref(),
        ScreeningInput {
            jd_filename: jd.filename,
            jd_text,
            candidates,
            criteria: form.criteria,
            author: ctx.author(),
        },
    )
    .await?;
    warnings.extend(outcome.warnings);
    let mut report = outcome.report;

    let document = render_docx_blocking(report.clone())
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    let filename = report_filename(&report);

    let persisted = persist_report(
        state.files.as_ref(),
        state.reports.as_ref(),
        &mut report,
        &document,
        &filename,
        DOCX_MIME,
    )
    .await;
    warnings.extend(persisted.warnings);

    Ok(Json(GenerateResponse {
        record_id: persisted.record_id,
        filename,
        content_type: DOCX_MIME,
        storage_file_id: report.storage_file_id.clone(),
        warnings,
        report,
        document_base64: STANDARD.encode(&document),
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Listing, download, deletion
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub id: Uuid,
    pub jd_filename: String,
    pub cv_filenames: Vec<String>,
    pub generated_by_email: String,
    pub generated_by_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub storage_file_id: Option<String>,
    pub storage_link: Option<String>,
}

/// GET /api/v1/reports
///
/// Admins see every report, everyone else only their own. Newest first.
pub async fn handle_list_reports(
    State(state): State<AppState>,
    ctx: SessionContext,
) -> Result<Json<Vec<ReportListItem>>, AppError> {
    let filter = (!ctx.is_admin()).then_some(ctx.user.email.as_str());
    let stored = state.reports.list(filter).await?;

    let mut items = Vec::with_capacity(stored.len());
    for entry in stored {
        let report = entry.report;
        let storage_link = match report.storage_file_id.as_deref() {
            Some(file_id) => match state.files.link(file_id).await {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!(report_id = %entry.id, "Could not create storage link: {e}");
                    None
                }
            },
            None => None,
        };
        items.push(ReportListItem {
            id: entry.id,
            jd_filename: report.jd_filename,
            cv_filenames: report.cv_filenames,
            generated_by_email: report.author.email,
            generated_by_name: report.author.display_name,
            timestamp: report.created_at,
            storage_file_id: report.storage_file_id,
            storage_link,
        });
    }

    Ok(Json(items))
}

/// GET /api/v1/reports/:id/document
pub async fn handle_download_report(
    State(state): State<AppState>,
    ctx: SessionContext,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let stored = state
        .reports
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Report {id} not found")))?;

    if !ctx.is_admin() && stored.report.author.email != ctx.user.email {
        return Err(AppError::Forbidden(
            "You can only download your own reports".to_string(),
        ));
    }

    let filename = report_filename(&stored.report);
    let document = render_docx_blocking(stored.report)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    let disposition = HeaderValue::from_str(&attachment_disposition(&filename))
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_MIME)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct DeleteReportResponse {
    pub deleted: bool,
    pub warnings: Vec<String>,
}

/// DELETE /api/v1/reports/:id
pub async fn handle_delete_report(
    State(state): State<AppState>,
    AdminContext(ctx): AdminContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteReportResponse>, AppError> {
    let warnings = delete_report(state.files.as_ref(), state.reports.as_ref(), id).await?;
    info!(report_id = %id, "Report deleted by {}", ctx.user.email);
    Ok(Json(DeleteReportResponse {
        deleted: true,
        warnings,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octet_stream_falls_back_to_extension() {
        let file = UploadedFile {
            filename: "cv.pdf".to_string(),
            content_type: Some("application/octet-stream".to_string()),
            bytes: Bytes::new(),
        };
        assert_eq!(file.kind(), Some(DocumentKind::Pdf));

        let declared = UploadedFile {
            filename: "cv.pdf".to_string(),
            content_type: Some("text/plain".to_string()),
            bytes: Bytes::new(),
        };
        assert_eq!(declared.kind(), None);
    }
}
