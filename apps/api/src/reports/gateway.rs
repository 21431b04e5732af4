//! Persistence Gateway — the two best-effort side effects of a generated
//! report, and admin deletion.
//!
//! Upload and metadata insert are independent: neither failure invalidates
//! the rendered document, and neither rolls the other back. Failures come back
//! as user-facing warnings.

use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::reports::store::ReportStore;
use crate::screening::models::Report;
use crate::storage::FileStore;

#[derive(Debug, Clone, Default)]
pub struct PersistOutcome {
    /// Metadata record id; `None` when the insert failed.
    pub record_id: Option<Uuid>,
    pub warnings: Vec<String>,
}

/// Uploads the rendered document, stamps the resulting storage id (or `None`)
/// onto `report`, then inserts the metadata record.
pub async fn persist_report(
    files: &dyn FileStore,
    reports: &dyn ReportStore,
    report: &mut Report,
    document: &[u8],
    filename: &str,
    content_type: &str,
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();

    report.storage_file_id = match files
        .upload(document.to_vec(), filename, content_type)
        .await
    {
        Ok(file_id) => Some(file_id),
        Err(e) => {
            warn!(filename = %filename, "Report upload failed: {e}");
            outcome.warnings.push(format!(
                "Error uploading report to file storage: {e}. You can still download the report directly."
            ));
            None
        }
    };

    match reports.insert(report).await {
        Ok(id) => {
            info!(report_id = %id, "Report metadata saved");
            outcome.record_id = Some(id);
        }
        Err(e) => {
            warn!(filename = %filename, "Report metadata insert failed: {e}");
            outcome
                .warnings
                .push(format!("Error saving report metadata to database: {e}"));
        }
    }

    outcome
}

/// Deletes the metadata record, then the stored file. Returns warnings for a
/// storage delete that failed after the record was already gone.
pub async fn delete_report(
    files: &dyn FileStore,
    reports: &dyn ReportStore,
    id: Uuid,
) -> Result<Vec<String>, AppError> {
    let stored = reports
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Report {id} not found")))?;

    if !reports.delete(id).await? {
        return Err(AppError::NotFound(format!("Report {id} not found")));
    }
    info!(report_id = %id, "Report metadata deleted");

    let mut warnings = Vec::new();
    if let Some(file_id) = stored.report.storage_file_id.as_deref() {
        if let Err(e) = files.delete(file_id).await {
            warn!(report_id = %id, "Stored report file could not be deleted: {e}");
            warnings.push(format!(
                "Report record deleted, but the stored file could not be removed: {e}"
            ));
        }
    }

    Ok(warnings)
}
