//! Report Renderer — turns a `Report` into a DOCX document.
//!
//! Rendering is two-phase:
//! 1. `render_layout` maps the report onto a flat list of `Block`s. This is where
//!    every content decision lives (section order, headers, "N/A" fallbacks).
//! 2. `render_docx` writes those blocks through the `docx-rs` builder.
//!
//! Nothing reads the clock here: the date printed in the document is the
//! report's own `created_at`, so rendering the same report twice yields the same
//! layout.

use docx_rs::{
    AlignmentType, BreakType, Docx, Paragraph, Run, Style, StyleType, Table, TableCell, TableRow,
    VAlignType,
};
use thiserror::Error;

use crate::screening::models::{CandidateEvaluation, Report};

pub use crate::extract::DOCX_MIME;

pub const REPORT_TITLE: &str = "JD-CV Comparative Analysis Report";
pub const EVALUATION_HEADERS: [&str; 8] = [
    "Candidate Name",
    "Match %",
    "Ranking",
    "Shortlist Probability",
    "Key Strengths",
    "Key Gaps",
    "Location Suitability",
    "Comments",
];
pub const NO_SHORTLIST: &str = "No candidates recommended for shortlist based on current analysis.";
const NOT_AVAILABLE: &str = "N/A";

const HEADING_1: &str = "Heading1";
const HEADING_2: &str = "Heading2";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to package document: {0}")]
    Pack(String),

    #[error("render task aborted: {0}")]
    Aborted(String),
}

// ────────────────────────────────────────────────────────────────────────────
// Layout model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    PageBreak,
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
        /// First column of each body row is bold (row labels).
        bold_first_column: bool,
    },
}

fn or_na(value: &str) -> String {
    if value.trim().is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value.to_string()
    }
}

fn evaluation_row(e: &CandidateEvaluation) -> Vec<String> {
    vec![
        or_na(&e.candidate_name),
        format!("{}%", e.match_percent),
        e.ranking.to_string(),
        e.shortlist_probability.as_str().to_string(),
        or_na(&e.key_strengths),
        or_na(&e.key_gaps),
        e.location_suitability
            .map(|l| l.as_str().to_string())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        or_na(&e.comments),
    ]
}

/// Maps a report onto the fixed section order of the document.
pub fn render_layout(report: &Report) -> Vec<Block> {
    let mut blocks = Vec::new();

    // Title and metadata
    blocks.push(Block::Heading {
        level: 1,
        text: REPORT_TITLE.to_string(),
    });
    blocks.push(Block::Paragraph(format!(
        "Generated by {}",
        or_na(report.author.label())
    )));
    blocks.push(Block::Paragraph(format!(
        "Date: {}",
        report.created_at.format("%Y-%m-%d %H:%M:%S")
    )));
    blocks.push(Block::Paragraph(format!(
        "Job Description: {}",
        or_na(&report.jd_filename)
    )));
    let candidates = if report.cv_filenames.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        report.cv_filenames.join(", ")
    };
    blocks.push(Block::Paragraph(format!("Candidates: {candidates}")));
    blocks.push(Block::PageBreak);

    // Candidate evaluation table, in stored ranking order
    blocks.push(Block::Heading {
        level: 2,
        text: "🧾 Candidate Evaluation Table".to_string(),
    });
    blocks.push(Block::Paragraph(
        "Detailed assessment of each candidate against the Job Description:".to_string(),
    ));
    if report.evaluations.is_empty() {
        blocks.push(Block::Paragraph(
            "No candidate evaluation data available.".to_string(),
        ));
    } else {
        blocks.push(Block::Table {
            header: EVALUATION_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: report.evaluations.iter().map(evaluation_row).collect(),
            bold_first_column: false,
        });
    }
    blocks.push(Block::PageBreak);

    // Criteria comparison
    blocks.push(Block::Heading {
        level: 2,
        text: "✅ Additional Observations (Criteria Comparison)".to_string(),
    });
    if report.criteria_matrix.is_empty() || report.evaluations.is_empty() {
        blocks.push(Block::Paragraph(
            "No criteria comparison data available.".to_string(),
        ));
    } else {
        let names: Vec<&str> = report
            .evaluations
            .iter()
            .map(|e| e.candidate_name.as_str())
            .collect();

        let mut header = vec!["Criteria".to_string()];
        header.extend(names.iter().map(|n| n.to_string()));

        let rows = report
            .criteria_matrix
            .rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.criterion.clone()];
                cells.extend(names.iter().map(|name| {
                    row.rating_for(name)
                        .map(|r| r.symbol().to_string())
                        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
                }));
                cells
            })
            .collect();

        blocks.push(Block::Table {
            header,
            rows,
            bold_first_column: true,
        });
    }
    blocks.push(Block::PageBreak);

    // Summary and shortlist
    blocks.push(Block::Heading {
        level: 2,
        text: "General Observations".to_string(),
    });
    blocks.push(Block::Paragraph(or_na(&report.summary.general_observations)));
    blocks.push(Block::Heading {
        level: 2,
        text: "📌 Final Shortlist Recommendation".to_string(),
    });
    if report.summary.shortlisted_candidates.is_empty() {
        blocks.push(Block::Paragraph(NO_SHORTLIST.to_string()));
    } else {
        blocks.push(Block::Paragraph(format!(
            "Shortlisted candidates: {}",
            report.summary.shortlisted_candidates.join(", ")
        )));
    }

    blocks
}

// ────────────────────────────────────────────────────────────────────────────
// DOCX output
// ────────────────────────────────────────────────────────────────────────────

fn text_cell(text: &str, bold: bool, centered: bool) -> TableCell {
    let mut run = Run::new().add_text(text);
    if bold {
        run = run.bold();
    }
    let mut paragraph = Paragraph::new().add_run(run);
    if centered {
        paragraph = paragraph.align(AlignmentType::Center);
    }
    TableCell::new()
        .add_paragraph(paragraph)
        .vertical_align(VAlignType::Center)
}

fn build_table(header: &[String], rows: &[Vec<String>], bold_first_column: bool) -> Table {
    let mut table_rows = Vec::with_capacity(rows.len() + 1);
    table_rows.push(TableRow::new(
        header.iter().map(|h| text_cell(h, true, true)).collect(),
    ));
    for row in rows {
        table_rows.push(TableRow::new(
            row.iter()
                .enumerate()
                .map(|(i, cell)| {
                    let label = bold_first_column && i == 0;
                    // Rating symbols are centered; free text stays left-aligned.
                    text_cell(cell, label, bold_first_column && i > 0)
                })
                .collect(),
        ));
    }
    Table::new(table_rows)
}

fn styled_docx() -> Docx {
    Docx::new()
        .add_style(
            Style::new(HEADING_1, StyleType::Paragraph)
                .name("Heading 1")
                .size(32)
                .bold(),
        )
        .add_style(
            Style::new(HEADING_2, StyleType::Paragraph)
                .name("Heading 2")
                .size(26)
                .bold(),
        )
}

/// Renders the report to DOCX bytes.
pub fn render_docx(report: &Report) -> Result<Vec<u8>, RenderError> {
    let mut docx = styled_docx();

    for block in render_layout(report) {
        docx = match block {
            Block::Heading { level, text } => {
                let style = if level <= 1 { HEADING_1 } else { HEADING_2 };
                docx.add_paragraph(Paragraph::new().style(style).add_run(Run::new().add_text(text)))
            }
            Block::Paragraph(text) => {
                docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
            }
            Block::PageBreak => docx
                .add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page))),
            Block::Table {
                header,
                rows,
                bold_first_column,
            } => docx.add_table(build_table(&header, &rows, bold_first_column)),
        };
    }

    let mut cursor = std::io::Cursor::new(Vec::new());
    docx.build()
        .pack(&mut cursor)
        .map_err(|e| RenderError::Pack(e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Runs `render_docx` on the blocking pool.
pub async fn render_docx_blocking(report: Report) -> Result<Vec<u8>, RenderError> {
    tokio::task::spawn_blocking(move || render_docx(&report))
        .await
        .map_err(|e| RenderError::Aborted(e.to_string()))?
}

/// `{author}_JD_CV_Analysis_Report_{YYYYMMDD_HHMMSS}.docx`, stamped with the
/// report's creation time. Path separators in the author label become `_`.
pub fn report_filename(report: &Report) -> String {
    let author: String = report
        .author
        .label()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!(
        "{}_JD_CV_Analysis_Report_{}.docx",
        author,
        report.created_at.format("%Y%m%d_%H%M%S")
    )
}
