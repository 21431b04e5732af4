//! Evaluation Orchestrator — sequences the three LLM stages of a screening run.
//!
//! Flow: per-candidate evaluation (×N) → batch re-rank → criteria matrix →
//!       summary → `Report`.
//!
//! Every stage recovers locally from a malformed or failed reply with a fixed
//! fallback value. The only hard failure is an LLM client that cannot make
//! calls at all, which is checked before any work starts.

use chrono::Utc;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::llm_client::prompts::RECRUITER_SYSTEM;
use crate::llm_client::{call_structured, ChatModel, LlmError, StructuredReply};
use crate::screening::models::{
    Author, CandidateEvaluation, CriteriaMatrix, LlmCriteriaMatrix, LocationSuitability, Report,
    ReportSummary, ShortlistProbability,
};
use crate::screening::prompts::{
    build_criteria_prompt, build_evaluation_prompt, build_summary_prompt, CvText,
};

/// Ranking given to a sentinel before the batch re-rank.
pub const SENTINEL_RANKING: u32 = 99;
const ANALYSIS_FAILED: &str = "AI analysis failed.";
const ANALYSIS_FAILED_COMMENT: &str = "Failed to generate AI analysis.";
const NOT_AVAILABLE: &str = "N/A";

// ────────────────────────────────────────────────────────────────────────────
// Inputs / outputs
// ────────────────────────────────────────────────────────────────────────────

/// One extracted résumé.
#[derive(Debug, Clone)]
pub struct CandidateDocument {
    pub filename: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ScreeningInput {
    pub jd_filename: String,
    pub jd_text: String,
    pub candidates: Vec<CandidateDocument>,
    pub criteria: Vec<String>,
    pub author: Author,
}

/// The assembled report plus human-readable notes on every stage that fell back.
#[derive(Debug, Clone)]
pub struct ScreeningOutcome {
    pub report: Report,
    pub warnings: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Reply decoding
// ────────────────────────────────────────────────────────────────────────────

/// The per-candidate reply as the model sends it. Only `MatchPercent` is
/// mandatory; everything else degrades to a default during normalization.
#[derive(Debug, Deserialize)]
pub struct RawEvaluation {
    #[serde(rename = "CandidateName", default)]
    pub candidate_name: Option<String>,
    #[serde(rename = "MatchPercent", deserialize_with = "lenient_percent")]
    pub match_percent: i64,
    #[serde(rename = "KeyStrengths", default)]
    pub key_strengths: Option<String>,
    #[serde(rename = "KeyGaps", default)]
    pub key_gaps: Option<String>,
    #[serde(rename = "LocationSuitability", default)]
    pub location_suitability: Option<serde_json::Value>,
    #[serde(rename = "Comments", default)]
    pub comments: Option<String>,
}

/// Accepts `85`, `85.0`, `"85"` and `"85%"`.
fn lenient_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .ok_or_else(|| D::Error::custom("MatchPercent is not a finite number")),
        serde_json::Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .map(|f| f.round() as i64)
            .map_err(|_| D::Error::custom(format!("MatchPercent '{s}' is not numeric"))),
        other => Err(D::Error::custom(format!(
            "MatchPercent has unexpected type: {other}"
        ))),
    }
}

/// Candidate name used when the model gives none: the filename without its
/// `.pdf` / `.docx` extension.
pub fn name_from_filename(filename: &str) -> String {
    filename.replace(".pdf", "").replace(".docx", "")
}

fn text_or_na(value: Option<String>) -> String {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Turns a decoded reply into an evaluation. `match_percent` is clamped to
/// [0, 100]; ranking is a placeholder until `rerank`.
pub fn normalize_evaluation(raw: RawEvaluation, filename: &str) -> CandidateEvaluation {
    let clamped = raw.match_percent.clamp(0, 100);
    if clamped != raw.match_percent {
        warn!(
            candidate = %filename,
            "MatchPercent {} out of range, clamped to {}",
            raw.match_percent,
            clamped
        );
    }
    let match_percent = clamped as u8;

    let location_suitability = raw
        .location_suitability
        .and_then(|v| serde_json::from_value::<LocationSuitability>(v).ok());

    let candidate_name = raw
        .candidate_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| name_from_filename(filename));

    CandidateEvaluation {
        candidate_name,
        match_percent,
        ranking: 1,
        shortlist_probability: ShortlistProbability::from_match_percent(match_percent),
        key_strengths: text_or_na(raw.key_strengths),
        key_gaps: text_or_na(raw.key_gaps),
        location_suitability,
        comments: text_or_na(raw.comments),
        original_filename: filename.to_string(),
    }
}

/// Fixed evaluation substituted when analysis of one résumé fails.
pub fn sentinel_evaluation(filename: &str) -> CandidateEvaluation {
    CandidateEvaluation {
        candidate_name: name_from_filename(filename),
        match_percent: 0,
        ranking: SENTINEL_RANKING,
        shortlist_probability: ShortlistProbability::Low,
        key_strengths: ANALYSIS_FAILED.to_string(),
        key_gaps: ANALYSIS_FAILED.to_string(),
        location_suitability: None,
        comments: ANALYSIS_FAILED_COMMENT.to_string(),
        original_filename: filename.to_string(),
    }
}

/// Stable sort by `match_percent` descending, dense 1-based rankings, and
/// shortlist buckets recomputed from the final percentage.
pub fn rerank(evaluations: &mut [CandidateEvaluation]) {
    evaluations.sort_by(|a, b| b.match_percent.cmp(&a.match_percent));
    for (position, evaluation) in evaluations.iter_mut().enumerate() {
        evaluation.ranking = position as u32 + 1;
        evaluation.shortlist_probability =
            ShortlistProbability::from_match_percent(evaluation.match_percent);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs the full screening pipeline. Calls are strictly sequential.
pub async fn generate_report(
    llm: &dyn ChatModel,
    input: ScreeningInput,
) -> Result<ScreeningOutcome, AppError> {
    if !llm.is_available() {
        return Err(AppError::LlmUnavailable(
            "LLM client has no credentials".to_string(),
        ));
    }

    let ScreeningInput {
        jd_filename,
        jd_text,
        candidates,
        criteria,
        author,
    } = input;

    let mut warnings = Vec::new();

    // Step 1: individual evaluations
    info!("Step 1/3: evaluating {} candidates", candidates.len());
    let mut evaluations = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let evaluation = evaluate_candidate(llm, &jd_text, candidate, &mut warnings).await;
        evaluations.push(evaluation);
    }

    // Step 2: batch re-rank
    rerank(&mut evaluations);

    let candidate_names: Vec<String> = evaluations
        .iter()
        .map(|e| e.candidate_name.clone())
        .collect();

    // Step 3: criteria matrix
    info!("Step 2/3: comparing candidates on {} criteria", criteria.len());
    let cv_texts: Vec<CvText<'_>> = candidates
        .iter()
        .map(|c| CvText {
            filename: &c.filename,
            text: &c.text,
        })
        .collect();
    let prompt = build_criteria_prompt(&jd_text, &cv_texts, &criteria, &candidate_names);
    let criteria_matrix = match call_structured::<LlmCriteriaMatrix>(llm, &prompt, RECRUITER_SYSTEM)
        .await
    {
        Ok(StructuredReply::Parsed(LlmCriteriaMatrix(matrix))) => matrix,
        Ok(StructuredReply::Malformed { raw, reason }) => {
            let reason = malformed_reply("criteria", &raw, reason);
            fallback_matrix(&criteria, &candidate_names, &reason, &mut warnings)
        }
        Err(e) => fallback_matrix(&criteria, &candidate_names, &e.to_string(), &mut warnings),
    };

    // Step 4: summary
    info!("Step 3/3: generating general observations and shortlist");
    let prompt = build_summary_prompt(&evaluations);
    let summary = match call_structured::<ReportSummary>(llm, &prompt, RECRUITER_SYSTEM).await {
        Ok(StructuredReply::Parsed(summary)) => summary,
        Ok(StructuredReply::Malformed { raw, reason }) => {
            let reason = malformed_reply("summary", &raw, reason);
            fallback_summary(&reason, &mut warnings)
        }
        Err(e) => fallback_summary(&e.to_string(), &mut warnings),
    };

    // Step 5: assemble
    let cv_filenames = candidates.into_iter().map(|c| c.filename).collect();
    let report = Report {
        jd_filename,
        cv_filenames,
        author,
        created_at: Utc::now(),
        evaluations,
        criteria_matrix,
        summary,
        storage_file_id: None,
    };

    info!(
        "Screening complete: {} candidates, {} warnings",
        report.evaluations.len(),
        warnings.len()
    );

    Ok(ScreeningOutcome { report, warnings })
}

async fn evaluate_candidate(
    llm: &dyn ChatModel,
    jd_text: &str,
    candidate: &CandidateDocument,
    warnings: &mut Vec<String>,
) -> CandidateEvaluation {
    let prompt = build_evaluation_prompt(
        jd_text,
        &CvText {
            filename: &candidate.filename,
            text: &candidate.text,
        },
    );

    let failure: String = match call_structured::<RawEvaluation>(llm, &prompt, RECRUITER_SYSTEM)
        .await
    {
        Ok(StructuredReply::Parsed(raw)) => {
            return normalize_evaluation(raw, &candidate.filename)
        }
        Ok(StructuredReply::Malformed { raw, reason }) => {
            format!("malformed reply ({})", malformed_reply("evaluation", &raw, reason))
        }
        Err(e) => describe_llm_error(&e),
    };

    warn!(candidate = %candidate.filename, "Evaluation failed: {failure}");
    warnings.push(format!(
        "Could not get structured evaluation for {}: {failure}",
        candidate.filename
    ));
    sentinel_evaluation(&candidate.filename)
}

fn fallback_matrix(
    criteria: &[String],
    candidate_names: &[String],
    reason: &str,
    warnings: &mut Vec<String>,
) -> CriteriaMatrix {
    warn!("Criteria comparison failed: {reason}");
    warnings.push(format!(
        "Could not get structured criteria comparison: {reason}"
    ));
    CriteriaMatrix::all_gaps(criteria, candidate_names)
}

fn fallback_summary(reason: &str, warnings: &mut Vec<String>) -> ReportSummary {
    warn!("Summary generation failed: {reason}");
    warnings.push(format!(
        "Could not get general observations and shortlist: {reason}"
    ));
    ReportSummary::unavailable()
}

/// Logs the undecodable payload and hands back the decode error.
fn malformed_reply(stage: &str, raw: &str, reason: String) -> String {
    debug!(stage, raw = %raw, "Undecodable LLM reply");
    reason
}

fn describe_llm_error(error: &LlmError) -> String {
    match error {
        LlmError::EmptyContent => "empty reply".to_string(),
        other => other.to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
