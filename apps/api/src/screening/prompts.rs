// All LLM prompt templates for the screening pipeline.
// Templates are filled by `fill`; no control logic lives here.

use crate::llm_client::prompts::JSON_OBJECT_INSTRUCTION;
use crate::screening::models::CandidateEvaluation;

/// Per-candidate evaluation prompt.
/// Replace: {jd_text}, {cv_filename}, {cv_text}, {json_instruction}
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"Given the following Job Description (JD) and Candidate CV, evaluate the candidate and provide the following details in a JSON object:
- CandidateName: Full name of the candidate (deduce from CV).
- MatchPercent: An integer percentage between 0 and 100 (e.g., 75) indicating overall match with the JD.
- Ranking: An integer rank relative to other candidates, assuming this is the only candidate evaluated right now. Assign rank 1.
- ShortlistProbability: "High", "Moderate", or "Low".
- KeyStrengths: A concise string listing key strengths of the CV relative to the JD.
- KeyGaps: A concise string listing key areas of improvement/gaps in the CV relative to the JD.
- LocationSuitability: "Suitable", "Consider", or "Not Suitable" (based on the JD's location if specified, and the CV's implied location).
- Comments: A concise overall comment on the candidate's fit.

Job Description:
{jd_text}

Candidate CV ({cv_filename}):
{cv_text}

{json_instruction}"#;

/// Criteria-matrix prompt covering all candidates at once.
/// Replace: {jd_text}, {cv_blocks}, {criteria_list}, {candidate_names}, {json_instruction}
pub const CRITERIA_PROMPT_TEMPLATE: &str = r#"Given the Job Description and the following CVs, evaluate each candidate against the provided criteria.
For each candidate and each criterion, provide one symbol:
- ✅ for strong match/presence
- ⚠️ for partial match/some presence/needs consideration
- ❌ for no match/significant gap

Output a JSON object where keys are the criteria and values are objects containing candidate names as keys and their symbol ratings as values.

Job Description:
{jd_text}

Candidate CVs:
{cv_blocks}

Criteria to evaluate (use these exact names as keys): {criteria_list}
Candidate names to use as keys: {candidate_names}

Example JSON structure: {"Education": {"Candidate1 Name": "✅", "Candidate2 Name": "⚠️"}, "Relevant Experience": {"Candidate1 Name": "❌", "Candidate2 Name": "✅"}}

{json_instruction}"#;

/// Summary prompt fed with the already-ranked evaluations.
/// Replace: {candidate_block}, {json_instruction}
pub const SUMMARY_PROMPT_TEMPLATE: &str = r#"Based on the following candidate evaluations, provide:
1. General Observations: An overall summary of the candidate pool, highlighting top candidates and general trends.
2. Final Shortlist Recommendation: A list of names of candidates recommended for shortlisting, based primarily on 'High' or 'Moderate' shortlist probability and ranking.

Candidate Evaluations (sorted by rank):
{candidate_block}

Output in JSON format with keys 'GeneralObservations' (string) and 'ShortlistedCandidates' (list of strings).

{json_instruction}"#;

/// One résumé as seen by the prompt builder.
pub struct CvText<'a> {
    pub filename: &'a str,
    pub text: &'a str,
}

/// Single-pass placeholder substitution: text inserted for one placeholder is
/// never scanned again, so documents containing `{...}` stay verbatim.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let replaced = tail.find('}').and_then(|end| {
            let key = &tail[1..end];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, end + 1))
        });
        match replaced {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn build_evaluation_prompt(jd_text: &str, cv: &CvText<'_>) -> String {
    fill(
        EVALUATION_PROMPT_TEMPLATE,
        &[
            ("jd_text", jd_text),
            ("cv_filename", cv.filename),
            ("cv_text", cv.text),
            ("json_instruction", JSON_OBJECT_INSTRUCTION),
        ],
    )
}

pub fn build_criteria_prompt(
    jd_text: &str,
    cvs: &[CvText<'_>],
    criteria: &[String],
    candidate_names: &[String],
) -> String {
    let cv_blocks: String = cvs
        .iter()
        .map(|cv| format!("\n--- CV {} ---\n{}\n", cv.filename, cv.text))
        .collect();

    fill(
        CRITERIA_PROMPT_TEMPLATE,
        &[
            ("jd_text", jd_text),
            ("cv_blocks", &cv_blocks),
            ("criteria_list", &criteria.join(", ")),
            ("candidate_names", &candidate_names.join(", ")),
            ("json_instruction", JSON_OBJECT_INSTRUCTION),
        ],
    )
}

/// `evaluations` must already be in ranking order.
pub fn build_summary_prompt(evaluations: &[CandidateEvaluation]) -> String {
    let candidate_block = evaluations
        .iter()
        .map(|e| {
            format!(
                "- {} (Match: {}%, Rank: {}, Shortlist: {}): Strengths: {}. Gaps: {}. Comments: {}",
                e.candidate_name,
                e.match_percent,
                e.ranking,
                e.shortlist_probability.as_str(),
                e.key_strengths,
                e.key_gaps,
                e.comments
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    fill(
        SUMMARY_PROMPT_TEMPLATE,
        &[
            ("candidate_block", &candidate_block),
            ("json_instruction", JSON_OBJECT_INSTRUCTION),
        ],
    )
}
