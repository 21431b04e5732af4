//! Report data model: per-candidate evaluations, the criteria matrix, the
//! summary, and the `Report` aggregate that owns them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

/// Likelihood bucket derived from the final match percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortlistProbability {
    High,
    Moderate,
    Low,
}

impl ShortlistProbability {
    /// ≥80 → High, ≥60 → Moderate, otherwise Low.
    pub fn from_match_percent(match_percent: u8) -> Self {
        match match_percent {
            80.. => ShortlistProbability::High,
            60..=79 => ShortlistProbability::Moderate,
            _ => ShortlistProbability::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShortlistProbability::High => "High",
            ShortlistProbability::Moderate => "Moderate",
            ShortlistProbability::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationSuitability {
    Suitable,
    Consider,
    #[serde(rename = "Not Suitable", alias = "NotSuitable")]
    NotSuitable,
}

impl LocationSuitability {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSuitability::Suitable => "Suitable",
            LocationSuitability::Consider => "Consider",
            LocationSuitability::NotSuitable => "Not Suitable",
        }
    }
}

/// Three-valued criterion rating. Serialized as the symbol shown in the report;
/// the word forms are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "✅", alias = "Strong")]
    Strong,
    #[serde(rename = "⚠️", alias = "⚠", alias = "Partial")]
    Partial,
    #[serde(rename = "❌", alias = "Gap")]
    Gap,
}

impl Rating {
    pub fn symbol(&self) -> &'static str {
        match self {
            Rating::Strong => "✅",
            Rating::Partial => "⚠️",
            Rating::Gap => "❌",
        }
    }
}

/// One evaluated résumé.
///
/// `ranking` and `shortlist_probability` are only meaningful after the batch
/// re-ranking pass in the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub candidate_name: String,
    pub match_percent: u8,
    pub ranking: u32,
    pub shortlist_probability: ShortlistProbability,
    pub key_strengths: String,
    pub key_gaps: String,
    /// Absent when the model gave no usable value or analysis failed.
    pub location_suitability: Option<LocationSuitability>,
    pub comments: String,
    pub original_filename: String,
}

/// Ratings for one criterion, keyed by candidate name, in the model's order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionRow {
    pub criterion: String,
    pub ratings: Vec<CandidateRating>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRating {
    pub candidate: String,
    pub rating: Rating,
}

impl CriterionRow {
    pub fn rating_for(&self, candidate: &str) -> Option<Rating> {
        self.ratings
            .iter()
            .find(|r| r.candidate == candidate)
            .map(|r| r.rating)
    }
}

/// criterion → (candidate → rating). Stored as an ordered list of rows so
/// the iteration order survives any JSON store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriteriaMatrix {
    pub rows: Vec<CriterionRow>,
}

impl CriteriaMatrix {
    /// Every (criterion, candidate) cell set to `Gap`.
    pub fn all_gaps(criteria: &[String], candidates: &[String]) -> Self {
        CriteriaMatrix {
            rows: criteria
                .iter()
                .map(|criterion| CriterionRow {
                    criterion: criterion.clone(),
                    ratings: candidates
                        .iter()
                        .map(|candidate| CandidateRating {
                            candidate: candidate.clone(),
                            rating: Rating::Gap,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Decodes the LLM's `{criterion: {candidate: symbol}}` object while keeping
/// the key order of the reply.
#[derive(Debug)]
pub struct LlmCriteriaMatrix(pub CriteriaMatrix);

impl<'de> Deserialize<'de> for LlmCriteriaMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MatrixVisitor;

        impl<'de> Visitor<'de> for MatrixVisitor {
            type Value = LlmCriteriaMatrix;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object keyed by criterion name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut rows = Vec::new();
                while let Some((criterion, ratings)) = map.next_entry::<String, LlmRatings>()? {
                    rows.push(CriterionRow {
                        criterion,
                        ratings: ratings.0,
                    });
                }
                Ok(LlmCriteriaMatrix(CriteriaMatrix { rows }))
            }
        }

        deserializer.deserialize_map(MatrixVisitor)
    }
}

struct LlmRatings(Vec<CandidateRating>);

impl<'de> Deserialize<'de> for LlmRatings {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RatingsVisitor;

        impl<'de> Visitor<'de> for RatingsVisitor {
            type Value = LlmRatings;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping candidate name to rating")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut ratings = Vec::new();
                while let Some((candidate, rating)) = map.next_entry::<String, Rating>()? {
                    ratings.push(CandidateRating { candidate, rating });
                }
                Ok(LlmRatings(ratings))
            }
        }

        deserializer.deserialize_map(RatingsVisitor)
    }
}

/// Narrative pool summary and the recommended shortlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(rename = "GeneralObservations", alias = "general_observations")]
    pub general_observations: String,
    #[serde(
        rename = "ShortlistedCandidates",
        alias = "shortlisted_candidates",
        default
    )]
    pub shortlisted_candidates: Vec<String>,
}

impl ReportSummary {
    pub fn unavailable() -> Self {
        ReportSummary {
            general_observations: "Could not generate general observations.".to_string(),
            shortlisted_candidates: Vec::new(),
        }
    }
}

/// Who generated a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub email: String,
    pub display_name: Option<String>,
}

impl Author {
    /// Display name when set, email otherwise.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.email)
    }
}

/// The aggregate produced by one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub jd_filename: String,
    pub cv_filenames: Vec<String>,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub evaluations: Vec<CandidateEvaluation>,
    pub criteria_matrix: CriteriaMatrix,
    pub summary: ReportSummary,
    /// File-store identifier; `None` when the upload failed or has not happened.
    pub storage_file_id: Option<String>,
}
