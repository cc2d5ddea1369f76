//! Shared value types for the Scriptorium pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. dimension scores are in `0..=10`,
//! token counts are non-negative integers) and participate in domain
//! computations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AttemptIndex, ChapterNumber};

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

/// Estimated number of model tokens a piece of text occupies.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this count is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for TokenCount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl std::iter::Sum for TokenCount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, t| acc + t)
    }
}

// ---------------------------------------------------------------------------
// Score types
// ---------------------------------------------------------------------------

/// Highest value a single critique dimension may carry.
pub const MAX_DIMENSION_SCORE: u8 = 10;

/// Reasons a critique could not be turned into a [`QualityScore`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ScoreError {
    /// The critique carried no scored dimensions, so no overall score exists.
    #[error("critique contained no scored dimensions")]
    NoDimensions,

    /// A dimension value fell outside `0..=10`.
    #[error("dimension '{dimension}' scored {value}, expected 0..=10")]
    OutOfRange {
        /// Name of the offending dimension.
        dimension: String,
        /// The raw value reported by the critic.
        value: i64,
    },
}

/// Per-dimension weights used to derive a weighted overall score.
///
/// Dimensions absent from the map weigh `1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreWeights(BTreeMap<String, f64>);

impl ScoreWeights {
    /// Wraps a dimension → weight mapping.
    pub fn new(weights: BTreeMap<String, f64>) -> Self {
        Self(weights)
    }

    /// Weight applied to `dimension`.
    pub fn weight_of(&self, dimension: &str) -> f64 {
        self.0.get(dimension).copied().unwrap_or(1.0)
    }

    /// Iterates over the explicitly configured weights.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Returns `true` when no explicit weights are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------

/// A critic's evaluation of one revision attempt of one chapter.
///
/// Immutable once created; exactly one exists per [`crate::RevisionAttempt`].
/// The overall score is derived at construction time as the arithmetic mean of
/// the dimensions, or a weighted mean when [`ScoreWeights`] are supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    chapter: ChapterNumber,
    attempt: AttemptIndex,
    dimensions: BTreeMap<String, u8>,
    feedback: String,
    overall: f64,
    created_at: Timestamp,
}

impl QualityScore {
    /// Builds a score from raw critic dimensions.
    ///
    /// Fails when there are no dimensions or any value lies outside `0..=10`.
    pub fn new(
        chapter: ChapterNumber,
        attempt: AttemptIndex,
        raw_dimensions: BTreeMap<String, i64>,
        feedback: impl Into<String>,
        weights: Option<&ScoreWeights>,
    ) -> Result<Self, ScoreError> {
        if raw_dimensions.is_empty() {
            return Err(ScoreError::NoDimensions);
        }

        let mut dimensions = BTreeMap::new();
        for (name, value) in raw_dimensions {
            let score = u8::try_from(value)
                .ok()
                .filter(|v| *v <= MAX_DIMENSION_SCORE)
                .ok_or_else(|| ScoreError::OutOfRange {
                    dimension: name.clone(),
                    value,
                })?;
            dimensions.insert(name, score);
        }

        let overall = derive_overall(&dimensions, weights);
        Ok(Self {
            chapter,
            attempt,
            dimensions,
            feedback: feedback.into(),
            overall,
            created_at: Timestamp::now(),
        })
    }

    /// Chapter this score belongs to.
    pub fn chapter(&self) -> ChapterNumber {
        self.chapter
    }

    /// Attempt this score belongs to.
    pub fn attempt(&self) -> AttemptIndex {
        self.attempt
    }

    /// Named dimension scores.
    pub fn dimensions(&self) -> &BTreeMap<String, u8> {
        &self.dimensions
    }

    /// Free-text critique feedback.
    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    /// Derived overall score on the 0–10 scale.
    pub fn overall(&self) -> f64 {
        self.overall
    }

    /// When the score was recorded.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}

fn derive_overall(dimensions: &BTreeMap<String, u8>, weights: Option<&ScoreWeights>) -> f64 {
    let (weighted_sum, total_weight) =
        dimensions
            .iter()
            .fold((0.0_f64, 0.0_f64), |(sum, total), (name, score)| {
                let w = weights.map_or(1.0, |ws| ws.weight_of(name));
                (sum + w * f64::from(*score), total + w)
            });

    if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
