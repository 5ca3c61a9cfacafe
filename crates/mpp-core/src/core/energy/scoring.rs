use super::term::{EnergyTerm, MarkRef, TermContext, TermScope};
use crate::core::models::ids::MarkId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Mark {0} not found in the configuration")]
    MarkNotFound(MarkId),
    #[error("Mark {0} has degenerate geometry")]
    DegenerateMark(MarkId),
    #[error("Term '{term}' produced a non-finite score ({value}) for {subject}")]
    NonFinite {
        term: String,
        value: f64,
        subject: String,
    },
    #[error("Term '{term}' does not support {scope} scoring")]
    UnsupportedScope { term: String, scope: TermScope },
    #[error("Mark {0} does not cover any voxel of the background stack")]
    OutsideStack(MarkId),
}

/// Runs terms against marks, enforcing the guarantees every score must satisfy.
///
/// Degenerate marks are rejected before the term sees them, pair arguments are put
/// in id order, and non-finite results become [`ScoringError::NonFinite`].
pub struct Scorer<'a> {
    ctx: TermContext<'a>,
}

impl<'a> Scorer<'a> {
    pub fn new(ctx: TermContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &TermContext<'a> {
        &self.ctx
    }

    pub fn score_mark(&self, term: &dyn EnergyTerm, mark: MarkRef<'_>) -> Result<f64, ScoringError> {
        if mark.mark.is_degenerate() {
            return Err(ScoringError::DegenerateMark(mark.id));
        }
        let value = term.score_mark(mark, &self.ctx)?;
        check_finite(term, value, || mark.id.to_string())
    }

    pub fn score_pair(
        &self,
        term: &dyn EnergyTerm,
        first: MarkRef<'_>,
        second: MarkRef<'_>,
    ) -> Result<f64, ScoringError> {
        let (first, second) = if first.id <= second.id {
            (first, second)
        } else {
            (second, first)
        };
        for mark in [first, second] {
            if mark.mark.is_degenerate() {
                return Err(ScoringError::DegenerateMark(mark.id));
            }
        }
        let value = term.score_pair(first, second, &self.ctx)?;
        check_finite(term, value, || format!("({}, {})", first.id, second.id))
    }
}

fn check_finite(
    term: &dyn EnergyTerm,
    value: f64,
    subject: impl FnOnce() -> String,
) -> Result<f64, ScoringError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScoringError::NonFinite {
            term: term.name().to_string(),
            value,
            subject: subject(),
        })
    }
}
