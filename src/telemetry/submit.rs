//! Submission span helpers.
//!
//! One span per remote submission attempt, carrying the identifier and,
//! once known, how it ended.

use tracing::Span;

use crate::model::{Did, Outcome};

/// Start a span for one remote submission.
///
/// `submit.outcome` is declared empty and filled by [`record_outcome`].
pub fn start_submit_span(did: &Did) -> Span {
    tracing::info_span!(
        "didlist.submit",
        "submit.did" = %did,
        "submit.outcome" = tracing::field::Empty,
    )
}

/// Record how the submission ended and emit a transition event.
pub fn record_outcome(span: &Span, outcome: Outcome) {
    span.record("submit.outcome", tracing::field::display(outcome));
    span.in_scope(|| {
        tracing::debug!(from = "in_flight", to = %outcome, "state_transition");
    });
}
