//! Greedy non-maximum suppression shared by both decoders.

/// Outcome of comparing a new candidate against the accepted predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmsDecision {
    /// No accepted prediction conflicts with the candidate: append it.
    Independent,
    /// The candidate beats the accepted prediction at this index: replace it.
    ReplaceAt(usize),
    /// An accepted prediction with equal or higher confidence conflicts: drop the candidate.
    DiscardNew,
}

/// A prediction that can be compared against another one of the same kind.
pub trait Suppress {
    /// Whether the two predictions describe the same object.
    fn overlaps(&self, other: &Self) -> bool;

    /// Confidence on the 0-100 scale.
    fn confidence(&self) -> f32;
}

/// Compare `candidate` against `accepted` in order; the first conflict decides.
pub fn non_max_suppression<T: Suppress>(candidate: &T, accepted: &[T]) -> NmsDecision {
    for (index, existing) in accepted.iter().enumerate() {
        if !candidate.overlaps(existing) {
            continue;
        }
        if candidate.confidence() > existing.confidence() {
            return NmsDecision::ReplaceAt(index);
        }
        return NmsDecision::DiscardNew;
    }
    NmsDecision::Independent
}

/// Update `accepted` according to `decision`.
pub fn apply<T>(decision: NmsDecision, accepted: &mut Vec<T>, candidate: T) {
    match decision {
        NmsDecision::Independent => accepted.push(candidate),
        NmsDecision::ReplaceAt(index) => {
            accepted.remove(index);
            accepted.push(candidate);
        }
        NmsDecision::DiscardNew => {}
    }
}

/// Run suppression for `candidate` and apply the result.
pub fn insert<T: Suppress>(accepted: &mut Vec<T>, candidate: T) -> NmsDecision {
    let decision = non_max_suppression(&candidate, accepted);
    apply(decision, accepted, candidate);
    decision
}
