//! Answer correctness policies.
//!
//! Ground-truth answers are drone command sequences such as
//! `takeoff(); fly_forward(2.0); land().` where `;` separates commands.

/// Separator between individual commands in an answer.
pub const COMMAND_SEPARATOR: char = ';';

/// Exact policy: the trimmed candidate equals the trimmed ground truth.
pub fn is_exact_match(ground_truth: &str, candidate: &str) -> bool {
    ground_truth.trim() == candidate.trim()
}

/// Contains policy: every `;`-separated sub-answer of the ground truth, with
/// surrounding whitespace and all `.` characters removed, occurs somewhere in
/// the untrimmed candidate.
///
/// An empty ground truth never matches.
pub fn is_contains_match(ground_truth: &str, candidate: &str) -> bool {
    if ground_truth.is_empty() {
        return false;
    }

    ground_truth
        .split(COMMAND_SEPARATOR)
        .map(|part| part.replace('.', ""))
        .filter(|part| !part.trim().is_empty())
        .all(|part| candidate.contains(part.trim()))
}

/// Number of command separators in `text`.
pub fn marker_count(text: &str) -> usize {
    text.matches(COMMAND_SEPARATOR).count()
}
