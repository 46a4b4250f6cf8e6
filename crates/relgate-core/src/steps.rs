//! Action step splitting

use once_cell::sync::Lazy;
use regex::Regex;

static STEP_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\s+|;|\n").expect("step separator pattern"));

/// Split a proposed action into steps
///
/// Separators are numbered list markers, semicolons and newlines. An action
/// without separators is a single step.
#[must_use]
pub fn split_steps(action: &str) -> Vec<String> {
    let steps: Vec<String> = STEP_SEPARATOR
        .split(action)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if steps.is_empty() && !action.trim().is_empty() {
        vec![action.trim().to_string()]
    } else {
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_list() {
        assert_eq!(
            split_steps("1. Drain node 2. Restart pods 3. Verify p99"),
            vec!["Drain node", "Restart pods", "Verify p99"]
        );
    }

    #[test]
    fn semicolons_and_newlines() {
        assert_eq!(
            split_steps("scale down ; flush cache\nscale up"),
            vec!["scale down", "flush cache", "scale up"]
        );
    }

    #[test]
    fn single_step() {
        assert_eq!(split_steps("  restart payments-api  "), vec!["restart payments-api"]);
        assert!(split_steps("   ").is_empty());
    }
}
