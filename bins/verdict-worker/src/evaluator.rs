/// Test Evaluator - Output Comparison and Aggregation
///
/// **Core Responsibility:**
/// Turn a test case's captured output into an outcome, and a run's outcomes
/// into the final result payload.
///
/// **Critical Properties:**
/// - Knows nothing about the sandbox or the isolation utility
/// - Knows nothing about Redis
/// - Pure functions: (actual, expected) → outcome, outcomes → payload
///
/// **Normalization Rules:**
/// - Both sides are trimmed before being recorded
/// - Comparison ignores every whitespace character, so `[1, 2]` and `[1,2]`
///   are equal, as are `1 2` and `12`
/// - Case sensitive, no numeric tolerance

use crate::classifier::{self, RuntimeErrorCategory};
use std::collections::BTreeSet;
use std::fmt;
use verdict_common::types::{ExecutionResult, Payload};

pub const ALL_PASSED_MESSAGE: &str = "All test cases passed";

/// Strip all whitespace for comparison.
pub fn normalize_output(output: &str) -> String {
    output.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Outcome of one evaluated test case. `index` is 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed {
        index: usize,
    },
    Failed {
        index: usize,
        expected: String,
        actual: String,
    },
    RuntimeError {
        index: usize,
        categories: BTreeSet<RuntimeErrorCategory>,
        expected: String,
        actual: String,
    },
}

impl CaseOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed { .. })
    }

    /// Highest-precedence crash category. A crash leaves the sandbox in an
    /// unknown state; nothing after it runs.
    pub fn runtime_error(&self) -> Option<RuntimeErrorCategory> {
        match self {
            CaseOutcome::RuntimeError { categories, .. } => categories.first().copied(),
            _ => None,
        }
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseOutcome::Passed { index } => write!(f, "Test case {} passed", index + 1),
            CaseOutcome::Failed {
                index,
                expected,
                actual,
            } => write!(
                f,
                "Test case {} failed\nExpected: [{}]\nGot: [{}]",
                index + 1,
                expected,
                actual
            ),
            CaseOutcome::RuntimeError {
                index,
                expected,
                actual,
                ..
            } => write!(
                f,
                "Test case {} failed with runtime error\nExpected: [{}]\nGot: [{}]",
                index + 1,
                expected,
                actual
            ),
        }
    }
}

/// Judge one case. Crash signatures take precedence over content.
pub fn evaluate_case(index: usize, actual: &str, expected: &str) -> CaseOutcome {
    let actual = actual.trim();
    let expected = expected.trim();

    if classifier::is_runtime_error(actual) {
        return CaseOutcome::RuntimeError {
            index,
            categories: classifier::classify(Some(actual)),
            expected: expected.to_string(),
            actual: actual.to_string(),
        };
    }

    if normalize_output(actual) == normalize_output(expected) {
        CaseOutcome::Passed { index }
    } else {
        CaseOutcome::Failed {
            index,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Collapse outcomes into the result payload.
///
/// All passed → a single message. Anything else → one line per evaluated
/// case, in order. Both are `SUCCESS`: a wrong answer is a judged result,
/// not a system error.
pub fn aggregate(outcomes: &[CaseOutcome]) -> ExecutionResult {
    if outcomes.iter().all(CaseOutcome::is_passed) {
        return ExecutionResult::success(Payload::Message(ALL_PASSED_MESSAGE.to_string()));
    }

    ExecutionResult::success(Payload::List(
        outcomes.iter().map(|o| o.to_string()).collect(),
    ))
}
