/// Runtime error classification
///
/// Matches a test case's captured output against known crash signatures.
/// Categories are evaluated independently; the boolean form checks them in
/// declaration order and stops at the first hit.

use std::collections::BTreeSet;
use std::fmt;

/// Marker synthesized by the process protocol when a guest exits nonzero
/// without printing anything.
pub const EXIT_MARKER: &str = "Process exited with code:";

/// Namespace prefix that identifies runtime classes in a stack trace.
const RUNTIME_NAMESPACE: &str = "java.lang.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuntimeErrorCategory {
    /// The runtime could not start (heap reservation, VM creation).
    Initialization,
    /// An uncaught exception escaped the program.
    LanguageException,
    /// Signal or native crash.
    OsFault,
    /// Nonzero exit with no output at all.
    NonzeroExit,
}

impl RuntimeErrorCategory {
    pub const ALL: [RuntimeErrorCategory; 4] = [
        RuntimeErrorCategory::Initialization,
        RuntimeErrorCategory::LanguageException,
        RuntimeErrorCategory::OsFault,
        RuntimeErrorCategory::NonzeroExit,
    ];

    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            RuntimeErrorCategory::Initialization => &[
                "Error occurred during initialization of VM",
                "Could not reserve enough space",
                "Could not create the Java Virtual Machine",
                "Could not allocate",
                "There is insufficient memory",
                "Failed to reserve memory",
                "Native memory allocation",
                "hs_err_pid",
            ],
            RuntimeErrorCategory::LanguageException => {
                &["Exception in thread", "at java.", "at sun."]
            }
            RuntimeErrorCategory::OsFault => &["Segmentation fault", "core dumped", "fatal error"],
            RuntimeErrorCategory::NonzeroExit => &[EXIT_MARKER],
        }
    }

    pub fn matches(&self, output: &str) -> bool {
        if output.is_empty() {
            return false;
        }

        match self {
            RuntimeErrorCategory::LanguageException => {
                self.contains_any(output)
                    || (output.contains(RUNTIME_NAMESPACE)
                        && (output.contains("Exception") || output.contains("Error")))
            }
            RuntimeErrorCategory::NonzeroExit => {
                output.contains(EXIT_MARKER) && !output.contains("code: 0")
            }
            _ => self.contains_any(output),
        }
    }

    fn contains_any(&self, output: &str) -> bool {
        self.patterns().iter().any(|p| output.contains(p))
    }
}

impl fmt::Display for RuntimeErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeErrorCategory::Initialization => "initialization failure",
            RuntimeErrorCategory::LanguageException => "uncaught exception",
            RuntimeErrorCategory::OsFault => "system fault",
            RuntimeErrorCategory::NonzeroExit => "nonzero exit",
        };
        f.write_str(name)
    }
}

/// Every category the output matches.
pub fn classify(output: Option<&str>) -> BTreeSet<RuntimeErrorCategory> {
    match output {
        Some(text) => RuntimeErrorCategory::ALL
            .iter()
            .copied()
            .filter(|c| c.matches(text))
            .collect(),
        None => BTreeSet::new(),
    }
}

/// First matching category, in evaluation order.
pub fn first_match(output: &str) -> Option<RuntimeErrorCategory> {
    RuntimeErrorCategory::ALL
        .iter()
        .copied()
        .find(|c| c.matches(output))
}

pub fn is_runtime_error(output: &str) -> bool {
    first_match(output).is_some()
}
