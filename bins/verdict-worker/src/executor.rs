/// Submission Executor - High-Level Orchestration
///
/// **Responsibility:**
/// Drive one submission from receipt to result:
/// cache lookup → slot → provision → source → compile → test cases →
/// teardown → result.
///
/// **Architecture:**
/// 1. `TestCaseStore` supplies the problem's cases (store.rs)
/// 2. `SlotAllocator` picks the sandbox slot (slots.rs)
/// 3. `SandboxManager` provisions, populates and tears down (sandbox.rs)
/// 4. `IsolateEngine` runs the compiler and the guest (engine.rs)
/// 5. The evaluator judges each case and aggregates (evaluator.rs)
///
/// Every error funnels into one `ExecutionResult` with status `ERROR`, and
/// teardown runs exactly once for every submission that reached a slot,
/// including runs that panic.

use crate::config::SandboxConfig;
use crate::error::JudgeError;
use crate::evaluator::{self, CaseOutcome};
use crate::sandbox::SandboxManager;
use crate::slots::{SlotAllocator, SlotLeases};
use crate::store::TestCaseStore;
use futures_util::FutureExt;
use std::any::Any;
use std::iter::Enumerate;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use verdict_common::types::{ExecutionResult, Language, Submission, TestCaseSet};

pub struct Executor {
    store: Arc<dyn TestCaseStore>,
    sandbox: SandboxManager,
    allocator: SlotAllocator,
    leases: Option<SlotLeases>,
}

impl Executor {
    pub fn new(store: Arc<dyn TestCaseStore>, sandbox: SandboxManager) -> Self {
        let config = sandbox.engine().config();
        let allocator = SlotAllocator::new(config.slot_count);
        let leases = config
            .slot_leasing
            .then(|| SlotLeases::new(allocator.slot_count()));
        Self {
            store,
            sandbox,
            allocator,
            leases,
        }
    }

    fn config(&self) -> &SandboxConfig {
        self.sandbox.engine().config()
    }

    /// Judge a submission. Never fails: errors become `ERROR` results.
    #[instrument(
        skip(self, submission),
        fields(
            submission_id = %submission.submission_id,
            problem = %submission.problem_name,
            language = %submission.language,
        )
    )]
    pub async fn execute(&self, submission: &Submission) -> ExecutionResult {
        let result = match self.judge(submission).await {
            Ok(result) => result,
            Err(e) => {
                match &e {
                    JudgeError::Unexpected(inner) => {
                        error!(error = ?inner, "Execution failed")
                    }
                    other => warn!(kind = other.kind(), error = %other, "Submission rejected"),
                }
                ExecutionResult::error(e.to_string())
            }
        };
        result.correlated_with(submission)
    }

    async fn judge(&self, submission: &Submission) -> Result<ExecutionResult, JudgeError> {
        let language = Language::from_tag(&submission.language)
            .ok_or_else(|| JudgeError::UnsupportedLanguage(submission.language.clone()))?;

        let cases = self
            .store
            .fetch(&submission.problem_name)
            .await?
            .ok_or_else(|| JudgeError::CacheMiss(submission.problem_name.clone()))?;

        let slot = self.allocator.slot_for(&submission.submission_id);
        let _lease = match &self.leases {
            Some(leases) => {
                if leases.is_leased(slot) {
                    debug!(slot, "Slot busy, waiting for lease");
                }
                Some(leases.acquire(slot).await)
            }
            None => None,
        };
        info!(slot, cases = cases.len(), "Slot assigned");

        let outcome = AssertUnwindSafe(self.run_in_slot(slot, language, &submission.code, &cases))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(JudgeError::Unexpected(anyhow::anyhow!(
                    "worker panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        self.sandbox.teardown(slot).await;
        outcome
    }

    async fn run_in_slot(
        &self,
        slot: u32,
        language: Language,
        code: &str,
        cases: &TestCaseSet,
    ) -> Result<ExecutionResult, JudgeError> {
        let box_path = self.sandbox.provision(slot).await?;
        self.sandbox.write_source(&box_path, language, code).await?;

        if let Some(compile) = self.config().compile_command(language, &box_path) {
            let output = self.sandbox.engine().run_plain(&compile).await?;
            let diagnostics = output.text.trim();
            if !diagnostics.is_empty() {
                return Err(JudgeError::Compilation(output.text));
            }
            debug!(slot, "Compilation succeeded");
        }

        let mut cursor = CaseCursor::new(self, slot, language, box_path, cases);
        let mut outcomes = Vec::with_capacity(cases.len());
        while let Some(outcome) = cursor.next().await? {
            let crash = outcome.runtime_error();
            outcomes.push(outcome);
            if let Some(category) = crash {
                warn!(
                    slot,
                    case = outcomes.len(),
                    category = %category,
                    skipped = cases.len() - outcomes.len(),
                    "Runtime error, skipping remaining test cases"
                );
                break;
            }
        }

        let passed = outcomes.iter().filter(|o| o.is_passed()).count();
        info!(slot, evaluated = outcomes.len(), passed, "Test cases evaluated");

        Ok(evaluator::aggregate(&outcomes))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Lazily runs test cases in stored order, one per `next` call.
///
/// Nothing runs until asked for, so the caller stopping early means the
/// remaining cases never touch the sandbox.
struct CaseCursor<'a> {
    executor: &'a Executor,
    slot: u32,
    language: Language,
    box_path: PathBuf,
    cases: Enumerate<CaseIter<'a>>,
}

type CaseIter<'a> = Box<dyn Iterator<Item = (&'a str, &'a str)> + Send + Sync + 'a>;

impl<'a> CaseCursor<'a> {
    fn new(
        executor: &'a Executor,
        slot: u32,
        language: Language,
        box_path: PathBuf,
        cases: &'a TestCaseSet,
    ) -> Self {
        Self {
            executor,
            slot,
            language,
            box_path,
            cases: (Box::new(cases.iter()) as CaseIter<'a>).enumerate(),
        }
    }

    async fn next(&mut self) -> Result<Option<CaseOutcome>, JudgeError> {
        let (index, (input, expected)) = match self.cases.next() {
            Some(case) => case,
            None => return Ok(None),
        };

        let actual = self.run_case(&self.box_path, input).await?;
        let outcome = evaluator::evaluate_case(index, &actual, expected);
        debug!(slot = self.slot, case = index + 1, passed = outcome.is_passed(), "Test case finished");
        Ok(Some(outcome))
    }

    async fn run_case(&self, box_path: &Path, input: &str) -> Result<String, JudgeError> {
        let sandbox = &self.executor.sandbox;
        sandbox.write_stdin(box_path, input).await?;

        let config = self.executor.config();
        let limits = config.limits_for(self.language);
        let command = config.run_command(self.language);
        let output = sandbox.engine().run(self.slot, &limits, &command).await?;
        Ok(output.trim().to_string())
    }
}
