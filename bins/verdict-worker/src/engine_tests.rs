/// End-to-end scenarios for the submission executor.
///
/// The isolation utility is replaced by `ScriptedExecutor`, which records
/// every argv it receives, so these tests can count init/run/cleanup calls
/// and check the early-abort and teardown guarantees without a real sandbox.

#[cfg(test)]
mod executor_scenarios {
    use crate::config::SandboxConfig;
    use crate::engine::testing::ScriptedExecutor;
    use crate::engine::{CapturedOutput, CommandExecutor, IsolateEngine, ProcessExecutor};
    use crate::evaluator::ALL_PASSED_MESSAGE;
    use crate::executor::Executor;
    use crate::sandbox::SandboxManager;
    use crate::store::testing::MemoryStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use verdict_common::types::{Payload, ResultStatus, Submission};

    fn build(root: &Path, store: MemoryStore, runner: Arc<dyn CommandExecutor>, leasing: bool) -> (Executor, Arc<MemoryStore>) {
        let config = SandboxConfig {
            sandbox_root: root.to_path_buf(),
            slot_leasing: leasing,
            ..SandboxConfig::default()
        };
        let store = Arc::new(store);
        let engine = IsolateEngine::new(runner, Arc::new(config));
        (Executor::new(store.clone(), SandboxManager::new(engine)), store)
    }

    fn submission(language: &str, problem: &str, id: &str) -> Submission {
        Submission {
            language: language.to_string(),
            code: "const x = require('fs').readFileSync(0, 'utf8'); console.log(x)".to_string(),
            problem_name: problem.to_string(),
            problem_id: 1001,
            user_id: "user-7".to_string(),
            submission_id: id.to_string(),
        }
    }

    fn outcome_lines(payload: &Option<Payload>) -> Vec<String> {
        match payload {
            Some(Payload::List(lines)) => lines.clone(),
            other => panic!("expected per-case list, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cache_miss_never_touches_sandbox() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        let (executor, store) = build(root.path(), MemoryStore::new(), runner.clone(), false);

        let result = executor.execute(&submission("js", "missing", "s-1")).await;

        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(result.error_list, Payload::Message("Test cases not found for missing".into()));
        assert_eq!(store.lookups(), 1);
        assert!(runner.calls().is_empty(), "no isolation utility invocation expected");
        assert_eq!(result.submission_id, "s-1");
        assert_eq!(result.user_id, "user-7");
        assert_eq!(result.problem_id, 1001);
    }

    #[tokio::test]
    async fn test_all_passed_reports_single_message() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner
            .push_run("[1, 2, 3]\nOK (0.04 sec real, 0.05 sec wall)", 0)
            .push_run("hello world\n", 0);
        let store = MemoryStore::new().with_problem("echo", &[("a", "[1,2,3]"), ("b", "hello world")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("javascript", "echo", "s-2")).await;

        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.data, Some(Payload::Message(ALL_PASSED_MESSAGE.to_string())));
        assert_eq!(result.error_list, Payload::List(vec![]));
        assert_eq!(runner.init_count(), 1);
        assert_eq!(runner.run_count(), 2);
        assert_eq!(runner.cleanup_count(), 1);
    }

    #[tokio::test]
    async fn test_mismatch_lists_every_case_in_order() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner.push_run("1", 0).push_run("5", 0).push_run("3", 0);
        let store = MemoryStore::new().with_problem("count", &[("", "1"), ("", "2"), ("", "3")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("js", "count", "s-3")).await;

        assert_eq!(result.status, ResultStatus::Success);
        let lines = outcome_lines(&result.data);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Test case 1 passed");
        assert_eq!(lines[1], "Test case 2 failed\nExpected: [2]\nGot: [5]");
        assert_eq!(lines[2], "Test case 3 passed");
        assert_eq!(runner.cleanup_count(), 1);
    }

    #[tokio::test]
    async fn test_runtime_error_skips_remaining_cases() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner
            .push_run("1", 0)
            .push_run("Exited with error status 1", 1)
            .push_run("3", 0)
            .push_run("4", 0);
        let store = MemoryStore::new().with_problem(
            "crashy",
            &[("", "1"), ("", "2"), ("", "3"), ("", "4")],
        );
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("js", "crashy", "s-4")).await;

        // crash at index 1 → exactly two guest runs, two outcomes
        assert_eq!(runner.run_count(), 2);
        let lines = outcome_lines(&result.data);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Test case 1 passed");
        assert_eq!(
            lines[1],
            "Test case 2 failed with runtime error\nExpected: [2]\nGot: [Process exited with code: 1]"
        );
        assert_eq!(runner.cleanup_count(), 1);
    }

    #[tokio::test]
    async fn test_uncaught_exception_on_first_case() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner.push_plain("", 0);
        runner.push_run(
            "Exception in thread \"main\" java.lang.ArrayIndexOutOfBoundsException: 3\n\tat Main.main(Main.java:4)",
            1,
        );
        let store = MemoryStore::new().with_problem("arrays", &[("", "x"), ("", "y")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("java", "arrays", "s-5")).await;

        assert_eq!(runner.run_count(), 1);
        let lines = outcome_lines(&result.data);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Test case 1 failed with runtime error"));
    }

    #[tokio::test]
    async fn test_java_compiles_then_runs_with_jvm_limits() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner.push_plain("", 0).push_run("10", 0);
        let store = MemoryStore::new().with_problem("double", &[("5", "10")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("Java", "double", "s-6")).await;
        assert!(result.is_success());

        let calls = runner.calls();
        let compile = calls.iter().find(|argv| argv[0].ends_with("javac")).unwrap();
        assert!(compile[1].ends_with("box/Main.java"));

        let run = calls.iter().find(|argv| argv.contains(&"--run".to_string())).unwrap();
        assert!(run.contains(&"--mem=1048576".to_string()));
        assert!(run.contains(&"--processes=50".to_string()));
        assert_eq!(run.last().map(String::as_str), Some("Main"));
    }

    #[tokio::test]
    async fn test_input_file_holds_case_input() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner.push_run("ok", 0);
        let store = MemoryStore::new().with_problem("stdin", &[("3 4\n", "ok")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let sub = submission("js", "stdin", "s-7");
        executor.execute(&sub).await;

        let slot = crate::slots::SlotAllocator::new(100).slot_for("s-7");
        let box_path = root.path().join(slot.to_string()).join("box");
        assert_eq!(std::fs::read_to_string(box_path.join("input.txt")).unwrap(), "3 4\n");
        assert_eq!(std::fs::read_to_string(box_path.join("main.js")).unwrap(), sub.code);
    }

    #[tokio::test]
    async fn test_compile_failure_reports_and_tears_down() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner.push_plain("Main.java:2: error: ';' expected\n1 error", 1);
        let store = MemoryStore::new().with_problem("p", &[("", "1")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("java", "p", "s-8")).await;

        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(
            result.error_list,
            Payload::Message("Compilation error:\nMain.java:2: error: ';' expected\n1 error\n".into())
        );
        assert_eq!(runner.run_count(), 0);
        assert_eq!(runner.cleanup_count(), 1);
        assert_eq!(result.submission_id, "s-8");
    }

    #[tokio::test]
    async fn test_failure_mid_loop_still_tears_down() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner.push_run("1", 0).fail_run_at(1);
        let store = MemoryStore::new().with_problem("p", &[("", "1"), ("", "2"), ("", "3")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("js", "p", "s-9")).await;

        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(
            result.error_list,
            Payload::Message("Execution failed: injected spawn failure".into())
        );
        assert_eq!(runner.run_count(), 2);
        assert_eq!(runner.cleanup_count(), 1);
        assert_eq!(result.problem_id, 1001);
    }

    #[tokio::test]
    async fn test_provision_failure_still_tears_down() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedExecutor::new());
        runner.fail_init(2);
        let store = MemoryStore::new().with_problem("p", &[("", "1")]);
        let (executor, _) = build(root.path(), store, runner.clone(), false);

        let result = executor.execute(&submission("js", "p", "s-10")).await;

        assert_eq!(result.status, ResultStatus::Error);
        match &result.error_list {
            Payload::Message(msg) => assert!(msg.starts_with("Sandbox provisioning failed for slot")),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(runner.run_count(), 0);
        assert_eq!(runner.cleanup_count(), 1);
    }

    /// Delays guest runs so two submissions overlap in time.
    struct SlowRuns {
        inner: Arc<ScriptedExecutor>,
        delay: Duration,
    }

    #[async_trait]
    impl CommandExecutor for SlowRuns {
        async fn execute(&self, argv: &[String]) -> anyhow::Result<CapturedOutput> {
            if argv.iter().any(|a| a == "--run") {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.execute(argv).await
        }
    }

    /// Lifecycle verbs in call order, e.g. ["init", "run", "cleanup"].
    fn lifecycle_trace(runner: &ScriptedExecutor) -> Vec<&'static str> {
        runner
            .calls()
            .iter()
            .filter_map(|argv| {
                if argv.iter().any(|a| a == "--init") {
                    Some("init")
                } else if argv.iter().any(|a| a == "--cleanup") {
                    Some("cleanup")
                } else if argv.iter().any(|a| a == "--run") {
                    Some("run")
                } else {
                    None
                }
            })
            .collect()
    }

    async fn run_colliding_pair(leasing: bool) -> Vec<&'static str> {
        let root = tempfile::tempdir().unwrap();
        let scripted = Arc::new(ScriptedExecutor::new());
        let runner = Arc::new(SlowRuns {
            inner: scripted.clone(),
            delay: Duration::from_millis(50),
        });
        let store = MemoryStore::new().with_problem("p", &[("", "")]);
        let (executor, _) = build(root.path(), store, runner, leasing);

        // "Aa" and "BB" hash to the same slot
        let first = submission("js", "p", "Aa");
        let second = submission("js", "p", "BB");
        let (a, b) = tokio::join!(executor.execute(&first), executor.execute(&second));
        assert!(a.is_success());
        assert!(b.is_success());

        lifecycle_trace(&scripted)
    }

    #[tokio::test]
    async fn test_colliding_slots_interleave_without_leasing() {
        let trace = run_colliding_pair(false).await;
        assert_eq!(trace.len(), 6);
        // both inits happen before the first cleanup: the slot is shared
        let first_cleanup = trace.iter().position(|v| *v == "cleanup").unwrap();
        let inits_before = trace[..first_cleanup].iter().filter(|v| **v == "init").count();
        assert_eq!(inits_before, 2);
    }

    #[tokio::test]
    async fn test_colliding_slots_serialize_with_leasing() {
        let trace = run_colliding_pair(true).await;
        assert_eq!(trace, vec!["init", "run", "cleanup", "init", "run", "cleanup"]);
    }

    /// Runs every guest as a real shell script; lifecycle calls and the run
    /// itself are still recorded by the scripted double.
    struct ShellGuest {
        recorder: Arc<ScriptedExecutor>,
        process: ProcessExecutor,
        script: String,
    }

    #[async_trait]
    impl CommandExecutor for ShellGuest {
        async fn execute(&self, argv: &[String]) -> anyhow::Result<CapturedOutput> {
            let recorded = self.recorder.execute(argv).await?;
            if !argv.iter().any(|a| a == "--run") {
                return Ok(recorded);
            }
            let shell = vec!["sh".to_string(), "-c".to_string(), self.script.clone()];
            self.process.execute(&shell).await
        }
    }

    #[tokio::test]
    async fn test_binary_guest_output_is_judged_not_errored() {
        let root = tempfile::tempdir().unwrap();
        let recorder = Arc::new(ScriptedExecutor::new());
        let runner = Arc::new(ShellGuest {
            recorder: recorder.clone(),
            process: ProcessExecutor::default(),
            script: "printf 'ab\\377cd\\n'".to_string(),
        });
        let store = MemoryStore::new().with_problem("bytes", &[("", "x"), ("", "y")]);
        let (executor, _) = build(root.path(), store, runner, false);

        let result = executor.execute(&submission("js", "bytes", "s-11")).await;

        assert_eq!(result.status, ResultStatus::Success);
        let lines = outcome_lines(&result.data);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Test case 1 failed\nExpected: [x]\nGot: [ab\u{FFFD}cd]");
        assert_eq!(recorder.run_count(), 2);
        assert_eq!(recorder.cleanup_count(), 1);
    }

    #[tokio::test]
    async fn test_flooding_guest_is_truncated_and_judged() {
        let root = tempfile::tempdir().unwrap();
        let recorder = Arc::new(ScriptedExecutor::new());
        let runner = Arc::new(ShellGuest {
            recorder: recorder.clone(),
            process: ProcessExecutor::new(64),
            script: "yes 1 | head -n 100000".to_string(),
        });
        let store = MemoryStore::new().with_problem("flood", &[("", "1")]);
        let (executor, _) = build(root.path(), store, runner, false);

        let result = executor.execute(&submission("js", "flood", "s-12")).await;

        assert_eq!(result.status, ResultStatus::Success);
        let lines = outcome_lines(&result.data);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Test case 1 failed\nExpected: [1]"));
        assert!(lines[0].ends_with("[output truncated]]"));
        assert!(lines[0].len() < 512);
        assert_eq!(recorder.cleanup_count(), 1);
    }

    /// Panics on the first guest run.
    struct PanicOnRun {
        inner: Arc<ScriptedExecutor>,
    }

    #[async_trait]
    impl CommandExecutor for PanicOnRun {
        async fn execute(&self, argv: &[String]) -> anyhow::Result<CapturedOutput> {
            let output = self.inner.execute(argv).await?;
            if argv.iter().any(|a| a == "--run") {
                panic!("guest runner exploded");
            }
            Ok(output)
        }
    }

    #[tokio::test]
    async fn test_panic_mid_run_still_tears_down_and_releases_slot() {
        let root = tempfile::tempdir().unwrap();
        let scripted = Arc::new(ScriptedExecutor::new());
        let runner = Arc::new(PanicOnRun {
            inner: scripted.clone(),
        });
        let store = MemoryStore::new().with_problem("p", &[("", "1")]);
        let (executor, _) = build(root.path(), store, runner, true);

        let result = executor.execute(&submission("js", "p", "s-13")).await;

        assert_eq!(result.status, ResultStatus::Error);
        assert_eq!(
            result.error_list,
            Payload::Message("Execution failed: worker panicked: guest runner exploded".into())
        );
        assert_eq!(result.submission_id, "s-13");
        assert_eq!(scripted.cleanup_count(), 1);

        // the lease was released, so the same slot can be taken again
        let again = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(&submission("js", "p", "s-13")),
        )
        .await;
        assert!(again.is_ok());
        assert_eq!(scripted.cleanup_count(), 2);
    }
}
