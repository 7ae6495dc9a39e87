/// Sandbox Process Protocol
///
/// **Core Responsibility:**
/// Build one invocation of the isolation utility, run it, and hand back the
/// guest's output with the utility's own status lines removed.
///
/// **Boundary:**
/// - Knows the utility's flags and its metadata line prefixes
/// - Does NOT decide pass/fail or classify crashes
/// - Does NOT own sandbox lifecycle (see sandbox.rs)
///
/// Spawning is behind `CommandExecutor` so the protocol can be driven by a
/// scripted executor in tests.

use crate::config::{RunLimits, SandboxConfig, DEFAULT_MAX_OUTPUT_BYTES};
use crate::classifier::EXIT_MARKER;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Lines the isolation utility prints about the run itself.
pub const METADATA_PREFIXES: &[&str] = &[
    "OK (",
    "Time limit exceeded",
    "Caught fatal signal",
    "Exited with error status",
];

/// Last line of output that hit the capture cap.
pub const TRUNCATION_MARKER: &str = "[output truncated]";

/// Longest line kept whole. Longer lines are split.
const MAX_LINE_BYTES: usize = 64 * 1024;

const READ_BUF_BYTES: usize = 8 * 1024;

pub fn is_metadata_line(line: &str) -> bool {
    METADATA_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

/// Merged stdout/stderr lines plus the exit code of one child process.
/// `truncated` is set when lines past the capture cap were discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub lines: Vec<String>,
    pub exit_code: i32,
    pub truncated: bool,
}

impl CapturedOutput {
    pub fn new(text: &str, exit_code: i32) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            exit_code,
            truncated: false,
        }
    }
}

/// Keeps lines until `limit` bytes are stored, then only drops them so the
/// child can keep writing.
struct OutputCollector {
    lines: Vec<String>,
    stored: usize,
    limit: usize,
    truncated: bool,
}

impl OutputCollector {
    fn new(limit: usize) -> Self {
        Self {
            lines: Vec::new(),
            stored: 0,
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, raw: &[u8]) {
        if self.truncated {
            return;
        }
        let line = strip_line_ending(raw);
        if self.stored + line.len() > self.limit {
            self.truncated = true;
            return;
        }
        self.stored += line.len();
        // Guest output is untrusted bytes; invalid UTF-8 becomes U+FFFD.
        self.lines.push(String::from_utf8_lossy(line).into_owned());
    }

    /// Feed one read from a stream. `pending` holds that stream's unfinished
    /// line. An empty chunk is end of stream; returns `false` then.
    fn feed(&mut self, chunk: &[u8], pending: &mut Vec<u8>) -> bool {
        if chunk.is_empty() {
            if !pending.is_empty() {
                self.push(pending);
                pending.clear();
            }
            return false;
        }
        if self.truncated {
            pending.clear();
            return true;
        }

        pending.extend_from_slice(chunk);
        while let Some(end) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            self.push(&line);
        }
        if pending.len() >= MAX_LINE_BYTES {
            self.push(pending);
            pending.clear();
        }
        true
    }

    fn finish(self, exit_code: i32) -> CapturedOutput {
        CapturedOutput {
            lines: self.lines,
            exit_code,
            truncated: self.truncated,
        }
    }
}

fn strip_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Output of an unsandboxed helper command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainOutput {
    pub text: String,
    pub exit_code: i32,
}

/// Runs a command to completion and captures its merged output.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, argv: &[String]) -> Result<CapturedOutput>;
}

/// Real child processes via tokio.
///
/// stdout and stderr are read concurrently and interleaved line by line in
/// arrival order, at most `max_output_bytes` of them kept. No timeout is
/// layered on top: the isolation utility enforces CPU and wall-clock limits
/// itself.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExecutor {
    max_output_bytes: usize,
}

impl ProcessExecutor {
    pub fn new(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, argv: &[String]) -> Result<CapturedOutput> {
        let (program, args) = argv
            .split_first()
            .context("Cannot execute an empty command")?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program))?;

        let mut stdout = child.stdout.take().context("Child stdout not captured")?;
        let mut stderr = child.stderr.take().context("Child stderr not captured")?;
        let (mut out_chunk, mut err_chunk) = ([0u8; READ_BUF_BYTES], [0u8; READ_BUF_BYTES]);
        let (mut out_pending, mut err_pending) = (Vec::new(), Vec::new());

        let mut collector = OutputCollector::new(self.max_output_bytes);
        let (mut out_open, mut err_open) = (true, true);
        while out_open || err_open {
            tokio::select! {
                read = stdout.read(&mut out_chunk), if out_open => {
                    let n = read?;
                    out_open = collector.feed(&out_chunk[..n], &mut out_pending);
                }
                read = stderr.read(&mut err_chunk), if err_open => {
                    let n = read?;
                    err_open = collector.feed(&err_chunk[..n], &mut err_pending);
                }
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for {}", program))?;

        // Killed by a signal: no exit code, report as generic failure.
        let exit_code = status.code().unwrap_or(-1);

        if collector.truncated {
            warn!(command = %program, limit = self.max_output_bytes, "Output exceeded capture limit, truncated");
        }

        Ok(collector.finish(exit_code))
    }
}

/// Join guest lines, dropping utility metadata. Each kept line keeps its
/// trailing newline.
pub fn sanitize(lines: &[String]) -> String {
    let mut output = String::new();
    for line in lines.iter().filter(|l| !is_metadata_line(l)) {
        output.push_str(line);
        output.push('\n');
    }
    output
}

/// Sanitized output, or the exit marker when a failing process said nothing.
/// Truncated output ends with `TRUNCATION_MARKER`.
pub fn guest_output(captured: &CapturedOutput) -> String {
    let mut output = sanitize(&captured.lines);
    if captured.truncated {
        output.push_str(TRUNCATION_MARKER);
        output.push('\n');
    }
    if captured.exit_code != 0 && output.is_empty() {
        return format!("{} {}", EXIT_MARKER, captured.exit_code);
    }
    output
}

/// Drives the isolation utility for one sandbox configuration.
#[derive(Clone)]
pub struct IsolateEngine {
    executor: Arc<dyn CommandExecutor>,
    config: Arc<SandboxConfig>,
}

impl IsolateEngine {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: Arc<SandboxConfig>) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Full argv for a resource-limited run of `inner_command` in `slot`.
    pub fn run_argv(&self, slot: u32, limits: &RunLimits, inner_command: &[String]) -> Vec<String> {
        let mut argv = vec![
            self.config.isolate_binary.clone(),
            format!("--box-id={}", slot),
            format!("--time={}", limits.time_secs),
            format!("--wall-time={}", limits.wall_time_secs),
            format!("--mem={}", limits.memory_kb),
            format!("--processes={}", limits.max_processes),
            format!("--stdin={}", self.config.stdin_file),
        ];
        argv.extend(self.config.mounts.iter().map(|m| m.to_flag()));
        argv.push("--run".to_string());
        argv.push("--".to_string());
        argv.extend(inner_command.iter().cloned());
        argv
    }

    /// Lifecycle verb (`init`, `cleanup`) for a slot.
    pub fn lifecycle_argv(&self, slot: u32, verb: &str) -> Vec<String> {
        vec![
            self.config.isolate_binary.clone(),
            format!("--box-id={}", slot),
            format!("--{}", verb),
        ]
    }

    /// Run a guest command under the configured limits. The returned text
    /// carries the trailing newline of the last line; callers trim.
    pub async fn run(&self, slot: u32, limits: &RunLimits, inner_command: &[String]) -> Result<String> {
        let argv = self.run_argv(slot, limits, inner_command);
        debug!(slot, command = ?inner_command, "Running guest");

        let captured = self.executor.execute(&argv).await?;
        let dropped = captured.lines.iter().filter(|l| is_metadata_line(l)).count();
        if captured.exit_code != 0 {
            debug!(slot, exit_code = captured.exit_code, metadata_lines = dropped, "Guest exited nonzero");
        }

        Ok(guest_output(&captured))
    }

    /// Run a helper command without any isolation flags.
    pub async fn run_plain(&self, argv: &[String]) -> Result<PlainOutput> {
        let captured = self.executor.execute(argv).await?;
        let mut text = String::new();
        for line in &captured.lines {
            text.push_str(line);
            text.push('\n');
        }
        if captured.truncated {
            text.push_str(TRUNCATION_MARKER);
            text.push('\n');
        }
        if captured.exit_code != 0 {
            warn!(command = ?argv.first(), exit_code = captured.exit_code, "Helper command failed");
        }
        Ok(PlainOutput {
            text,
            exit_code: captured.exit_code,
        })
    }
}
