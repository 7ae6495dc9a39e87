// Worker configuration, built once at startup and shared read-only.
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use verdict_common::types::Language;

/// Resource limits for one guest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub time_secs: u32,
    pub wall_time_secs: u32,
    pub memory_kb: u64,
    pub max_processes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Read-only, skipped by the sandbox when the host path is missing.
    Maybe,
    ReadWrite,
}

/// Host directory exposed inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host: PathBuf,
    pub guest: PathBuf,
    pub mode: MountMode,
}

impl BindMount {
    pub fn read_only(path: &str) -> Self {
        Self {
            host: PathBuf::from(path),
            guest: PathBuf::from(path),
            mode: MountMode::Maybe,
        }
    }

    pub fn read_write(path: &str) -> Self {
        Self {
            host: PathBuf::from(path),
            guest: PathBuf::from(path),
            mode: MountMode::ReadWrite,
        }
    }

    /// Rendered as the isolation utility's `--dir` flag.
    pub fn to_flag(&self) -> String {
        let mode = match self.mode {
            MountMode::Maybe => "maybe",
            MountMode::ReadWrite => "rw",
        };
        format!("--dir={}={}:{}", self.host.display(), self.guest.display(), mode)
    }
}

/// Absolute paths of the compiler and runtimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub java: PathBuf,
    pub javac: PathBuf,
    pub node: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            java: PathBuf::from("/usr/bin/java"),
            javac: PathBuf::from("/usr/bin/javac"),
            node: PathBuf::from("/usr/bin/node"),
        }
    }
}

/// JVM flags sized to fit inside the sandbox memory ceiling.
pub const JVM_FLAGS: &[&str] = &[
    "-Xmx64m",
    "-Xms32m",
    "-XX:MaxMetaspaceSize=32m",
    "-XX:MetaspaceSize=16m",
    "-XX:ReservedCodeCacheSize=16m",
    "-XX:-UseCompressedClassPointers",
    "-XX:+UseSerialGC",
    "-XX:TieredStopAtLevel=1",
];

pub const JAVA_ENTRY_POINT: &str = "Main";

/// Captured output kept per process before truncation.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Everything the sandbox components need. Passed explicitly; nothing in
/// the core reads the environment.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub isolate_binary: String,
    pub sandbox_root: PathBuf,
    pub slot_count: u32,
    pub limits: RunLimits,
    pub jvm_limits: RunLimits,
    pub mounts: Vec<BindMount>,
    pub stdin_file: String,
    pub toolchain: Toolchain,
    pub max_output_bytes: usize,
    pub slot_leasing: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let limits = RunLimits {
            time_secs: 5,
            wall_time_secs: 10,
            memory_kb: 524_288,
            max_processes: 20,
        };
        Self {
            isolate_binary: "isolate".to_string(),
            sandbox_root: PathBuf::from("/var/local/lib/isolate"),
            slot_count: 100,
            limits,
            jvm_limits: RunLimits {
                memory_kb: 1_048_576,
                max_processes: 50,
                ..limits
            },
            mounts: vec![
                BindMount::read_only("/usr/lib/jvm"),
                BindMount::read_only("/usr/share"),
                BindMount::read_only("/usr/bin"),
                BindMount::read_only("/lib"),
                BindMount::read_only("/lib64"),
                BindMount::read_only("/etc"),
                BindMount::read_write("/tmp"),
            ],
            stdin_file: "input.txt".to_string(),
            toolchain: Toolchain::default(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            slot_leasing: false,
        }
    }
}

impl SandboxConfig {
    pub fn limits_for(&self, language: Language) -> RunLimits {
        match language {
            Language::Java => self.jvm_limits,
            Language::JavaScript => self.limits,
        }
    }

    /// Working directory of a slot: `<root>/<slot>/box`.
    pub fn box_path(&self, slot: u32) -> PathBuf {
        self.sandbox_root.join(slot.to_string()).join("box")
    }

    /// Guest command line for one test-case run.
    pub fn run_command(&self, language: Language) -> Vec<String> {
        match language {
            Language::Java => {
                let mut cmd = vec![self.toolchain.java.display().to_string()];
                cmd.extend(JVM_FLAGS.iter().map(|f| f.to_string()));
                cmd.push(JAVA_ENTRY_POINT.to_string());
                cmd
            }
            Language::JavaScript => vec![
                self.toolchain.node.display().to_string(),
                Language::JavaScript.source_file_name().to_string(),
            ],
        }
    }

    /// Compiler command line, `None` for interpreted languages.
    pub fn compile_command(&self, language: Language, box_path: &Path) -> Option<Vec<String>> {
        if !language.is_compiled() {
            return None;
        }
        Some(vec![
            self.toolchain.javac.display().to_string(),
            box_path
                .join(language.source_file_name())
                .display()
                .to_string(),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub concurrency: usize,
    pub testcases_path: Option<PathBuf>,
    pub sandbox: SandboxConfig,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut sandbox = SandboxConfig::default();

        if let Some(bin) = lookup("ISOLATE_BIN") {
            sandbox.isolate_binary = bin;
        }
        if let Some(root) = lookup("SANDBOX_ROOT") {
            sandbox.sandbox_root = PathBuf::from(root);
        }
        sandbox.slot_count = parse_or(&lookup, "SANDBOX_SLOTS", sandbox.slot_count)?;
        if sandbox.slot_count == 0 {
            bail!("SANDBOX_SLOTS must be at least 1");
        }

        sandbox.limits.time_secs = parse_or(&lookup, "TIME_LIMIT_SECS", sandbox.limits.time_secs)?;
        sandbox.limits.wall_time_secs =
            parse_or(&lookup, "WALL_TIME_LIMIT_SECS", sandbox.limits.wall_time_secs)?;
        sandbox.limits.memory_kb = parse_or(&lookup, "MEMORY_LIMIT_KB", sandbox.limits.memory_kb)?;
        sandbox.limits.max_processes =
            parse_or(&lookup, "MAX_PROCESSES", sandbox.limits.max_processes)?;

        sandbox.jvm_limits.time_secs = sandbox.limits.time_secs;
        sandbox.jvm_limits.wall_time_secs = sandbox.limits.wall_time_secs;
        sandbox.jvm_limits.memory_kb =
            parse_or(&lookup, "JVM_MEMORY_LIMIT_KB", sandbox.jvm_limits.memory_kb)?;
        sandbox.jvm_limits.max_processes =
            parse_or(&lookup, "JVM_MAX_PROCESSES", sandbox.jvm_limits.max_processes)?;

        sandbox.max_output_bytes =
            parse_or(&lookup, "MAX_OUTPUT_BYTES", sandbox.max_output_bytes)?;
        if sandbox.max_output_bytes == 0 {
            bail!("MAX_OUTPUT_BYTES must be at least 1");
        }

        sandbox.slot_leasing = lookup("SLOT_LEASING")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let concurrency: usize = parse_or(&lookup, "WORKER_CONCURRENCY", 4)?;

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            concurrency: concurrency.max(1),
            testcases_path: lookup("TESTCASES_PATH").map(PathBuf::from),
            sandbox,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
