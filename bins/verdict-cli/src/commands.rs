// CLI commands for operating Verdict
use anyhow::{bail, Context, Result};
use redis::aio::ConnectionManager;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use uuid::Uuid;
use verdict_common::fixtures;
use verdict_common::types::{Language, Submission};

const TOOLCHAIN: [&str; 3] = ["java", "javac", "node"];

/// Resolved toolchain as printed by `discover --json`
#[derive(Debug, Serialize)]
pub struct DiscoveredToolchain {
    pub java: Option<PathBuf>,
    pub javac: Option<PathBuf>,
    pub node: Option<PathBuf>,
}

async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .with_context(|| format!("Invalid Redis URL: {}", redis_url))?;
    ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", redis_url))
}

/// Load every problem under `path` into the test-case cache
pub async fn load_testcases(redis_url: &str, path: &Path) -> Result<()> {
    let base = path
        .canonicalize()
        .with_context(|| format!("Fixture directory not found: {}", path.display()))?;
    println!("📂 Loading test cases from {}", base.display());

    let problems = fixtures::read_fixtures(&base)
        .with_context(|| format!("Failed to read {}", base.display()))?;
    let mut conn = connect(redis_url).await?;

    let (mut loaded, mut skipped) = (0usize, 0usize);
    for problem in problems {
        match problem {
            Ok(fixture) => {
                verdict_common::redis::store_test_cases(&mut conn, &fixture.problem_name, &fixture.cases)
                    .await
                    .with_context(|| format!("Failed to cache {}", fixture.problem_name))?;
                println!("  ✓ {} ({} test cases)", fixture.problem_name, fixture.cases.len());
                loaded += 1;
            }
            Err(reason) => {
                println!("  ✗ {}", reason);
                skipped += 1;
            }
        }
    }

    println!("\n✅ Loaded {} problem(s), skipped {}", loaded, skipped);
    Ok(())
}

/// Build the queued submission for a source file
fn build_submission(
    language: &str,
    code: String,
    problem_name: &str,
    problem_id: i64,
    user_id: &str,
) -> Result<Submission> {
    if Language::from_tag(language).is_none() {
        bail!("Unsupported language: {} (expected java, javascript or js)", language);
    }
    if problem_name.trim().is_empty() {
        bail!("Problem name cannot be empty");
    }

    Ok(Submission {
        language: language.to_string(),
        code,
        problem_name: problem_name.to_string(),
        problem_id,
        user_id: user_id.to_string(),
        submission_id: Uuid::new_v4().to_string(),
    })
}

/// Queue a source file for judging
pub async fn submit(
    redis_url: &str,
    language: &str,
    file: &Path,
    problem_name: &str,
    problem_id: i64,
    user_id: &str,
) -> Result<()> {
    let code = fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file {}", file.display()))?;
    let submission = build_submission(language, code, problem_name, problem_id, user_id)?;

    let mut conn = connect(redis_url).await?;
    verdict_common::redis::push_submission(&mut conn, &submission)
        .await
        .context("Failed to queue submission")?;

    println!("🚀 Submission queued");
    println!("   ID:       {}", submission.submission_id);
    println!("   Problem:  {}", submission.problem_name);
    println!("   Language: {}", submission.language);
    println!("\nResult key: {}", verdict_common::redis::result_key(&submission.submission_id));
    Ok(())
}

/// Print where each toolchain binary resolves on this host
pub fn discover(json: bool) -> Result<()> {
    let found = DiscoveredToolchain {
        java: locate("java")?,
        javac: locate("javac")?,
        node: locate("node")?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    println!("🔍 Toolchain discovery");
    for (name, path) in TOOLCHAIN.iter().zip([&found.java, &found.javac, &found.node]) {
        match path {
            Some(path) => println!("  {:<6} {}", name, path.display()),
            None => println!("  {:<6} not found (worker falls back to /usr/bin/{})", name, name),
        }
    }
    Ok(())
}

fn locate(name: &str) -> Result<Option<PathBuf>> {
    let which = Command::new("which")
        .arg(name)
        .output()
        .context("Failed to run which")?;
    let found = String::from_utf8_lossy(&which.stdout).trim().to_string();
    if !which.status.success() || found.is_empty() {
        debug!(executable = name, "which found nothing");
        return Ok(None);
    }

    let real = Command::new("readlink")
        .args(["-f", &found])
        .output()
        .context("Failed to run readlink")?;
    let real = PathBuf::from(String::from_utf8_lossy(&real.stdout).trim());
    debug!(executable = name, which = %found, resolved = %real.display(), "Resolved executable");

    Ok(real.exists().then_some(real))
}
