mod classifier;
mod config;
mod engine;
mod engine_tests;
mod error;
mod evaluator;
mod executor;
mod sandbox;
mod slots;
mod store;
mod toolchain;

use config::{SandboxConfig, WorkerConfig};
use engine::{IsolateEngine, ProcessExecutor};
use executor::Executor;
use sandbox::SandboxManager;
use std::path::Path;
use std::sync::Arc;
use store::RedisStore;
use tokio::signal;
use tracing::{error, info, instrument, warn};
use verdict_common::{fixtures, redis};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Verdict worker booting...");

    let WorkerConfig {
        redis_url,
        concurrency,
        testcases_path,
        sandbox,
    } = WorkerConfig::from_env()?;

    // Resolve toolchain paths once; the config is frozen afterwards.
    let process_executor = Arc::new(ProcessExecutor::new(sandbox.max_output_bytes));
    let discovery = IsolateEngine::new(process_executor.clone(), Arc::new(sandbox.clone()));
    let toolchain = toolchain::discover(&discovery, &sandbox.toolchain).await;
    let sandbox = Arc::new(SandboxConfig { toolchain, ..sandbox });

    info!(
        isolate = %sandbox.isolate_binary,
        sandbox_root = %sandbox.sandbox_root.display(),
        slots = sandbox.slot_count,
        time_secs = sandbox.limits.time_secs,
        wall_time_secs = sandbox.limits.wall_time_secs,
        memory_kb = sandbox.limits.memory_kb,
        jvm_memory_kb = sandbox.jvm_limits.memory_kb,
        max_output_bytes = sandbox.max_output_bytes,
        slot_leasing = sandbox.slot_leasing,
        "Sandbox configured"
    );

    // Connect to Redis
    let client = ::redis::Client::open(redis_url.as_str())?;
    let redis_conn = ::redis::aio::ConnectionManager::new(client).await?;
    info!("Connected to Redis: {}", redis_url);

    if let Some(path) = testcases_path.as_deref() {
        load_fixtures(&mut redis_conn.clone(), path).await;
    }

    let engine = IsolateEngine::new(process_executor, sandbox);
    let executor = Arc::new(Executor::new(
        Arc::new(RedisStore::new(redis_conn.clone())),
        SandboxManager::new(engine),
    ));

    let workers: Vec<_> = (0..concurrency)
        .map(|worker_id| {
            let executor = executor.clone();
            let conn = redis_conn.clone();
            tokio::spawn(async move { worker_loop(worker_id, conn, executor).await })
        })
        .collect();
    info!(workers = concurrency, "Worker pool started");

    // Setup graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        warn!("Received shutdown signal, stopping workers...");
    };

    tokio::select! {
        _ = futures_util::future::join_all(workers) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

/// Read fixture directories and publish them to the test-case cache.
/// Problems that fail to load are logged and skipped.
async fn load_fixtures(conn: &mut ::redis::aio::ConnectionManager, base: &Path) {
    let base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    info!(path = %base.display(), "Loading test cases");

    let problems = match fixtures::read_fixtures(&base) {
        Ok(problems) => problems,
        Err(e) => {
            error!(path = %base.display(), error = %e, "Failed to read test case fixtures");
            return;
        }
    };

    for problem in problems {
        match problem {
            Ok(fixture) => match redis::store_test_cases(conn, &fixture.problem_name, &fixture.cases).await {
                Ok(()) => info!(
                    problem = %fixture.problem_name,
                    cases = fixture.cases.len(),
                    "Loaded test cases into cache"
                ),
                Err(e) => error!(problem = %fixture.problem_name, error = %e, "Failed to cache test cases"),
            },
            Err(reason) => warn!(reason = %reason, "Skipping malformed fixture"),
        }
    }
}

#[instrument(skip(redis_conn, executor))]
async fn worker_loop(
    worker_id: usize,
    mut redis_conn: ::redis::aio::ConnectionManager,
    executor: Arc<Executor>,
) {
    loop {
        // BLPOP with 5 second timeout so shutdown is noticed
        match redis::pop_submission(&mut redis_conn, 5.0).await {
            Ok(Some(submission)) => {
                info!(
                    submission_id = %submission.submission_id,
                    problem = %submission.problem_name,
                    language = %submission.language,
                    source_size = submission.code.len(),
                    "Received submission"
                );

                let start = std::time::Instant::now();
                let result = executor.execute(&submission).await;

                info!(
                    submission_id = %submission.submission_id,
                    status = ?result.status,
                    execution_ms = start.elapsed().as_millis() as u64,
                    "Execution completed"
                );

                match redis::publish_result(&mut redis_conn, &result).await {
                    Ok(()) => info!(submission_id = %result.submission_id, "Result published"),
                    Err(e) => {
                        // Non-fatal - redelivery is the transport's concern
                        error!(submission_id = %result.submission_id, error = %e, "Failed to publish result");
                    }
                }
            }
            Ok(None) => continue,
            Err(e) if e.kind() == ::redis::ErrorKind::TypeError => {
                warn!(error = %e, "Dropping malformed submission");
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}
