// Read-only access to the test-case cache
use anyhow::{Context, Result};
use async_trait::async_trait;
use verdict_common::types::TestCaseSet;

#[async_trait]
pub trait TestCaseStore: Send + Sync {
    /// `Ok(None)` when the problem has no cached test cases.
    async fn fetch(&self, problem_name: &str) -> Result<Option<TestCaseSet>>;
}

/// Test cases stored in Redis under `problem:<name>:{inputs,outputs}`.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TestCaseStore for RedisStore {
    async fn fetch(&self, problem_name: &str) -> Result<Option<TestCaseSet>> {
        let mut conn = self.conn.clone();
        verdict_common::redis::load_test_cases(&mut conn, problem_name)
            .await
            .with_context(|| format!("Failed to load test cases for {}", problem_name))
    }
}
