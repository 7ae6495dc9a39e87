use crate::types::{ExecutionResult, Submission, TestCaseSet};
use redis::{AsyncCommands, RedisResult};

/// Redis semantics shared by the API, the worker and the CLI.
/// Keeps key names and payload encodings in one place so producers and
/// consumers never drift.

pub const SUBMISSION_QUEUE: &str = "code-executor";
pub const RESULT_QUEUE: &str = "code-results";
pub const PROBLEM_PREFIX: &str = "problem:";

/// Stored results expire after 24 hours.
pub const RESULT_TTL_SECS: u64 = 86400;

pub fn inputs_key(problem_name: &str) -> String {
    format!("{}{}:inputs", PROBLEM_PREFIX, problem_name)
}

pub fn outputs_key(problem_name: &str) -> String {
    format!("{}{}:outputs", PROBLEM_PREFIX, problem_name)
}

pub fn result_key(submission_id: &str) -> String {
    format!("{}:{}", RESULT_QUEUE, submission_id)
}

fn encode<T: serde::Serialize>(value: &T) -> RedisResult<String> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
    })
}

fn decode<T: serde::de::DeserializeOwned>(payload: &str) -> RedisResult<T> {
    serde_json::from_str(payload).map_err(|e| {
        redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
    })
}

/// Enqueue a submission. RPUSH + BLPOP gives FIFO delivery.
pub async fn push_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
) -> RedisResult<()> {
    let payload = encode(submission)?;
    conn.rpush(SUBMISSION_QUEUE, payload).await
}

/// Pop the next submission, waiting at most `timeout_seconds`.
///
/// A payload that fails to decode is returned as a `TypeError` so the caller
/// can log and drop it without stopping.
pub async fn pop_submission(
    conn: &mut redis::aio::ConnectionManager,
    timeout_seconds: f64,
) -> RedisResult<Option<Submission>> {
    let popped: Option<(String, String)> = conn.blpop(SUBMISSION_QUEUE, timeout_seconds).await?;

    match popped {
        Some((_key, payload)) => decode(&payload).map(Some),
        None => Ok(None),
    }
}

/// Publish a finished result on the result channel and keep a copy for
/// point lookups.
pub async fn publish_result(
    conn: &mut redis::aio::ConnectionManager,
    result: &ExecutionResult,
) -> RedisResult<()> {
    let payload = encode(result)?;

    let _: () = conn.rpush(RESULT_QUEUE, &payload).await?;
    let _: () = conn
        .set_ex(result_key(&result.submission_id), &payload, RESULT_TTL_SECS)
        .await?;

    Ok(())
}

pub async fn get_result(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &str,
) -> RedisResult<Option<ExecutionResult>> {
    let payload: Option<String> = conn.get(result_key(submission_id)).await?;

    match payload {
        Some(data) => decode(&data).map(Some),
        None => Ok(None),
    }
}

/// Load the test cases of a problem.
///
/// `Ok(None)` when either key is absent. A length mismatch between the two
/// lists is a `TypeError`: the cache was populated inconsistently.
pub async fn load_test_cases(
    conn: &mut redis::aio::ConnectionManager,
    problem_name: &str,
) -> RedisResult<Option<TestCaseSet>> {
    let inputs: Option<String> = conn.get(inputs_key(problem_name)).await?;
    let outputs: Option<String> = conn.get(outputs_key(problem_name)).await?;

    let (inputs, outputs) = match (inputs, outputs) {
        (Some(i), Some(o)) => (decode::<Vec<String>>(&i)?, decode::<Vec<String>>(&o)?),
        _ => return Ok(None),
    };

    let (n_in, n_out) = (inputs.len(), outputs.len());
    TestCaseSet::new(inputs, outputs).map(Some).ok_or_else(|| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "test case count mismatch",
            format!("{}: {} inputs, {} outputs", problem_name, n_in, n_out),
        ))
    })
}

pub async fn store_test_cases(
    conn: &mut redis::aio::ConnectionManager,
    problem_name: &str,
    cases: &TestCaseSet,
) -> RedisResult<()> {
    let _: () = conn.set(inputs_key(problem_name), encode(&cases.inputs())?).await?;
    let _: () = conn.set(outputs_key(problem_name), encode(&cases.outputs())?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_keys() {
        assert_eq!(inputs_key("two-sum"), "problem:two-sum:inputs");
        assert_eq!(outputs_key("two-sum"), "problem:two-sum:outputs");
    }

    #[test]
    fn test_result_key_deterministic() {
        let id = uuid::Uuid::new_v4().to_string();
        let key1 = result_key(&id);
        let key2 = result_key(&id);
        assert_eq!(key1, key2);
        assert!(key1.starts_with("code-results:"));
        assert!(key1.ends_with(&id));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode::<Submission>("not json").is_err());
    }

    async fn connect() -> redis::aio::ConnectionManager {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url.as_str()).unwrap();
        redis::aio::ConnectionManager::new(client).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_test_cases_survive_cache() {
        let mut conn = connect().await;
        let problem = format!("it-{}", uuid::Uuid::new_v4());
        let cases = TestCaseSet::new(vec!["1 2".into(), "3 4".into()], vec!["3".into(), "7".into()]).unwrap();

        store_test_cases(&mut conn, &problem, &cases).await.unwrap();
        let loaded = load_test_cases(&mut conn, &problem).await.unwrap();
        assert_eq!(loaded, Some(cases));

        assert_eq!(load_test_cases(&mut conn, "it-missing-problem").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_published_result_is_retrievable() {
        let mut conn = connect().await;
        let mut result = crate::types::ExecutionResult::error("Test cases not found for x");
        result.submission_id = uuid::Uuid::new_v4().to_string();

        publish_result(&mut conn, &result).await.unwrap();
        let fetched = get_result(&mut conn, &result.submission_id).await.unwrap();
        assert_eq!(fetched, Some(result));
    }
}
