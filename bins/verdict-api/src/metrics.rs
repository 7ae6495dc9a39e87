// Prometheus counters for the submission API

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref SUBMISSIONS_ENQUEUED: IntCounterVec = register_int_counter_vec!(
        "verdict_submissions_enqueued_total",
        "Submissions accepted onto the execution queue",
        &["language"]
    )
    .unwrap();
    pub static ref ENQUEUE_FAILURES: IntCounter = register_int_counter!(
        "verdict_enqueue_failures_total",
        "Submissions that could not be written to the execution queue"
    )
    .unwrap();
    pub static ref RESULT_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "verdict_result_lookups_total",
        "Result lookups by outcome",
        &["outcome"]
    )
    .unwrap();
}

/// Render every registered metric in the text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
