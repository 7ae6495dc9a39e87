use serde::{Deserialize, Serialize};
use std::fmt;

/// One submission as delivered by the job transport.
///
/// `language` stays a raw tag here: an unknown tag must still produce a
/// correlated error result, so parsing happens in the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub language: String,
    pub code: String,
    pub problem_name: String,
    #[serde(default)]
    pub problem_id: i64,
    #[serde(default)]
    pub user_id: String,
    pub submission_id: String,
}

/// Supported toolchains. `Java` is compiled ahead of the test loop,
/// `JavaScript` is handed straight to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    JavaScript,
}

impl Language {
    /// Case-insensitive tag lookup; `js` is accepted as an alias.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "java" => Some(Language::Java),
            "javascript" | "js" => Some(Language::JavaScript),
            _ => None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self, Language::Java)
    }

    /// File name the toolchain expects inside the sandbox root.
    pub fn source_file_name(&self) -> &'static str {
        match self {
            Language::Java => "Main.java",
            Language::JavaScript => "main.js",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Java => write!(f, "java"),
            Language::JavaScript => write!(f, "javascript"),
        }
    }
}

/// Ordered (input, expected output) pairs for one problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseSet {
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl TestCaseSet {
    /// Pairs inputs with outputs by position. Returns `None` when the two
    /// sequences differ in length.
    pub fn new(inputs: Vec<String>, outputs: Vec<String>) -> Option<Self> {
        if inputs.len() != outputs.len() {
            return None;
        }
        Some(Self { inputs, outputs })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inputs
            .iter()
            .zip(self.outputs.iter())
            .map(|(i, o)| (i.as_str(), o.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Either a single message or an ordered list of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Message(String),
    List(Vec<String>),
}

/// Outcome of one submission, published on the result channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub data: Option<Payload>,
    pub status: ResultStatus,
    pub error_list: Payload,
    pub submission_id: String,
    pub user_id: String,
    pub problem_id: i64,
}

impl ExecutionResult {
    pub fn success(data: Payload) -> Self {
        Self {
            data: Some(data),
            status: ResultStatus::Success,
            error_list: Payload::List(Vec::new()),
            submission_id: String::new(),
            user_id: String::new(),
            problem_id: 0,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: None,
            status: ResultStatus::Error,
            error_list: Payload::Message(message.into()),
            submission_id: String::new(),
            user_id: String::new(),
            problem_id: 0,
        }
    }

    /// Attach the routing fields of the originating submission.
    pub fn correlated_with(mut self, submission: &Submission) -> Self {
        self.submission_id = submission.submission_id.clone();
        self.user_id = submission.user_id.clone();
        self.problem_id = submission.problem_id;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}
