use serde::{Deserialize, Serialize};

use super::{Difficulty, Platform, SubmissionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_id: Option<String>,
    pub problem_title: String,
    pub platform: Platform,
    pub language: String,
    pub difficulty: Difficulty,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl Submission {
    pub fn new(
        problem_title: impl Into<String>,
        platform: Platform,
        language: impl Into<String>,
        difficulty: Difficulty,
        status: SubmissionStatus,
    ) -> Self {
        Self {
            problem_id: None,
            problem_title: problem_title.into(),
            platform,
            language: language.into(),
            difficulty,
            status,
            execution_time: None,
        }
    }

    pub fn with_problem_id(mut self, problem_id: impl Into<String>) -> Self {
        self.problem_id = Some(problem_id.into());
        self
    }

    pub fn with_execution_time(mut self, millis: f64) -> Self {
        self.execution_time = Some(millis);
        self
    }

    pub fn problem_key(&self) -> &str {
        self.problem_id.as_deref().unwrap_or(&self.problem_title)
    }
}
