use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use validator::{Validate, ValidationError};

/// Identifier of a task, unique within a dataset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ===== Task Type =====

/// Kind of classification problem a task poses.
///
/// Unknown type names are preserved verbatim in `Other` so datasets with
/// custom task families still load and round-trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskType {
    Sentiment,
    Math,
    Logic,
    Other(String),
}

impl TaskType {
    pub fn as_str(&self) -> &str {
        match self {
            TaskType::Sentiment => "sentiment",
            TaskType::Math => "math",
            TaskType::Logic => "logic",
            TaskType::Other(name) => name,
        }
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "sentiment" => TaskType::Sentiment,
            "math" => TaskType::Math,
            "logic" => TaskType::Logic,
            _ => TaskType::Other(value.trim().to_string()),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TaskType::from(raw.as_str()))
    }
}

// ===== Task =====

/// A single classification question with its ground-truth answer.
///
/// Tasks are immutable once loaded; run results refer to them by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Task {
    #[validate(custom(function = "non_blank_id"))]
    pub id: TaskId,
    pub task_type: TaskType,
    #[validate(custom(function = "non_blank"))]
    pub ground_truth: String,
    #[serde(alias = "prompt", alias = "input_text")]
    #[validate(custom(function = "non_blank"))]
    pub base_content: String,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        task_type: TaskType,
        base_content: impl Into<String>,
        ground_truth: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task_type,
            ground_truth: ground_truth.into(),
            base_content: base_content.into(),
        }
    }
}

fn non_blank_id(id: &TaskId) -> Result<(), ValidationError> {
    non_blank(id.as_str())
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_round_trips_unknown_names() {
        let parsed: TaskType = serde_json::from_str("\"translation\"").unwrap();
        assert_eq!(parsed, TaskType::Other("translation".to_string()));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"translation\"");
    }

    #[test]
    fn task_type_parsing_is_case_insensitive() {
        assert_eq!(TaskType::from("Sentiment"), TaskType::Sentiment);
        assert_eq!(TaskType::from(" MATH "), TaskType::Math);
    }

    #[test]
    fn prompt_is_accepted_as_content_alias() {
        let task: Task = serde_json::from_str(
            r#"{"id": "t1", "task_type": "logic", "prompt": "Is it?", "ground_truth": "yes"}"#,
        )
        .unwrap();
        assert_eq!(task.base_content, "Is it?");
    }

    #[test]
    fn blank_ground_truth_fails_validation() {
        let task = Task::new("t1", TaskType::Math, "1 + 1?", "  ");
        assert!(task.validate().is_err());
    }

    #[test]
    fn blank_id_fails_validation() {
        let task = Task::new("", TaskType::Math, "1 + 1?", "2");
        assert!(task.validate().is_err());
    }
}
