//! Task store: loading, validating and generating experiment datasets.

use prompt_lab_core::{
    CoreError, DatasetError, DatasetSource, Result, Task, TaskId, TaskType,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use validator::Validate;

/// Content field names accepted on input, in order of preference.
const CONTENT_FIELDS: [&str; 3] = ["base_content", "prompt", "input_text"];

/// Immutable, ordered collection of tasks with unique ids.
#[derive(Debug, Clone)]
pub struct TaskStore {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
}

impl TaskStore {
    /// Builds a store after checking ids are unique and every task is valid.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self> {
        if tasks.is_empty() {
            return Err(DatasetError::Empty.into());
        }

        let mut index = HashMap::with_capacity(tasks.len());
        for (position, task) in tasks.iter().enumerate() {
            task.validate().map_err(|e| DatasetError::Invalid {
                id: task.id.to_string(),
                reason: e.to_string(),
            })?;
            if index.insert(task.id.clone(), position).is_some() {
                return Err(DatasetError::DuplicateId(task.id.to_string()).into());
            }
        }

        Ok(Self { tasks, index })
    }

    /// Reads a JSON array of task objects, or JSON Lines when the file
    /// extension is `.jsonl`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(DatasetError::Io)?;

        let is_jsonl = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);

        let records = if is_jsonl {
            parse_jsonl(&content)?
        } else {
            parse_json_array(&content)?
        };

        let tasks = records
            .iter()
            .enumerate()
            .map(|(index, record)| task_from_record(index, record))
            .collect::<Result<Vec<_>>>()?;

        let store = Self::from_tasks(tasks)?;
        info!(path = %path.display(), tasks = store.len(), "Loaded dataset");
        Ok(store)
    }

    /// Resolves a configured dataset source.
    pub async fn from_source(source: &DatasetSource) -> Result<Self> {
        match source {
            DatasetSource::File { path } => Self::load(path).await,
            DatasetSource::Synthetic { count, seed } => Self::synthetic(*count, *seed),
            DatasetSource::Builtin => Ok(Self::builtin()),
        }
    }

    /// Three hand-written demo tasks, one per task family.
    pub fn builtin() -> Self {
        let tasks = vec![
            Task::new(
                "sentiment_1",
                TaskType::Sentiment,
                "I loved the movie, it was fantastic!",
                "positive",
            ),
            Task::new("math_1", TaskType::Math, "What is 7 + 5?", "12"),
            Task::new(
                "logic_1",
                TaskType::Logic,
                "If all A are B, and all B are C, are all A also C?",
                "yes",
            ),
        ];
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self { tasks, index }
    }

    /// Deterministic synthetic dataset cycling through sentiment, math and
    /// logic tasks. The same `(count, seed)` always yields the same tasks.
    pub fn synthetic(count: usize, seed: u64) -> Result<Self> {
        if count == 0 {
            return Err(DatasetError::Empty.into());
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut counters = [0usize; 3];
        let mut tasks = Vec::with_capacity(count);

        for i in 0..count {
            let family = i % 3;
            counters[family] += 1;
            let n = counters[family];
            let task = match family {
                0 => synthetic_sentiment(&mut rng, n),
                1 => synthetic_math(&mut rng, n),
                _ => synthetic_logic(&mut rng, n),
            };
            tasks.push(task);
        }

        info!(count, seed, "Generated synthetic dataset");
        Self::from_tasks(tasks)
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<'a> IntoIterator for &'a TaskStore {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

// ===== Parsing =====

fn parse_json_array(content: &str) -> Result<Vec<Value>> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| DatasetError::Parse(e.to_string()))?;
    match value {
        Value::Array(records) => Ok(records),
        _ => Err(DatasetError::Parse("expected a JSON array of tasks".to_string()).into()),
    }
}

fn parse_jsonl(content: &str) -> Result<Vec<Value>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| CoreError::from(DatasetError::Parse(format!("line {}: {}", i + 1, e))))
        })
        .collect()
}

fn task_from_record(index: usize, record: &Value) -> Result<Task> {
    let object = record
        .as_object()
        .ok_or_else(|| DatasetError::Parse(format!("record {} is not an object", index)))?;

    let id = required_text(object, index, "id")?;
    let task_type = required_text(object, index, "task_type")?;
    let ground_truth = required_text(object, index, "ground_truth")?;
    let content = CONTENT_FIELDS
        .iter()
        .find_map(|field| text_field(object, field))
        .ok_or_else(|| missing(index, "prompt"))?;

    Ok(Task::new(
        id,
        TaskType::from(task_type.as_str()),
        content,
        ground_truth,
    ))
}

/// String or number field; numbers keep their JSON spelling (`12` -> "12").
fn text_field(object: &Map<String, Value>, field: &str) -> Option<String> {
    match object.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(object: &Map<String, Value>, index: usize, field: &str) -> Result<String> {
    text_field(object, field).ok_or_else(|| missing(index, field))
}

fn missing(index: usize, field: &str) -> CoreError {
    DatasetError::MissingField {
        index,
        field: field.to_string(),
    }
    .into()
}

// ===== Synthetic generation =====

const POSITIVE_REVIEWS: [&str; 5] = [
    "I loved the movie, it was fantastic!",
    "The food was delicious and the service was excellent.",
    "This phone exceeded all my expectations.",
    "What a delightful book, I could not put it down.",
    "The concert was amazing from start to finish.",
];

const NEGATIVE_REVIEWS: [&str; 5] = [
    "The product broke after one day of use.",
    "I was bored the entire time and left early.",
    "The hotel room was dirty and the staff were rude.",
    "This was a complete waste of money.",
    "The software keeps crashing and support never answers.",
];

const NOUNS: [&str; 8] = [
    "cats", "dogs", "birds", "robots", "teachers", "artists", "pilots", "farmers",
];

fn synthetic_sentiment(rng: &mut StdRng, n: usize) -> Task {
    let positive = rng.gen_bool(0.5);
    let (bank, label) = if positive {
        (&POSITIVE_REVIEWS, "positive")
    } else {
        (&NEGATIVE_REVIEWS, "negative")
    };
    let text = bank[rng.gen_range(0..bank.len())];
    Task::new(format!("sentiment_{}", n), TaskType::Sentiment, text, label)
}

fn synthetic_math(rng: &mut StdRng, n: usize) -> Task {
    let a: i64 = rng.gen_range(1..=20);
    let b: i64 = rng.gen_range(1..=20);
    let (text, answer) = match rng.gen_range(0..3) {
        0 => (format!("What is {} + {}?", a, b), a + b),
        1 => {
            let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
            (format!("What is {} - {}?", hi, lo), hi - lo)
        }
        _ => (format!("What is {} * {}?", a, b), a * b),
    };
    Task::new(format!("math_{}", n), TaskType::Math, text, answer.to_string())
}

fn pick_noun(rng: &mut StdRng) -> &'static str {
    NOUNS[rng.gen_range(0..NOUNS.len())]
}

fn synthetic_logic(rng: &mut StdRng, n: usize) -> Task {
    let x = pick_noun(rng);
    let mut y = pick_noun(rng);
    while y == x {
        y = pick_noun(rng);
    }
    let mut z = pick_noun(rng);
    while z == x || z == y {
        z = pick_noun(rng);
    }

    let (text, answer) = if rng.gen_bool(0.5) {
        (
            format!("If all {x} are {y}, and all {y} are {z}, are all {x} also {z}?"),
            "yes",
        )
    } else {
        (
            format!("If no {x} are {y}, and all {z} are {x}, can any {z} be {y}?"),
            "no",
        )
    };
    Task::new(format!("logic_{}", n), TaskType::Logic, text, answer)
}
