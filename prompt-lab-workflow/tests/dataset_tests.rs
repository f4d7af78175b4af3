use pretty_assertions::assert_eq;
use prompt_lab_core::*;
use prompt_lab_workflow::TaskStore;
use rstest::rstest;
use std::path::PathBuf;
use tempfile::TempDir;

async fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    tokio::fs::write(&path, content).await.unwrap();
    path
}

#[tokio::test]
async fn test_load_json_array_keeps_file_order() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "tasks.json",
        r#"[
            {"id": "t2", "task_type": "sentiment", "prompt": "Hated it", "ground_truth": "negative"},
            {"id": "t1", "task_type": "math", "base_content": "What is 2 + 2?", "ground_truth": 4}
        ]"#,
    )
    .await;

    let store = TaskStore::load(&path).await.unwrap();
    let ids: Vec<&str> = store.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t2", "t1"]);

    let math = store.get(&TaskId::new("t1")).unwrap();
    assert_eq!(math.task_type, TaskType::Math);
    assert_eq!(math.ground_truth, "4");
    assert_eq!(math.base_content, "What is 2 + 2?");
}

#[tokio::test]
async fn test_load_jsonl_skips_blank_lines() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "tasks.jsonl",
        "{\"id\": \"a\", \"task_type\": \"logic\", \"input_text\": \"Is water wet?\", \"ground_truth\": \"yes\"}\n\n\
         {\"id\": \"b\", \"task_type\": \"trivia\", \"prompt\": \"Capital of France?\", \"ground_truth\": \"paris\"}\n",
    )
    .await;

    let store = TaskStore::load(&path).await.unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get(&TaskId::new("b")).unwrap().task_type,
        TaskType::Other("trivia".to_string())
    );
}

#[rstest]
#[case::missing_id(r#"[{"task_type": "math", "prompt": "1+1", "ground_truth": "2"}]"#, 0, "id")]
#[case::missing_ground_truth(
    r#"[{"id": "a", "task_type": "math", "prompt": "1+1", "ground_truth": "2"},
        {"id": "b", "task_type": "math", "prompt": "2+2"}]"#,
    1,
    "ground_truth"
)]
#[case::missing_content(r#"[{"id": "a", "task_type": "math", "ground_truth": "2"}]"#, 0, "prompt")]
#[tokio::test]
async fn test_missing_field_reports_record_index(
    #[case] content: &str,
    #[case] index: usize,
    #[case] field: &str,
) {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "tasks.json", content).await;

    match TaskStore::load(&path).await {
        Err(CoreError::Dataset(DatasetError::MissingField { index: i, field: f })) => {
            assert_eq!(i, index);
            assert_eq!(f, field);
        }
        other => panic!("expected missing field error, got {:?}", other.map(|s| s.len())),
    }
}

#[tokio::test]
async fn test_duplicate_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "tasks.json",
        r#"[
            {"id": "a", "task_type": "math", "prompt": "1+1", "ground_truth": "2"},
            {"id": "a", "task_type": "math", "prompt": "2+2", "ground_truth": "4"}
        ]"#,
    )
    .await;

    let err = TaskStore::load(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::Dataset(DatasetError::DuplicateId(id)) if id == "a"));
}

#[rstest]
#[case::not_json("tasks.json", "this is not json")]
#[case::not_array("tasks.json", r#"{"id": "a"}"#)]
#[case::bad_line("tasks.jsonl", "{\"id\": \"a\"\n")]
#[tokio::test]
async fn test_malformed_files_are_parse_errors(#[case] name: &str, #[case] content: &str) {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, name, content).await;
    let err = TaskStore::load(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::Dataset(DatasetError::Parse(_))));
}

#[tokio::test]
async fn test_empty_dataset_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "tasks.json", "[]").await;
    let err = TaskStore::load(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::Dataset(DatasetError::Empty)));
}

#[tokio::test]
async fn test_blank_ground_truth_is_invalid() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "tasks.json",
        r#"[{"id": "a", "task_type": "math", "prompt": "1+1", "ground_truth": "   "}]"#,
    )
    .await;
    let err = TaskStore::load(&path).await.unwrap_err();
    assert!(matches!(err, CoreError::Dataset(DatasetError::Invalid { .. })));
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let err = TaskStore::load("/definitely/not/here.json").await.unwrap_err();
    assert!(matches!(err, CoreError::Dataset(DatasetError::Io(_))));
}

// ===== Generated datasets =====

#[test]
fn test_synthetic_is_reproducible_per_seed() {
    let first = TaskStore::synthetic(12, 42).unwrap();
    let second = TaskStore::synthetic(12, 42).unwrap();
    let other = TaskStore::synthetic(12, 43).unwrap();

    assert_eq!(first.tasks(), second.tasks());
    assert_ne!(first.tasks(), other.tasks());
}

#[test]
fn test_synthetic_cycles_task_families() {
    let store = TaskStore::synthetic(6, 1).unwrap();
    let ids: Vec<&str> = store.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["sentiment_1", "math_1", "logic_1", "sentiment_2", "math_2", "logic_2"]
    );
    for task in &store {
        match task.task_type {
            TaskType::Sentiment => assert!(["positive", "negative"].contains(&task.ground_truth.as_str())),
            TaskType::Logic => assert!(["yes", "no"].contains(&task.ground_truth.as_str())),
            TaskType::Math => assert!(task.ground_truth.parse::<i64>().is_ok()),
            TaskType::Other(_) => panic!("unexpected task family"),
        }
    }
}

#[test]
fn test_synthetic_zero_count_is_empty_error() {
    assert!(matches!(
        TaskStore::synthetic(0, 1),
        Err(CoreError::Dataset(DatasetError::Empty))
    ));
}

#[tokio::test]
async fn test_from_source_resolves_every_kind() {
    let builtin = TaskStore::from_source(&DatasetSource::Builtin).await.unwrap();
    assert_eq!(builtin.len(), 3);

    let synthetic = TaskStore::from_source(&DatasetSource::Synthetic { count: 5, seed: 9 })
        .await
        .unwrap();
    assert_eq!(synthetic.len(), 5);

    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "tasks.json",
        r#"[{"id": "x", "task_type": "logic", "prompt": "Is it?", "ground_truth": "yes"}]"#,
    )
    .await;
    let file = TaskStore::from_source(&DatasetSource::File { path }).await.unwrap();
    assert_eq!(file.len(), 1);
}
