use async_trait::async_trait;
use pretty_assertions::assert_eq;
use prompt_lab_core::*;
use prompt_lab_metrics::Evaluator;
use prompt_lab_storage::MemorySink;
use prompt_lab_workflow::*;
use rstest::rstest;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn two_tasks() -> Vec<Task> {
    vec![
        Task::new("t1", TaskType::Sentiment, "Loved every minute of it.", "positive"),
        Task::new("t2", TaskType::Sentiment, "Terrible, I walked out.", "negative"),
    ]
}

fn executor(port: Arc<dyn ModelQueryPort>, sink: Arc<dyn ResultSink>, concurrency: usize) -> RunExecutor {
    RunExecutor::new(
        port,
        sink,
        ExecutorConfig {
            max_concurrency: concurrency,
            ..Default::default()
        },
    )
}

/// Sink that rejects every append.
struct BrokenSink;

#[async_trait]
impl ResultSink for BrokenSink {
    async fn append(&self, _result: &RunResult) -> Result<()> {
        Err(CoreError::Storage("disk full".to_string()))
    }
}

/// Port that cancels a token on its first call, then answers normally.
struct CancelOnFirstCall {
    token: CancellationToken,
}

#[async_trait]
impl ModelQueryPort for CancelOnFirstCall {
    async fn query(
        &self,
        _prompt: &str,
        _options: &QueryOptions,
    ) -> std::result::Result<QueryResponse, QueryError> {
        self.token.cancel();
        Ok(QueryResponse {
            text: "positive".to_string(),
            latency_ms: 0,
            token_usage: None,
        })
    }

    fn name(&self) -> &str {
        "cancel-on-first-call"
    }
}

/// Stub that sleeps before answering, so completion order varies.
struct SlowStub {
    inner: StubProvider,
    delay: std::time::Duration,
}

#[async_trait]
impl ModelQueryPort for SlowStub {
    async fn query(
        &self,
        prompt: &str,
        options: &QueryOptions,
    ) -> std::result::Result<QueryResponse, QueryError> {
        tokio::time::sleep(self.delay * (prompt.len() % 3) as u32).await;
        self.inner.query(prompt, options).await
    }

    fn name(&self) -> &str {
        "slow-stub"
    }
}

// ===== Determinism =====

#[rstest]
#[case(1)]
#[case(3)]
#[case(16)]
#[tokio::test]
async fn test_stub_runs_are_identical_across_executions(#[case] concurrency: usize) {
    let store = TaskStore::synthetic(9, 7).unwrap();

    let run = || async {
        let sink = Arc::new(MemorySink::new());
        executor(Arc::new(StubProvider::new()), sink, concurrency)
            .execute(store.tasks(), &Strategy::ALL, &LengthClass::ALL)
            .await
            .unwrap()
    };
    let first = run().await;
    let second = run().await;

    assert_eq!(first.len(), 9 * Strategy::ALL.len() * LengthClass::ALL.len());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[rstest]
#[case(1)]
#[case(4)]
#[tokio::test]
async fn test_runs_with_failures_are_identical_across_executions(#[case] concurrency: usize) {
    let tasks: Vec<Task> = (0..10)
        .map(|i| Task::new(format!("t{i}"), TaskType::Logic, format!("Is item {i} in stock?"), "yes"))
        .collect();

    let run = || async {
        let port = SlowStub {
            inner: StubProvider::new().with_failure(QueryErrorKind::Timeout, |p| {
                p.contains("item 3 ") || p.contains("item 7 ")
            }),
            delay: std::time::Duration::from_millis(2),
        };
        executor(Arc::new(port), Arc::new(MemorySink::new()), concurrency)
            .execute(&tasks, &[Strategy::Baseline], &LengthClass::ALL)
            .await
            .unwrap()
    };
    let first = run().await;
    let second = run().await;

    assert_eq!(first.len(), 30);
    let failed: Vec<&RunResult> = first.iter().filter(|r| r.is_error()).collect();
    assert_eq!(failed.len(), 6);
    assert!(failed.iter().all(|r| r.latency_ms == 0));
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn test_failure_latency_comes_from_the_port() {
    struct ReportsLatency;

    #[async_trait]
    impl ModelQueryPort for ReportsLatency {
        async fn query(
            &self,
            _prompt: &str,
            _options: &QueryOptions,
        ) -> std::result::Result<QueryResponse, QueryError> {
            Err(QueryError::new(QueryErrorKind::RateLimited, "slow down").with_latency(42))
        }

        fn name(&self) -> &str {
            "reports-latency"
        }
    }

    let results = executor(Arc::new(ReportsLatency), Arc::new(MemorySink::new()), 2)
        .execute(&two_tasks(), &[Strategy::Baseline], &[LengthClass::Short])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.latency_ms, 42);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(QueryErrorKind::RateLimited));
    }
}

#[tokio::test]
async fn test_result_set_does_not_depend_on_worker_count() {
    let store = TaskStore::synthetic(6, 3).unwrap();
    let mut sets = Vec::new();
    for concurrency in [1, 2, 8] {
        let results = executor(Arc::new(StubProvider::new()), Arc::new(MemorySink::new()), concurrency)
            .execute(store.tasks(), &Strategy::ALL, &LengthClass::ALL)
            .await
            .unwrap();
        sets.push(results);
    }
    assert_eq!(sets[0], sets[1]);
    assert_eq!(sets[1], sets[2]);
}

#[tokio::test]
async fn test_results_are_sorted_by_run_key() {
    let tasks = vec![
        Task::new("b", TaskType::Math, "What is 1 + 1?", "2"),
        Task::new("a", TaskType::Math, "What is 2 + 2?", "4"),
    ];
    let results = executor(Arc::new(StubProvider::new()), Arc::new(MemorySink::new()), 4)
        .execute(&tasks, &[Strategy::React, Strategy::Baseline], &[LengthClass::Long, LengthClass::Short])
        .await
        .unwrap();

    let keys: Vec<RunKey> = results.iter().map(RunResult::key).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    assert_eq!(keys[0], RunKey::new(TaskId::new("a"), Strategy::Baseline, LengthClass::Short));
}

#[tokio::test]
async fn test_repeated_task_ids_run_once() {
    let mut tasks = two_tasks();
    tasks.push(Task::new("t1", TaskType::Sentiment, "A second copy of t1.", "positive"));

    let stub = Arc::new(StubProvider::new());
    let results = executor(stub.clone(), Arc::new(MemorySink::new()), 2)
        .execute(&tasks, &[Strategy::Baseline], &[LengthClass::Short])
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(stub.calls(), 2);
    let keys: Vec<&str> = results.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(keys, vec!["t1", "t2"]);
}

#[tokio::test]
async fn test_duplicate_strategies_and_lengths_are_collapsed() {
    let results = executor(Arc::new(StubProvider::new()), Arc::new(MemorySink::new()), 2)
        .execute(
            &two_tasks(),
            &[Strategy::FewShot, Strategy::FewShot, Strategy::Baseline],
            &[LengthClass::Short, LengthClass::Short],
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 4);
}

// ===== Recording =====

#[tokio::test]
async fn test_single_worker_records_in_canonical_order() {
    let sink = Arc::new(MemorySink::new());
    executor(Arc::new(StubProvider::new()), sink.clone(), 1)
        .execute(
            &two_tasks(),
            &[Strategy::FewShot, Strategy::Baseline],
            &[LengthClass::Long, LengthClass::Short],
        )
        .await
        .unwrap();

    let recorded: Vec<RunKey> = sink.results().await.iter().map(RunResult::key).collect();
    let expected: Vec<RunKey> = ["t1", "t2"]
        .into_iter()
        .flat_map(|task| {
            [Strategy::Baseline, Strategy::FewShot].into_iter().flat_map(move |strategy| {
                [LengthClass::Short, LengthClass::Long]
                    .into_iter()
                    .map(move |length| RunKey::new(TaskId::new(task), strategy, length))
            })
        })
        .collect();
    assert_eq!(recorded, expected);
}

#[tokio::test]
async fn test_every_result_reaches_the_sink() {
    let sink = Arc::new(MemorySink::new());
    let results = executor(Arc::new(StubProvider::new()), sink.clone(), 4)
        .execute(&two_tasks(), &Strategy::ALL, &LengthClass::ALL)
        .await
        .unwrap();

    let mut recorded = sink.results().await;
    recorded.sort_by_key(RunResult::key);
    assert_eq!(recorded, results);
}

#[tokio::test]
async fn test_sink_failure_aborts_execution() {
    let err = executor(Arc::new(StubProvider::new()), Arc::new(BrokenSink), 2)
        .execute(&two_tasks(), &[Strategy::Baseline], &[LengthClass::Short])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Storage(msg) if msg.contains("disk full")));
}

// ===== Failure isolation =====

#[tokio::test]
async fn test_constant_provider_scenario_end_to_end() {
    let tasks = two_tasks();
    let results = executor(Arc::new(StubProvider::constant("positive")), Arc::new(MemorySink::new()), 2)
        .execute(&tasks, &[Strategy::Baseline, Strategy::FewShot], &[LengthClass::Short])
        .await
        .unwrap();

    let summary = Evaluator::from_tasks(&tasks).summarize(&results).unwrap();
    assert_eq!(summary.accuracy(Strategy::Baseline, LengthClass::Short), Some(0.5));
    assert_eq!(summary.accuracy(Strategy::FewShot, LengthClass::Short), Some(0.5));
    assert_eq!(
        summary.disagreement(Strategy::Baseline, Strategy::FewShot, LengthClass::Short),
        Some(0.0)
    );
}

#[tokio::test]
async fn test_single_injected_failure_is_isolated() {
    let tasks = two_tasks();
    let strategies = [Strategy::Baseline, Strategy::FewShot];

    let clean = executor(Arc::new(StubProvider::constant("positive")), Arc::new(MemorySink::new()), 4)
        .execute(&tasks, &strategies, &[LengthClass::Short])
        .await
        .unwrap();

    // Only the short few-shot prompt for t2 ends with its content and the arrow.
    let failing = StubProvider::constant("positive").with_failure(QueryErrorKind::Timeout, |prompt| {
        prompt.ends_with("Terrible, I walked out. =>")
    });
    let faulty = executor(Arc::new(failing), Arc::new(MemorySink::new()), 4)
        .execute(&tasks, &strategies, &[LengthClass::Short])
        .await
        .unwrap();

    assert_eq!(faulty.len(), clean.len());
    let failed_key = RunKey::new(TaskId::new("t2"), Strategy::FewShot, LengthClass::Short);
    for (before, after) in clean.iter().zip(&faulty) {
        if after.key() == failed_key {
            assert_eq!(after.error.as_ref().map(|e| e.kind), Some(QueryErrorKind::Timeout));
            assert!(after.raw_output.is_none());
        } else {
            assert_eq!(before, after);
        }
    }

    let summary = Evaluator::from_tasks(&tasks).summarize(&faulty).unwrap();
    let few_shot = summary.group(Strategy::FewShot, LengthClass::Short).unwrap();
    assert_eq!(few_shot.attempts, 2);
    assert_eq!(few_shot.exact_matches, 0);
    assert_eq!(few_shot.accuracy, 0.0);
    assert_eq!(few_shot.error_rate, 0.5);
    assert_eq!(
        summary.disagreement(Strategy::Baseline, Strategy::FewShot, LengthClass::Short),
        Some(0.0)
    );
}

// ===== Cancellation and progress =====

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let stub = Arc::new(StubProvider::new());
    let sink = Arc::new(MemorySink::new());
    let executor = executor(stub.clone(), sink.clone(), 2);
    executor.cancellation_token().cancel();

    let results = executor
        .execute(&two_tasks(), &Strategy::ALL, &LengthClass::ALL)
        .await
        .unwrap();

    assert!(results.is_empty());
    assert_eq!(stub.calls(), 0);
    assert!(sink.is_empty().await);
}

#[tokio::test]
async fn test_cancellation_keeps_in_flight_result() {
    let token = CancellationToken::new();
    let sink = Arc::new(MemorySink::new());
    let executor = executor(
        Arc::new(CancelOnFirstCall { token: token.clone() }),
        sink.clone(),
        1,
    )
    .with_cancellation(token);

    let results = executor
        .execute(&two_tasks(), &Strategy::ALL, &LengthClass::ALL)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(sink.results().await, results);
    assert_eq!(
        results[0].key(),
        RunKey::new(TaskId::new("t1"), Strategy::Baseline, LengthClass::Short)
    );
}

#[tokio::test]
async fn test_progress_reports_every_triple() {
    let executor = executor(Arc::new(StubProvider::new()), Arc::new(MemorySink::new()), 3);
    let mut progress = executor.subscribe_progress();

    let results = executor
        .execute(&two_tasks(), &Strategy::ALL, &[LengthClass::Medium])
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = progress.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), results.len());
    assert!(events.iter().all(|e| e.total == results.len()));
    assert_eq!(events.iter().map(|e| e.completed).max(), Some(results.len()));
}
