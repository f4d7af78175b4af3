//! Terminal rendering: summary tables and run progress.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use prompt_lab_core::Task;
use prompt_lab_storage::INSUFFICIENT_DATA;
use prompt_lab_workflow::{Evaluation, ExecutionProgress};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const MAX_CONTENT_CHARS: usize = 60;

fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn optional_percent(value: Option<f64>) -> String {
    value.map(percent).unwrap_or_else(|| "-".to_string())
}

pub fn print_evaluation(evaluation: &Evaluation) {
    let summary = &evaluation.summary;

    let mut accuracy = table(&[
        "Strategy",
        "Length",
        "Attempts",
        "Exact",
        "Accuracy",
        "Errors",
        "Error rate",
        "Lenient",
        "Distance",
        "p50 latency (ms)",
    ]);
    for group in &summary.groups {
        accuracy.add_row(vec![
            Cell::new(group.strategy),
            Cell::new(group.length_class),
            Cell::new(group.attempts),
            Cell::new(group.exact_matches),
            Cell::new(percent(group.accuracy)),
            Cell::new(group.errors).fg(if group.errors > 0 { Color::Red } else { Color::Reset }),
            Cell::new(percent(group.error_rate)),
            Cell::new(percent(group.lenient_accuracy)),
            Cell::new(
                group
                    .mean_semantic_distance
                    .map(|d| format!("{:.3}", d))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(format!("{:.0}", group.latency_ms.median)),
        ]);
    }
    println!("Accuracy by strategy and length\n{accuracy}");

    let mut sensitivity = table(&["Strategy", "Short", "Medium", "Long", "Spread", "Non-monotonic"]);
    for curve in &summary.sensitivity {
        let mut row = vec![Cell::new(curve.strategy)];
        row.extend(curve.points.iter().map(|p| Cell::new(optional_percent(p.accuracy))));
        row.push(Cell::new(optional_percent(curve.spread)));
        row.push(Cell::new(if curve.non_monotonic { "yes" } else { "no" }));
        sensitivity.add_row(row);
    }
    println!("\nLength sensitivity\n{sensitivity}");

    if !summary.disagreement.is_empty() {
        let mut disagreement = table(&["Length", "Strategy A", "Strategy B", "Shared", "Differing", "Rate"]);
        for entry in &summary.disagreement {
            disagreement.add_row(vec![
                Cell::new(entry.length_class),
                Cell::new(entry.strategy_a),
                Cell::new(entry.strategy_b),
                Cell::new(entry.shared),
                Cell::new(entry.differing),
                Cell::new(
                    entry
                        .rate
                        .map(percent)
                        .unwrap_or_else(|| INSUFFICIENT_DATA.to_string()),
                ),
            ]);
        }
        println!("\nPairwise disagreement\n{disagreement}");
    }

    let comparisons = &evaluation.comparisons;
    if !comparisons.flips.is_empty() {
        let mut flips = table(&["Candidate", "Pairs", "Improved", "Worsened", "Same", "Sign test p"]);
        for flip in &comparisons.flips {
            flips.add_row(vec![
                Cell::new(flip.candidate),
                Cell::new(flip.pairs),
                Cell::new(flip.improved).fg(Color::Green),
                Cell::new(flip.worsened).fg(Color::Red),
                Cell::new(flip.same),
                Cell::new(
                    flip.sign_test
                        .p_value
                        .map(|p| format!("{:.4}", p))
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ]);
        }
        println!("\nChanges against baseline\n{flips}");
    }

    let totals = &summary.totals;
    println!(
        "\nTotal: {} task(s), {} attempt(s), accuracy {}, error rate {}",
        totals.tasks,
        totals.attempts,
        optional_percent(totals.accuracy),
        optional_percent(totals.error_rate),
    );
}

pub fn print_tasks(tasks: &[Task]) {
    let mut listing = table(&["Id", "Type", "Ground truth", "Content"]);
    for task in tasks {
        let mut content: String = task.base_content.chars().take(MAX_CONTENT_CHARS).collect();
        if task.base_content.chars().count() > MAX_CONTENT_CHARS {
            content.push('…');
        }
        listing.add_row(vec![
            Cell::new(&task.id),
            Cell::new(&task.task_type),
            Cell::new(&task.ground_truth),
            Cell::new(content),
        ]);
    }
    println!("{listing}");
    println!("\nTotal: {} task(s)", tasks.len());
}

/// Drives a progress bar from executor progress events until the channel
/// closes.
pub fn spawn_progress_bar(
    mut events: broadcast::Receiver<ExecutionProgress>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏ ");
        bar.set_style(style);

        let mut failed = 0usize;
        loop {
            match events.recv().await {
                Ok(event) => {
                    bar.set_length(event.total as u64);
                    bar.set_position(event.completed as u64);
                    if event.failed {
                        failed += 1;
                    }
                    bar.set_message(format!("{} failed", failed));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        bar.finish_and_clear();
    })
}
