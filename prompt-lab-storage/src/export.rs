//! Machine-readable export of a metrics summary: JSON, CSV tables and a
//! checksummed manifest.

use chrono::{DateTime, Utc};
use csv::{Terminator, WriterBuilder};
use prompt_lab_core::{CoreError, Result};
use prompt_lab_metrics::{ComparisonReport, FlipAnalysis, MetricsSummary};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::artifacts::{detect_content_type, ArtifactMetadata};

pub const SUMMARY_FILE: &str = "summary.json";
pub const ACCURACY_FILE: &str = "accuracy.csv";
pub const DISAGREEMENT_FILE: &str = "disagreement.csv";
pub const SENSITIVITY_FILE: &str = "sensitivity.csv";
pub const FLIPS_FILE: &str = "flips.csv";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Written in place of an undefined disagreement rate.
pub const INSUFFICIENT_DATA: &str = "insufficient data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedFile {
    pub name: String,
    #[serde(flatten)]
    pub metadata: ArtifactMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub experiment_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<ExportedFile>,
}

impl ExportManifest {
    pub fn file(&self, name: &str) -> Option<&ExportedFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    experiment_id: Uuid,
    summary: &'a MetricsSummary,
    comparisons: &'a ComparisonReport,
}

/// Writes summary files into one output directory.
pub struct SummaryExporter {
    dir: PathBuf,
}

impl SummaryExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn export(
        &self,
        experiment_id: Uuid,
        summary: &MetricsSummary,
        comparisons: &ComparisonReport,
    ) -> Result<ExportManifest> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            CoreError::Storage(format!("failed to create {}: {}", self.dir.display(), e))
        })?;

        let document = SummaryDocument {
            experiment_id,
            summary,
            comparisons,
        };
        let outputs = vec![
            (SUMMARY_FILE, serde_json::to_vec_pretty(&document)?),
            (ACCURACY_FILE, accuracy_csv(summary)?.into_bytes()),
            (DISAGREEMENT_FILE, disagreement_csv(summary)?.into_bytes()),
            (SENSITIVITY_FILE, sensitivity_csv(summary)?.into_bytes()),
            (FLIPS_FILE, flips_csv(&comparisons.flips)?.into_bytes()),
        ];

        let mut files = Vec::with_capacity(outputs.len());
        for (name, data) in outputs {
            self.write(name, &data).await?;
            files.push(ExportedFile {
                name: name.to_string(),
                metadata: ArtifactMetadata::new(&data, detect_content_type(name)),
            });
        }

        let manifest = ExportManifest {
            experiment_id,
            generated_at: Utc::now(),
            files,
        };
        self.write(MANIFEST_FILE, &serde_json::to_vec_pretty(&manifest)?)
            .await?;

        info!(
            dir = %self.dir.display(),
            files = manifest.files.len(),
            %experiment_id,
            "Exported summary"
        );
        Ok(manifest)
    }

    async fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, data).await.map_err(|e| {
            CoreError::Storage(format!("failed to write {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), bytes = data.len(), "Wrote export file");
        Ok(())
    }
}

// ===== CSV rendering =====

fn csv_error(err: impl std::fmt::Display) -> CoreError {
    CoreError::Storage(format!("failed to render CSV: {}", err))
}

fn render_table<I>(header: &[&str], rows: I) -> Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut wtr = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(header).map_err(csv_error)?;
    for row in rows {
        wtr.write_record(&row).map_err(csv_error)?;
    }
    let bytes = wtr.into_inner().map_err(csv_error)?;
    String::from_utf8(bytes).map_err(csv_error)
}

fn number(value: f64) -> String {
    format!("{:.4}", value)
}

fn optional(value: Option<f64>) -> String {
    value.map(number).unwrap_or_default()
}

pub fn accuracy_csv(summary: &MetricsSummary) -> Result<String> {
    render_table(
        &[
            "strategy",
            "length_class",
            "attempts",
            "exact_matches",
            "accuracy",
            "errors",
            "error_rate",
            "lenient_accuracy",
            "mean_semantic_distance",
        ],
        summary.groups.iter().map(|group| {
            vec![
                group.strategy.to_string(),
                group.length_class.to_string(),
                group.attempts.to_string(),
                group.exact_matches.to_string(),
                number(group.accuracy),
                group.errors.to_string(),
                number(group.error_rate),
                number(group.lenient_accuracy),
                optional(group.mean_semantic_distance),
            ]
        }),
    )
}

pub fn disagreement_csv(summary: &MetricsSummary) -> Result<String> {
    render_table(
        &["length_class", "strategy_a", "strategy_b", "shared", "differing", "rate"],
        summary.disagreement.iter().map(|entry| {
            vec![
                entry.length_class.to_string(),
                entry.strategy_a.to_string(),
                entry.strategy_b.to_string(),
                entry.shared.to_string(),
                entry.differing.to_string(),
                entry
                    .rate
                    .map(number)
                    .unwrap_or_else(|| INSUFFICIENT_DATA.to_string()),
            ]
        }),
    )
}

pub fn sensitivity_csv(summary: &MetricsSummary) -> Result<String> {
    render_table(
        &["strategy", "short", "medium", "long", "spread", "non_monotonic"],
        summary.sensitivity.iter().map(|curve| {
            let mut fields = vec![curve.strategy.to_string()];
            fields.extend(curve.points.iter().map(|p| optional(p.accuracy)));
            fields.push(optional(curve.spread));
            fields.push(curve.non_monotonic.to_string());
            fields
        }),
    )
}

pub fn flips_csv(flips: &[FlipAnalysis]) -> Result<String> {
    render_table(
        &[
            "baseline",
            "candidate",
            "pairs",
            "improved",
            "worsened",
            "same",
            "sign_test_p_value",
        ],
        flips.iter().map(|flip| {
            vec![
                flip.baseline.to_string(),
                flip.candidate.to_string(),
                flip.pairs.to_string(),
                flip.improved.to_string(),
                flip.worsened.to_string(),
                flip.same.to_string(),
                optional(flip.sign_test.p_value),
            ]
        }),
    )
}
