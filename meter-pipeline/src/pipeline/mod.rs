use std::{fmt, pin::Pin, time::SystemTime};

use futures::{Stream, StreamExt};
use meter_client::domain::SeriesError;
use serde::{Serialize, Serializer};

pub mod build;

pub use build::{build_series_set, PipelineSettings};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("config error: {0}")]
    Config(String),
}

/// Failure of a single record; never aborts the rest of a batch.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("malformed timestamp in {field}: '{value}'")]
    MalformedTimestamp { field: &'static str, value: String },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("duplicate metric code '{code}' in period {period}")]
    DuplicateMetricCode { code: String, period: String },
    #[error(transparent)]
    Series(#[from] SeriesError),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

/// Drains a source, keeping good records and the per-record errors apart.
pub async fn collect_records<T, S>(source: &S) -> (Vec<T>, Vec<PipelineError>)
where
    S: Source<T> + ?Sized,
{
    let mut stream = source.stream().await;
    let mut records = Vec::new();
    let mut errors = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(env) => records.push(env.payload),
            Err(e) => errors.push(e),
        }
    }
    (records, errors)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Esl,
    Sdat,
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSource::Esl => f.write_str("esl"),
            RecordSource::Sdat => f.write_str("sdat"),
        }
    }
}

/// Conditions that lose or overwrite data without failing a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    UnknownDirection { document_id: String },
    UnknownMetricCode { code: String, period: String },
    DuplicateMetricCode { code: String, period: String },
    DuplicateKey { key: String },
    TotalMismatch { document_id: String, points_total: f64, daily_total: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub source: RecordSource,
    pub index: usize,
    #[serde(serialize_with = "serialize_display")]
    pub error: TransformError,
}

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Complete,
    Partial,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Complete => "complete",
            OutcomeStatus::Partial => "partial",
            OutcomeStatus::Failed => "failed",
        }
    }
}

/// Everything a transform skipped, overwrote or failed on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformReport {
    pub records_seen: usize,
    pub warnings: Vec<Warning>,
    pub failures: Vec<RecordFailure>,
}

impl TransformReport {
    pub fn new(records_seen: usize) -> Self {
        Self {
            records_seen,
            ..Self::default()
        }
    }

    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(?warning, "record data skipped or overwritten");
        self.warnings.push(warning);
    }

    pub fn fail(&mut self, source: RecordSource, index: usize, error: TransformError) {
        tracing::warn!(%source, index, error = %error, "record failed to transform");
        metrics::counter!("transform_record_failures_total").increment(1);
        self.failures.push(RecordFailure { source, index, error });
    }

    /// Takes over warnings and failures of `other`, keeping `records_seen`.
    pub fn absorb(&mut self, other: TransformReport) {
        self.warnings.extend(other.warnings);
        self.failures.extend(other.failures);
    }

    /// Rewrites failure indices through `raw_indices[i]`.
    pub fn remap_indices(&mut self, raw_indices: &[usize]) {
        for failure in &mut self.failures {
            if let Some(raw) = raw_indices.get(failure.index) {
                failure.index = *raw;
            }
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        if self.records_seen > 0 && self.failures.len() >= self.records_seen {
            OutcomeStatus::Failed
        } else if self.warnings.is_empty() && self.failures.is_empty() {
            OutcomeStatus::Complete
        } else {
            OutcomeStatus::Partial
        }
    }
}

/// A transform result with its report.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub report: TransformReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_distinguishes_partial_from_failed() {
        let mut report = TransformReport::new(2);
        assert_eq!(report.status(), OutcomeStatus::Complete);

        report.warn(Warning::UnknownDirection {
            document_id: "ID1".to_string(),
        });
        assert_eq!(report.status(), OutcomeStatus::Partial);

        report.fail(RecordSource::Sdat, 0, TransformError::InvalidRecord("a".to_string()));
        assert_eq!(report.status(), OutcomeStatus::Partial);
        report.fail(RecordSource::Sdat, 1, TransformError::InvalidRecord("b".to_string()));
        assert_eq!(report.status(), OutcomeStatus::Failed);
    }

    #[test]
    fn empty_input_is_complete() {
        assert_eq!(TransformReport::new(0).status(), OutcomeStatus::Complete);
    }

    #[test]
    fn remap_translates_failure_indices() {
        let mut report = TransformReport::new(1);
        report.fail(RecordSource::Sdat, 1, TransformError::InvalidRecord("x".to_string()));
        report.remap_indices(&[3, 7]);
        assert_eq!(report.failures[0].index, 7);
    }

    #[test]
    fn failures_serialize_error_as_text() {
        let failure = RecordFailure {
            source: RecordSource::Esl,
            index: 2,
            error: TransformError::MalformedTimestamp {
                field: "period anchor",
                value: "soon".to_string(),
            },
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["source"], "esl");
        assert_eq!(json["error"], "malformed timestamp in period anchor: 'soon'");
    }
}
