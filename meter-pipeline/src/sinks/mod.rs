use std::{io, str::FromStr};

use meter_client::domain::TimeSeries;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

pub mod delimited;
pub mod json_document;

pub use delimited::DelimitedTextSink;
pub use json_document::JsonDocumentSink;

use crate::pipeline::PipelineError;

/// One exported field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Count(u32),
}

impl FieldValue {
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Count(c) => c.to_string(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(v) => s.serialize_str(v),
            FieldValue::Number(v) => s.serialize_f64(*v),
            FieldValue::Count(v) => s.serialize_u32(*v),
        }
    }
}

/// A flattened point: key field, metric fields, then `reading_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    fields: Vec<(&'static str, FieldValue)>,
}

impl ExportRecord {
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

impl Serialize for ExportRecord {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Flattens every point of `series` in series order.
pub fn records(series: &TimeSeries) -> Result<Vec<ExportRecord>, PipelineError> {
    series
        .points()
        .iter()
        .map(|point| {
            let label = point
                .key
                .label()
                .map_err(|e| PipelineError::Sink(format!("failed to format series key: {e}")))?;
            let mut fields = Vec::with_capacity(point.metrics.len() + 2);
            fields.push((point.key.field_name(), FieldValue::Text(label)));
            for (metric, value) in &point.metrics {
                fields.push((metric.as_str(), FieldValue::Number(*value)));
            }
            if let Some(count) = point.reading_count {
                fields.push(("reading_count", FieldValue::Count(count)));
            }
            Ok(ExportRecord { fields })
        })
        .collect()
}

/// Writes already flattened records in one output format.
pub trait SeriesSink {
    fn write_records(&self, records: &[ExportRecord], out: &mut dyn io::Write) -> Result<(), PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(PipelineError::Sink(format!(
                "unsupported export format '{other}'; expected csv or json"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub delimiter: char,
    /// Quote fields containing the delimiter, quotes or line breaks.
    pub escape: bool,
    pub pretty: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            escape: true,
            pretty: true,
        }
    }
}

impl ExportConfig {
    pub fn delimiter_byte(&self) -> Result<u8, PipelineError> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| PipelineError::Config(format!("delimiter '{}' is not a single ASCII byte", self.delimiter)))
    }
}

/// Serializes `series` into `format`.
pub fn export(series: &TimeSeries, format: ExportFormat, cfg: &ExportConfig) -> Result<String, PipelineError> {
    let records = records(series)?;
    let mut buf = Vec::new();
    match format {
        ExportFormat::Csv => DelimitedTextSink::new(cfg.delimiter_byte()?, cfg.escape).write_records(&records, &mut buf)?,
        ExportFormat::Json => JsonDocumentSink::new(cfg.pretty).write_records(&records, &mut buf)?,
    }
    String::from_utf8(buf).map_err(|e| PipelineError::Sink(format!("export is not valid UTF-8: {e}")))
}
