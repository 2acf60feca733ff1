use std::collections::{BTreeMap, HashSet};

use time::{macros::format_description, Date, OffsetDateTime, UtcOffset};

use super::granularity::DateRange;
use super::metric::{MetricConfig, MetricKey};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("metric '{metric}' at {key} is not part of the series configuration")]
    MetricNotConfigured { metric: MetricKey, key: String },
    #[error("duplicate series key {0}")]
    DuplicateKey(String),
}

/// Position of a point on the time axis.
///
/// A series only ever holds one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeriesKey {
    /// Start instant of an interval reading (UTC).
    Instant(OffsetDateTime),
    /// Canonical calendar day of a daily bucket.
    Day(Date),
    /// Anchor of an ESL period.
    Period(Date),
}

impl SeriesKey {
    /// Export column name for this kind of key.
    pub fn field_name(&self) -> &'static str {
        match self {
            SeriesKey::Instant(_) => "timestamp",
            SeriesKey::Day(_) => "date",
            SeriesKey::Period(_) => "period",
        }
    }

    pub fn date(&self) -> Date {
        match self {
            SeriesKey::Instant(ts) => ts.to_offset(UtcOffset::UTC).date(),
            SeriesKey::Day(d) | SeriesKey::Period(d) => *d,
        }
    }

    /// Canonical, locale-free text form of the key.
    pub fn label(&self) -> Result<String, time::error::Format> {
        match self {
            SeriesKey::Instant(ts) => ts
                .to_offset(UtcOffset::UTC)
                .format(&time::format_description::well_known::Rfc3339),
            SeriesKey::Day(d) => d.format(format_description!("[year]-[month]-[day]")),
            SeriesKey::Period(d) => d.format(format_description!("[year]-[month]")),
        }
    }

    fn describe(&self) -> String {
        self.label().unwrap_or_else(|_| format!("{self:?}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPoint {
    pub key: SeriesKey,
    pub metrics: BTreeMap<MetricKey, f64>,
    /// Number of source documents folded into an aggregated point.
    pub reading_count: Option<u32>,
}

impl NormalizedPoint {
    pub fn new(key: SeriesKey) -> Self {
        Self {
            key,
            metrics: BTreeMap::new(),
            reading_count: None,
        }
    }

    pub fn with_metric(mut self, key: MetricKey, value: f64) -> Self {
        self.metrics.insert(key, value);
        self
    }

    pub fn metric(&self, key: MetricKey) -> Option<f64> {
        self.metrics.get(&key).copied()
    }
}

/// Points plus the metric configuration describing them.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    points: Vec<NormalizedPoint>,
    config: MetricConfig,
}

impl TimeSeries {
    /// Builds a series, rejecting duplicate keys and unconfigured metrics.
    pub fn new(points: Vec<NormalizedPoint>, config: MetricConfig) -> Result<Self, SeriesError> {
        let mut seen = HashSet::with_capacity(points.len());
        for point in &points {
            if !seen.insert(point.key) {
                return Err(SeriesError::DuplicateKey(point.key.describe()));
            }
            if let Some(metric) = point.metrics.keys().find(|m| !config.contains(**m)) {
                return Err(SeriesError::MetricNotConfigured {
                    metric: *metric,
                    key: point.key.describe(),
                });
            }
        }
        Ok(Self { points, config })
    }

    pub fn empty(config: MetricConfig) -> Self {
        Self {
            points: Vec::new(),
            config,
        }
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_strictly_ascending(&self) -> bool {
        self.points.windows(2).all(|w| w[0].key < w[1].key)
    }

    /// Earliest and latest calendar date covered by the series.
    pub fn span(&self) -> Option<(Date, Date)> {
        let first = self.points.iter().map(|p| p.key.date()).min()?;
        let last = self.points.iter().map(|p| p.key.date()).max()?;
        Some((first, last))
    }

    /// Points whose key date falls inside `range`, order preserved.
    pub fn clip(&self, range: &DateRange) -> TimeSeries {
        TimeSeries {
            points: self
                .points
                .iter()
                .filter(|p| range.contains(p.key.date()))
                .cloned()
                .collect(),
            config: self.config.clone(),
        }
    }
}
