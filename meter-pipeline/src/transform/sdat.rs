use std::collections::BTreeMap;

use meter_client::domain::{
    Direction, DirectionMap, IntervalDocument, IntervalPayload, MetricConfig, NormalizedPoint,
    SeriesKey, TimeSeries,
};
use time::OffsetDateTime;

use super::{key_label, validate_interval_document};
use crate::pipeline::{Outcome, RecordSource, TransformError, TransformReport, Warning};

/// Expands sequence-indexed SDAT volumes into timestamped points and joins
/// the direction streams on the resulting instant.
pub struct IntervalExpander<'a> {
    directions: &'a DirectionMap,
    config: &'a MetricConfig,
}

impl<'a> IntervalExpander<'a> {
    pub fn new(directions: &'a DirectionMap, config: &'a MetricConfig) -> Self {
        Self { directions, config }
    }

    pub fn expand(&self, docs: &[IntervalDocument]) -> Result<Outcome<TimeSeries>, TransformError> {
        let mut report = TransformReport::new(docs.len());
        let mut groups: BTreeMap<Direction, Vec<(usize, &IntervalDocument)>> = BTreeMap::new();

        for (index, doc) in docs.iter().enumerate() {
            match self.directions.resolve(&doc.direction_id) {
                Some(direction) => groups.entry(direction).or_default().push((index, doc)),
                None => {
                    metrics::counter!("sdat_unknown_direction_total").increment(1);
                    report.warn(Warning::UnknownDirection {
                        document_id: doc.direction_id.clone(),
                    });
                }
            }
        }

        let mut joined: BTreeMap<OffsetDateTime, NormalizedPoint> = BTreeMap::new();
        for (direction, group) in groups {
            let metric = direction.metric_key();
            if !self.config.contains(metric) {
                tracing::debug!(?direction, "direction metric not configured, skipping group");
                continue;
            }

            for (index, doc) in group {
                let points = match expand_document(doc) {
                    Ok(Some(points)) => points,
                    Ok(None) => continue,
                    Err(e) => {
                        report.fail(RecordSource::Sdat, index, e);
                        continue;
                    }
                };

                for (ts, volume) in points {
                    let point = joined
                        .entry(ts)
                        .or_insert_with(|| NormalizedPoint::new(SeriesKey::Instant(ts)));
                    if point.metrics.insert(metric, volume).is_some() {
                        report.warn(Warning::DuplicateKey {
                            key: key_label(&point.key),
                        });
                    }
                }
            }
        }

        let points: Vec<NormalizedPoint> = joined.into_values().collect();
        tracing::debug!(documents = docs.len(), points = points.len(), "SDAT intervals expanded");
        let series = TimeSeries::new(points, self.config.clone())?;
        Ok(Outcome {
            value: series,
            report,
        })
    }
}

/// Timestamped volumes of one document; `None` for total-only documents.
fn expand_document(
    doc: &IntervalDocument,
) -> Result<Option<Vec<(OffsetDateTime, f64)>>, TransformError> {
    validate_interval_document(doc)?;
    let IntervalPayload::Points(points) = &doc.payload else {
        return Ok(None);
    };

    points
        .iter()
        .map(|p| {
            doc.instant_of(p.sequence)
                .map(|ts| (ts, p.volume))
                .ok_or_else(|| {
                    TransformError::InvalidRecord(format!(
                        "sequence {} of document '{}' is out of range",
                        p.sequence, doc.direction_id
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
