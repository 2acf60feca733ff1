use std::collections::BTreeMap;

use meter_client::domain::{
    DirectionMap, IntervalDocument, MetricConfig, NormalizedPoint, SeriesKey, TimeSeries,
};
use time::{Date, UtcOffset};

use super::validate_interval_document;
use crate::pipeline::{Outcome, RecordSource, TransformError, TransformReport, Warning};

/// Sums SDAT documents into one point per canonical calendar day.
///
/// The bucket of a document is the date of its interval start seen from
/// `basis`, a fixed offset that never depends on the host locale.
pub struct DailyAggregator<'a> {
    directions: &'a DirectionMap,
    config: &'a MetricConfig,
    basis: UtcOffset,
}

impl<'a> DailyAggregator<'a> {
    pub fn new(directions: &'a DirectionMap, config: &'a MetricConfig, basis: UtcOffset) -> Self {
        Self {
            directions,
            config,
            basis,
        }
    }

    pub fn bucket_of(&self, doc: &IntervalDocument) -> Date {
        doc.interval.start.to_offset(self.basis).date()
    }

    pub fn aggregate(&self, docs: &[IntervalDocument]) -> Result<Outcome<TimeSeries>, TransformError> {
        let mut report = TransformReport::new(docs.len());
        let mut buckets: BTreeMap<Date, NormalizedPoint> = BTreeMap::new();

        for (index, doc) in docs.iter().enumerate() {
            let Some(direction) = self.directions.resolve(&doc.direction_id) else {
                metrics::counter!("sdat_unknown_direction_total").increment(1);
                report.warn(Warning::UnknownDirection {
                    document_id: doc.direction_id.clone(),
                });
                continue;
            };
            if let Err(e) = validate_interval_document(doc) {
                report.fail(RecordSource::Sdat, index, e);
                continue;
            }
            let metric = direction.metric_key();
            if !self.config.contains(metric) {
                continue;
            }

            let day = self.bucket_of(doc);
            let point = buckets.entry(day).or_insert_with(|| NormalizedPoint {
                key: SeriesKey::Day(day),
                metrics: BTreeMap::new(),
                reading_count: Some(0),
            });
            *point.metrics.entry(metric).or_insert(0.0) += doc.total_volume();
            point.reading_count = Some(point.reading_count.unwrap_or(0) + 1);
        }

        let points: Vec<NormalizedPoint> = buckets.into_values().collect();
        tracing::debug!(documents = docs.len(), days = points.len(), "SDAT documents aggregated by day");
        let series = TimeSeries::new(points, self.config.clone())?;
        Ok(Outcome {
            value: series,
            report,
        })
    }
}
