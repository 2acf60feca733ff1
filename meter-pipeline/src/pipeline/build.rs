use meter_client::domain::{
    DirectionMap, IntervalDocument, IntervalPayload, MeterReadingPeriod, MetricCodeMap,
    MetricConfig,
};
use serde::Deserialize;
use time::UtcOffset;

use super::{Outcome, PipelineError, RecordSource, TransformReport, Warning};
use crate::resolver::SeriesSet;
use crate::sources::raw::{RawDataset, RawSdatDocument};
use crate::transform::{
    validate_interval_document, DailyAggregator, DuplicateCodePolicy, IntervalExpander,
    PeriodNormalizer,
};

const TOTAL_MISMATCH_TOLERANCE: f64 = 1e-6;

/// Mapping tables and policies the transforms run with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Offset from UTC, in minutes, whose calendar days form the daily
    /// buckets.
    pub bucket_utc_offset_minutes: i32,
    pub duplicate_code_policy: DuplicateCodePolicy,
    pub directions: DirectionMap,
    pub esl_codes: MetricCodeMap,
    pub esl_metrics: MetricConfig,
    pub sdat_metrics: MetricConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            bucket_utc_offset_minutes: 0,
            duplicate_code_policy: DuplicateCodePolicy::default(),
            directions: DirectionMap::default(),
            esl_codes: MetricCodeMap::default(),
            esl_metrics: MetricConfig::esl_default(),
            sdat_metrics: MetricConfig::sdat_default(),
        }
    }
}

impl PipelineSettings {
    pub fn bucket_basis(&self) -> Result<UtcOffset, PipelineError> {
        self.bucket_utc_offset_minutes
            .checked_mul(60)
            .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "bucket_utc_offset_minutes {} is not a valid UTC offset",
                    self.bucket_utc_offset_minutes
                ))
            })
    }
}

fn check_total(raw: &RawSdatDocument, report: &mut TransformReport) {
    let Some(daily_total) = raw.total_daily else {
        return;
    };
    if raw.data.is_empty() {
        return;
    }
    let points_total: f64 = raw.data.iter().map(|o| o.volume).sum();
    if (points_total - daily_total).abs() > TOTAL_MISMATCH_TOLERANCE * daily_total.abs().max(1.0) {
        report.warn(Warning::TotalMismatch {
            document_id: raw.document_id.clone(),
            points_total,
            daily_total,
        });
    }
}

/// Decodes `dataset` and produces all three series.
///
/// Records that cannot be decoded or validated are reported and left out;
/// the rest of the batch is still processed.
pub fn build_series_set(
    dataset: &RawDataset,
    settings: &PipelineSettings,
) -> Result<Outcome<SeriesSet>, PipelineError> {
    let basis = settings.bucket_basis()?;
    let mut report = TransformReport::new(dataset.len());

    let mut periods = Vec::with_capacity(dataset.esl.len());
    let mut period_indices = Vec::with_capacity(dataset.esl.len());
    for (index, raw) in dataset.esl.iter().enumerate() {
        match MeterReadingPeriod::try_from(raw) {
            Ok(period) => {
                periods.push(period);
                period_indices.push(index);
            }
            Err(e) => report.fail(RecordSource::Esl, index, e),
        }
    }

    let mut docs: Vec<IntervalDocument> = Vec::with_capacity(dataset.sdat.len());
    let mut doc_indices = Vec::with_capacity(dataset.sdat.len());
    for (index, raw) in dataset.sdat.iter().enumerate() {
        let doc = match IntervalDocument::try_from(raw).and_then(|doc| {
            validate_interval_document(&doc)?;
            Ok(doc)
        }) {
            Ok(doc) => doc,
            Err(e) => {
                report.fail(RecordSource::Sdat, index, e);
                continue;
            }
        };
        if settings.directions.resolve(&doc.direction_id).is_none() {
            metrics::counter!("sdat_unknown_direction_total").increment(1);
            report.warn(Warning::UnknownDirection {
                document_id: doc.direction_id.clone(),
            });
            continue;
        }
        if matches!(doc.payload, IntervalPayload::Points(_)) {
            check_total(raw, &mut report);
        }
        docs.push(doc);
        doc_indices.push(index);
    }

    let normalizer = PeriodNormalizer::new(
        &settings.esl_codes,
        &settings.esl_metrics,
        settings.duplicate_code_policy,
    );
    let mut esl = normalizer.normalize(&periods)?;
    esl.report.remap_indices(&period_indices);
    report.absorb(esl.report);

    let expander = IntervalExpander::new(&settings.directions, &settings.sdat_metrics);
    let mut intervals = expander.expand(&docs)?;
    intervals.report.remap_indices(&doc_indices);
    report.absorb(intervals.report);

    // Documents were validated above, so the aggregator report holds nothing new.
    let aggregator = DailyAggregator::new(&settings.directions, &settings.sdat_metrics, basis);
    let daily = aggregator.aggregate(&docs)?;

    tracing::info!(
        esl_points = esl.value.len(),
        daily_points = daily.value.len(),
        interval_points = intervals.value.len(),
        warnings = report.warnings.len(),
        failures = report.failures.len(),
        "series set built"
    );

    Ok(Outcome {
        value: SeriesSet {
            periods: esl.value,
            daily: daily.value,
            intervals: intervals.value,
        },
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OutcomeStatus, TransformError};
    use crate::sources::raw::{RawEslPeriod, RawEslValue, RawInterval, RawObservation};

    fn sdat(id: &str, start: &str, data: Vec<RawObservation>, total: Option<f64>) -> RawSdatDocument {
        RawSdatDocument {
            document_id: id.to_string(),
            interval: RawInterval {
                start: start.to_string(),
                end: "2020-04-09T22:00:00Z".to_string(),
            },
            resolution: 15,
            data,
            total_daily: total,
        }
    }

    fn obs(sequence: u32, volume: f64) -> RawObservation {
        RawObservation { sequence, volume }
    }

    #[test]
    fn builds_all_three_series() {
        let dataset = RawDataset {
            esl: vec![RawEslPeriod {
                month: "2020-04-01T00:00:00".to_string(),
                data: vec![RawEslValue {
                    obis: "1-1:1.8.1".to_string(),
                    value: 100.0,
                }],
            }],
            sdat: vec![
                sdat("ID735", "2020-04-08T22:00:00Z", vec![obs(1, 1.0), obs(2, 2.0)], None),
                sdat("ID742", "2020-04-08T22:00:00Z", vec![obs(2, 0.5)], None),
            ],
        };
        let out = build_series_set(&dataset, &PipelineSettings::default()).unwrap();
        assert_eq!(out.value.periods.len(), 1);
        assert_eq!(out.value.intervals.len(), 2);
        assert_eq!(out.value.daily.len(), 1);
        assert_eq!(out.value.daily.points()[0].reading_count, Some(2));
        assert_eq!(out.report.status(), OutcomeStatus::Complete);
    }

    #[test]
    fn malformed_records_are_isolated_with_raw_indices() {
        let dataset = RawDataset {
            esl: vec![RawEslPeriod {
                month: "March".to_string(),
                data: Vec::new(),
            }],
            sdat: vec![
                sdat("ID735", "2020-04-08T22:00:00Z", vec![obs(1, 1.0)], None),
                sdat("ID735", "yesterday", vec![obs(1, 1.0)], None),
                sdat("ID742", "2020-04-08T22:00:00Z", vec![obs(0, 1.0)], None),
            ],
        };
        let out = build_series_set(&dataset, &PipelineSettings::default()).unwrap();
        let failed: Vec<_> = out.report.failures.iter().map(|f| (f.source, f.index)).collect();
        assert_eq!(
            failed,
            vec![(RecordSource::Esl, 0), (RecordSource::Sdat, 1), (RecordSource::Sdat, 2)]
        );
        assert!(matches!(
            out.report.failures[1].error,
            TransformError::MalformedTimestamp { .. }
        ));
        assert_eq!(out.value.intervals.len(), 1);
        assert_eq!(out.report.status(), OutcomeStatus::Partial);
    }

    #[test]
    fn oversized_sequence_offset_fails_only_its_document() {
        let mut huge = sdat(
            "ID735",
            "2020-04-08T22:00:00Z",
            vec![obs(4_000_000_000, 1.0)],
            None,
        );
        huge.resolution = 1_000_000_000;
        let dataset = RawDataset {
            esl: Vec::new(),
            sdat: vec![huge, sdat("ID742", "2020-04-08T22:00:00Z", Vec::new(), Some(3.0))],
        };
        let out = build_series_set(&dataset, &PipelineSettings::default()).unwrap();

        assert_eq!(out.report.failures.len(), 1);
        assert_eq!(out.report.failures[0].index, 0);
        assert!(matches!(
            out.report.failures[0].error,
            TransformError::InvalidRecord(_)
        ));
        assert_eq!(out.value.daily.len(), 1);
        assert_eq!(
            out.value.daily.points()[0].metric(meter_client::domain::MetricKey::FeedIn),
            Some(3.0)
        );
        assert_eq!(out.report.status(), OutcomeStatus::Partial);
    }

    #[test]
    fn all_failing_is_failed() {
        let dataset = RawDataset {
            esl: Vec::new(),
            sdat: vec![sdat("ID735", "not a time", vec![obs(1, 1.0)], None)],
        };
        let out = build_series_set(&dataset, &PipelineSettings::default()).unwrap();
        assert_eq!(out.report.status(), OutcomeStatus::Failed);
        assert!(out.value.daily.is_empty());
    }

    #[test]
    fn unknown_direction_is_reported_once() {
        let dataset = RawDataset {
            esl: Vec::new(),
            sdat: vec![sdat("ID999", "2020-04-08T22:00:00Z", vec![obs(1, 1.0)], None)],
        };
        let out = build_series_set(&dataset, &PipelineSettings::default()).unwrap();
        assert_eq!(out.report.warnings.len(), 1);
        assert!(out.value.intervals.is_empty());
    }

    #[test]
    fn mismatching_total_is_warned() {
        let dataset = RawDataset {
            esl: Vec::new(),
            sdat: vec![sdat(
                "ID735",
                "2020-04-08T22:00:00Z",
                vec![obs(1, 1.0), obs(2, 1.0)],
                Some(3.0),
            )],
        };
        let out = build_series_set(&dataset, &PipelineSettings::default()).unwrap();
        assert!(matches!(
            &out.report.warnings[..],
            [Warning::TotalMismatch { points_total, .. }] if *points_total == 2.0
        ));
        assert_eq!(
            out.value.daily.points()[0].metric(meter_client::domain::MetricKey::Purchase),
            Some(2.0)
        );
    }

    #[test]
    fn invalid_bucket_offset_is_config_error() {
        let settings = PipelineSettings {
            bucket_utc_offset_minutes: 48 * 60,
            ..PipelineSettings::default()
        };
        assert!(matches!(
            build_series_set(&RawDataset::default(), &settings),
            Err(PipelineError::Config(_))
        ));
    }
}
