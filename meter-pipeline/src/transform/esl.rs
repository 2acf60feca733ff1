use std::collections::{BTreeMap, HashMap};

use meter_client::domain::{
    MeterReadingPeriod, MetricCodeMap, MetricConfig, MetricKey, NormalizedPoint, SeriesKey,
    TimeSeries,
};
use serde::Deserialize;
use time::Date;

use super::{key_label, validate_period};
use crate::pipeline::{Outcome, RecordSource, TransformError, TransformReport, Warning};

/// What to do when one ESL period carries the same code twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateCodePolicy {
    /// Later value wins; a warning is recorded.
    #[default]
    Overwrite,
    /// The whole period fails.
    Reject,
}

/// Flattens ESL periods into one point per period anchor.
pub struct PeriodNormalizer<'a> {
    codes: &'a MetricCodeMap,
    config: &'a MetricConfig,
    policy: DuplicateCodePolicy,
}

impl<'a> PeriodNormalizer<'a> {
    pub fn new(codes: &'a MetricCodeMap, config: &'a MetricConfig, policy: DuplicateCodePolicy) -> Self {
        Self {
            codes,
            config,
            policy,
        }
    }

    /// Output keeps input order; periods sharing an anchor collapse into the
    /// first point for that anchor with later values overwriting.
    pub fn normalize(
        &self,
        periods: &[MeterReadingPeriod],
    ) -> Result<Outcome<TimeSeries>, TransformError> {
        let mut report = TransformReport::new(periods.len());
        let mut points: Vec<NormalizedPoint> = Vec::with_capacity(periods.len());
        let mut slots: HashMap<Date, usize> = HashMap::new();
        let mut latest: Option<Date> = None;

        for (index, period) in periods.iter().enumerate() {
            let key = SeriesKey::Period(period.anchor);
            let values = match validate_period(period).and_then(|()| self.flatten(period, &key, &mut report)) {
                Ok(values) => values,
                Err(e) => {
                    report.fail(RecordSource::Esl, index, e);
                    continue;
                }
            };

            if latest.is_some_and(|l| period.anchor < l) {
                tracing::debug!(period = %key_label(&key), "ESL period out of order, keeping input order");
            }
            latest = latest.max(Some(period.anchor));

            match slots.get(&period.anchor) {
                Some(&slot) => {
                    report.warn(Warning::DuplicateKey { key: key_label(&key) });
                    points[slot].metrics.extend(values);
                }
                None => {
                    slots.insert(period.anchor, points.len());
                    points.push(NormalizedPoint {
                        key,
                        metrics: values,
                        reading_count: None,
                    });
                }
            }
        }

        tracing::debug!(periods = periods.len(), points = points.len(), "ESL periods normalized");
        let series = TimeSeries::new(points, self.config.clone())?;
        Ok(Outcome {
            value: series,
            report,
        })
    }

    fn flatten(
        &self,
        period: &MeterReadingPeriod,
        key: &SeriesKey,
        report: &mut TransformReport,
    ) -> Result<BTreeMap<MetricKey, f64>, TransformError> {
        let mut values = BTreeMap::new();
        for reading in &period.readings {
            let Some(metric) = self
                .codes
                .resolve(&reading.code)
                .filter(|m| self.config.contains(*m))
            else {
                metrics::counter!("esl_unknown_metric_codes_total").increment(1);
                report.warn(Warning::UnknownMetricCode {
                    code: reading.code.clone(),
                    period: key_label(key),
                });
                continue;
            };

            if values.insert(metric, reading.value).is_some() {
                match self.policy {
                    DuplicateCodePolicy::Overwrite => report.warn(Warning::DuplicateMetricCode {
                        code: reading.code.clone(),
                        period: key_label(key),
                    }),
                    DuplicateCodePolicy::Reject => {
                        return Err(TransformError::DuplicateMetricCode {
                            code: reading.code.clone(),
                            period: key_label(key),
                        })
                    }
                }
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OutcomeStatus;
    use meter_client::domain::EslReading;
    use time::{macros::date, Month};

    const CODES: [&str; 4] = ["1-1:1.8.1", "1-1:1.8.2", "1-1:2.8.1", "1-1:2.8.2"];

    fn period(anchor: Date, readings: &[(&str, f64)]) -> MeterReadingPeriod {
        MeterReadingPeriod {
            anchor,
            readings: readings
                .iter()
                .map(|(code, value)| EslReading {
                    code: code.to_string(),
                    value: *value,
                })
                .collect(),
        }
    }

    fn normalize(periods: &[MeterReadingPeriod], policy: DuplicateCodePolicy) -> Outcome<TimeSeries> {
        let codes = MetricCodeMap::default();
        let config = MetricConfig::esl_default();
        PeriodNormalizer::new(&codes, &config, policy)
            .normalize(periods)
            .unwrap()
    }

    #[test]
    fn six_months_of_four_codes_yield_six_points() {
        let periods: Vec<_> = (1..=6u8)
            .map(|m| {
                let anchor = Date::from_calendar_date(2024, Month::try_from(m).unwrap(), 1).unwrap();
                let readings: Vec<_> = CODES.iter().map(|c| (*c, f64::from(m) * 100.0)).collect();
                period(anchor, &readings)
            })
            .collect();

        let out = normalize(&periods, DuplicateCodePolicy::Overwrite);
        let series = out.value;
        assert_eq!(series.len(), 6);
        assert!(series.points().iter().all(|p| p.metrics.len() == 4));
        assert!(series.is_strictly_ascending());
        assert_eq!(series.points()[0].key, SeriesKey::Period(date!(2024-01-01)));
        assert_eq!(series.points()[5].key, SeriesKey::Period(date!(2024-06-01)));
        assert_eq!(out.report.status(), OutcomeStatus::Complete);
    }

    #[test]
    fn empty_input_yields_empty_series() {
        let out = normalize(&[], DuplicateCodePolicy::Overwrite);
        assert!(out.value.is_empty());
        assert_eq!(out.report.status(), OutcomeStatus::Complete);
    }

    #[test]
    fn out_of_order_input_is_preserved() {
        let periods = vec![
            period(date!(2024-03-01), &[("1-1:1.8.1", 3.0)]),
            period(date!(2024-01-01), &[("1-1:1.8.1", 1.0)]),
        ];
        let out = normalize(&periods, DuplicateCodePolicy::Overwrite);
        let keys: Vec<_> = out.value.points().iter().map(|p| p.key).collect();
        assert_eq!(
            keys,
            vec![
                SeriesKey::Period(date!(2024-03-01)),
                SeriesKey::Period(date!(2024-01-01))
            ]
        );
        assert!(out.report.warnings.is_empty());
    }

    #[test]
    fn duplicate_code_overwrites_by_default() {
        let periods = vec![period(
            date!(2024-01-01),
            &[("1-1:1.8.1", 1.0), ("1-1:1.8.1", 2.0)],
        )];
        let out = normalize(&periods, DuplicateCodePolicy::Overwrite);
        assert_eq!(out.value.points()[0].metric(MetricKey::HighTariffPurchase), Some(2.0));
        assert_eq!(
            out.report.warnings,
            vec![Warning::DuplicateMetricCode {
                code: "1-1:1.8.1".to_string(),
                period: "2024-01".to_string()
            }]
        );
    }

    #[test]
    fn duplicate_code_rejects_only_that_period() {
        let periods = vec![
            period(date!(2024-01-01), &[("1-1:1.8.1", 1.0), ("1-1:1.8.1", 2.0)]),
            period(date!(2024-02-01), &[("1-1:1.8.1", 5.0)]),
        ];
        let out = normalize(&periods, DuplicateCodePolicy::Reject);
        assert_eq!(out.value.len(), 1);
        assert_eq!(out.report.failures.len(), 1);
        assert_eq!(out.report.failures[0].index, 0);
        assert_eq!(out.report.status(), OutcomeStatus::Partial);
    }

    #[test]
    fn unknown_codes_are_reported_not_kept() {
        let periods = vec![period(
            date!(2024-01-01),
            &[("1-1:1.8.1", 1.0), ("1-1:5.8.1", 9.0)],
        )];
        let out = normalize(&periods, DuplicateCodePolicy::Overwrite);
        assert_eq!(out.value.points()[0].metrics.len(), 1);
        assert!(matches!(
            &out.report.warnings[..],
            [Warning::UnknownMetricCode { code, .. }] if code == "1-1:5.8.1"
        ));
    }

    #[test]
    fn repeated_anchor_merges_into_one_point() {
        let periods = vec![
            period(date!(2024-01-01), &[("1-1:1.8.1", 1.0), ("1-1:1.8.2", 2.0)]),
            period(date!(2024-01-01), &[("1-1:1.8.1", 7.0)]),
        ];
        let out = normalize(&periods, DuplicateCodePolicy::Overwrite);
        assert_eq!(out.value.len(), 1);
        let point = &out.value.points()[0];
        assert_eq!(point.metric(MetricKey::HighTariffPurchase), Some(7.0));
        assert_eq!(point.metric(MetricKey::LowTariffPurchase), Some(2.0));
        assert!(matches!(&out.report.warnings[..], [Warning::DuplicateKey { .. }]));
    }
}
