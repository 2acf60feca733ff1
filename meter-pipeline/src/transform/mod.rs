use meter_client::domain::{IntervalDocument, IntervalPayload, MeterReadingPeriod, SeriesKey};
use time::{
    macros::{date, datetime},
    OffsetDateTime,
};

pub mod daily;
pub mod esl;
pub mod sdat;

pub use daily::DailyAggregator;
pub use esl::{DuplicateCodePolicy, PeriodNormalizer};
pub use sdat::IntervalExpander;

use crate::pipeline::TransformError;

pub(crate) fn key_label(key: &SeriesKey) -> String {
    key.label().unwrap_or_else(|_| format!("{key:?}"))
}

fn check_window(ts: OffsetDateTime) -> Result<(), TransformError> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if ts < min_ts || ts > max_ts {
        return Err(TransformError::InvalidRecord(
            "timestamp out of allowed range".to_string(),
        ));
    }
    Ok(())
}

/// Pure validation of an `IntervalDocument`.
///
/// Rules:
/// - resolution must be positive.
/// - interval start must not be after its end.
/// - both interval bounds within [2000-01-01, 2100-01-01].
/// - sequence numbers start at 1 and every point falls inside
///   [start, end).
/// - volumes and totals must be finite and non-negative.
pub fn validate_interval_document(doc: &IntervalDocument) -> Result<(), TransformError> {
    if doc.resolution_minutes == 0 {
        return Err(TransformError::InvalidRecord(
            "resolution must be positive".to_string(),
        ));
    }
    if doc.interval.start > doc.interval.end {
        return Err(TransformError::InvalidRecord(
            "interval start is after its end".to_string(),
        ));
    }
    check_window(doc.interval.start)?;
    check_window(doc.interval.end)?;

    let volume_ok = |v: f64| v.is_finite() && v >= 0.0;
    match &doc.payload {
        IntervalPayload::Points(points) => {
            if let Some(p) = points.iter().find(|p| p.sequence == 0) {
                return Err(TransformError::InvalidRecord(format!(
                    "sequence numbers start at 1, got {}",
                    p.sequence
                )));
            }
            if let Some(p) = points.iter().find(|p| {
                doc.instant_of(p.sequence)
                    .map_or(true, |ts| ts >= doc.interval.end)
            }) {
                return Err(TransformError::InvalidRecord(format!(
                    "sequence {} falls outside the document interval",
                    p.sequence
                )));
            }
            if points.iter().any(|p| !volume_ok(p.volume)) {
                return Err(TransformError::InvalidRecord(
                    "volume must be finite and non-negative".to_string(),
                ));
            }
        }
        IntervalPayload::DailyTotal(total) => {
            if !volume_ok(*total) {
                return Err(TransformError::InvalidRecord(
                    "daily total must be finite and non-negative".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Pure validation of a `MeterReadingPeriod`.
///
/// Rules:
/// - anchor within the same sanity window as interval documents.
/// - register values must be finite.
pub fn validate_period(period: &MeterReadingPeriod) -> Result<(), TransformError> {
    let anchor = period.anchor;
    if anchor < date!(2000-01-01) || anchor > date!(2100-01-01) {
        return Err(TransformError::InvalidRecord(
            "period anchor out of allowed range".to_string(),
        ));
    }
    if let Some(r) = period.readings.iter().find(|r| !r.value.is_finite()) {
        return Err(TransformError::InvalidRecord(format!(
            "value for '{}' is not finite",
            r.code
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_client::domain::{EslReading, Interval, IntervalPoint};

    fn document(payload: IntervalPayload) -> IntervalDocument {
        IntervalDocument {
            direction_id: "ID735".to_string(),
            interval: Interval {
                start: datetime!(2024-01-01 00:00:00 UTC),
                end: datetime!(2024-01-02 00:00:00 UTC),
            },
            resolution_minutes: 15,
            payload,
        }
    }

    #[test]
    fn interval_validation_accepts_valid_document() {
        let doc = document(IntervalPayload::Points(vec![IntervalPoint {
            sequence: 1,
            volume: 0.5,
        }]));
        assert!(validate_interval_document(&doc).is_ok());
    }

    #[test]
    fn interval_validation_rejects_sequence_zero() {
        let doc = document(IntervalPayload::Points(vec![IntervalPoint {
            sequence: 0,
            volume: 0.5,
        }]));
        let res = validate_interval_document(&doc);
        assert!(matches!(res, Err(TransformError::InvalidRecord(_))));
    }

    #[test]
    fn interval_validation_rejects_point_past_end() {
        // 15-minute slots in one day end at sequence 96.
        let last = document(IntervalPayload::Points(vec![IntervalPoint {
            sequence: 96,
            volume: 0.5,
        }]));
        assert!(validate_interval_document(&last).is_ok());

        let past = document(IntervalPayload::Points(vec![IntervalPoint {
            sequence: 500,
            volume: 0.5,
        }]));
        assert!(matches!(
            validate_interval_document(&past),
            Err(TransformError::InvalidRecord(_))
        ));
    }

    #[test]
    fn interval_validation_rejects_unrepresentable_offset() {
        let mut doc = document(IntervalPayload::Points(vec![IntervalPoint {
            sequence: 4_000_000_000,
            volume: 0.5,
        }]));
        doc.resolution_minutes = 1_000_000_000;
        assert!(matches!(
            validate_interval_document(&doc),
            Err(TransformError::InvalidRecord(_))
        ));
    }

    #[test]
    fn interval_validation_rejects_negative_total() {
        let doc = document(IntervalPayload::DailyTotal(-0.1));
        let res = validate_interval_document(&doc);
        assert!(matches!(res, Err(TransformError::InvalidRecord(_))));
    }

    #[test]
    fn interval_validation_rejects_zero_resolution() {
        let mut doc = document(IntervalPayload::DailyTotal(1.0));
        doc.resolution_minutes = 0;
        assert!(validate_interval_document(&doc).is_err());
    }

    #[test]
    fn interval_validation_rejects_out_of_range_ts() {
        let mut doc = document(IntervalPayload::DailyTotal(1.0));
        doc.interval.start = datetime!(1800-01-01 00:00:00 UTC);
        let res = validate_interval_document(&doc);
        assert!(matches!(res, Err(TransformError::InvalidRecord(_))));
    }

    #[test]
    fn period_validation_rejects_nan() {
        let period = MeterReadingPeriod {
            anchor: date!(2024-01-01),
            readings: vec![EslReading {
                code: "1-1:1.8.1".to_string(),
                value: f64::NAN,
            }],
        };
        assert!(matches!(
            validate_period(&period),
            Err(TransformError::InvalidRecord(_))
        ));
    }
}
