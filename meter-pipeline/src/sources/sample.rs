//! Deterministic demonstration dataset.
//!
//! Produces hourly SDAT documents for both directions and monthly ESL
//! register readings consistent with them, so every series the resolver can
//! pick is populated. Output depends only on the arguments.

use std::f64::consts::PI;

use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, Duration, Time,
    Weekday,
};

use super::raw::{RawDataset, RawEslPeriod, RawEslValue, RawInterval, RawObservation, RawSdatDocument};
use crate::pipeline::PipelineError;

const PURCHASE_ID: &str = "ID735";
const FEED_IN_ID: &str = "ID742";
const HIGH_TARIFF_SHARE: f64 = 0.6;

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Yearly swing peaking mid-January for purchase, mid-July for feed-in.
fn seasonal(date: Date, peak_ordinal: f64) -> f64 {
    let phase = 2.0 * PI * (f64::from(date.ordinal()) - peak_ordinal) / 365.0;
    1.0 + 0.3 * phase.cos()
}

fn purchase_volume(date: Date, hour: u32) -> f64 {
    let weekend = matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday);
    let base = if weekend { 1.4 } else { 1.7 };
    let shape = match hour {
        0..=5 => 0.6,
        6..=8 => 1.4,
        17..=21 => 1.6,
        _ => 1.0,
    };
    round3(base * shape * seasonal(date, 15.0) / 24.0 * 2.0)
}

fn feed_in_volume(date: Date, hour: u32) -> f64 {
    if !(6..=20).contains(&hour) {
        return 0.0;
    }
    let sun = (PI * (f64::from(hour) - 6.0) / 14.0).sin();
    round3(2.4 * sun * seasonal(date, 196.0))
}

fn document(id: &str, day: Date, volume: fn(Date, u32) -> f64) -> Result<RawSdatDocument, PipelineError> {
    let format = |d: Date| {
        d.with_time(Time::MIDNIGHT)
            .assume_utc()
            .format(&Rfc3339)
            .map_err(|e| PipelineError::Source(format!("failed to format sample timestamp: {e}")))
    };
    let next = day
        .next_day()
        .ok_or_else(|| PipelineError::Source("sample range exceeds calendar".to_string()))?;

    Ok(RawSdatDocument {
        document_id: id.to_string(),
        interval: RawInterval {
            start: format(day)?,
            end: format(next)?,
        },
        resolution: 60,
        data: (0..24u32)
            .map(|hour| RawObservation {
                sequence: hour + 1,
                volume: volume(day, hour),
            })
            .collect(),
        total_daily: None,
    })
}

fn register_reading(anchor: Date, purchase: f64, feed_in: f64) -> Result<RawEslPeriod, PipelineError> {
    let month = anchor
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(|e| PipelineError::Source(format!("failed to format sample anchor: {e}")))?;
    let value = |obis: &str, v: f64| RawEslValue {
        obis: obis.to_string(),
        value: round3(v),
    };
    Ok(RawEslPeriod {
        month,
        data: vec![
            value("1-1:1.8.1", purchase * HIGH_TARIFF_SHARE),
            value("1-1:1.8.2", purchase * (1.0 - HIGH_TARIFF_SHARE)),
            value("1-1:2.8.1", feed_in * HIGH_TARIFF_SHARE),
            value("1-1:2.8.2", feed_in * (1.0 - HIGH_TARIFF_SHARE)),
        ],
    })
}

/// `days` days of data starting at `first_day`.
///
/// ESL periods are anchored on the first day of each month following a
/// month boundary crossed by the range and carry cumulative registers.
pub fn sample_dataset(first_day: Date, days: u32) -> Result<RawDataset, PipelineError> {
    let mut dataset = RawDataset::default();
    let mut purchase_total = 0.0;
    let mut feed_in_total = 0.0;

    for offset in 0..days {
        let day = first_day
            .checked_add(Duration::days(i64::from(offset)))
            .ok_or_else(|| PipelineError::Source("sample range exceeds calendar".to_string()))?;

        let purchase = document(PURCHASE_ID, day, purchase_volume)?;
        let feed_in = document(FEED_IN_ID, day, feed_in_volume)?;
        purchase_total += purchase.data.iter().map(|o| o.volume).sum::<f64>();
        feed_in_total += feed_in.data.iter().map(|o| o.volume).sum::<f64>();
        dataset.sdat.push(purchase);
        dataset.sdat.push(feed_in);

        if let Some(next) = day.next_day() {
            if next.day() == 1 {
                dataset.esl.push(register_reading(next, purchase_total, feed_in_total)?);
            }
        }
    }

    Ok(dataset)
}
