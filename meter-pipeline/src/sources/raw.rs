use meter_client::domain::{
    EslReading, Interval, IntervalDocument, IntervalPayload, IntervalPoint, MeterReadingPeriod,
};
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::pipeline::TransformError;

/// Decoded upstream payload: ESL periods and SDAT documents side by side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataset {
    #[serde(rename = "esl-data", default)]
    pub esl: Vec<RawEslPeriod>,
    #[serde(rename = "sdat-data", default)]
    pub sdat: Vec<RawSdatDocument>,
}

impl RawDataset {
    pub fn len(&self) -> usize {
        self.esl.len() + self.sdat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.esl.is_empty() && self.sdat.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEslPeriod {
    #[serde(alias = "periodAnchor")]
    pub month: String,
    #[serde(alias = "readings", default)]
    pub data: Vec<RawEslValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEslValue {
    #[serde(alias = "code")]
    pub obis: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInterval {
    #[serde(rename = "startDateTime", alias = "start")]
    pub start: String,
    #[serde(rename = "endDateTime", alias = "end")]
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub sequence: u32,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSdatDocument {
    #[serde(rename = "documentID", alias = "directionId")]
    pub document_id: String,
    pub interval: RawInterval,
    #[serde(alias = "resolutionMinutes", default = "default_resolution")]
    pub resolution: u32,
    #[serde(alias = "points", default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<RawObservation>,
    #[serde(
        rename = "totalDaily",
        alias = "dailyTotal",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_daily: Option<f64>,
}

fn default_resolution() -> u32 {
    15
}

/// Parses an RFC 3339 instant, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC.
pub fn parse_instant(field: &'static str, s: &str) -> Result<OffsetDateTime, TransformError> {
    let trimmed = s.trim();
    if let Ok(ts) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(ts);
    }
    PrimitiveDateTime::parse(
        trimmed,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|_| TransformError::MalformedTimestamp {
        field,
        value: s.to_string(),
    })
}

/// Parses an ESL period anchor; any of the instant forms or a bare date.
pub fn parse_anchor(s: &str) -> Result<Date, TransformError> {
    if let Ok(date) = Date::parse(s.trim(), format_description!("[year]-[month]-[day]")) {
        return Ok(date);
    }
    parse_instant("period anchor", s).map(|ts| ts.date())
}

impl TryFrom<&RawEslPeriod> for MeterReadingPeriod {
    type Error = TransformError;

    fn try_from(raw: &RawEslPeriod) -> Result<Self, Self::Error> {
        Ok(MeterReadingPeriod {
            anchor: parse_anchor(&raw.month)?,
            readings: raw
                .data
                .iter()
                .map(|v| EslReading {
                    code: v.obis.clone(),
                    value: v.value,
                })
                .collect(),
        })
    }
}

impl TryFrom<&RawSdatDocument> for IntervalDocument {
    type Error = TransformError;

    /// Points take precedence over a total carried alongside them.
    fn try_from(raw: &RawSdatDocument) -> Result<Self, Self::Error> {
        let interval = Interval {
            start: parse_instant("interval start", &raw.interval.start)?,
            end: parse_instant("interval end", &raw.interval.end)?,
        };

        let payload = match (raw.data.is_empty(), raw.total_daily) {
            (false, _) => IntervalPayload::Points(
                raw.data
                    .iter()
                    .map(|o| IntervalPoint {
                        sequence: o.sequence,
                        volume: o.volume,
                    })
                    .collect(),
            ),
            (true, Some(total)) => IntervalPayload::DailyTotal(total),
            (true, None) => {
                return Err(TransformError::InvalidRecord(format!(
                    "document '{}' has neither observations nor a daily total",
                    raw.document_id
                )))
            }
        };

        Ok(IntervalDocument {
            direction_id: raw.document_id.clone(),
            interval,
            resolution_minutes: raw.resolution,
            payload,
        })
    }
}
