use time::Date;

/// One register value inside an ESL time period.
#[derive(Debug, Clone, PartialEq)]
pub struct EslReading {
    pub code: String,
    pub value: f64,
}

/// Cumulative register readings for one ESL time period.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReadingPeriod {
    pub anchor: Date,
    pub readings: Vec<EslReading>,
}
