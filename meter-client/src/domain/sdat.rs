use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalPoint {
    /// 1-based position inside the interval.
    pub sequence: u32,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntervalPayload {
    Points(Vec<IntervalPoint>),
    DailyTotal(f64),
}

/// A decoded SDAT document for a single direction.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalDocument {
    pub direction_id: String,
    pub interval: Interval,
    pub resolution_minutes: u32,
    pub payload: IntervalPayload,
}

impl IntervalDocument {
    /// Sum of all point volumes, or the pre-aggregated total.
    pub fn total_volume(&self) -> f64 {
        match &self.payload {
            IntervalPayload::Points(points) => points.iter().map(|p| p.volume).sum(),
            IntervalPayload::DailyTotal(total) => *total,
        }
    }

    /// Absolute instant of the point at `sequence`.
    ///
    /// Returns `None` for sequence 0 or when the result leaves the
    /// representable range.
    pub fn instant_of(&self, sequence: u32) -> Option<OffsetDateTime> {
        let steps = i64::from(sequence.checked_sub(1)?);
        let secs = steps
            .checked_mul(i64::from(self.resolution_minutes))?
            .checked_mul(60)?;
        self.interval.start.checked_add(Duration::seconds(secs))
    }
}
