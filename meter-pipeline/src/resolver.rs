use std::borrow::Cow;

use meter_client::domain::{add_months, Granularity, GranularityKind, TimeSeries};
use serde::{Deserialize, Serialize};
use time::Date;

/// The three series a request can be answered from.
#[derive(Debug, Clone)]
pub struct SeriesSet {
    /// ESL register readings, one point per period.
    pub periods: TimeSeries,
    /// SDAT volumes summed per canonical day.
    pub daily: TimeSeries,
    /// SDAT volumes per interval.
    pub intervals: TimeSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSelector {
    Periods,
    Daily,
    Intervals,
}

impl SeriesSet {
    pub fn get(&self, selector: SeriesSelector) -> &TimeSeries {
        match selector {
            SeriesSelector::Periods => &self.periods,
            SeriesSelector::Daily => &self.daily,
            SeriesSelector::Intervals => &self.intervals,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Custom spans shorter than this many calendar months use the daily
    /// series, longer ones the ESL series.
    pub custom_threshold_months: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            custom_threshold_months: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    Fixed(SeriesSelector),
    SpanThreshold {
        under: SeriesSelector,
        over: SeriesSelector,
    },
}

const DECISION_TABLE: [(GranularityKind, Rule); 4] = [
    (GranularityKind::Day, Rule::Fixed(SeriesSelector::Intervals)),
    (GranularityKind::Month, Rule::Fixed(SeriesSelector::Daily)),
    (GranularityKind::Year, Rule::Fixed(SeriesSelector::Periods)),
    (
        GranularityKind::Custom,
        Rule::SpanThreshold {
            under: SeriesSelector::Daily,
            over: SeriesSelector::Periods,
        },
    ),
];

/// True when `end` lies less than `months` calendar months after `start`.
pub fn span_under(start: Date, end: Date, months: u32) -> bool {
    match add_months(start, months) {
        Some(limit) => end < limit,
        None => true,
    }
}

/// Picks a series for `granularity`.
///
/// `span` is the date range to judge custom requests by; without one the
/// longer-range series is chosen.
pub fn select(granularity: &Granularity, span: Option<(Date, Date)>, cfg: &ResolverConfig) -> SeriesSelector {
    let kind = granularity.kind();
    let rule = DECISION_TABLE
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, rule)| *rule)
        .unwrap_or(Rule::Fixed(SeriesSelector::Periods));

    match rule {
        Rule::Fixed(selector) => selector,
        Rule::SpanThreshold { under, over } => match span {
            Some((start, end)) if span_under(start, end, cfg.custom_threshold_months) => under,
            _ => over,
        },
    }
}

#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub selector: SeriesSelector,
    pub series: Cow<'a, TimeSeries>,
}

/// Selects the series for `granularity` from `set`.
///
/// Custom requests are judged by their own range when they carry one,
/// otherwise by the span of the daily series; an explicit range also clips
/// the result.
pub fn resolve<'a>(set: &'a SeriesSet, granularity: &Granularity, cfg: &ResolverConfig) -> Resolved<'a> {
    let range = granularity.range();
    let span = match range {
        Some(r) => Some((r.start(), r.end())),
        None => set.daily.span(),
    };
    let selector = select(granularity, span, cfg);
    let chosen = set.get(selector);

    let series = match range {
        Some(r) => Cow::Owned(chosen.clip(r)),
        None => Cow::Borrowed(chosen),
    };
    tracing::debug!(granularity = %granularity.kind(), ?selector, points = series.len(), "series resolved");
    Resolved { selector, series }
}
