pub mod esl;
pub mod granularity;
pub mod metric;
pub mod sdat;
pub mod series;

pub use esl::{EslReading, MeterReadingPeriod};
pub use granularity::{
    add_months, parse_date, DateRange, Granularity, GranularityError, GranularityKind,
};
pub use metric::{Direction, DirectionMap, MetricCodeMap, MetricConfig, MetricKey, MetricStyle};
pub use sdat::{Interval, IntervalDocument, IntervalPayload, IntervalPoint};
pub use series::{NormalizedPoint, SeriesError, SeriesKey, TimeSeries};
