use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Energy flow direction of an SDAT interval document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Purchase,
    FeedIn,
}

impl Direction {
    pub fn metric_key(self) -> MetricKey {
        match self {
            Direction::Purchase => MetricKey::Purchase,
            Direction::FeedIn => MetricKey::FeedIn,
        }
    }
}

/// Every numeric field a normalized point can carry.
///
/// Declaration order is the field order used by the exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Purchase,
    FeedIn,
    HighTariffPurchase,
    LowTariffPurchase,
    HighTariffFeedIn,
    LowTariffFeedIn,
}

impl MetricKey {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKey::Purchase => "purchase",
            MetricKey::FeedIn => "feed_in",
            MetricKey::HighTariffPurchase => "high_tariff_purchase",
            MetricKey::LowTariffPurchase => "low_tariff_purchase",
            MetricKey::HighTariffFeedIn => "high_tariff_feed_in",
            MetricKey::LowTariffFeedIn => "low_tariff_feed_in",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps external SDAT document identifiers to a [`Direction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectionMap {
    entries: HashMap<String, Direction>,
}

impl DirectionMap {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, document_id: impl Into<String>, direction: Direction) -> Self {
        self.entries.insert(document_id.into(), direction);
        self
    }

    pub fn resolve(&self, document_id: &str) -> Option<Direction> {
        self.entries.get(document_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DirectionMap {
    /// Identifiers used by the reference SDAT exports.
    fn default() -> Self {
        Self::new()
            .with("ID735", Direction::Purchase)
            .with("ID742", Direction::FeedIn)
    }
}

/// Maps ESL register codes (OBIS) to a [`MetricKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricCodeMap {
    codes: HashMap<String, MetricKey>,
}

impl MetricCodeMap {
    pub fn new() -> Self {
        Self {
            codes: HashMap::new(),
        }
    }

    pub fn with(mut self, code: impl Into<String>, key: MetricKey) -> Self {
        self.codes.insert(code.into(), key);
        self
    }

    pub fn resolve(&self, code: &str) -> Option<MetricKey> {
        self.codes.get(code.trim()).copied()
    }
}

impl Default for MetricCodeMap {
    fn default() -> Self {
        Self::new()
            .with("1-1:1.8.1", MetricKey::HighTariffPurchase)
            .with("1-1:1.8.2", MetricKey::LowTariffPurchase)
            .with("1-1:2.8.1", MetricKey::HighTariffFeedIn)
            .with("1-1:2.8.2", MetricKey::LowTariffFeedIn)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricStyle {
    pub label: String,
    pub color: String,
}

impl MetricStyle {
    pub fn new(label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: color.into(),
        }
    }
}

/// Label and color for every metric a series may carry.
///
/// A [`crate::domain::TimeSeries`] refuses points with metrics missing here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricConfig {
    styles: BTreeMap<MetricKey, MetricStyle>,
}

impl MetricConfig {
    pub fn new() -> Self {
        Self {
            styles: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: MetricKey, style: MetricStyle) -> Self {
        self.styles.insert(key, style);
        self
    }

    /// Register readings from ESL files.
    pub fn esl_default() -> Self {
        Self::new()
            .with(
                MetricKey::HighTariffPurchase,
                MetricStyle::new("Purchase (high tariff)", "hsl(var(--chart-1))"),
            )
            .with(
                MetricKey::LowTariffPurchase,
                MetricStyle::new("Purchase (low tariff)", "hsl(var(--chart-2))"),
            )
            .with(
                MetricKey::HighTariffFeedIn,
                MetricStyle::new("Feed-in (high tariff)", "hsl(var(--chart-3))"),
            )
            .with(
                MetricKey::LowTariffFeedIn,
                MetricStyle::new("Feed-in (low tariff)", "hsl(var(--chart-4))"),
            )
    }

    /// Interval volumes from SDAT files, one metric per direction.
    pub fn sdat_default() -> Self {
        Self::new()
            .with(MetricKey::Purchase, MetricStyle::new("Purchase", "hsl(var(--chart-1))"))
            .with(MetricKey::FeedIn, MetricStyle::new("Feed-in", "hsl(var(--chart-2))"))
    }

    pub fn contains(&self, key: MetricKey) -> bool {
        self.styles.contains_key(&key)
    }

    pub fn style(&self, key: MetricKey) -> Option<&MetricStyle> {
        self.styles.get(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = MetricKey> + '_ {
        self.styles.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}
