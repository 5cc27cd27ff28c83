use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Symbolic priority class of a task.
///
/// There is a single total order, `High > Medium > Low > Unknown`, expressed by
/// [`Priority::rank`]. Both numeric scales used by the system derive from it:
/// the broker delivery priority ([`Priority::delivery_priority`], 10/5/1/0) and
/// the in-batch execution order (the rank itself, 3/2/1/0).
///
/// Unrecognized symbols are kept verbatim in `Unknown` so they survive a
/// serialization round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Priority {
    High,
    Medium,
    Low,
    Unknown(String),
}

impl Priority {
    pub const HIGH: &'static str = "high";
    pub const MEDIUM: &'static str = "medium";
    pub const LOW: &'static str = "low";

    /// Delivery priority handed to the broker, indexed by rank
    const DELIVERY_SCALE: [u8; 4] = [0, 1, 5, 10];

    /// Parse a symbol. Matching is exact and case sensitive.
    pub fn parse(symbol: &str) -> Self {
        match symbol {
            Self::HIGH => Priority::High,
            Self::MEDIUM => Priority::Medium,
            Self::LOW => Priority::Low,
            other => Priority::Unknown(other.to_string()),
        }
    }

    /// Position in the canonical order: high=3, medium=2, low=1, unknown=0
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::Unknown(_) => 0,
        }
    }

    /// Numeric broker priority: high=10, medium=5, low=1, unknown=0
    pub fn delivery_priority(&self) -> u8 {
        Self::DELIVERY_SCALE[self.rank() as usize]
    }

    /// Whether this is one of the three recognized symbols
    pub fn is_known(&self) -> bool {
        !matches!(self, Priority::Unknown(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::High => Self::HIGH,
            Priority::Medium => Self::MEDIUM,
            Priority::Low => Self::LOW,
            Priority::Unknown(symbol) => symbol,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Unknown(String::new())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Priority {
    fn from(symbol: &str) -> Self {
        Priority::parse(symbol)
    }
}

impl From<String> for Priority {
    fn from(symbol: String) -> Self {
        match symbol.as_str() {
            Self::HIGH | Self::MEDIUM | Self::LOW => Priority::parse(&symbol),
            _ => Priority::Unknown(symbol),
        }
    }
}

impl From<Priority> for String {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Unknown(symbol) => symbol,
            known => known.as_str().to_string(),
        }
    }
}

// `null` reads as the empty symbol, same as a missing key.
impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let symbol = Option::<String>::deserialize(deserializer)?;
        Ok(symbol.map(Priority::from).unwrap_or_default())
    }
}
