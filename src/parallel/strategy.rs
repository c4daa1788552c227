use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{ParconvError, ParconvResult};
use crate::parallel::partition::PartitionPolicy;

/// How a stage distributes its per-pixel work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Single worker on the calling thread; no partitioning, no barrier.
    Sequential,
    /// Fixed contiguous index ranges, one per worker.
    StaticChunks,
    /// Workers claim single indices from a shared atomic cursor.
    #[default]
    DynamicCursor,
    /// Rows scheduled by a rayon pool sized to the worker count.
    RayonRows,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::StaticChunks,
        Strategy::DynamicCursor,
        Strategy::RayonRows,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::StaticChunks => "static-chunks",
            Strategy::DynamicCursor => "dynamic-cursor",
            Strategy::RayonRows => "rayon-rows",
        }
    }

    /// Partition policy for the strategies that run on the crate's own worker threads.
    pub(crate) fn partition_policy(self) -> Option<PartitionPolicy> {
        match self {
            Strategy::StaticChunks => Some(PartitionPolicy::Static),
            Strategy::DynamicCursor => Some(PartitionPolicy::Dynamic),
            Strategy::Sequential | Strategy::RayonRows => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric selector: `1` sequential, `2` static chunks, `3` dynamic cursor, `4` rayon rows.
impl TryFrom<u32> for Strategy {
    type Error = ParconvError;

    fn try_from(v: u32) -> ParconvResult<Self> {
        match v {
            1 => Ok(Strategy::Sequential),
            2 => Ok(Strategy::StaticChunks),
            3 => Ok(Strategy::DynamicCursor),
            4 => Ok(Strategy::RayonRows),
            other => Err(ParconvError::invalid_configuration(format!(
                "unrecognized strategy selector {other} (expected 1..=4)"
            ))),
        }
    }
}

impl FromStr for Strategy {
    type Err = ParconvError;

    fn from_str(s: &str) -> ParconvResult<Self> {
        if let Ok(n) = s.parse::<u32>() {
            return Strategy::try_from(n);
        }
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                ParconvError::invalid_configuration(format!("unrecognized strategy '{s}'"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_selector_round_trips_names() {
        for (i, strategy) in Strategy::ALL.into_iter().enumerate() {
            assert_eq!(Strategy::try_from(i as u32 + 1).unwrap(), strategy);
            assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn unknown_selectors_are_configuration_errors() {
        assert!(matches!(
            Strategy::try_from(0),
            Err(ParconvError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            "work-stealing".parse::<Strategy>(),
            Err(ParconvError::InvalidConfiguration(_))
        ));
        assert!("9".parse::<Strategy>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&Strategy::StaticChunks).unwrap(),
            "\"static-chunks\""
        );
        let s: Strategy = serde_json::from_str("\"dynamic-cursor\"").unwrap();
        assert_eq!(s, Strategy::DynamicCursor);
    }
}
