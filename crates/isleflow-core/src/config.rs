//! Engine tuning knobs. Deserializable so data files can override them.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Millis, f64_to_fixed64_lossy};

/// Rates closer than this are considered equal (damping, highlighting).
pub const DEFAULT_ACCURACY: f64 = 0.01;

/// Lower bound for any productivity boost; keeps divisions finite.
pub const DEFAULT_BOOST_FLOOR: f64 = 0.01;

/// Upper bound on resolver + damping passes per settle.
pub const DEFAULT_MAX_SETTLE_PASSES: u32 = 64;

/// Upper bound on hops when walking a chain of trade routes.
pub const DEFAULT_MAX_TRADE_CHAIN: u32 = 1000;

/// Samples younger than this are treated as automatic re-triggers.
pub const DEFAULT_DAMPING_WINDOW_MS: Millis = 200;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub accuracy: f64,
    pub boost_floor: f64,
    pub max_settle_passes: u32,
    pub max_trade_chain: u32,
    pub damping_window_ms: Millis,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accuracy: DEFAULT_ACCURACY,
            boost_floor: DEFAULT_BOOST_FLOOR,
            max_settle_passes: DEFAULT_MAX_SETTLE_PASSES,
            max_trade_chain: DEFAULT_MAX_TRADE_CHAIN,
            damping_window_ms: DEFAULT_DAMPING_WINDOW_MS,
        }
    }
}

impl EngineConfig {
    pub fn accuracy(&self) -> Fixed64 {
        f64_to_fixed64_lossy(self.accuracy)
    }

    pub fn boost_floor(&self) -> Fixed64 {
        let floor = f64_to_fixed64_lossy(self.boost_floor);
        if floor <= Fixed64::ZERO {
            f64_to_fixed64_lossy(DEFAULT_BOOST_FLOOR)
        } else {
            floor
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.max_trade_chain, 1000);
        assert_eq!(config.damping_window_ms, 200);
        assert_eq!(config.accuracy(), Fixed64::from_num(0.01));
    }

    #[test]
    fn non_positive_floor_falls_back() {
        let config = EngineConfig {
            boost_floor: -1.0,
            ..EngineConfig::default()
        };
        assert_eq!(config.boost_floor(), Fixed64::from_num(DEFAULT_BOOST_FLOOR));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"accuracy": 0.5}"#).unwrap();
        assert_eq!(config.accuracy, 0.5);
        assert_eq!(config.max_settle_passes, DEFAULT_MAX_SETTLE_PASSES);
    }
}
