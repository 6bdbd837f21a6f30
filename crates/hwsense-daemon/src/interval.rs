//! Poll interval presets.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// How often the monitor collects a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PollInterval {
    /// 1 second.
    Fast,
    /// 2 seconds.
    #[default]
    Normal,
    /// 5 seconds.
    Eco,
    /// 10 seconds.
    Slow,
}

impl PollInterval {
    pub const ALL: [PollInterval; 4] = [
        PollInterval::Fast,
        PollInterval::Normal,
        PollInterval::Eco,
        PollInterval::Slow,
    ];

    /// Returns the timer period.
    pub fn period(&self) -> Duration {
        Duration::from_secs(match self {
            PollInterval::Fast => 1,
            PollInterval::Normal => 2,
            PollInterval::Eco => 5,
            PollInterval::Slow => 10,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PollInterval::Fast => "fast",
            PollInterval::Normal => "normal",
            PollInterval::Eco => "eco",
            PollInterval::Slow => "slow",
        }
    }
}

impl FromStr for PollInterval {
    type Err = String;

    /// Accepts a preset name or its period in seconds.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" | "1" | "1s" => Ok(PollInterval::Fast),
            "normal" | "2" | "2s" => Ok(PollInterval::Normal),
            "eco" | "5" | "5s" => Ok(PollInterval::Eco),
            "slow" | "10" | "10s" => Ok(PollInterval::Slow),
            _ => Err(format!(
                "Invalid interval '{}'. Valid: fast, normal, eco, slow (or 1, 2, 5, 10)",
                s
            )),
        }
    }
}

impl std::fmt::Display for PollInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<String> for PollInterval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PollInterval> for String {
    fn from(value: PollInterval) -> Self {
        value.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periods() {
        assert_eq!(PollInterval::Fast.period(), Duration::from_secs(1));
        assert_eq!(PollInterval::Normal.period(), Duration::from_secs(2));
        assert_eq!(PollInterval::Eco.period(), Duration::from_secs(5));
        assert_eq!(PollInterval::Slow.period(), Duration::from_secs(10));
        assert_eq!(PollInterval::default(), PollInterval::Normal);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("fast".parse::<PollInterval>().unwrap(), PollInterval::Fast);
        assert_eq!("ECO".parse::<PollInterval>().unwrap(), PollInterval::Eco);
        assert_eq!("10".parse::<PollInterval>().unwrap(), PollInterval::Slow);
        assert_eq!("2s".parse::<PollInterval>().unwrap(), PollInterval::Normal);
        assert!("3".parse::<PollInterval>().is_err());
        assert!("turbo".parse::<PollInterval>().is_err());

        for interval in PollInterval::ALL {
            assert_eq!(interval.to_string().parse::<PollInterval>().unwrap(), interval);
        }
    }
}
