use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    M1,   // 1 minute
    M5,   // 5 minutes
    M15,  // 15 minutes
    H1,   // 1 hour
    H4,   // 4 hours
    D1,   // 1 day
}

impl TimeFrame {
    /// Binance kline interval string
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "1m",
            TimeFrame::M5 => "5m",
            TimeFrame::M15 => "15m",
            TimeFrame::H1 => "1h",
            TimeFrame::H4 => "4h",
            TimeFrame::D1 => "1d",
        }
    }
}

impl FromStr for TimeFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "M1" | "1M" => Ok(TimeFrame::M1),
            "M5" | "5M" => Ok(TimeFrame::M5),
            "M15" | "15M" => Ok(TimeFrame::M15),
            "H1" | "1H" => Ok(TimeFrame::H1),
            "H4" | "4H" => Ok(TimeFrame::H4),
            "D1" | "1D" => Ok(TimeFrame::D1),
            _ => Err(format!("Unknown timeframe: {}", s)),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_spellings() {
        assert_eq!("1h".parse::<TimeFrame>().unwrap(), TimeFrame::H1);
        assert_eq!("H4".parse::<TimeFrame>().unwrap(), TimeFrame::H4);
        assert_eq!("5m".parse::<TimeFrame>().unwrap(), TimeFrame::M5);
        assert!("2h".parse::<TimeFrame>().is_err());
    }
}
