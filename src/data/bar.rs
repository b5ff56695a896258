use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BarError {
    #[error("Invalid OHLC values: high ({high}) < low ({low})")]
    InvalidHighLow { high: f64, low: f64 },
    #[error("Invalid OHLC values: close ({close}) outside high-low range [{low}, {high}]")]
    InvalidClose { close: f64, high: f64, low: f64 },
    #[error("Invalid OHLC values: open ({open}) outside high-low range [{low}, {high}]")]
    InvalidOpen { open: f64, high: f64, low: f64 },
    #[error("Negative volume: {0}")]
    NegativeVolume(f64),
    #[error("Timestamps must be strictly increasing: bar {index} at {timestamp} follows {previous}")]
    NonIncreasingTimestamp {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

//a single ohlcv bar (candlestick), read-only to the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    //creates a new Bar with validation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarError> {
        if high < low {
            return Err(BarError::InvalidHighLow { high, low });
        }

        if close < low || close > high {
            return Err(BarError::InvalidClose { close, high, low });
        }

        if open < low || open > high {
            return Err(BarError::InvalidOpen { open, high, low });
        }

        if volume < 0.0 {
            return Err(BarError::NegativeVolume(volume));
        }

        Ok(Self::new_unchecked(timestamp, open, high, low, close, volume))
    }

    //creates a Bar without validation
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

//checks that a series is ordered by strictly increasing timestamp
pub fn validate_series(bars: &[Bar]) -> Result<(), BarError> {
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(BarError::NonIncreasingTimestamp {
                index: index + 1,
                timestamp: pair[1].timestamp,
                previous: pair[0].timestamp,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    #[test]
    fn rejects_high_below_low() {
        let err = Bar::new(ts(0), 100.0, 95.0, 99.0, 97.0, 1.0).unwrap_err();
        assert_eq!(err, BarError::InvalidHighLow { high: 95.0, low: 99.0 });
    }

    #[test]
    fn rejects_close_outside_range() {
        assert!(matches!(
            Bar::new(ts(0), 100.0, 105.0, 95.0, 110.0, 1.0),
            Err(BarError::InvalidClose { .. })
        ));
    }

    #[test]
    fn series_must_be_strictly_increasing() {
        let bars = vec![
            Bar::new_unchecked(ts(0), 1.0, 1.0, 1.0, 1.0, 0.0),
            Bar::new_unchecked(ts(1), 1.0, 1.0, 1.0, 1.0, 0.0),
            Bar::new_unchecked(ts(1), 1.0, 1.0, 1.0, 1.0, 0.0),
        ];
        assert!(validate_series(&bars[..2]).is_ok());
        assert!(matches!(
            validate_series(&bars),
            Err(BarError::NonIncreasingTimestamp { index: 2, .. })
        ));
    }
}
