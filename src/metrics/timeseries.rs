use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//a point in the equity curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    //absolute distance below the running peak
    pub drawdown: f64,
    //same distance as a percentage of the peak
    pub drawdown_percent: f64,
}

//builds the equity curve one bar at a time, tracking the running peak
#[derive(Debug, Clone)]
pub struct EquityTracker {
    initial_capital: f64,
    peak: f64,
    points: Vec<EquityPoint>,
}

impl EquityTracker {
    pub fn new(initial_capital: f64) -> Self {
        EquityTracker {
            initial_capital,
            peak: initial_capital,
            points: Vec::new(),
        }
    }

    pub fn with_capacity(initial_capital: f64, capacity: usize) -> Self {
        EquityTracker {
            initial_capital,
            peak: initial_capital,
            points: Vec::with_capacity(capacity),
        }
    }

    //appends a point and returns it
    pub fn record(&mut self, timestamp: DateTime<Utc>, equity: f64) -> &EquityPoint {
        self.peak = self.peak.max(equity);
        let point = point_below_peak(timestamp, equity, self.peak);
        self.points.push(point);
        &self.points[self.points.len() - 1]
    }

    //overwrites the equity of the latest point (end-of-data settlement)
    pub fn restate_last(&mut self, equity: f64) {
        let Some(last) = self.points.pop() else {
            return;
        };

        self.peak = self
            .points
            .iter()
            .map(|p| p.equity)
            .fold(self.initial_capital, f64::max)
            .max(equity);
        self.points
            .push(point_below_peak(last.timestamp, equity, self.peak));
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    //fractional drawdown of the latest point
    pub fn current_drawdown(&self) -> f64 {
        match self.points.last() {
            Some(point) if self.peak > 0.0 => (self.peak - point.equity) / self.peak,
            _ => 0.0,
        }
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<EquityPoint> {
        self.points
    }
}

fn point_below_peak(timestamp: DateTime<Utc>, equity: f64, peak: f64) -> EquityPoint {
    let drawdown = (peak - equity).max(0.0);
    let drawdown_percent = if peak > 0.0 {
        drawdown / peak * 100.0
    } else {
        0.0
    };

    EquityPoint {
        timestamp,
        equity,
        drawdown,
        drawdown_percent,
    }
}

//per-period returns, the first one measured against the initial capital
pub fn calculate_returns(equity_curve: &[EquityPoint], initial_capital: f64) -> Vec<f64> {
    let mut returns = Vec::with_capacity(equity_curve.len());
    let mut previous = initial_capital;

    for point in equity_curve {
        let ret = if previous != 0.0 {
            (point.equity - previous) / previous
        } else {
            0.0
        };
        returns.push(ret);
        previous = point.equity;
    }

    returns
}

//calculates maximum drawdown percent from equity curve
pub fn max_drawdown_percent(equity_curve: &[EquityPoint]) -> f64 {
    equity_curve
        .iter()
        .map(|point| point.drawdown_percent)
        .fold(0.0, f64::max)
}

//an interval spent below a previous equity peak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPeriod {
    //first point below the peak
    pub start: DateTime<Utc>,
    //recovery timestamp, none if still under water at the end of the series
    pub end: Option<DateTime<Utc>>,
    pub trough_time: DateTime<Utc>,
    pub peak_equity: f64,
    pub trough_equity: f64,
    //peak-to-trough, absolute and percent
    pub depth: f64,
    pub depth_percent: f64,
    pub duration_secs: i64,
}

impl DrawdownPeriod {
    pub fn is_recovered(&self) -> bool {
        self.end.is_some()
    }
}

//single forward scan over the equity curve
pub fn drawdown_periods(equity_curve: &[EquityPoint], initial_capital: f64) -> Vec<DrawdownPeriod> {
    let mut periods = Vec::new();
    let mut peak = initial_capital;
    let mut open: Option<DrawdownPeriod> = None;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            if let Some(mut period) = open.take() {
                period.end = Some(point.timestamp);
                period.duration_secs = (point.timestamp - period.start).num_seconds();
                periods.push(period);
            }
            continue;
        }

        let depth = peak - point.equity;
        let period = open.get_or_insert_with(|| DrawdownPeriod {
            start: point.timestamp,
            end: None,
            trough_time: point.timestamp,
            peak_equity: peak,
            trough_equity: point.equity,
            depth: 0.0,
            depth_percent: 0.0,
            duration_secs: 0,
        });

        if depth > period.depth {
            period.depth = depth;
            period.depth_percent = if peak > 0.0 { depth / peak * 100.0 } else { 0.0 };
            period.trough_equity = point.equity;
            period.trough_time = point.timestamp;
        }
        period.duration_secs = (point.timestamp - period.start).num_seconds();
    }

    if let Some(period) = open {
        periods.push(period);
    }

    periods
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn curve(values: &[f64], initial: f64) -> Vec<EquityPoint> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tracker = EquityTracker::new(initial);
        for (i, &value) in values.iter().enumerate() {
            tracker.record(start + Duration::hours(i as i64), value);
        }
        tracker.into_points()
    }

    #[test]
    fn drawdown_is_measured_from_running_peak() {
        let points = curve(&[100.0, 120.0, 90.0, 130.0], 100.0);
        assert_eq!(points[1].drawdown, 0.0);
        assert_relative_eq!(points[2].drawdown, 30.0, epsilon = 1e-9);
        assert_relative_eq!(points[2].drawdown_percent, 25.0, epsilon = 1e-9);
        assert_relative_eq!(max_drawdown_percent(&points), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn first_return_uses_initial_capital() {
        let points = curve(&[110.0, 99.0], 100.0);
        let returns = calculate_returns(&points, 100.0);
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns[0], 0.1, epsilon = 1e-9);
        assert_relative_eq!(returns[1], -0.1, epsilon = 1e-12);
    }

    #[test]
    fn periods_close_on_new_peak() {
        let points = curve(&[100.0, 90.0, 80.0, 105.0, 95.0], 100.0);
        let periods = drawdown_periods(&points, 100.0);

        assert_eq!(periods.len(), 2);
        let first = &periods[0];
        assert!(first.is_recovered());
        assert_eq!(first.start, points[1].timestamp);
        assert_eq!(first.end, Some(points[3].timestamp));
        assert_eq!(first.trough_time, points[2].timestamp);
        assert_relative_eq!(first.depth, 20.0, epsilon = 1e-9);
        assert_eq!(first.duration_secs, 2 * 3600);

        let second = &periods[1];
        assert!(!second.is_recovered());
        assert_relative_eq!(second.peak_equity, 105.0, epsilon = 1e-9);
        assert_relative_eq!(second.depth, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn restating_last_point_recomputes_drawdown() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tracker = EquityTracker::new(100.0);
        tracker.record(start, 110.0);
        tracker.record(start + Duration::hours(1), 120.0);
        tracker.restate_last(105.0);

        assert_relative_eq!(tracker.peak(), 110.0, epsilon = 1e-9);
        let last = tracker.points().last().unwrap();
        assert_relative_eq!(last.equity, 105.0, epsilon = 1e-9);
        assert_relative_eq!(last.drawdown, 5.0, epsilon = 1e-9);
    }
}
