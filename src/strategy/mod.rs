pub mod rsi_reversion;
pub mod sma_crossover;

use crate::config::{BacktestConfig, StrategyConfig};
use crate::data::Bar;
use crate::engine::execution::{max_quantity, position_size};
use crate::error::ConfigError;
use crate::portfolio::{Account, Direction, ExitReason, OpenRejection, OpenRequest, Position};
use chrono::{DateTime, Utc};
use tracing::warn;

//strategy interface that all strategies must implement
//an error from any callback fails the run
pub trait Strategy: Send {
    //called once before the first bar
    fn initialize(&mut self, _config: &BacktestConfig) -> anyhow::Result<()> {
        Ok(())
    }

    //called on each processed bar, after stop checks
    fn on_bar(&mut self, context: &mut StrategyContext, bar: &Bar) -> anyhow::Result<()>;

    //called at the last processed bar, before any end-of-data close
    fn finalize(&mut self, _context: &mut StrategyContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

//builds a fresh strategy for every run
pub trait StrategyFactory {
    fn create(&self, config: &StrategyConfig) -> anyhow::Result<Box<dyn Strategy>>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&StrategyConfig) -> anyhow::Result<Box<dyn Strategy>>,
{
    fn create(&self, config: &StrategyConfig) -> anyhow::Result<Box<dyn Strategy>> {
        self(config)
    }
}

//resolves the bundled strategies by name
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinStrategies;

impl BuiltinStrategies {
    pub const NAMES: [&'static str; 2] = ["sma_crossover", "rsi_reversion"];
}

impl StrategyFactory for BuiltinStrategies {
    fn create(&self, config: &StrategyConfig) -> anyhow::Result<Box<dyn Strategy>> {
        match config.name.to_ascii_lowercase().as_str() {
            "sma_crossover" | "sma" | "ma_cross" => Ok(Box::new(
                sma_crossover::SmaCrossoverStrategy::from_config(config)?,
            )),
            "rsi_reversion" | "rsi" => Ok(Box::new(
                rsi_reversion::RsiReversionStrategy::from_config(config)?,
            )),
            _ => Err(ConfigError::UnknownStrategy(config.name.clone()).into()),
        }
    }
}

//strategy log lines and soft rejections collected during a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunJournal {
    pub logs: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunJournal {
    pub fn warn(&mut self, index: usize, message: String) {
        warn!("bar {}: {}", index, message);
        self.warnings.push(format!("bar {}: {}", index, message));
    }
}

//view of the run handed to the strategy on each bar
pub struct StrategyContext<'a> {
    bars: &'a [Bar],
    index: usize,
    config: &'a BacktestConfig,
    account: &'a mut Account,
    journal: &'a mut RunJournal,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        bars: &'a [Bar],
        index: usize,
        config: &'a BacktestConfig,
        account: &'a mut Account,
        journal: &'a mut RunJournal,
    ) -> Self {
        StrategyContext {
            bars,
            index,
            config,
            account,
            journal,
        }
    }

    pub fn bar(&self) -> &Bar {
        &self.bars[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.bar().timestamp
    }

    //every bar up to and including the current one
    pub fn history(&self) -> &[Bar] {
        &self.bars[..=self.index]
    }

    //close prices of the last n bars, oldest first
    pub fn close_prices(&self, n: usize) -> Vec<f64> {
        let history = self.history();
        let start = history.len().saturating_sub(n);
        history[start..].iter().map(|b| b.close).collect()
    }

    pub fn cash(&self) -> f64 {
        self.account.cash
    }

    //marked at the current close
    pub fn equity(&self) -> f64 {
        self.account.equity(self.bar().close)
    }

    pub fn position(&self) -> Option<&Position> {
        self.account.position.as_ref()
    }

    pub fn has_position(&self) -> bool {
        self.account.has_position()
    }

    pub fn allow_short(&self) -> bool {
        self.config.allow_short
    }

    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.config.strategy.parameter(name)
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.journal.logs.push(message.into());
    }

    //opens a long at the bar close; false when rejected
    pub fn buy(
        &mut self,
        quantity: Option<f64>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        self.open(Direction::Long, quantity, stop_loss, take_profit)
    }

    //opens a short at the bar close; false when rejected
    pub fn sell(
        &mut self,
        quantity: Option<f64>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        self.open(Direction::Short, quantity, stop_loss, take_profit)
    }

    //closes at the bar close; false when flat
    pub fn close_position(&mut self, reason: Option<ExitReason>) -> bool {
        let bar = &self.bars[self.index];
        self.account
            .close(bar.close, bar.timestamp, reason.unwrap_or(ExitReason::Signal))
            .is_some()
    }

    fn open(
        &mut self,
        direction: Direction,
        quantity: Option<f64>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> bool {
        let action = match direction {
            Direction::Long => "buy",
            Direction::Short => "sell",
        };

        //checked before clamping, f64::min would swallow a NaN
        let invalid_quantity = quantity.filter(|q| !(*q > 0.0 && q.is_finite()));

        let rejection = if let Some(position) = &self.account.position {
            Some(OpenRejection::PositionAlreadyOpen(position.direction))
        } else if direction == Direction::Short && !self.config.allow_short {
            Some(OpenRejection::ShortingDisabled)
        } else if let Some(q) = invalid_quantity {
            Some(OpenRejection::NonPositiveQuantity(q))
        } else {
            None
        };
        if let Some(rejection) = rejection {
            self.journal
                .warn(self.index, format!("{} ignored: {}", action, rejection));
            return false;
        }

        let bar = &self.bars[self.index];
        let price = bar.close;
        let equity = self.account.equity(price);
        let quantity = quantity
            .unwrap_or_else(|| position_size(&self.config.position_sizing, self.account.cash, price))
            .min(max_quantity(self.config.max_position_size, equity, price));

        let request = OpenRequest {
            direction,
            quantity,
            price,
            time: bar.timestamp,
            stop_loss,
            take_profit,
        };

        match self.account.open(request) {
            Ok(_) => true,
            Err(rejection) => {
                self.journal
                    .warn(self.index, format!("{} ignored: {}", action, rejection));
                false
            }
        }
    }
}

//reads a lookback length from the strategy parameters
pub(crate) fn period_parameter(
    config: &StrategyConfig,
    name: &str,
    default: usize,
) -> anyhow::Result<usize> {
    let value = config.parameter_or(name, default as f64).round();
    if !(value >= 1.0) {
        anyhow::bail!("{} must be at least 1, got {}", name, value);
    }
    Ok(value as usize)
}

//stop or target placed `percent` away from the price; none when percent is 0
pub(crate) fn offset_price(price: f64, percent: f64, above: bool) -> Option<f64> {
    if percent <= 0.0 {
        return None;
    }
    let offset = price * percent / 100.0;
    Some(if above { price + offset } else { price - offset })
}

//simple moving average of the given prices
pub fn sma(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    Some(prices.iter().sum::<f64>() / prices.len() as f64)
}

//relative strength index over the last `period` changes
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - period - 1..];
    let (gain, loss) = window
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(gain, loss), change| {
            if change > 0.0 {
                (gain + change, loss)
            } else {
                (gain, loss - change)
            }
        });

    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}
