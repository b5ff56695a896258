use crate::config::StrategyConfig;
use crate::data::Bar;
use crate::engine::execution::OrderSide;
use crate::portfolio::ExitReason;
use crate::strategy::{offset_price, period_parameter, sma, Strategy, StrategyContext};

//sma crossover strategy
//goes long when fast sma crosses above slow sma
//goes short when fast sma crosses below slow sma
//each entry carries a percent stop-loss and take-profit
#[derive(Debug, Clone)]
pub struct SmaCrossoverStrategy {
    name: String,
    fast_period: usize,
    slow_period: usize,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    //none defers to the position sizing policy
    quantity: Option<f64>,

    //state
    last_fast_sma: Option<f64>,
    last_slow_sma: Option<f64>,
}

impl SmaCrossoverStrategy {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        stop_loss_pct: f64,
        take_profit_pct: f64,
    ) -> anyhow::Result<Self> {
        if fast_period == 0 || fast_period >= slow_period {
            anyhow::bail!(
                "fast_period ({}) must be at least 1 and below slow_period ({})",
                fast_period,
                slow_period
            );
        }
        if stop_loss_pct < 0.0 || take_profit_pct < 0.0 {
            anyhow::bail!("stop-loss and take-profit percentages must be non-negative");
        }

        Ok(SmaCrossoverStrategy {
            name: format!("SMA Crossover {}/{}", fast_period, slow_period),
            fast_period,
            slow_period,
            stop_loss_pct,
            take_profit_pct,
            quantity: None,
            last_fast_sma: None,
            last_slow_sma: None,
        })
    }

    //reads fast_period, slow_period, stop_loss_pct, take_profit_pct and quantity
    pub fn from_config(config: &StrategyConfig) -> anyhow::Result<Self> {
        let mut strategy = Self::new(
            period_parameter(config, "fast_period", 9)?,
            period_parameter(config, "slow_period", 21)?,
            config.parameter_or("stop_loss_pct", 2.0),
            config.parameter_or("take_profit_pct", 4.0),
        )?;
        strategy.quantity = config.parameter("quantity").filter(|q| *q > 0.0);
        Ok(strategy)
    }

    //returns some(buy) for a bullish cross, some(sell) for a bearish one
    fn check_crossover(&self, fast_sma: f64, slow_sma: f64) -> Option<OrderSide> {
        if let (Some(prev_fast), Some(prev_slow)) = (self.last_fast_sma, self.last_slow_sma) {
            if prev_fast <= prev_slow && fast_sma > slow_sma {
                return Some(OrderSide::Buy);
            }
            if prev_fast >= prev_slow && fast_sma < slow_sma {
                return Some(OrderSide::Sell);
            }
        }
        None
    }
}

impl Strategy for SmaCrossoverStrategy {
    fn initialize(&mut self, _config: &crate::config::BacktestConfig) -> anyhow::Result<()> {
        self.last_fast_sma = None;
        self.last_slow_sma = None;
        Ok(())
    }

    fn on_bar(&mut self, context: &mut StrategyContext, bar: &Bar) -> anyhow::Result<()> {
        let closes = context.close_prices(self.slow_period);
        if closes.len() < self.slow_period {
            return Ok(());
        }

        let (Some(fast_sma), Some(slow_sma)) = (
            sma(&closes[closes.len() - self.fast_period..]),
            sma(&closes),
        ) else {
            return Ok(());
        };

        let signal = self.check_crossover(fast_sma, slow_sma);
        self.last_fast_sma = Some(fast_sma);
        self.last_slow_sma = Some(slow_sma);

        let price = bar.close;
        match signal {
            Some(OrderSide::Buy) => {
                if context.position().is_some_and(|p| p.is_short()) {
                    context.close_position(Some(ExitReason::Signal));
                }
                if !context.has_position() {
                    context.log(format!(
                        "bullish cross {:.4} > {:.4} at {:.4}",
                        fast_sma, slow_sma, price
                    ));
                    context.buy(
                        self.quantity,
                        offset_price(price, self.stop_loss_pct, false),
                        offset_price(price, self.take_profit_pct, true),
                    );
                }
            }
            Some(OrderSide::Sell) => {
                if context.position().is_some_and(|p| p.is_long()) {
                    context.close_position(Some(ExitReason::Signal));
                }
                if !context.has_position() && context.allow_short() {
                    context.log(format!(
                        "bearish cross {:.4} < {:.4} at {:.4}",
                        fast_sma, slow_sma, price
                    ));
                    context.sell(
                        self.quantity,
                        offset_price(price, self.stop_loss_pct, true),
                        offset_price(price, self.take_profit_pct, false),
                    );
                }
            }
            None => {}
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
