use crate::config::StrategyConfig;
use crate::data::Bar;
use crate::portfolio::ExitReason;
use crate::strategy::{offset_price, period_parameter, rsi, Strategy, StrategyContext};

//rsi mean reversion strategy
//buys when rsi drops below oversold and exits when it rises above overbought
//shorts the mirror image when shorting is allowed
#[derive(Debug, Clone)]
pub struct RsiReversionStrategy {
    name: String,
    period: usize,
    oversold: f64,
    overbought: f64,
    stop_loss_pct: f64,
    quantity: Option<f64>,
}

impl RsiReversionStrategy {
    pub fn new(
        period: usize,
        oversold: f64,
        overbought: f64,
        stop_loss_pct: f64,
    ) -> anyhow::Result<Self> {
        if period == 0 {
            anyhow::bail!("period must be at least 1");
        }
        if !(0.0..=100.0).contains(&oversold)
            || !(0.0..=100.0).contains(&overbought)
            || oversold >= overbought
        {
            anyhow::bail!(
                "thresholds must satisfy 0 <= oversold ({}) < overbought ({}) <= 100",
                oversold,
                overbought
            );
        }
        if stop_loss_pct < 0.0 {
            anyhow::bail!("stop_loss_pct must be non-negative, got {}", stop_loss_pct);
        }

        Ok(RsiReversionStrategy {
            name: format!("RSI Reversion {}", period),
            period,
            oversold,
            overbought,
            stop_loss_pct,
            quantity: None,
        })
    }

    //reads period, oversold, overbought, stop_loss_pct and quantity
    pub fn from_config(config: &StrategyConfig) -> anyhow::Result<Self> {
        let mut strategy = Self::new(
            period_parameter(config, "period", 14)?,
            config.parameter_or("oversold", 30.0),
            config.parameter_or("overbought", 70.0),
            config.parameter_or("stop_loss_pct", 2.0),
        )?;
        strategy.quantity = config.parameter("quantity").filter(|q| *q > 0.0);
        Ok(strategy)
    }
}

impl Strategy for RsiReversionStrategy {
    fn on_bar(&mut self, context: &mut StrategyContext, bar: &Bar) -> anyhow::Result<()> {
        let closes = context.close_prices(self.period + 1);
        let Some(rsi_value) = rsi(&closes, self.period) else {
            return Ok(());
        };

        //exit on the opposite extreme
        let exit = match context.position() {
            Some(p) if p.is_long() => rsi_value > self.overbought,
            Some(_) => rsi_value < self.oversold,
            None => false,
        };
        if exit {
            context.log(format!("rsi {:.2} exit at {:.4}", rsi_value, bar.close));
            context.close_position(Some(ExitReason::Signal));
        }

        if context.has_position() {
            return Ok(());
        }

        if rsi_value < self.oversold {
            context.log(format!("rsi {:.2} oversold at {:.4}", rsi_value, bar.close));
            context.buy(
                self.quantity,
                offset_price(bar.close, self.stop_loss_pct, false),
                None,
            );
        } else if rsi_value > self.overbought && context.allow_short() {
            context.log(format!("rsi {:.2} overbought at {:.4}", rsi_value, bar.close));
            context.sell(
                self.quantity,
                offset_price(bar.close, self.stop_loss_pct, true),
                None,
            );
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
