use crate::config::{PositionSizing, SizingMethod};
use serde::{Deserialize, Serialize};

//stop distance assumed by risk-based sizing, as a fraction of price
pub const RISK_DISTANCE: f64 = 0.02;

//order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    //moves the price against the trader: up for buys, down for sells
    pub fn slipped_price(&self, price: f64, slippage_rate: f64) -> f64 {
        match self {
            OrderSide::Buy => price * (1.0 + slippage_rate),
            OrderSide::Sell => price * (1.0 - slippage_rate),
        }
    }
}

//a simulated fill with its costs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub side: OrderSide,
    pub reference_price: f64,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
    pub slippage_cost: f64,
}

impl Fill {
    //returns the notional value of the fill
    pub fn notional_value(&self) -> f64 {
        self.price * self.quantity
    }
}

//slippage and commission model shared by entries and exits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionModel {
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

impl ExecutionModel {
    pub fn new(commission_rate: f64, slippage_rate: f64) -> Self {
        ExecutionModel {
            commission_rate,
            slippage_rate,
        }
    }

    //fills `quantity` at `reference_price` moved against the trader
    pub fn fill(&self, side: OrderSide, reference_price: f64, quantity: f64) -> Fill {
        let price = side.slipped_price(reference_price, self.slippage_rate);
        let notional = price * quantity;

        Fill {
            side,
            reference_price,
            price,
            quantity,
            commission: notional * self.commission_rate,
            slippage_cost: (price - reference_price).abs() * quantity,
        }
    }
}

//quantity implied by the sizing policy at a given price
pub fn position_size(sizing: &PositionSizing, cash: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }

    match sizing.method {
        SizingMethod::Fixed => sizing.value,
        SizingMethod::Percent => cash * (sizing.value / 100.0) / price,
        SizingMethod::Risk => cash * (sizing.value / 100.0) / (price * RISK_DISTANCE),
    }
}

//largest quantity allowed by the max position size (fraction of equity)
pub fn max_quantity(max_position_size: f64, equity: f64, price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    (max_position_size * equity / price).max(0.0)
}
