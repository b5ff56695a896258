use crate::metrics::performance::PerformanceMetrics;
use crate::metrics::trade_statistics::TradeStatistics;
use prettytable::{Cell, Row, Table};

fn row(table: &mut Table, name: &str, value: String) {
    table.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
}

fn hours(secs: f64) -> String {
    format!("{:.1}h", secs / 3600.0)
}

impl PerformanceMetrics {
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(Row::new(vec![Cell::new("Metric"), Cell::new("Value")]));

        row(&mut table, "Initial Capital", format!("${:.2}", self.initial_capital));
        row(&mut table, "Final Equity", format!("${:.2}", self.final_equity));
        row(
            &mut table,
            "Total Return",
            format!("${:.2} ({:.2}%)", self.total_return, self.total_return_percent),
        );
        row(
            &mut table,
            "Annualized Return",
            format!("{:.2}%", self.annualized_return_percent),
        );
        row(&mut table, "CAGR", format!("{:.2}%", self.cagr_percent));
        row(
            &mut table,
            "Volatility (ann.)",
            format!("{:.2}%", self.annualized_volatility_percent),
        );
        row(&mut table, "Sharpe Ratio", format!("{:.3}", self.sharpe_ratio));
        row(&mut table, "Sortino Ratio", format!("{:.3}", self.sortino_ratio));
        row(&mut table, "Calmar Ratio", format!("{:.3}", self.calmar_ratio));
        row(&mut table, "K-Ratio", format!("{:.3}", self.k_ratio));
        row(&mut table, "Omega Ratio", format!("{:.3}", self.omega_ratio));
        row(
            &mut table,
            "Max Drawdown",
            format!("${:.2} ({:.2}%)", self.max_drawdown, self.max_drawdown_percent),
        );
        row(
            &mut table,
            "Max DD Duration",
            hours(self.max_drawdown_duration_secs as f64),
        );
        row(&mut table, "Ulcer Index", format!("{:.3}", self.ulcer_index));
        row(
            &mut table,
            "VaR / CVaR 95%",
            format!("{:.4} / {:.4}", self.var_95, self.cvar_95),
        );
        row(&mut table, "Number of Trades", format!("{}", self.total_trades));
        row(&mut table, "Win Rate", format!("{:.2}%", self.win_rate));
        row(&mut table, "Avg Win", format!("${:.2}", self.avg_win));
        row(&mut table, "Avg Loss", format!("${:.2}", self.avg_loss));
        row(&mut table, "Largest Win", format!("${:.2}", self.largest_win));
        row(&mut table, "Largest Loss", format!("${:.2}", self.largest_loss));
        row(&mut table, "Profit Factor", format!("{:.3}", self.profit_factor));
        row(&mut table, "Expectancy", format!("${:.2}", self.expectancy));
        row(&mut table, "Exposure", format!("{:.2}%", self.exposure_percent));
        row(&mut table, "Total Fees", format!("${:.2}", self.total_fees));

        table
    }

    //prints metrics in a formatted table
    pub fn pretty_print_table(&self) {
        self.to_table().printstd();
    }
}

impl TradeStatistics {
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("Side"),
            Cell::new("Trades"),
            Cell::new("Win Rate"),
            Cell::new("Profit Factor"),
            Cell::new("Net P&L"),
        ]));

        for (name, side) in [("Long", &self.long), ("Short", &self.short)] {
            table.add_row(Row::new(vec![
                Cell::new(name),
                Cell::new(&side.trades.to_string()),
                Cell::new(&format!("{:.2}%", side.win_rate)),
                Cell::new(&format!("{:.3}", side.profit_factor)),
                Cell::new(&format!("${:.2}", side.net_pnl)),
            ]));
        }

        table
    }

    pub fn pretty_print_table(&self) {
        self.to_table().printstd();

        let mut table = Table::new();
        row(
            &mut table,
            "Holding (min/avg/max)",
            format!(
                "{} / {} / {}",
                hours(self.min_holding_secs as f64),
                hours(self.avg_holding_secs),
                hours(self.max_holding_secs as f64)
            ),
        );
        row(
            &mut table,
            "Streaks (win/loss)",
            format!(
                "{} / {}",
                self.max_consecutive_wins, self.max_consecutive_losses
            ),
        );
        row(
            &mut table,
            "Trades per day/week/month",
            format!(
                "{:.2} / {:.2} / {:.2}",
                self.trades_per_day, self.trades_per_week, self.trades_per_month
            ),
        );
        row(
            &mut table,
            "Exits (stop/target/signal)",
            format!(
                "{} / {} / {}",
                self.exit_reasons.stop_loss,
                self.exit_reasons.take_profit,
                self.exit_reasons.signal
            ),
        );
        table.printstd();
    }
}
