use super::ui;
use crate::core::DataContext;
use crate::optimize::{OptimizationRequest, OptimizationResult, optimize_portfolio_with_progress};
use anyhow::Result;
use comfy_table::Cell;

impl OptimizationResult {
    pub fn display_as_table(&self) -> String {
        let mut output = format!(
            "Optimized portfolio ({}, {} days)\n\n",
            ui::style_text(self.risk_method.as_str(), ui::StyleType::Title),
            self.lookback_days
        );

        let Some(weights) = &self.weights else {
            output.push_str(&ui::style_text(
                self.note.as_deref().unwrap_or("Optimization failed."),
                ui::StyleType::Error,
            ));
            return output;
        };

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Asset"),
            ui::header_cell("Weight"),
            ui::header_cell("Units"),
        ]);
        for asset in &self.assets {
            let weight = weights.get(asset).copied().unwrap_or(0.0);
            let units = self
                .allocation
                .as_ref()
                .and_then(|a| a.units.get(asset).copied());
            table.add_row(vec![
                Cell::new(asset),
                ui::number_cell(ui::format_percent(weight)),
                ui::format_optional_cell(units, |u| format!("{u:.4}")),
            ]);
        }
        output.push_str(&table.to_string());

        let mut stats = ui::new_styled_table();
        stats.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);
        stats.add_row(vec![
            Cell::new("Expected annual return"),
            ui::format_optional_cell(self.expected_return, ui::format_percent),
        ]);
        stats.add_row(vec![
            Cell::new("Annual volatility"),
            ui::format_optional_cell(self.volatility, ui::format_percent),
        ]);
        stats.add_row(vec![
            Cell::new("Sharpe ratio"),
            ui::format_optional_cell(self.sharpe_ratio, |s| format!("{s:.2}")),
        ]);
        stats.add_row(vec![
            Cell::new("Portfolio value"),
            ui::format_optional_cell(self.total_value, ui::format_usd),
        ]);
        if let Some(alloc) = &self.allocation {
            stats.add_row(vec![
                Cell::new("Leftover cash"),
                ui::number_cell(format!(
                    "{} ({})",
                    ui::format_usd(alloc.leftover),
                    ui::format_percent(alloc.leftover_fraction)
                )),
            ]);
        }
        output.push_str("\n\n");
        output.push_str(&stats.to_string());

        if !self.efficient_frontier.is_empty() {
            let mut frontier = ui::new_styled_table();
            frontier.set_header(vec![
                ui::header_cell("Volatility"),
                ui::header_cell("Return"),
            ]);
            for point in &self.efficient_frontier {
                frontier.add_row(vec![
                    ui::number_cell(ui::format_percent(point.volatility)),
                    ui::signed_percent_cell(point.expected_return),
                ]);
            }
            output.push_str(&format!(
                "\n\n{}\n{}",
                ui::style_text("Efficient frontier", ui::StyleType::Label),
                frontier
            ));
        }

        if let Some(note) = &self.note {
            output.push_str(&format!(
                "\n\n{}",
                ui::style_text(note, ui::StyleType::Warning)
            ));
        }
        output
    }
}

pub async fn run(ctx: &DataContext, request: &OptimizationRequest, json: bool) -> Result<()> {
    let pb = ui::new_progress_bar(request.holdings.len() as u64, true);
    pb.set_message("Fetching history...");
    let result = optimize_portfolio_with_progress(ctx, request, &|symbol: &str| {
        pb.set_message(format!("Fetched {symbol}"));
        pb.inc(1);
    })
    .await;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.display_as_table());
    }

    if let Some(kind) = result.failure {
        anyhow::bail!("Optimization did not produce weights ({kind:?})");
    }
    Ok(())
}
