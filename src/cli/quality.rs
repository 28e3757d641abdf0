use super::ui;
use crate::core::DataContext;
use crate::data::{QualityIssue, get_historical_prices, validate_price_matrix};
use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;

/// Availability and quality of history for a set of symbols.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub symbols_requested: Vec<String>,
    pub symbols_available: Vec<String>,
    pub symbols_missing: Vec<String>,
    pub days_requested: u32,
    pub days_available: usize,
    pub coverage_percent: f64,
    pub is_valid: bool,
    pub issues: Vec<QualityIssue>,
}

pub async fn build_report(
    ctx: &DataContext,
    symbols: &[String],
    days: u32,
    allow_multi_source: bool,
    progress: &(dyn Fn(&str) + Sync),
) -> QualityReport {
    let (matrix, missing) =
        get_historical_prices(ctx, symbols, days, allow_multi_source, progress).await;
    let (is_valid, issues) = if matrix.is_empty() {
        (false, Vec::new())
    } else {
        let report = validate_price_matrix(&matrix, days);
        (report.is_valid, report.issues)
    };
    let coverage_percent = if days > 0 {
        matrix.n_rows() as f64 / f64::from(days) * 100.0
    } else {
        0.0
    };
    QualityReport {
        symbols_requested: symbols.to_vec(),
        symbols_available: matrix.symbols().to_vec(),
        symbols_missing: missing,
        days_requested: days,
        days_available: matrix.n_rows(),
        coverage_percent,
        is_valid,
        issues,
    }
}

impl QualityReport {
    pub fn display(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);
        let rows = [
            ("Requested", self.symbols_requested.join(", ")),
            ("Available", self.symbols_available.join(", ")),
            ("Missing", self.symbols_missing.join(", ")),
            (
                "Days",
                format!("{} of {}", self.days_available, self.days_requested),
            ),
            ("Coverage", format!("{:.1}%", self.coverage_percent)),
        ];
        for (label, value) in rows {
            table.add_row(vec![Cell::new(label), Cell::new(value)]);
        }

        let verdict = if self.is_valid {
            ui::style_text("valid", ui::StyleType::Value)
        } else {
            ui::style_text("invalid", ui::StyleType::Error)
        };
        let mut output = format!(
            "{}\n\n{}\n\nVerdict: {}",
            ui::style_text("Data quality", ui::StyleType::Title),
            table,
            verdict
        );
        for issue in &self.issues {
            output.push_str(&format!(
                "\n  - {}",
                ui::style_text(&issue.to_string(), ui::StyleType::Warning)
            ));
        }
        output
    }
}

pub async fn run(
    ctx: &DataContext,
    symbols: &[String],
    days: u32,
    allow_multi_source: bool,
    json: bool,
) -> Result<()> {
    let symbols: Vec<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
    let pb = ui::new_progress_bar(symbols.len() as u64, true);
    pb.set_message("Fetching history...");
    let report = build_report(ctx, &symbols, days, allow_multi_source, &|symbol: &str| {
        pb.set_message(format!("Fetched {symbol}"));
        pb.inc(1);
    })
    .await;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.display());
    }
    Ok(())
}
