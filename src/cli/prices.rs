use super::ui;
use crate::core::DataContext;
use crate::core::coins::lookup;
use crate::data::get_live_prices;
use anyhow::Result;
use comfy_table::Cell;
use std::collections::HashMap;

pub fn prices_table(symbols: &[String], prices: &HashMap<String, f64>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Name"),
        ui::header_cell("Price (USD)"),
    ]);
    for symbol in symbols {
        let name = lookup(symbol).map_or("unsupported", |c| c.name);
        let price = match prices.get(symbol) {
            Some(p) => ui::number_cell(ui::format_usd(*p)),
            None => ui::na_cell(true),
        };
        table.add_row(vec![Cell::new(symbol), Cell::new(name), price]);
    }
    table.to_string()
}

pub async fn run(ctx: &DataContext, symbols: &[String], allow_multi_source: bool) -> Result<()> {
    let symbols: Vec<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
    let pb = ui::new_progress_bar(1, true);
    pb.set_message("Fetching live prices...");
    let prices = get_live_prices(ctx, &symbols, allow_multi_source).await;
    pb.finish_and_clear();

    println!("{}", prices_table(&symbols, &prices));
    if prices.is_empty() {
        anyhow::bail!("No live prices available for {}", symbols.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_price_is_marked() {
        let prices = HashMap::from([("BTC".to_string(), 60000.0)]);
        let table = prices_table(&["BTC".to_string(), "XYZ".to_string()], &prices);
        assert!(table.contains("$60000.00"));
        assert!(table.contains("Bitcoin"));
        assert!(table.contains("unsupported"));
        assert!(table.contains("N/A"));
    }
}
