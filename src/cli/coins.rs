use super::ui;
use crate::core::coins::SUPPORTED_COINS;
use comfy_table::Cell;

pub fn coins_table() -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Name"),
        ui::header_cell("CoinGecko ID"),
    ]);
    for coin in SUPPORTED_COINS {
        table.add_row(vec![
            Cell::new(coin.symbol),
            Cell::new(coin.name),
            Cell::new(ui::style_text(coin.coingecko_id, ui::StyleType::Subtle)),
        ]);
    }
    table.to_string()
}

pub fn run() {
    println!(
        "{}\n\n{}",
        ui::style_text("Supported coins", ui::StyleType::Title),
        coins_table()
    );
}
