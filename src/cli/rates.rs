//! Renders query results as tables.

use crate::cli::ui;
use crate::model::CachedRate;
use comfy_table::{Cell, Table};

/// One row per asset, one column per requested currency, plus the entry age.
pub fn rates_table(rates: &[CachedRate], currencies: &[String]) -> Table {
    let mut table = ui::new_styled_table();

    let mut header = vec![ui::header_cell("Asset")];
    for currency in currencies {
        header.push(ui::header_cell(&currency.to_uppercase()));
    }
    header.push(ui::header_cell("Updated"));
    table.set_header(header);

    for rate in rates {
        let mut row = vec![Cell::new(&rate.id)];
        for currency in currencies {
            row.push(ui::rate_cell(rate.currency_rate_map.get(currency).copied()));
        }
        row.push(Cell::new(
            rate.last_updated.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ));
        table.add_row(row);
    }

    table
}

pub fn print_rates(title: &str, rates: &[CachedRate], currencies: &[String]) {
    println!("{}", ui::style_text(title, ui::StyleType::Title));
    if rates.is_empty() {
        println!("{}", ui::style_text("No rates resolved.", ui::StyleType::Subtle));
        return;
    }
    println!("{}", rates_table(rates, currencies));
}
