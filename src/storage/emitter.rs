// src/storage/emitter.rs
use rust_decimal::{Decimal, RoundingStrategy};

use crate::extractors::balance::Transaction;
use crate::extractors::layout::Field;

pub const BASIC_COLUMNS: [&str; 5] = ["date", "description", "debit", "credit", "balance"];

/// Column header; debug mode adds an `x`/`y` pair per field.
pub fn header(debug: bool) -> Vec<String> {
    let mut columns: Vec<String> = BASIC_COLUMNS.iter().map(|c| c.to_string()).collect();
    if debug {
        for field in Field::ALL {
            columns.push(format!("{}_x", field));
            columns.push(format!("{}_y", field));
        }
    }
    columns
}

/// Serializes one transaction as plain-text cells.
pub fn record(tx: &Transaction, debug: bool) -> Vec<String> {
    let mut cells = vec![
        tx.date.format("%Y-%m-%d").to_string(),
        tx.description.clone(),
        tx.debit.map(format_amount).unwrap_or_default(),
        tx.credit.map(format_amount).unwrap_or_default(),
        format_amount(tx.balance),
    ];
    if debug {
        for field in Field::ALL {
            match tx.coordinates.get(field) {
                Some((x, y)) => {
                    cells.push(format!("{:.2}", x));
                    cells.push(format!("{:.2}", y));
                }
                None => cells.extend([String::new(), String::new()]),
            }
        }
    }
    cells
}

/// Two decimal places, half away from zero.
pub fn format_amount(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}
