// src/extractors/balance.rs

// --- Imports ---
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::extractors::fields::{ClassifiedRow, FieldCoordinates};
use crate::utils::error::{BalanceMismatchWarning, DocumentWarning};

// --- Constants ---
// Half a cent: printed balances are rounded to two places.
pub const DEFAULT_BALANCE_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

// --- Data Structures ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSource {
    /// Printed on the statement row.
    Printed,
    /// Computed from the previous balance because the row prints none.
    Carried,
}

/// A validated statement transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub debit: Option<Decimal>,
    pub credit: Option<Decimal>,
    pub balance: Decimal,
    pub balance_source: BalanceSource,
    pub page_index: usize,
    pub coordinates: FieldCoordinates,
}

/// Running balance threaded through one document.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningBalanceState {
    pub previous_balance: Option<Decimal>,
}

/// What to do with a row whose printed balance does not add up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Emit the row as printed and report the mismatch.
    #[default]
    Keep,
    /// Drop the row and report the mismatch.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorConfig {
    pub tolerance: Decimal,
    pub policy: MismatchPolicy,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { tolerance: DEFAULT_BALANCE_TOLERANCE, policy: MismatchPolicy::Keep }
    }
}

/// Result of validating one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// `None` when the row was rejected.
    pub transaction: Option<Transaction>,
    pub warning: Option<DocumentWarning>,
}

// --- Fold ---

/// Checks one row against the running balance and returns the next state.
///
/// Rows without a debit or credit (opening balance, balance brought forward) reseed the
/// state without a check, as does the first priced row of a document. Rows that print no
/// balance get one carried from the previous balance.
pub fn validate_row(
    state: RunningBalanceState,
    row: ClassifiedRow,
    row_index: usize,
    config: &ValidatorConfig,
) -> (RunningBalanceState, Validated) {
    let movement = row.credit.unwrap_or(Decimal::ZERO) - row.debit.unwrap_or(Decimal::ZERO);
    let mut warning = None;

    let (balance, source) = match (row.balance, state.previous_balance) {
        (Some(printed), Some(previous)) if row.is_movement() => {
            let expected = previous + movement;
            if (expected - printed).abs() > config.tolerance {
                let mismatch = BalanceMismatchWarning {
                    row_index,
                    page_index: row.page_index,
                    expected,
                    actual: printed,
                };
                tracing::warn!("{}", mismatch);
                if config.policy == MismatchPolicy::Reject {
                    let validated = Validated { transaction: None, warning: Some(mismatch.into()) };
                    return (state, validated);
                }
                warning = Some(mismatch.into());
            }
            (printed, BalanceSource::Printed)
        }
        (Some(printed), _) => {
            tracing::debug!("Row {} seeds the running balance at {}", row_index, printed);
            (printed, BalanceSource::Printed)
        }
        (None, Some(previous)) => (previous + movement, BalanceSource::Carried),
        (None, None) => {
            let unseeded = DocumentWarning::UnseededBalance { row_index, page_index: row.page_index };
            tracing::warn!("{}", unseeded);
            warning = Some(unseeded);
            (movement, BalanceSource::Carried)
        }
    };

    let transaction = Transaction {
        date: row.date,
        description: row.description,
        debit: row.debit,
        credit: row.credit,
        balance,
        balance_source: source,
        page_index: row.page_index,
        coordinates: row.coordinates,
    };
    let next = RunningBalanceState { previous_balance: Some(balance) };
    (next, Validated { transaction: Some(transaction), warning })
}
