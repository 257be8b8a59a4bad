use crate::error::{ExportError, Result};
use crate::models::{OutputRow, Transaction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub const FEE_DESCRIPTION: &str = "Stripe fee";

/// Converts an amount in minor units (cents) to major units
pub fn to_major_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2).normalize()
}

/// Split a transaction into its gross amount row and its negated fee row
pub fn project(tx: &Transaction, date_format: &str) -> Result<(OutputRow, OutputRow)> {
    let created = DateTime::<Utc>::from_timestamp(tx.created, 0)
        .ok_or(ExportError::InvalidTimestamp(tx.created))?;
    let date = created.format(date_format).to_string();

    let reference = tx.source.clone().unwrap_or_default();
    let email = tx.metadata_value("email").to_string();
    let name = tx.metadata_value("name").to_string();

    let amount_row = OutputRow {
        date: date.clone(),
        amount: to_major_units(tx.amount),
        description: tx.description.clone().unwrap_or_default(),
        reference: reference.clone(),
        transaction_type: tx.transaction_type.clone(),
        email: email.clone(),
        name: name.clone(),
    };

    // Negate in minor units so a zero fee stays 0 rather than -0
    let fee_row = OutputRow {
        date,
        amount: to_major_units(-tx.fee),
        description: FEE_DESCRIPTION.to_string(),
        reference,
        transaction_type: tx.transaction_type.clone(),
        email,
        name,
    };

    Ok((amount_row, fee_row))
}
