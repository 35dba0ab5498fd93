use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::supplier;

/// One supplier's solicitation-and-response record on a ticket.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// Derived from ticket, supplier and send time, so soliciting the same
    /// supplier again after a withdrawal never reuses an id.
    pub id: String,
    pub supplier_id: supplier::Id,
    pub status: Status,
    pub quote_amount: Option<Money>,
    pub notes: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
    pub is_winner: bool,
    pub rejection_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[display("PENDING")]
    Pending,
    #[display("RECEIVED")]
    Received,
    #[display("ACCEPTED")]
    Accepted,
    #[display("REJECTED")]
    Rejected,
    #[display("CANCELLED")]
    Cancelled,
}

/// Non-negative amount in an explicit currency.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    pub fn new(amount: impl Into<Decimal>, currency: &str) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.to_owned(),
        }
    }
}
