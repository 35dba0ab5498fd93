//! Supplier quote requests of a ticket.
//!
//! At most one request is ever the winner. Once a winner exists no other
//! request is left RECEIVED: accepting a quote rejects every competing quote
//! that was already submitted. PENDING requests are left alone, suppliers
//! that never answered are not told they lost.
//!
//! All amounts recorded on one ticket share a single currency.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    db::{
        activity::Metadata,
        quote::{self, Money, QuoteRequest},
        supplier,
        ticket::{self, Status},
        user::Actor,
        Ticket,
    },
    error::{InvalidTransition, NotFound, QuoteAction},
    Error,
};

use super::{
    activity, permission,
    status::{self, Trigger},
    Outcome, Workflow,
};

/// Reason stored on competing quotes when another one wins.
pub const ANOTHER_QUOTE_SELECTED: &str = "Another quote was selected";

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub pending_count: usize,
    pub received_count: usize,
    pub accepted_count: usize,
    /// Lowest RECEIVED or ACCEPTED amount, in the ticket's one currency.
    pub best_price: Option<Money>,
}

pub fn summary(ticket: &Ticket) -> Summary {
    let count = |status| {
        ticket
            .quote_requests
            .iter()
            .filter(|q| q.status == status)
            .count()
    };
    Summary {
        pending_count: count(quote::Status::Pending),
        received_count: count(quote::Status::Received),
        accepted_count: count(quote::Status::Accepted),
        best_price: ticket
            .quote_requests
            .iter()
            .filter(|q| {
                matches!(
                    q.status,
                    quote::Status::Received | quote::Status::Accepted,
                )
            })
            .filter_map(|q| q.quote_amount.as_ref())
            .min_by_key(|m| m.amount)
            .cloned(),
    }
}

/// Solicits every supplier of `suppliers` not solicited yet.
///
/// Returns the suppliers that were actually added. Moves a `New` ticket to
/// `Quoting`.
pub fn request(
    ticket: &mut Ticket,
    suppliers: &BTreeSet<supplier::Id>,
    actor: &Actor,
    now: OffsetDateTime,
) -> Result<Vec<supplier::Id>, Error> {
    if suppliers.is_empty() {
        return Err(Error::validation("no suppliers to request quotes from"));
    }
    // Quoting tickets only grow their ledger, nothing else accepts requests.
    if !matches!(ticket.status, Status::New | Status::Quoting) {
        return Err(InvalidTransition {
            trigger: Trigger::RequestQuotes,
            status: ticket.status,
        }
        .into());
    }

    let added = suppliers
        .iter()
        .filter(|s| ticket.quote_request(s).is_none())
        .cloned()
        .collect::<Vec<_>>();
    if added.is_empty() {
        return Ok(added);
    }

    for supplier_id in &added {
        ticket.quote_requests.push(QuoteRequest {
            id: request_id(&ticket.id, supplier_id, now),
            supplier_id: supplier_id.clone(),
            status: quote::Status::Pending,
            quote_amount: None,
            notes: None,
            valid_until: None,
            is_winner: false,
            rejection_reason: None,
            sent_at: now,
            updated_at: now,
        });
    }
    activity::record(
        ticket,
        "quotes_requested",
        format!("Requested quotes from {} supplier(s)", added.len()),
        &actor.id,
        now,
        Metadata::from([("supplierIds".to_owned(), json!(added))]),
    );

    if ticket.status == Status::New {
        status::transition(
            ticket,
            Trigger::RequestQuotes,
            actor,
            now,
            Metadata::new(),
        )?;
    }
    Ok(added)
}

/// Stores the amount a supplier quoted. A RECEIVED quote may be revised.
pub fn record_amount(
    ticket: &mut Ticket,
    supplier_id: &supplier::Id,
    quote: QuoteInput,
    actor: &Actor,
    now: OffsetDateTime,
) -> Result<(), Error> {
    validate_money(&quote.amount)?;
    if ticket.status.is_terminal() {
        return Err(Error::conflict(format!(
            "ticket {} is {}",
            ticket.id, ticket.status,
        )));
    }
    if ticket.winner().is_some() {
        return Err(Error::conflict(format!(
            "ticket {} already has an accepted quote",
            ticket.id,
        )));
    }

    if let Some(other) = ticket
        .quote_requests
        .iter()
        .filter(|q| &q.supplier_id != supplier_id)
        .filter_map(|q| q.quote_amount.as_ref())
        .find(|m| m.currency != quote.amount.currency)
    {
        return Err(Error::validation(format!(
            "quote currency {} does not match {} used by other quotes on \
             the ticket",
            quote.amount.currency, other.currency,
        )));
    }

    let request = find_mut(ticket, supplier_id)?;
    ensure_status(
        request,
        QuoteAction::Record,
        &[quote::Status::Pending, quote::Status::Received],
    )?;
    request.status = quote::Status::Received;
    request.quote_amount = Some(quote.amount.clone());
    request.notes = quote.notes;
    request.valid_until = quote.valid_until;
    request.updated_at = now;

    activity::record(
        ticket,
        "quote_received",
        format!(
            "Quote of {} {} recorded for supplier {supplier_id}",
            quote.amount.amount, quote.amount.currency,
        ),
        &actor.id,
        now,
        Metadata::from([
            ("supplierId".to_owned(), json!(supplier_id)),
            ("amount".to_owned(), json!(quote.amount)),
        ]),
    );
    Ok(())
}

/// Makes the quote of `supplier_id` the winner and contracts the ticket.
///
/// Every other RECEIVED quote is rejected in the same step.
pub fn accept(
    ticket: &mut Ticket,
    supplier_id: &supplier::Id,
    actor: &Actor,
    now: OffsetDateTime,
) -> Result<(), Error> {
    if let Some(winner) = ticket.winner() {
        return Err(Error::conflict(format!(
            "ticket {} already accepted the quote of supplier {}",
            ticket.id, winner.supplier_id,
        )));
    }
    ensure_status(
        find_mut(ticket, supplier_id)?,
        QuoteAction::Accept,
        &[quote::Status::Received],
    )?;
    status::check(ticket.status, Trigger::AcceptQuote)?;

    let mut rejected = Vec::new();
    for request in &mut ticket.quote_requests {
        if &request.supplier_id == supplier_id {
            request.status = quote::Status::Accepted;
            request.is_winner = true;
            request.updated_at = now;
        } else if request.status == quote::Status::Received {
            request.status = quote::Status::Rejected;
            request.is_winner = false;
            request.rejection_reason = Some(ANOTHER_QUOTE_SELECTED.to_owned());
            request.updated_at = now;
            rejected.push(request.supplier_id.clone());
        }
    }

    activity::record(
        ticket,
        "quote_accepted",
        format!("Accepted the quote of supplier {supplier_id}"),
        &actor.id,
        now,
        Metadata::from([
            ("supplierId".to_owned(), json!(supplier_id)),
            ("rejectedSupplierIds".to_owned(), json!(rejected)),
        ]),
    );
    status::transition(
        ticket,
        Trigger::AcceptQuote,
        actor,
        now,
        Metadata::from([("supplierId".to_owned(), json!(supplier_id))]),
    )?;
    Ok(())
}

pub fn reject(
    ticket: &mut Ticket,
    supplier_id: &supplier::Id,
    reason: &str,
    actor: &Actor,
    now: OffsetDateTime,
) -> Result<(), Error> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(Error::validation("rejection reason is empty"));
    }

    let request = find_mut(ticket, supplier_id)?;
    ensure_status(request, QuoteAction::Reject, &[quote::Status::Received])?;
    request.status = quote::Status::Rejected;
    request.is_winner = false;
    request.rejection_reason = Some(reason.to_owned());
    request.updated_at = now;

    activity::record(
        ticket,
        "quote_rejected",
        format!("Rejected the quote of supplier {supplier_id}"),
        &actor.id,
        now,
        Metadata::from([
            ("supplierId".to_owned(), json!(supplier_id)),
            ("reason".to_owned(), json!(reason)),
        ]),
    );
    Ok(())
}

/// Stops waiting for a supplier that has not quoted yet.
pub fn withdraw(
    ticket: &mut Ticket,
    supplier_id: &supplier::Id,
    actor: &Actor,
    now: OffsetDateTime,
) -> Result<(), Error> {
    let request = find_mut(ticket, supplier_id)?;
    ensure_status(request, QuoteAction::Withdraw, &[quote::Status::Pending])?;
    request.status = quote::Status::Cancelled;
    request.updated_at = now;

    activity::record(
        ticket,
        "quote_request_withdrawn",
        format!("Withdrew the quote request sent to supplier {supplier_id}"),
        &actor.id,
        now,
        Metadata::from([("supplierId".to_owned(), json!(supplier_id))]),
    );
    Ok(())
}

/// Amount quoted by a supplier.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteInput {
    pub amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
}

impl QuoteInput {
    pub fn new(amount: Money) -> Self {
        Self {
            amount,
            notes: None,
            valid_until: None,
        }
    }
}

fn request_id(
    ticket: &ticket::Id,
    supplier: &supplier::Id,
    now: OffsetDateTime,
) -> String {
    format!("{ticket}_{supplier}_{}", now.unix_timestamp_nanos())
}

fn find_mut<'t>(
    ticket: &'t mut Ticket,
    supplier_id: &supplier::Id,
) -> Result<&'t mut QuoteRequest, Error> {
    ticket
        .quote_requests
        .iter_mut()
        .find(|q| &q.supplier_id == supplier_id)
        .ok_or_else(|| NotFound::QuoteRequest(supplier_id.clone()).into())
}

fn ensure_status(
    request: &QuoteRequest,
    action: QuoteAction,
    allowed: &[quote::Status],
) -> Result<(), Error> {
    if allowed.contains(&request.status) {
        Ok(())
    } else {
        Err(Error::InvalidQuoteState {
            supplier: request.supplier_id.clone(),
            action,
            status: request.status,
        })
    }
}

fn validate_money(money: &Money) -> Result<(), Error> {
    if money.amount <= Decimal::ZERO {
        return Err(Error::validation(format!(
            "quote amount must be positive, got {}",
            money.amount,
        )));
    }
    if money.currency.len() != 3
        || !money.currency.bytes().all(|b| b.is_ascii_uppercase())
    {
        return Err(Error::validation(format!(
            "currency must be a three-letter code, got {:?}",
            money.currency,
        )));
    }
    Ok(())
}

impl Workflow {
    /// Solicits quotes from `suppliers`.
    ///
    /// Safe to retry: suppliers already on the ticket are skipped.
    pub async fn request_quotes(
        &self,
        id: &ticket::Id,
        suppliers: &BTreeSet<supplier::Id>,
        actor: &Actor,
    ) -> Result<Outcome<Ticket>, Error> {
        if suppliers.is_empty() {
            return Err(Error::validation(
                "no suppliers to request quotes from",
            ));
        }
        self.authorize(id, actor, "request quotes for", permission::can_manage)
            .await?;
        for supplier_id in suppliers {
            if self.backend.get_supplier(supplier_id).await?.is_none() {
                return Err(NotFound::Supplier(supplier_id.clone()).into());
            }
        }

        let mut previous = None;
        let mut added = Vec::new();
        let ticket = self
            .update(id, |t| {
                previous = Some(t.status);
                added = request(t, suppliers, actor, OffsetDateTime::now_utc())?;
                Ok(())
            })
            .await?;
        info!(
            ticket = %id,
            actor = %actor.id,
            added = added.len(),
            "quotes requested",
        );

        let mut outcome = Outcome::new(ticket);
        if let Some(previous) = previous {
            self.announce(&outcome.value, previous, &mut outcome.warnings)
                .await;
        }
        Ok(outcome)
    }

    pub async fn record_quote_amount(
        &self,
        id: &ticket::Id,
        supplier_id: &supplier::Id,
        quote: QuoteInput,
        actor: &Actor,
    ) -> Result<Ticket, Error> {
        validate_money(&quote.amount)?;
        self.authorize(id, actor, "record quotes on", permission::can_manage)
            .await?;

        let ticket = self
            .update(id, |t| {
                record_amount(
                    t,
                    supplier_id,
                    quote.clone(),
                    actor,
                    OffsetDateTime::now_utc(),
                )
            })
            .await?;
        info!(
            ticket = %id,
            supplier = %supplier_id,
            actor = %actor.id,
            "quote recorded",
        );
        Ok(ticket)
    }

    /// Accepts the quote of `supplier_id`.
    ///
    /// Runs as a single atomic update: of two managers accepting different
    /// quotes at the same time, the second gets [`Error::Conflict`].
    pub async fn accept_quote(
        &self,
        id: &ticket::Id,
        supplier_id: &supplier::Id,
        actor: &Actor,
    ) -> Result<Outcome<Ticket>, Error> {
        self.authorize(id, actor, "accept quotes on", permission::can_manage)
            .await?;

        let mut previous = None;
        let ticket = self
            .update(id, |t| {
                previous = Some(t.status);
                accept(t, supplier_id, actor, OffsetDateTime::now_utc())
            })
            .await?;
        info!(
            ticket = %id,
            supplier = %supplier_id,
            actor = %actor.id,
            "quote accepted",
        );

        let mut outcome = Outcome::new(ticket);
        if let Some(previous) = previous {
            self.announce(&outcome.value, previous, &mut outcome.warnings)
                .await;
        }
        Ok(outcome)
    }

    pub async fn reject_quote(
        &self,
        id: &ticket::Id,
        supplier_id: &supplier::Id,
        reason: &str,
        actor: &Actor,
    ) -> Result<Ticket, Error> {
        if reason.trim().is_empty() {
            return Err(Error::validation("rejection reason is empty"));
        }
        self.authorize(id, actor, "reject quotes on", permission::can_manage)
            .await?;

        let ticket = self
            .update(id, |t| {
                reject(t, supplier_id, reason, actor, OffsetDateTime::now_utc())
            })
            .await?;
        info!(
            ticket = %id,
            supplier = %supplier_id,
            actor = %actor.id,
            "quote rejected",
        );
        Ok(ticket)
    }

    pub async fn withdraw_quote_request(
        &self,
        id: &ticket::Id,
        supplier_id: &supplier::Id,
        actor: &Actor,
    ) -> Result<Ticket, Error> {
        self.authorize(id, actor, "withdraw quotes on", permission::can_manage)
            .await?;

        let ticket = self
            .update(id, |t| {
                withdraw(t, supplier_id, actor, OffsetDateTime::now_utc())
            })
            .await?;
        info!(
            ticket = %id,
            supplier = %supplier_id,
            actor = %actor.id,
            "quote request withdrawn",
        );
        Ok(ticket)
    }

    pub async fn summary(
        &self,
        id: &ticket::Id,
        actor: &Actor,
    ) -> Result<Summary, Error> {
        Ok(summary(&self.get_ticket(id, actor).await?))
    }
}
