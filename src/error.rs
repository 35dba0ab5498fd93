use std::{error::Error as StdError, fmt};

use derive_more::{Display, From};

use crate::{
    db::{self, quote, supplier, ticket, user},
    workflow::status::Trigger,
};

/// Failure of a workflow operation.
///
/// Collaborator outages never show up here: they are reported as warnings
/// next to a successful result (see [`crate::workflow::Outcome`]).
#[derive(Debug, Display, From)]
pub enum Error {
    /// Referenced ticket, quote request, supplier or actor does not exist.
    #[display("{_0}")]
    #[from]
    NotFound(NotFound),

    /// Malformed input. The caller has to correct it before retrying.
    #[display("validation failed: {_0}")]
    Validation(String),

    /// Ticket status transition attempted from a disallowed state.
    #[display("{_0}")]
    #[from]
    InvalidTransition(InvalidTransition),

    /// Quote request is not in a status the action can be applied to.
    #[display(
        "cannot {action} quote request of supplier {supplier}: \
         it is {status}"
    )]
    InvalidQuoteState {
        supplier: supplier::Id,
        action: QuoteAction,
        status: quote::Status,
    },

    /// Ticket changed under the caller in a way that breaks the operation.
    #[display("conflict: {_0}")]
    Conflict(String),

    /// Actor is not allowed to act on the ticket.
    #[display("forbidden: {_0}")]
    Forbidden(String),

    /// Backing store failed.
    #[display("store failure: {_0}")]
    #[from]
    Store(db::Error),
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::InvalidQuoteState { .. } => "INVALID_QUOTE_STATE",
            Self::Conflict(_) => "CONFLICT",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Store(_) => "STORE",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NotFound {
    Ticket(ticket::Id),
    QuoteRequest(supplier::Id),
    Supplier(supplier::Id),
    User(user::Id),
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticket(id) => write!(f, "ticket {id} not found"),
            Self::QuoteRequest(id) => {
                write!(f, "no quote request for supplier {id}")
            }
            Self::Supplier(id) => write!(f, "supplier {id} not found"),
            Self::User(id) => write!(f, "user {id} not found"),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display("cannot {trigger} a ticket in status {status}")]
pub struct InvalidTransition {
    pub trigger: Trigger,
    pub status: ticket::Status,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum QuoteAction {
    #[display("record an amount on")]
    Record,
    #[display("accept")]
    Accept,
    #[display("reject")]
    Reject,
    #[display("withdraw")]
    Withdraw,
}
