use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{
    activity::{Entry, Metadata},
    user, Ticket,
};

/// Appends an entry to the journal of `ticket`.
///
/// Never fails: whatever the content, the entry is kept.
pub fn record(
    ticket: &mut Ticket,
    action: &str,
    description: impl Into<String>,
    performed_by: &user::Id,
    timestamp: OffsetDateTime,
    metadata: Metadata,
) {
    ticket.activity_log.append(Entry {
        id: Uuid::new_v4().to_string(),
        action: action.to_owned(),
        description: description.into(),
        performed_by: performed_by.clone(),
        timestamp,
        metadata,
    });
}
