use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{ticket, user};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub ticket_id: ticket::Id,
    pub author_id: user::Id,
    pub author_role: user::Role,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
