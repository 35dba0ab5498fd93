use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use derive_more::From;
use futures::{future::OptionFuture, FutureExt as _};
use itertools::Itertools as _;
use jsonwebtoken::{
    decode, encode, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::error;

use crate::{
    api,
    db::{
        self,
        activity::Entry,
        quote::Money,
        supplier,
        user::{self, Actor},
        Comment, Supplier,
    },
    store,
    workflow::{ledger, NewTicket, Outcome, QuoteInput, Summary},
    Error, Workflow,
};

pub type SharedAppState = Arc<AppState>;

pub struct AppState {
    pub workflow: Workflow,

    pub jwt_expiration_time: Duration,

    pub jwt_decoding_key: DecodingKey,

    pub jwt_encoding_key: EncodingKey,
}

impl AppState {
    pub fn new(
        workflow: Workflow,
        jwt_secret: &str,
        jwt_expiration_time: Duration,
    ) -> Self {
        Self {
            workflow,
            jwt_expiration_time,
            jwt_decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            jwt_encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
        }
    }
}

pub fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/auth", post(auth))
        .route("/user", get(get_user))
        .route("/ticket", get(list_tickets).post(add_ticket))
        .route("/ticket/:id", get(get_ticket).patch(edit_ticket))
        .route("/ticket/:id/summary", get(get_summary))
        .route("/ticket/:id/activity", get(get_activity))
        .route("/ticket/:id/comment", get(list_comments).post(add_comment))
        .route("/supplier", get(list_suppliers))
        .with_state(state)
}

#[derive(Deserialize)]
struct AuthInput {
    login: String,
    password: String,
}

async fn auth(
    State(state): State<SharedAppState>,
    Json(AuthInput { login, password }): Json<AuthInput>,
) -> Result<String, AuthError> {
    use AuthError as E;

    let password_hash = api::user::PasswordHash::new(&password);

    let user = state
        .workflow
        .backend()
        .get_user_by_login(&login)
        .await?
        .filter(|u| u.password_hash == password_hash)
        .ok_or(E::WrongLoginOrPassword)?;

    let expires_at = OffsetDateTime::now_utc() + state.jwt_expiration_time;
    encode(
        &Header::default(),
        &AuthClaims {
            user_id: user.id,
            exp: expires_at.unix_timestamp(),
        },
        &state.jwt_encoding_key,
    )
    .map_err(|_| E::InvalidToken)
}

#[derive(Debug, From)]
pub enum AuthError {
    #[from]
    Store(Error),
    InvalidToken,
    UnknownUser,
    WrongLoginOrPassword,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Store(e) => e.into_response(),
            Self::InvalidToken | Self::UnknownUser => {
                StatusCode::UNAUTHORIZED.into_response()
            }
            Self::WrongLoginOrPassword => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

/// Error of a handler behind authentication.
#[derive(Debug, From)]
pub enum ApiError {
    #[from]
    Auth(AuthError),
    #[from]
    Workflow(Error),
    UserNotFound(user::Id),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            Self::Workflow(e) => e.into_response(),
            Self::UserNotFound(id) => {
                error!(user = %id, "ticket refers to an unknown user");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition(_)
            | Self::InvalidQuoteState { .. }
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Store(e) => {
                error!(error = %e, "store failure");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

async fn get_user(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
) -> Result<Json<api::User>, ApiError> {
    let my = state.user(&auth_claims).await?;
    Ok(Json(api::User::from(&my)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTicketsInput {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
    status: Option<api::ticket::Status>,
    building_id: Option<String>,
}

fn default_limit() -> usize {
    50
}

async fn list_tickets(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Query(input): Query<ListTicketsInput>,
) -> Result<Json<api::ticket::List>, ApiError> {
    let actor = state.actor(&auth_claims).await?;

    let filter = store::Filter {
        building_ids: input.building_id.map(|id| BTreeSet::from([id])),
        status: input.status,
        requested_by: None,
    };
    let all = state.workflow.list_tickets(filter, &actor).await?;
    let total_count = all.len();
    let page = all
        .into_iter()
        .skip(input.offset)
        .take(input.limit)
        .collect::<Vec<_>>();

    let user_ids = page
        .iter()
        .map(|ticket| &ticket.requested_by)
        .chain(page.iter().filter_map(|ticket| ticket.assigned_to.as_ref()))
        .unique()
        .collect::<Vec<_>>();
    let users = futures::future::try_join_all(user_ids.into_iter().map(|id| {
        state.workflow.backend().get_user(id)
    }))
    .await?
    .into_iter()
    .flatten()
    .map(|u| (u.id.clone(), api::User::from(&u)))
    .collect::<HashMap<_, _>>();

    let tickets = page
        .into_iter()
        .map(|ticket| {
            let requested_by = users
                .get(&ticket.requested_by)
                .cloned()
                .ok_or_else(|| ApiError::UserNotFound(ticket.requested_by.clone()))?;
            let assigned_to = ticket
                .assigned_to
                .as_ref()
                .map(|id| {
                    users
                        .get(id)
                        .cloned()
                        .ok_or_else(|| ApiError::UserNotFound(id.clone()))
                })
                .transpose()?;
            Ok::<_, ApiError>(present(ticket, requested_by, assigned_to))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(api::ticket::List {
        tickets,
        total_count,
    }))
}

async fn add_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Json(input): Json<NewTicket>,
) -> Result<Json<api::Ticket>, ApiError> {
    let actor = state.actor(&auth_claims).await?;
    let ticket = state.workflow.create_ticket(input, &actor).await?;
    Ok(Json(state.present(ticket).await?))
}

async fn get_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, ApiError> {
    let actor = state.actor(&auth_claims).await?;
    let ticket = state.workflow.get_ticket(&id, &actor).await?;
    Ok(Json(state.present(ticket).await?))
}

#[derive(Deserialize)]
#[serde(content = "data", rename_all = "camelCase", tag = "op")]
enum EditTicketInput {
    #[serde(rename_all = "camelCase")]
    RequestQuotes {
        supplier_ids: BTreeSet<supplier::Id>,
    },
    #[serde(rename_all = "camelCase")]
    RecordQuote {
        supplier_id: supplier::Id,
        amount: Money,
        #[serde(default)]
        notes: Option<String>,
        #[serde(default, with = "time::serde::rfc3339::option")]
        valid_until: Option<OffsetDateTime>,
    },
    #[serde(rename_all = "camelCase")]
    AcceptQuote { supplier_id: supplier::Id },
    #[serde(rename_all = "camelCase")]
    RejectQuote {
        supplier_id: supplier::Id,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    WithdrawQuoteRequest { supplier_id: supplier::Id },
    ScheduleWork {
        #[serde(with = "time::serde::rfc3339")]
        date: OffsetDateTime,
    },
    StartWork,
    MarkComplete,
    Close,
    Cancel {
        reason: String,
    },
    Assign {
        #[serde(default)]
        assignee: Option<user::Id>,
    },
}

async fn edit_ticket(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(op): Json<EditTicketInput>,
) -> Result<Json<api::ticket::Edited>, ApiError> {
    use EditTicketInput as Op;

    let actor = state.actor(&auth_claims).await?;
    let workflow = &state.workflow;

    let outcome = match op {
        Op::RequestQuotes { supplier_ids } => {
            workflow.request_quotes(&id, &supplier_ids, &actor).await?
        }
        Op::RecordQuote {
            supplier_id,
            amount,
            notes,
            valid_until,
        } => {
            let quote = QuoteInput {
                amount,
                notes,
                valid_until,
            };
            Outcome::new(
                workflow
                    .record_quote_amount(&id, &supplier_id, quote, &actor)
                    .await?,
            )
        }
        Op::AcceptQuote { supplier_id } => {
            workflow.accept_quote(&id, &supplier_id, &actor).await?
        }
        Op::RejectQuote {
            supplier_id,
            reason,
        } => Outcome::new(
            workflow
                .reject_quote(&id, &supplier_id, &reason, &actor)
                .await?,
        ),
        Op::WithdrawQuoteRequest { supplier_id } => Outcome::new(
            workflow
                .withdraw_quote_request(&id, &supplier_id, &actor)
                .await?,
        ),
        Op::ScheduleWork { date } => {
            workflow.schedule_work(&id, date, &actor).await?
        }
        Op::StartWork => workflow.start_work(&id, &actor).await?,
        Op::MarkComplete => workflow.mark_complete(&id, &actor).await?,
        Op::Close => workflow.close(&id, &actor).await?,
        Op::Cancel { reason } => workflow.cancel(&id, &reason, &actor).await?,
        Op::Assign { assignee } => {
            Outcome::new(workflow.assign(&id, assignee, &actor).await?)
        }
    };

    Ok(Json(api::ticket::Edited {
        ticket: state.present(outcome.value).await?,
        warnings: outcome.warnings.iter().map(ToString::to_string).collect(),
    }))
}

async fn get_summary(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<Summary>, ApiError> {
    let actor = state.actor(&auth_claims).await?;
    Ok(Json(state.workflow.summary(&id, &actor).await?))
}

async fn get_activity(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<Vec<Entry>>, ApiError> {
    let actor = state.actor(&auth_claims).await?;
    Ok(Json(state.workflow.activity(&id, &actor).await?))
}

async fn list_comments(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let actor = state.actor(&auth_claims).await?;
    Ok(Json(state.workflow.list_comments(&id, &actor).await?))
}

#[derive(Deserialize)]
struct AddCommentInput {
    content: String,
}

async fn add_comment(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(AddCommentInput { content }): Json<AddCommentInput>,
) -> Result<Json<Comment>, ApiError> {
    let actor = state.actor(&auth_claims).await?;
    Ok(Json(state.workflow.add_comment(&id, &content, &actor).await?))
}

async fn list_suppliers(
    State(state): State<SharedAppState>,
    auth_claims: AuthClaims,
    Query(filter): Query<supplier::Filter>,
) -> Result<Json<Vec<Supplier>>, ApiError> {
    state.actor(&auth_claims).await?;
    Ok(Json(state.workflow.backend().list_suppliers(&filter).await?))
}

impl AppState {
    async fn user(&self, claims: &AuthClaims) -> Result<db::User, AuthError> {
        self.workflow
            .backend()
            .get_user(&claims.user_id)
            .await?
            .ok_or(AuthError::UnknownUser)
    }

    async fn actor(&self, claims: &AuthClaims) -> Result<Actor, AuthError> {
        self.user(claims).await.map(|u| u.actor())
    }

    /// Resolves the users a ticket refers to.
    async fn present(
        &self,
        ticket: db::Ticket,
    ) -> Result<api::Ticket, ApiError> {
        let backend = self.workflow.backend();
        let requested_by = backend
            .get_user(&ticket.requested_by)
            .await?
            .ok_or_else(|| ApiError::UserNotFound(ticket.requested_by.clone()))?;
        let assigned_to =
            OptionFuture::from(ticket.assigned_to.clone().map(|id| async move {
                backend
                    .get_user(&id)
                    .await?
                    .ok_or(ApiError::UserNotFound(id))
            }))
            .map(Option::transpose)
            .await?;

        Ok(present(
            ticket,
            api::User::from(&requested_by),
            assigned_to.as_ref().map(api::User::from),
        ))
    }
}

fn present(
    ticket: db::Ticket,
    requested_by: api::User,
    assigned_to: Option<api::User>,
) -> api::Ticket {
    api::Ticket {
        status_label: api::ticket::status_label(
            ticket.status,
            &ticket.quote_requests,
        )
        .to_owned(),
        summary: ledger::summary(&ticket),
        id: ticket.id,
        title: ticket.title,
        description: ticket.description,
        location: ticket.location,
        urgency: ticket.urgency,
        building_id: ticket.building_id,
        status: ticket.status,
        requested_by,
        assigned_to,
        scheduled_date: ticket.scheduled_date,
        completed_date: ticket.completed_date,
        created_at: ticket.created_at,
        quote_requests: ticket.quote_requests,
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    user_id: api::user::Id,
    exp: i64,
}

#[async_trait]
impl FromRequestParts<SharedAppState> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
