use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use building_maintenance::{
    api,
    collab::{self, LogNotifier, LogScheduler, Notifier, Scheduler},
    config::{Membership, Seed, SeedActor},
    db::{supplier, ticket, user, Supplier},
    http,
    store::memory,
    workflow::NewTicket,
    Workflow,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net;

pub const JWT_SECRET: &str = "secret";

/// Actors, suppliers and buildings every test starts with.
///
/// Residents `alice` and `erin` and manager `bob` belong to building `b1`,
/// manager `dave` to `b2`, manager `carol` to every building.
pub fn seed() -> Seed {
    let actor = |id: &str, name: &str, role| SeedActor {
        id: id.into(),
        name: name.to_owned(),
        role,
        login: id.to_owned(),
        password: "password".to_owned(),
    };
    let supplier = |id: &str, name: &str, specialty: &str, rating| Supplier {
        id: id.into(),
        name: name.to_owned(),
        specialties: vec![specialty.to_owned()],
        rating,
    };
    let membership = |user: &str, building: &str| Membership {
        user: user.into(),
        buildings: vec![building.to_owned()],
    };

    Seed {
        actors: vec![
            actor("alice", "Alice", user::Role::Resident),
            actor("erin", "Erin", user::Role::Resident),
            actor("bob", "Bob", user::Role::Manager),
            actor("carol", "Carol", user::Role::Manager),
            actor("dave", "Dave", user::Role::Manager),
            actor("sam", "Sam", user::Role::Supplier),
        ],
        suppliers: vec![
            supplier("supA", "Acme Plumbing", "plumbing", Some(4.2)),
            supplier("supB", "Bolt Electric", "electrical", Some(4.8)),
            supplier("supC", "Pipe Friends", "Plumbing", None),
        ],
        memberships: vec![
            membership("alice", "b1"),
            membership("erin", "b1"),
            membership("bob", "b1"),
            membership("carol", "*"),
            membership("dave", "b2"),
        ],
    }
}

pub fn actor(id: &str) -> user::Actor {
    let role = match id {
        "alice" | "erin" => user::Role::Resident,
        "sam" => user::Role::Supplier,
        _ => user::Role::Manager,
    };
    user::Actor::new(id, role)
}

pub fn workflow() -> Workflow {
    workflow_with(Arc::new(LogScheduler), Arc::new(LogNotifier))
}

pub fn workflow_with(
    scheduler: Arc<dyn Scheduler>,
    notifier: Arc<dyn Notifier>,
) -> Workflow {
    Workflow::new(
        Arc::new(memory::Store::seeded(&seed())),
        scheduler,
        notifier,
    )
}

pub fn new_ticket(title: &str, building_id: &str) -> NewTicket {
    NewTicket {
        title: title.to_owned(),
        description: format!("{title}, please fix"),
        location: "Flat 4".to_owned(),
        urgency: ticket::Urgency::Medium,
        building_id: building_id.to_owned(),
    }
}

pub fn suppliers(ids: &[&str]) -> std::collections::BTreeSet<supplier::Id> {
    ids.iter().map(|&id| supplier::Id::from(id)).collect()
}

/// Calendar that is never reachable.
pub struct DownScheduler;

#[async_trait]
impl Scheduler for DownScheduler {
    async fn create_calendar_entry(
        &self,
        _: &ticket::Id,
        _: collab::Window,
    ) -> Result<collab::Event, collab::Error> {
        Err(collab::Error::new("calendar", "connection refused"))
    }
}

/// Notification service that is never reachable.
pub struct DownNotifier;

#[async_trait]
impl Notifier for DownNotifier {
    async fn notify(
        &self,
        _: &user::Id,
        _: &str,
    ) -> Result<(), collab::Error> {
        Err(collab::Error::new("notifications", "timed out"))
    }
}

/// Serves the API over a freshly seeded in-memory store on a random port.
///
/// The server lives as long as the runtime of the calling test.
pub async fn spawn_server() -> String {
    let app = http::router(Arc::new(http::AppState::new(
        workflow(),
        JWT_SECRET,
        Duration::from_secs(60 * 60),
    )));
    let listener = net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    format!("http://{addr}")
}

pub struct Client {
    inner: reqwest::Client,
    base_url: String,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.to_owned(),
            auth_token: None,
        }
    }

    pub async fn auth(mut self, login: &str, password: &str) -> Self {
        self.auth_token = Some(
            self.try_auth(login, password)
                .await
                .expect("wrong status code"),
        );
        self
    }

    pub async fn try_auth(
        &self,
        login: &str,
        password: &str,
    ) -> Result<String, StatusCode> {
        Ok(self
            .inner
            .post(format!("{}/auth", self.base_url))
            .json(&json!({
                "login": login,
                "password": password,
            }))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .text()
            .await
            .expect("failed to get a response"))
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let mut req =
            self.inner.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    async fn send<T: serde::de::DeserializeOwned>(
        req: reqwest::RequestBuilder,
    ) -> Result<T, StatusCode> {
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<T>()
            .await
            .expect("failed to get a response"))
    }

    pub async fn user(&self) -> Result<api::User, StatusCode> {
        Self::send(self.request(reqwest::Method::GET, "/user")).await
    }

    pub async fn get_tickets(
        &self,
        query: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        Self::send(
            self.request(reqwest::Method::GET, &format!("/ticket?{query}")),
        )
        .await
    }

    pub async fn add_ticket(
        &self,
        title: &str,
        building_id: &str,
    ) -> Result<api::Ticket, StatusCode> {
        Self::send(self.request(reqwest::Method::POST, "/ticket").json(
            &json!({
                "title": title,
                "description": format!("{title}, please fix"),
                "location": "Flat 4",
                "urgency": "HIGH",
                "buildingId": building_id,
            }),
        ))
        .await
    }

    pub async fn get_ticket(
        &self,
        id: &api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        Self::send(self.request(reqwest::Method::GET, &format!("/ticket/{id}")))
            .await
    }

    /// Applies `op` with `data` to the ticket.
    pub async fn edit_ticket(
        &self,
        id: &api::ticket::Id,
        op: &str,
        data: Value,
    ) -> Result<api::ticket::Edited, StatusCode> {
        let body = if data.is_null() {
            json!({ "op": op })
        } else {
            json!({ "op": op, "data": data })
        };
        Self::send(
            self.request(reqwest::Method::PATCH, &format!("/ticket/{id}"))
                .json(&body),
        )
        .await
    }

    /// Like [`Client::edit_ticket`], but returns the error body on failure.
    pub async fn edit_ticket_err(
        &self,
        id: &api::ticket::Id,
        op: &str,
        data: Value,
    ) -> (StatusCode, Value) {
        let body = if data.is_null() {
            json!({ "op": op })
        } else {
            json!({ "op": op, "data": data })
        };
        let resp = self
            .request(reqwest::Method::PATCH, &format!("/ticket/{id}"))
            .json(&body)
            .send()
            .await
            .expect("failed to send a request");
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn summary(
        &self,
        id: &api::ticket::Id,
    ) -> Result<Value, StatusCode> {
        Self::send(
            self.request(reqwest::Method::GET, &format!("/ticket/{id}/summary")),
        )
        .await
    }

    pub async fn activity(
        &self,
        id: &api::ticket::Id,
    ) -> Result<Vec<Value>, StatusCode> {
        Self::send(
            self.request(
                reqwest::Method::GET,
                &format!("/ticket/{id}/activity"),
            ),
        )
        .await
    }

    pub async fn comments(
        &self,
        id: &api::ticket::Id,
    ) -> Result<Vec<Value>, StatusCode> {
        Self::send(
            self.request(reqwest::Method::GET, &format!("/ticket/{id}/comment")),
        )
        .await
    }

    pub async fn add_comment(
        &self,
        id: &api::ticket::Id,
        content: &str,
    ) -> Result<Value, StatusCode> {
        Self::send(
            self.request(reqwest::Method::POST, &format!("/ticket/{id}/comment"))
                .json(&json!({ "content": content })),
        )
        .await
    }

    pub async fn suppliers(
        &self,
        query: &str,
    ) -> Result<Vec<Supplier>, StatusCode> {
        Self::send(
            self.request(reqwest::Method::GET, &format!("/supplier?{query}")),
        )
        .await
    }
}
