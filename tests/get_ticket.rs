pub mod common;

use building_maintenance::api;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn gets_ticket() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let added = alice.add_ticket("Leaking tap", "b1").await.unwrap();

    let ticket = alice.get_ticket(&added.id).await.unwrap();
    assert_eq!(ticket.id, added.id);
    assert_eq!(ticket.title, "Leaking tap");
    assert_eq!(ticket.requested_by.name, "Alice");

    let bob = common::Client::new(&base_url).auth("bob", "password").await;
    let ticket = bob.get_ticket(&added.id).await.unwrap();
    assert_eq!(ticket.id, added.id);

    let carol = common::Client::new(&base_url).auth("carol", "password").await;
    let ticket = carol.get_ticket(&added.id).await.unwrap();
    assert_eq!(ticket.id, added.id);
}

#[tokio::test]
async fn shows_assignee() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let bob = common::Client::new(&base_url).auth("bob", "password").await;
    let added = alice.add_ticket("Leaking tap", "b1").await.unwrap();

    bob.edit_ticket(&added.id, "assign", json!({ "assignee": "bob" }))
        .await
        .unwrap();

    let ticket = alice.get_ticket(&added.id).await.unwrap();
    let assignee = ticket.assigned_to.unwrap();
    assert_eq!(assignee.id, api::user::Id::from("bob"));
    assert_eq!(assignee.name, "Bob");
}

#[tokio::test]
async fn other_resident_cant_get_ticket() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let added = alice.add_ticket("Leaking tap", "b1").await.unwrap();

    let erin = common::Client::new(&base_url).auth("erin", "password").await;
    let status = erin.get_ticket(&added.id).await.unwrap_err();
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn manager_of_other_building_cant_get_ticket() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let added = alice.add_ticket("Leaking tap", "b1").await.unwrap();

    let dave = common::Client::new(&base_url).auth("dave", "password").await;
    let status = dave.get_ticket(&added.id).await.unwrap_err();
    assert_eq!(status, StatusCode::FORBIDDEN);

    let sam = common::Client::new(&base_url).auth("sam", "password").await;
    let status = sam.get_ticket(&added.id).await.unwrap_err();
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cant_get_unknown_ticket() {
    let base_url = common::spawn_server().await;
    let bob = common::Client::new(&base_url).auth("bob", "password").await;

    let status = bob
        .get_ticket(&api::ticket::Id::from("missing"))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cant_get_ticket_unauthorized() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let added = alice.add_ticket("Leaking tap", "b1").await.unwrap();

    let status = common::Client::new(&base_url)
        .get_ticket(&added.id)
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
