pub mod common;

use building_maintenance::api;
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn resident_lists_own_tickets() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let erin = common::Client::new(&base_url).auth("erin", "password").await;

    alice.add_ticket("Leaking tap", "b1").await.unwrap();
    alice.add_ticket("Broken window", "b1").await.unwrap();
    erin.add_ticket("Noisy boiler", "b1").await.unwrap();

    let list = alice.get_tickets("").await.unwrap();
    assert_eq!(list.total_count, 2);
    assert!(list
        .tickets
        .iter()
        .all(|t| t.requested_by.id == api::user::Id::from("alice")));
}

#[tokio::test]
async fn manager_lists_tickets_of_own_buildings() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let dave = common::Client::new(&base_url).auth("dave", "password").await;

    alice.add_ticket("Leaking tap", "b1").await.unwrap();
    dave.add_ticket("Broken lift", "b2").await.unwrap();

    let bob = common::Client::new(&base_url).auth("bob", "password").await;
    let list = bob.get_tickets("").await.unwrap();
    assert_eq!(list.total_count, 1);
    assert_eq!(list.tickets[0].building_id, "b1");

    let list = dave.get_tickets("").await.unwrap();
    assert_eq!(list.total_count, 1);
    assert_eq!(list.tickets[0].building_id, "b2");

    let carol = common::Client::new(&base_url).auth("carol", "password").await;
    let list = carol.get_tickets("").await.unwrap();
    assert_eq!(list.total_count, 2);

    let list = carol.get_tickets("buildingId=b2").await.unwrap();
    assert_eq!(list.total_count, 1);
    assert_eq!(list.tickets[0].title, "Broken lift");

    let list = bob.get_tickets("buildingId=b2").await.unwrap();
    assert_eq!(list.total_count, 0);
}

#[tokio::test]
async fn lists_tickets_by_status() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    let bob = common::Client::new(&base_url).auth("bob", "password").await;

    let ticket = alice.add_ticket("Leaking tap", "b1").await.unwrap();
    alice.add_ticket("Broken window", "b1").await.unwrap();
    bob.edit_ticket(
        &ticket.id,
        "requestQuotes",
        json!({ "supplierIds": ["supA"] }),
    )
    .await
    .unwrap();

    let list = bob.get_tickets("status=QUOTING").await.unwrap();
    assert_eq!(list.total_count, 1);
    assert_eq!(list.tickets[0].id, ticket.id);

    let list = bob.get_tickets("status=NEW").await.unwrap();
    assert_eq!(list.total_count, 1);
    assert_eq!(list.tickets[0].title, "Broken window");
}

#[tokio::test]
async fn lists_tickets_newest_first_in_pages() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;

    for i in 1..=5 {
        alice.add_ticket(&format!("Ticket {i}"), "b1").await.unwrap();
    }

    let list = alice.get_tickets("offset=1&limit=2").await.unwrap();
    assert_eq!(list.total_count, 5);
    let titles = list.tickets.iter().map(|t| &*t.title).collect::<Vec<_>>();
    assert_eq!(titles, ["Ticket 4", "Ticket 3"]);
}

#[tokio::test]
async fn supplier_lists_nothing() {
    let base_url = common::spawn_server().await;
    let alice = common::Client::new(&base_url).auth("alice", "password").await;
    alice.add_ticket("Leaking tap", "b1").await.unwrap();

    let sam = common::Client::new(&base_url).auth("sam", "password").await;
    let list = sam.get_tickets("").await.unwrap();
    assert_eq!(list.total_count, 0);
    assert!(list.tickets.is_empty());
}

#[tokio::test]
async fn cant_list_tickets_unauthorized() {
    let base_url = common::spawn_server().await;
    let status = common::Client::new(&base_url)
        .get_tickets("")
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
