use std::collections::BTreeSet;

use building_maintenance::{
    db::{
        activity::Metadata,
        ticket::{self, Status, Urgency},
        user::{Actor, Role},
        Ticket,
    },
    workflow::{
        permission,
        status::{self, Trigger},
    },
    Error,
};
use time::OffsetDateTime;

const ALL_STATUSES: [Status; 8] = [
    Status::New,
    Status::Quoting,
    Status::Contracted,
    Status::Scheduled,
    Status::InProgress,
    Status::Complete,
    Status::Closed,
    Status::Cancelled,
];

fn ticket(status: Status, requested_by: &str, building_id: &str) -> Ticket {
    Ticket {
        id: ticket::Id::from("t1"),
        title: "Leaking tap".to_owned(),
        description: String::new(),
        location: String::new(),
        urgency: Urgency::Low,
        building_id: building_id.to_owned(),
        requested_by: requested_by.into(),
        assigned_to: None,
        status,
        scheduled_date: None,
        completed_date: None,
        created_at: OffsetDateTime::now_utc(),
        quote_requests: Vec::new(),
        activity_log: Default::default(),
        comments: Vec::new(),
    }
}

fn buildings(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|&id| id.to_owned()).collect()
}

#[test]
fn follows_happy_path() {
    let path = [
        (Trigger::RequestQuotes, Status::Quoting),
        (Trigger::AcceptQuote, Status::Contracted),
        (Trigger::ScheduleWork, Status::Scheduled),
        (Trigger::StartWork, Status::InProgress),
        (Trigger::MarkComplete, Status::Complete),
        (Trigger::Close, Status::Closed),
    ];
    let mut current = Status::New;
    for (trigger, expected) in path {
        current = status::next(current, trigger).unwrap();
        assert_eq!(current, expected);
    }
}

#[test]
fn allows_nothing_else() {
    let mut allowed = 0;
    for status in ALL_STATUSES {
        for trigger in Trigger::ALL {
            let Some(next) = status::next(status, trigger) else {
                let err = status::check(status, trigger).unwrap_err();
                assert_eq!(err.status, status);
                assert_eq!(err.trigger, trigger);
                continue;
            };
            allowed += 1;
            if trigger == Trigger::Cancel {
                assert_eq!(next, Status::Cancelled);
            }
        }
    }
    // Six steps forward plus cancellation from five open statuses.
    assert_eq!(allowed, 11);
}

#[test]
fn never_leaves_terminal_status() {
    for status in [Status::Closed, Status::Cancelled] {
        assert!(status.is_terminal());
        for trigger in Trigger::ALL {
            assert_eq!(status::next(status, trigger), None);
        }
    }
}

#[test]
fn cant_cancel_complete_ticket() {
    assert_eq!(status::next(Status::Complete, Trigger::Cancel), None);
}

#[test]
fn journals_transition() {
    let mut t = ticket(Status::Complete, "r1", "b1");
    let actor = Actor::new("m1", Role::Manager);

    let previous = status::transition(
        &mut t,
        Trigger::Close,
        &actor,
        OffsetDateTime::now_utc(),
        Metadata::new(),
    )
    .unwrap();
    assert_eq!(previous, Status::Complete);
    assert_eq!(t.status, Status::Closed);

    let entry = t.activity_log.last().unwrap();
    assert_eq!(entry.action, "ticket_closed");
    assert_eq!(entry.performed_by.as_str(), "m1");
    assert_eq!(entry.metadata["previousStatus"], "COMPLETE");
    assert_eq!(entry.metadata["newStatus"], "CLOSED");
}

#[test]
fn leaves_ticket_untouched_on_invalid_transition() {
    let mut t = ticket(Status::New, "r1", "b1");
    let actor = Actor::new("m1", Role::Manager);

    let err = status::transition(
        &mut t,
        Trigger::StartWork,
        &actor,
        OffsetDateTime::now_utc(),
        Metadata::new(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)), "{err}");
    assert_eq!(t.status, Status::New);
    assert!(t.activity_log.is_empty());
}

#[test]
fn clamps_journal_timestamps() {
    let mut t = ticket(Status::New, "r1", "b1");
    let actor = Actor::new("m1", Role::Manager);
    let now = OffsetDateTime::now_utc();

    status::transition(
        &mut t,
        Trigger::RequestQuotes,
        &actor,
        now,
        Metadata::new(),
    )
    .unwrap();
    status::transition(
        &mut t,
        Trigger::AcceptQuote,
        &actor,
        now - time::Duration::minutes(5),
        Metadata::new(),
    )
    .unwrap();

    let entries = t.activity_log.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, "status_quoting");
    assert_eq!(entries[1].action, "status_contracted");
    assert_eq!(entries[1].timestamp, now);
}

#[test]
fn residents_comment_only_on_own_tickets() {
    let t2 = ticket(Status::New, "r1", "b1");

    let r2 = Actor::new("r2", Role::Resident);
    assert!(!permission::can_comment(&t2, &r2, &buildings(&[])));

    let r1 = Actor::new("r1", Role::Resident);
    assert!(permission::can_comment(&t2, &r1, &buildings(&[])));
}

#[test]
fn managers_comment_within_own_buildings() {
    let t3 = ticket(Status::New, "r1", "b2");
    let m1 = Actor::new("m1", Role::Manager);

    assert!(!permission::can_comment(&t3, &m1, &buildings(&["b1"])));
    assert!(permission::can_comment(&t3, &m1, &buildings(&["*"])));
    assert!(permission::can_comment(&t3, &m1, &buildings(&["b1", "b2"])));
}

#[test]
fn suppliers_never_comment() {
    let t = ticket(Status::Quoting, "r1", "b1");
    let s1 = Actor::new("s1", Role::Supplier);

    assert!(!permission::can_comment(&t, &s1, &buildings(&["*"])));
    assert!(!permission::can_view(&t, &s1, &buildings(&["*"])));
}

#[test]
fn permission_depends_only_on_arguments() {
    let t = ticket(Status::New, "r1", "b1");
    let r1 = Actor::new("r1", Role::Resident);
    let r2 = Actor::new("r2", Role::Resident);
    let m1 = Actor::new("m1", Role::Manager);
    let none = buildings(&[]);
    let ids = buildings(&["b1"]);

    for _ in 0..10 {
        assert!(permission::can_comment(&t, &r1, &none));
        assert!(!permission::can_comment(&t, &r2, &none));
        assert!(permission::can_comment(&t, &m1, &ids));
        assert!(permission::can_manage(&t, &m1, &ids));
    }
    // The same arguments give the same answer after unrelated calls.
    assert!(!permission::can_comment(&t, &m1, &none));
    assert!(permission::can_comment(&t, &m1, &ids));
}

#[test]
fn requester_cancels_only_new_ticket() {
    let r1 = Actor::new("r1", Role::Resident);
    let none = buildings(&[]);

    assert!(permission::can_cancel(&ticket(Status::New, "r1", "b1"), &r1, &none));
    assert!(!permission::can_cancel(
        &ticket(Status::Quoting, "r1", "b1"),
        &r1,
        &none,
    ));
    assert!(!permission::can_cancel(
        &ticket(Status::New, "r2", "b1"),
        &r1,
        &none,
    ));
}
