use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use dm_service::client::{ChatController, DeliveryEvent, ViewEffect};
use dm_service::models::message::{Message, MessageKind};

fn message(sender: Uuid, text: &str, created_at: DateTime<Utc>) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id: Uuid::new_v4(),
        sender_id: sender,
        kind: MessageKind::Text,
        content: text.into(),
        duration_seconds: None,
        read_by: vec![sender],
        deleted_by: vec![],
        reactions: HashMap::new(),
        edited_at: None,
        reply_to: None,
        created_at,
    }
}

fn texts(controller: &ChatController) -> Vec<String> {
    controller
        .visible()
        .iter()
        .map(|m| m.content.clone())
        .collect()
}

#[test]
fn snapshot_sorts_and_scrolls_to_tail() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let base = Utc::now();
    let older = message(viewer, "first", base - Duration::minutes(2));
    let newer = message(viewer, "second", base);

    let effect = c.apply(DeliveryEvent::Snapshot(vec![newer, older]));
    assert_eq!(effect, Some(ViewEffect::ScrollToTail));
    assert_eq!(texts(&c), vec!["first", "second"]);
}

#[test]
fn late_insert_splices_by_timestamp() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let base = Utc::now();
    c.apply(DeliveryEvent::Snapshot(vec![
        message(viewer, "a", base - Duration::minutes(3)),
        message(viewer, "c", base),
    ]));

    // Arrives after "c" but was created in between.
    c.apply(DeliveryEvent::Inserted(message(
        viewer,
        "b",
        base - Duration::minutes(1),
    )));
    assert_eq!(texts(&c), vec!["a", "b", "c"]);
}

#[test]
fn insert_scrolls_only_when_at_tail() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    c.apply(DeliveryEvent::Snapshot(vec![]));

    c.set_at_tail(false);
    let effect = c.apply(DeliveryEvent::Inserted(message(viewer, "x", Utc::now())));
    assert_eq!(effect, None);

    c.set_at_tail(true);
    let effect = c.apply(DeliveryEvent::Inserted(message(viewer, "y", Utc::now())));
    assert_eq!(effect, Some(ViewEffect::ScrollToTail));
}

#[test]
fn duplicate_insert_patches_without_reappending() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let m = message(viewer, "hello", Utc::now());
    c.apply(DeliveryEvent::Inserted(m.clone()));

    let mut dup = m.clone();
    dup.read_by.push(Uuid::new_v4());
    let effect = c.apply(DeliveryEvent::Inserted(dup));
    assert_eq!(effect, None);
    assert_eq!(c.visible().len(), 1);
    assert_eq!(c.visible()[0].read_by.len(), 2);
}

#[test]
fn update_patches_in_place_without_reordering() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let base = Utc::now();
    let first = message(viewer, "one", base - Duration::minutes(1));
    let second = message(viewer, "two", base);
    c.apply(DeliveryEvent::Snapshot(vec![first.clone(), second]));

    let mut edited = first;
    edited.content = "one, edited".into();
    edited.edited_at = Some(Utc::now());
    let effect = c.apply(DeliveryEvent::Updated(edited));
    assert_eq!(effect, None);
    assert_eq!(texts(&c), vec!["one, edited", "two"]);
}

#[test]
fn update_that_becomes_invisible_removes_the_row() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let m = message(viewer, "gone soon", Utc::now());
    c.apply(DeliveryEvent::Inserted(m.clone()));

    // The viewer soft-deleted this message on another device.
    let mut hidden = m;
    hidden.deleted_by.push(viewer);
    c.apply(DeliveryEvent::Updated(hidden));
    assert!(c.visible().is_empty());
}

#[test]
fn deleted_removes_by_id() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let m = message(viewer, "bye", Utc::now());
    c.apply(DeliveryEvent::Inserted(m.clone()));
    c.apply(DeliveryEvent::Deleted(m.id));
    assert!(c.visible().is_empty());
}

#[test]
fn cleared_watermark_filters_snapshot_and_inserts() {
    let viewer = Uuid::new_v4();
    let watermark = Utc::now();
    let mut c = ChatController::new(viewer, Some(watermark));

    c.apply(DeliveryEvent::Snapshot(vec![
        message(viewer, "old", watermark - Duration::hours(1)),
        message(viewer, "new", watermark + Duration::seconds(1)),
    ]));
    assert_eq!(texts(&c), vec!["new"]);

    c.apply(DeliveryEvent::Inserted(message(
        viewer,
        "stale",
        watermark - Duration::seconds(1),
    )));
    assert_eq!(texts(&c), vec!["new"]);
}

#[test]
fn optimistic_send_clears_draft_and_confirms() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    c.apply(DeliveryEvent::Snapshot(vec![]));
    c.set_draft("hi there");

    let pending = c.begin_send(MessageKind::Text).expect("send starts");
    assert_eq!(pending.content, "hi there");
    assert_eq!(c.draft(), "");
    assert_eq!(c.pending().len(), 1);

    let confirmed = message(viewer, "hi there", Utc::now());
    c.confirm_send(pending.local_id, confirmed);
    assert!(c.pending().is_empty());
    assert_eq!(texts(&c), vec!["hi there"]);
}

#[test]
fn failed_send_restores_the_draft() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    c.set_draft("do not lose me");

    let pending = c.begin_send(MessageKind::Text).unwrap();
    c.fail_send(pending.local_id);
    assert!(c.pending().is_empty());
    assert_eq!(c.draft(), "do not lose me");
}

#[test]
fn at_most_one_send_in_flight() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    c.set_draft("first");
    let pending = c.begin_send(MessageKind::Text).unwrap();

    c.set_draft("second");
    assert!(c.begin_send(MessageKind::Text).is_none());

    c.fail_send(pending.local_id);
    // The failed draft is not restored over newer input.
    assert_eq!(c.draft(), "second");
    assert!(c.begin_send(MessageKind::Text).is_some());
}

#[test]
fn blank_draft_never_sends() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    c.set_draft("   ");
    assert!(c.begin_send(MessageKind::Text).is_none());
}

#[test]
fn one_outstanding_action_per_controller() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    assert!(c.begin_action(a));
    assert!(!c.begin_action(b));
    c.finish_action(a);
    assert!(c.begin_action(b));
}

#[test]
fn typing_transitions_fire_once() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);

    assert!(c.start_typing());
    assert!(!c.start_typing());
    assert!(c.stop_typing());
    assert!(!c.stop_typing());
}

#[test]
fn close_reports_typing_and_drops_late_events() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    c.start_typing();

    let outcome = c.close();
    assert!(outcome.clear_typing);
    assert!(c.is_closed());

    assert_eq!(
        c.apply(DeliveryEvent::Inserted(message(viewer, "late", Utc::now()))),
        None
    );
    assert!(c.visible().is_empty());
    assert!(c.begin_send(MessageKind::Text).is_none());
    assert!(!c.begin_action(Uuid::new_v4()));
}

#[test]
fn reply_snapshot_survives_original_edit() {
    let viewer = Uuid::new_v4();
    let mut c = ChatController::new(viewer, None);
    let base = Utc::now();
    let original = message(viewer, "original text", base - Duration::minutes(5));

    let mut reply = message(viewer, "replying", base);
    reply.reply_to = Some(dm_service::models::message::ReplyTo {
        message_id: original.id,
        text: original.content.clone(),
        sender_id: original.sender_id,
        sender_name: "alice".into(),
    });
    c.apply(DeliveryEvent::Snapshot(vec![original.clone(), reply]));

    let mut edited = original;
    edited.content = "rewritten".into();
    edited.edited_at = Some(Utc::now());
    c.apply(DeliveryEvent::Updated(edited));

    let quoted = c.visible()[1].reply_to.as_ref().unwrap();
    assert_eq!(quoted.text, "original text");
}
