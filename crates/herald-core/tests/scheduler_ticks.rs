mod common;

use chrono::{TimeZone, Utc};
use common::{harness, media_message, text_message, Sent, ADMIN};
use herald_core::clock::{Clock, ManualClock};
use herald_core::directory::{Directory, UsersTable};
use herald_core::dispatch::Outcome;
use herald_core::scheduler::{SchedulePayload, ScheduleTable, Scheduler};
use herald_core::storage::{JsonFileTable, MemoryTable, TableStore};
use herald_core::transport::{Transport, TransportError};
use std::sync::Arc;

#[tokio::test]
async fn scheduled_text_fires_once_after_due_time() {
    let h = harness().await;
    for id in ["1001", "1002"] {
        h.dispatcher
            .handle_message(&text_message(id, None, "hi there"))
            .await
            .expect("handled");
    }
    h.dispatcher
        .handle_message(&text_message(
            ADMIN,
            None,
            "!schedule 2099-01-01 10:00 Happy New Year",
        ))
        .await
        .expect("handled");
    h.transport.clear();

    // Not due yet
    assert!(h.scheduler.tick().await.is_empty());
    assert!(h.transport.sent().is_empty());

    let due = Utc
        .with_ymd_and_hms(2099, 1, 1, 10, 0, 1)
        .single()
        .expect("valid due time");
    h.clock.set(due);

    let delivered = h.scheduler.tick().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].report.delivered, 3);
    assert_eq!(
        h.transport.texts_to("1001"),
        vec!["📢 <b>Scheduled announcement:</b>\nHappy New Year".to_string()]
    );

    let items = h.schedules.snapshot().await;
    assert!(items[0].sent);
    assert_eq!(items[0].sent_at, Some(due));

    // A second tick must not redeliver
    h.transport.clear();
    assert!(h.scheduler.tick().await.is_empty());
    assert!(h.transport.sent().is_empty());
}

#[tokio::test]
async fn failing_recipient_still_marks_item_sent() {
    let h = harness().await;
    h.dispatcher
        .handle_message(&text_message("1001", None, "hi there"))
        .await
        .expect("handled");
    h.dispatcher
        .handle_message(&text_message(ADMIN, None, "!schedule 2000-01-01 00:00 Past"))
        .await
        .expect("handled");
    h.transport.fail_for("1001", TransportError::Blocked);

    // Past due times fire on the next tick
    let delivered = h.scheduler.tick().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].report.failed(), 1);
    assert!(h.scheduler.items().await[0].sent);
}

#[tokio::test]
async fn media_and_replies_schedule_forwards() {
    let h = harness().await;

    let outcome = h
        .dispatcher
        .handle_message(&media_message(ADMIN, 31, Some("!schedule 2099-01-01 10:00")))
        .await
        .expect("handled");
    assert!(matches!(outcome, Outcome::Scheduled { .. }));

    let mut reply = text_message(ADMIN, None, "!schedule 2099-01-01 11:00");
    reply.message_id = 40;
    reply.reply_to = Some(39);
    let outcome = h
        .dispatcher
        .handle_message(&reply)
        .await
        .expect("handled");
    assert!(matches!(outcome, Outcome::Scheduled { .. }));

    let payloads: Vec<_> = h
        .scheduler
        .items()
        .await
        .into_iter()
        .map(|item| item.payload)
        .collect();
    assert_eq!(
        payloads,
        vec![
            SchedulePayload::ForwardReference {
                source_chat: ADMIN.into(),
                message_id: 31,
            },
            SchedulePayload::ForwardReference {
                source_chat: ADMIN.into(),
                message_id: 39,
            },
        ]
    );

    h.transport.clear();
    h.clock.set(
        Utc.with_ymd_and_hms(2099, 1, 2, 0, 0, 0)
            .single()
            .expect("valid time"),
    );
    assert_eq!(h.scheduler.tick().await.len(), 2);
    assert_eq!(
        h.transport.to(ADMIN),
        vec![
            Sent::Forward {
                to: ADMIN.into(),
                from: ADMIN.into(),
                message_id: 31,
            },
            Sent::Forward {
                to: ADMIN.into(),
                from: ADMIN.into(),
                message_id: 39,
            },
        ]
    );
}

#[tokio::test]
async fn sent_flag_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("schedules.json");
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .expect("valid time"),
    ));
    let clock_dyn: Arc<dyn Clock> = clock.clone();
    let transport: Arc<dyn Transport> = Arc::new(common::RecordingTransport::default());

    let directory = Arc::new(
        Directory::load(
            Arc::new(MemoryTable::<UsersTable>::default()),
            clock_dyn.clone(),
        )
        .await
        .expect("directory"),
    );
    directory.upsert("1001", None, "User").await;

    let scheduler = Scheduler::load(
        Arc::new(JsonFileTable::<ScheduleTable>::new(&path)),
        directory.clone(),
        transport.clone(),
        clock_dyn.clone(),
        "prefix",
    )
    .await
    .expect("scheduler");
    scheduler
        .create(
            SchedulePayload::Text {
                text: "hello".into(),
            },
            clock.now(),
            ADMIN,
        )
        .await;
    assert_eq!(scheduler.tick().await.len(), 1);

    // Reload from disk as a restarted process would
    let on_disk = JsonFileTable::<ScheduleTable>::new(&path)
        .load()
        .await
        .expect("load");
    assert_eq!(on_disk.len(), 1);
    assert!(on_disk[0].sent);

    let restarted = Scheduler::load(
        Arc::new(JsonFileTable::<ScheduleTable>::new(&path)),
        directory,
        transport,
        clock_dyn,
        "prefix",
    )
    .await
    .expect("scheduler");
    assert!(restarted.due_items().await.is_empty());
    assert!(restarted.tick().await.is_empty());
}
