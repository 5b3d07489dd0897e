mod common;

use chrono::Duration;
use common::*;
use talkto_client::dispatcher::{route, Dispatched, NoticeKind, RealtimeDispatcher};
use talkto_client::store::EventOutcome;
use talkto_client::{ClientError, RoomSession, RoomSnapshot, SyncConfig};
use talkto_models::gateway::PushEvent;
use talkto_models::message::ReplySnapshot;
use talkto_models::presence::{TypingPayload, TypingSource};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn typing(user_id: &str, username: &str) -> PushEvent {
    PushEvent::Typing(TypingPayload {
        user_id: user_id.to_string(),
        username: Some(username.to_string()),
        source: None,
    })
}

#[tokio::test]
async fn dispatcher_keeps_one_connection_for_the_active_room() {
    let api = FakeChatApi::with_messages(seeded(3));
    let connector = ChannelConnector::new();
    let _room_events = connector.channel(ROOM);
    let _other_events = connector.channel(OTHER_ROOM);

    let first = open_session(&api, None);
    let second = RoomSession::new(
        api.clone(),
        me(),
        SyncConfig::default(),
        RoomSnapshot {
            room_id: OTHER_ROOM.to_string(),
            read_state_included: true,
            ..RoomSnapshot::default()
        },
    );

    let mut dispatcher = RealtimeDispatcher::new(connector.clone());
    dispatcher.subscribe(&first).await.unwrap();
    dispatcher.subscribe(&first).await.unwrap();
    assert_eq!(connector.connects(), vec![ROOM.to_string()]);
    assert_eq!(dispatcher.active_room(), Some(ROOM));

    dispatcher.subscribe(&second).await.unwrap();
    assert_eq!(connector.closed(), vec![ROOM.to_string()]);
    assert_eq!(dispatcher.active_room(), Some(OTHER_ROOM));

    dispatcher.unsubscribe().await;
    assert_eq!(
        connector.closed(),
        vec![ROOM.to_string(), OTHER_ROOM.to_string()]
    );
    assert_eq!(dispatcher.active_room(), None);
}

#[tokio::test]
async fn step_refuses_a_session_of_another_room() {
    let api = FakeChatApi::with_messages(seeded(3));
    let connector = ChannelConnector::new();
    let events = connector.channel(ROOM);

    let session = open_session(&api, None);
    let mut other = RoomSession::new(
        api.clone(),
        me(),
        SyncConfig::default(),
        RoomSnapshot {
            room_id: OTHER_ROOM.to_string(),
            read_state_included: true,
            ..RoomSnapshot::default()
        },
    );

    let mut dispatcher = RealtimeDispatcher::new(connector.clone());
    dispatcher.subscribe(&session).await.unwrap();
    events.send(typing("2", "bob")).unwrap();

    assert_eq!(dispatcher.step(&mut other).await, None);
    assert_eq!(other.presence().active(Instant::now()).len(), 0);
}

#[tokio::test(start_paused = true)]
async fn typing_expires_through_the_sweep() {
    let api = FakeChatApi::with_messages(seeded(3));
    let connector = ChannelConnector::new();
    let events = connector.channel(ROOM);
    let mut session = open_session(&api, None);

    let mut dispatcher = RealtimeDispatcher::new(connector.clone());
    dispatcher.subscribe(&session).await.unwrap();

    events.send(typing("2", "bob")).unwrap();
    assert_eq!(
        dispatcher.step(&mut session).await,
        Some(Dispatched::Typing { accepted: true })
    );
    assert_eq!(
        session.typing_summary(Instant::now()).as_deref(),
        Some("bob is typing…")
    );

    let started = Instant::now();
    let mut purged = 0;
    for _ in 0..10 {
        match dispatcher.step(&mut session).await {
            Some(Dispatched::Swept(n)) if n > 0 => {
                purged = n;
                break;
            }
            Some(Dispatched::Swept(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(purged, 1);
    assert!(started.elapsed() >= std::time::Duration::from_millis(3500));
    assert_eq!(session.typing_summary(Instant::now()), None);
}

#[tokio::test]
async fn own_typing_echo_is_ignored_and_a_message_clears_typing() {
    let history = seeded(3);
    let api = FakeChatApi::with_messages(history.clone());
    let mut session = open_session(&api, None);

    assert_eq!(
        route(&mut session, typing(&me().id, "ana")),
        Dispatched::Typing { accepted: false }
    );
    assert_eq!(
        route(&mut session, typing("2", "bob")),
        Dispatched::Typing { accepted: true }
    );

    let msg = message(
        3000,
        history[2].created_at + Duration::seconds(5),
        bob(),
        "done typing",
    );
    route(&mut session, PushEvent::NewMessage(msg));
    assert_eq!(session.typing_summary(Instant::now()), None);
}

#[tokio::test]
async fn replies_and_mentions_raise_notices() {
    let history = seeded(3);
    let api = FakeChatApi::with_messages(history.clone());
    let mut session = open_session(&api, None);
    let later = history[2].created_at;

    let mut reply = message(3000, later + Duration::seconds(1), bob(), "fair point");
    reply.reply_to = Some(ReplySnapshot::from(&history[1]));
    match route(&mut session, PushEvent::NewMessage(reply)) {
        Dispatched::NewMessage {
            outcome: EventOutcome::Inserted,
            notice: Some(notice),
        } => {
            assert_eq!(notice.kind, NoticeKind::Reply);
            assert_eq!(notice.message_id, "3000");
            assert_eq!(notice.author, "bob");
            assert_eq!(notice.preview, "fair point");
        }
        other => panic!("unexpected {other:?}"),
    }

    let long = format!("@Ana {}", "z".repeat(100));
    let mention = message(3001, later + Duration::seconds(2), bob(), &long);
    match route(&mut session, PushEvent::NewMessage(mention.clone())) {
        Dispatched::NewMessage {
            notice: Some(notice),
            ..
        } => {
            assert_eq!(notice.kind, NoticeKind::Mention);
            assert_eq!(notice.preview.chars().count(), 78);
        }
        other => panic!("unexpected {other:?}"),
    }

    // a repeat delivery is not news
    assert_eq!(
        route(&mut session, PushEvent::NewMessage(mention)),
        Dispatched::NewMessage {
            outcome: EventOutcome::Unchanged,
            notice: None
        }
    );

    let plain = message(3002, later + Duration::seconds(3), bob(), "lunch?");
    assert_eq!(
        route(&mut session, PushEvent::NewMessage(plain)),
        Dispatched::NewMessage {
            outcome: EventOutcome::Inserted,
            notice: None
        }
    );
}

#[tokio::test]
async fn events_for_another_room_are_dropped() {
    let api = FakeChatApi::with_messages(seeded(3));
    let mut session = open_session(&api, None);

    let mut stray = message(3000, base_time(), bob(), "@ana wrong room");
    stray.room_id = OTHER_ROOM.to_string();
    assert_eq!(
        route(&mut session, PushEvent::NewMessage(stray)),
        Dispatched::NewMessage {
            outcome: EventOutcome::Ignored,
            notice: None
        }
    );
    assert_eq!(session.store().len(), 3);
}

#[tokio::test]
async fn run_forwards_notices_until_the_room_cannot_be_reached() {
    let history = seeded(3);
    let api = FakeChatApi::with_messages(history.clone());
    let connector = ChannelConnector::new();
    let events = connector.channel(ROOM);
    let mut session = open_session(&api, None);

    let mut dispatcher = RealtimeDispatcher::new(connector.clone());
    dispatcher.subscribe(&session).await.unwrap();

    let later = history[2].created_at;
    let mut reply = message(3000, later + Duration::seconds(1), bob(), "re");
    reply.reply_to = Some(ReplySnapshot::from(&history[1]));
    events.send(PushEvent::NewMessage(reply)).unwrap();
    events
        .send(PushEvent::NewMessage(message(
            3001,
            later + Duration::seconds(2),
            bob(),
            "unrelated",
        )))
        .unwrap();
    drop(events);

    let (notices, mut received) = mpsc::unbounded_channel();
    dispatcher.run(&mut session, notices).await;

    assert_eq!(session.store().len(), 5);
    // the reopen attempt found no channel
    assert_eq!(connector.connects(), vec![ROOM.to_string()]);
    assert_eq!(dispatcher.active_room(), None);
    let notice = received.recv().await.unwrap();
    assert_eq!(notice.kind, NoticeKind::Reply);
    assert!(received.recv().await.is_none());
}

#[tokio::test]
async fn closed_channel_reopens_and_merges_missed_messages() {
    let history = seeded(3);
    let api = FakeChatApi::with_messages(history.clone());
    let connector = ChannelConnector::new();
    let events = connector.channel(ROOM);
    let mut session = open_session(&api, None);

    let mut dispatcher = RealtimeDispatcher::new(connector.clone());
    dispatcher.subscribe(&session).await.unwrap();

    let later = history[2].created_at;
    api.publish(message(3000, later + Duration::seconds(30), bob(), "sent while away"));
    drop(events);
    let reopened = connector.channel(ROOM);

    assert_eq!(
        dispatcher.step(&mut session).await,
        Some(Dispatched::Resynced(1))
    );
    assert!(session.store().contains("3000"));
    assert_eq!(
        connector.connects(),
        vec![ROOM.to_string(), ROOM.to_string()]
    );
    assert_eq!(dispatcher.active_room(), Some(ROOM));

    // the new connection is live
    reopened
        .send(PushEvent::NewMessage(message(
            3001,
            later + Duration::seconds(40),
            bob(),
            "back again",
        )))
        .unwrap();
    assert_eq!(
        dispatcher.step(&mut session).await,
        Some(Dispatched::NewMessage {
            outcome: EventOutcome::Inserted,
            notice: None
        })
    );
    assert_eq!(session.store().len(), 5);
}

#[tokio::test]
async fn resync_walks_back_across_a_long_gap() {
    let history = seeded(3);
    let api = FakeChatApi::with_messages(history.clone());
    let mut session = open_session(&api, None);

    let later = history[2].created_at;
    for i in 0..45 {
        api.publish(message(
            3000 + i,
            later + Duration::seconds(10 + i),
            bob(),
            &format!("missed {i}"),
        ));
    }

    assert_eq!(session.resync().await.unwrap(), 45);
    assert_eq!(session.store().len(), 48);
    assert!(session.store().contains("3000"));
    assert!(!session.has_more());
    assert_eq!(api.history_calls(), 2);
}

#[tokio::test]
async fn reconnect_requires_a_subscription() {
    let api = FakeChatApi::with_messages(seeded(3));
    let connector = ChannelConnector::new();
    let mut session = open_session(&api, None);

    let mut dispatcher = RealtimeDispatcher::new(connector.clone());
    assert!(matches!(
        dispatcher.reconnect(&mut session).await,
        Err(ClientError::NotSubscribed)
    ));
    assert!(connector.connects().is_empty());
}

#[tokio::test]
async fn typing_keeps_the_stated_source() {
    let api = FakeChatApi::with_messages(seeded(3));
    let mut session = open_session(&api, None);

    let assisted = PushEvent::Typing(TypingPayload {
        user_id: "2".to_string(),
        username: Some("bob".to_string()),
        source: Some(TypingSource::Assistant),
    });
    route(&mut session, assisted);
    route(&mut session, typing("3", "cy"));

    let now = Instant::now();
    let sources: Vec<_> = session
        .presence()
        .active(now)
        .into_iter()
        .map(|entry| (entry.user_id.clone(), entry.source))
        .collect();
    assert_eq!(
        sources,
        vec![
            ("2".to_string(), TypingSource::Assistant),
            ("3".to_string(), TypingSource::Other),
        ]
    );
}
