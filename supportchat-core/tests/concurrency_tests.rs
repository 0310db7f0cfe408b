// tests/concurrency_tests.rs

use std::collections::HashSet;
use futures_util::future::join_all;

use tokio::time::timeout;

use supportchat_common::models::{SenderRole, SessionState, Viewer};
use supportchat_core::test_utils::helpers::*;
use supportchat_core::eventbus::ChatEvent;
use supportchat_core::{EngineConfig, Error};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_agent_wins_the_claim() -> Result<(), Error> {
    let engine = test_engine();
    let session = engine.create_session("cust-1", "Ada", "please help").await?;
    engine.request_human(session.id).await?;
    let session_id = session.id;

    let attempts = (0..10).map(|i| {
        let engine = engine.clone();
        let staff_id = format!("agent-{}", i);
        tokio::spawn(async move { (staff_id.clone(), engine.accept_session(session_id, &staff_id).await) })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.expect("task panicked")).collect();

    let winners: Vec<&String> = results.iter().filter(|(_, r)| r.is_ok()).map(|(id, _)| id).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0].clone();

    for (_, result) in &results {
        if let Err(e) = result {
            match e {
                Error::AlreadyClaimed { session_id, claimed_by } => {
                    assert_eq!(*session_id, session.id);
                    assert_eq!(*claimed_by, winner);
                }
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    let current = engine.get_session(session.id)?;
    assert_eq!(current.state(), SessionState::Active);
    assert_eq!(current.assigned_staff_id, Some(winner));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_get_distinct_increasing_seqs() -> Result<(), Error> {
    let engine = test_engine();
    let session = engine.create_session("cust-2", "Bo", "start").await?;
    engine.request_human(session.id).await?;
    engine.accept_session(session.id, "agent-1").await?;
    let session_id = session.id;

    let sends = (0..40).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let (who, role) = if i % 2 == 0 {
                ("cust-2", SenderRole::Customer)
            } else {
                ("agent-1", SenderRole::Staff)
            };
            engine.send_message(session_id, who, role, &format!("msg {}", i)).await
        })
    });
    let mut seqs = HashSet::new();
    for res in join_all(sends).await {
        let message = res.expect("task panicked")?;
        assert!(seqs.insert(message.seq), "seq {} handed out twice", message.seq);
    }
    assert_eq!(seqs.len(), 40);

    let ledger = engine.list_messages(session.id, None, None)?.messages;
    assert_eq!(ledger.len(), 41);
    for (idx, m) in ledger.iter().enumerate() {
        assert_eq!(m.seq, idx as u64 + 1);
    }
    assert!(ledger.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));

    let s = engine.get_session(session.id)?;
    assert_eq!(s.unread_for_staff, 21);
    assert_eq!(s.unread_for_customer, 20);
    assert_eq!(s.last_message_preview, ledger[40].content);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_open_session_per_customer_under_races() -> Result<(), Error> {
    let engine = test_engine();
    let creates = (0..8).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create_session("cust-3", "Cy", &format!("hello {}", i)).await })
    });
    let results: Vec<_> = join_all(creates).await.into_iter().map(|r| r.expect("task panicked")).collect();

    let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(created.len(), 1);
    let id = created[0].id;
    for r in &results {
        if let Err(e) = r {
            assert!(matches!(e, Error::AlreadyHasOpenSession(existing) if *existing == id));
        }
    }
    assert_eq!(engine.list_for_customer("cust-3").len(), 1);
    assert_eq!(engine.directory().customer_lock_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observers_see_commit_order() -> Result<(), Error> {
    let engine = test_engine();
    let session = engine.create_session("cust-4", "Di", "0").await?;
    let mut console = engine.watch_directory("console").await;
    let session_id = session.id;

    let sends = (0..20).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.send_message(session_id, "cust-4", SenderRole::Customer, &i.to_string()).await
        })
    });
    for res in join_all(sends).await {
        res.expect("task panicked")?;
    }

    let mut last = 1;
    for _ in 0..20 {
        let evt = next_event(&mut console).await?;
        if let supportchat_core::eventbus::ChatEvent::MessageAppended { message, session } = evt {
            assert_eq!(message.seq, last + 1);
            assert_eq!(session.unread_for_staff as u64, message.seq);
            last = message.seq;
        }
    }
    assert_eq!(last, 21);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_watchers_do_not_hold_up_commits() -> Result<(), Error> {
    let engine = test_engine_with_config(EngineConfig { subscriber_buffer: 4, ..fast_config() });
    let session_a = engine.create_session("cust-a", "Ada", "hello").await?;

    // Neither of these is ever read.
    let _console = engine.watch_directory("console-1").await;
    let _staff_view = engine.join_session(session_a.id, &Viewer::staff("staff-1")).await?;

    for i in 0..8 {
        let sent = timeout(
            EVENT_WAIT,
            engine.send_message(session_a.id, "cust-a", SenderRole::Customer, &format!("msg {}", i)),
        )
        .await?;
        sent?;
    }

    let session_b = timeout(EVENT_WAIT, engine.create_session("cust-b", "Bo", "hi")).await??;
    assert_eq!(session_b.state(), SessionState::Bot);

    let closed = timeout(EVENT_WAIT, engine.close_session(session_a.id)).await??;
    assert_eq!(closed.state(), SessionState::Closed);
    Ok(())
}

#[tokio::test]
async fn test_stalled_watcher_still_gets_every_event_in_order() -> Result<(), Error> {
    let engine = test_engine_with_config(EngineConfig { subscriber_buffer: 2, ..fast_config() });
    let mut console = engine.watch_directory("console-1").await;
    let session = engine.create_session("cust-a", "Ada", "0").await?;
    for i in 1..10 {
        engine.send_message(session.id, "cust-a", SenderRole::Customer, &i.to_string()).await?;
    }

    let mut seqs = Vec::new();
    while seqs.len() < 10 {
        if let ChatEvent::MessageAppended { message, .. } = next_event(&mut console).await? {
            seqs.push(message.seq);
        }
    }
    assert_eq!(seqs, (1..=10).collect::<Vec<u64>>());
    Ok(())
}
