// tests/state_invariant_tests.rs
//
// Random command sequences against one customer's sessions. After every step
// the committed session must satisfy the structural invariants, a closed
// session must not change except for its read counters, and the ledger must
// stay gapless and strictly increasing.

use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use supportchat_common::models::{Audience, ChatSession, SenderRole, SessionState};
use supportchat_core::test_utils::helpers::test_engine;
use supportchat_core::{ChatEngine, Error, SessionStateMachine};

const CUSTOMER: &str = "cust-prop";

#[derive(Debug, Clone)]
enum Command {
    Create,
    Send(SenderRole),
    RequestHuman,
    Accept(u8),
    Close,
    Acknowledge(Audience),
}

fn arbitrary_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Create),
        prop_oneof![
            Just(SenderRole::Customer),
            Just(SenderRole::Staff),
            Just(SenderRole::Bot),
            Just(SenderRole::System),
        ]
        .prop_map(Command::Send),
        Just(Command::RequestHuman),
        (0u8..3).prop_map(Command::Accept),
        Just(Command::Close),
        prop_oneof![Just(Audience::Customer), Just(Audience::Staff)].prop_map(Command::Acknowledge),
    ]
}

fn rank(state: SessionState) -> u8 {
    match state {
        SessionState::Bot => 0,
        SessionState::PendingHuman => 1,
        SessionState::Active => 2,
        SessionState::Closed => 3,
    }
}

fn without_counters(session: &ChatSession) -> ChatSession {
    let mut s = session.clone();
    s.unread_for_staff = 0;
    s.unread_for_customer = 0;
    s
}

fn fail(e: Error) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

async fn apply(engine: &ChatEngine, current: &ChatSession, command: &Command) -> Result<(), Error> {
    match command {
        Command::Create => engine.create_session(CUSTOMER, "Prop", "hello").await.map(|_| ()),
        Command::Send(role) => engine.send_message(current.id, "someone", *role, "text").await.map(|_| ()),
        Command::RequestHuman => engine.request_human(current.id).await.map(|_| ()),
        Command::Accept(n) => engine.accept_session(current.id, &format!("agent-{}", n)).await.map(|_| ()),
        Command::Close => engine.close_session(current.id).await.map(|_| ()),
        Command::Acknowledge(audience) => engine.acknowledge_read(current.id, *audience).await.map(|_| ()),
    }
}

async fn run_commands(commands: Vec<Command>) -> Result<(), TestCaseError> {
    let engine = test_engine();
    let mut current = engine.create_session(CUSTOMER, "Prop", "hello").await.map_err(fail)?;
    let mut ledger_len: u64 = 1;

    for command in &commands {
        let before = engine.get_session(current.id).map_err(fail)?;
        let result = apply(&engine, &before, command).await;

        if let Command::Create = command {
            if before.is_closed() {
                prop_assert!(result.is_ok(), "create after close failed: {:?}", result);
                current = engine.find_current_for(CUSTOMER).ok_or_else(|| TestCaseError::fail("no current session"))?;
                ledger_len = 1;
            } else {
                prop_assert!(matches!(result, Err(Error::AlreadyHasOpenSession(id)) if id == before.id));
            }
        } else if let (Command::Send(_), Ok(())) = (command, &result) {
            ledger_len += 1;
        }

        let after = engine.get_session(current.id).map_err(fail)?;
        prop_assert!(
            SessionStateMachine::check_invariants(&after).is_ok(),
            "{:?} broke an invariant: {:?}",
            command,
            SessionStateMachine::check_invariants(&after)
        );

        if after.id == before.id {
            prop_assert!(rank(after.state()) >= rank(before.state()), "{:?} moved state backwards", command);
            if before.is_closed() {
                prop_assert_eq!(without_counters(&after), without_counters(&before));
                match command {
                    Command::Send(_) | Command::RequestHuman | Command::Accept(_) => {
                        prop_assert!(result.is_err(), "{:?} succeeded on a closed session", command)
                    }
                    Command::Close | Command::Acknowledge(_) | Command::Create => {}
                }
            }
        }

        let seqs: Vec<u64> = engine
            .list_messages(current.id, None, None)
            .map_err(fail)?
            .messages
            .iter()
            .map(|m| m.seq)
            .collect();
        prop_assert_eq!(seqs, (1..=ledger_len).collect::<Vec<u64>>());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_invariants_hold_after_every_command(
        commands in prop::collection::vec(arbitrary_command(), 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        rt.block_on(run_commands(commands))?;
    }
}
