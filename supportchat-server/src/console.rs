// File: supportchat-server/src/console.rs
//
// Line-oriented operator console. Every engine operation is one command, so
// the whole customer/agent flow can be driven by hand from a terminal.

use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use supportchat_common::models::{Audience, ChatMessage, ChatSession, SenderRole, Viewer};
use supportchat_core::directory::StaffFilter;
use supportchat_core::eventbus::ChatEvent;
use supportchat_core::{ChatEngine, Error};

const HELP: &str = "\
Commands:
  help
  new      <customer_id> <display_name> <message...>
  say      <session> <customer|staff|bot|system> <sender_id> <message...>
  escalate <session>
  accept   <session> <staff_id>
  close    <session>
  read     <session> <customer|staff>
  show     <session>
  history  <session> [after_seq] [limit]
  queue
  all
  mine     <staff_id>
  customer <customer_id>
  current  <customer_id>
  join     <session> <customer|staff> <viewer_id>
  leave    <viewer_id>
  who      <session>
  reap     <idle_secs>
  quit
";

/// Reads commands from stdin until `quit`, EOF or shutdown.
pub async fn run_console(engine: ChatEngine) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shutdown_rx = engine.event_bus().shutdown_rx.clone();
    println!("Support chat console. Type 'help' for commands.");

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("Error reading stdin: {}", e);
                        break;
                    }
                };
                let (quit, output) = dispatch(&line, &engine).await;
                if let Some(text) = output {
                    println!("{}", text);
                }
                if quit {
                    break;
                }
            },
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!("Console closed.");
}

/// Runs one console line. Returns `(should_quit, output)`.
pub async fn dispatch(line: &str, engine: &ChatEngine) -> (bool, Option<String>) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let cmd = parts.first().map(|c| c.to_lowercase()).unwrap_or_default();
    let args = parts.get(1..).unwrap_or(&[]);

    match cmd.as_str() {
        "" => (false, None),
        "help" => (false, Some(HELP.to_string())),
        "quit" | "exit" => (true, Some("Bye.".to_string())),
        _ => match run_command(&cmd, args, engine).await {
            Ok(text) => (false, Some(text)),
            Err(e) if e.is_expected() => (false, Some(format!("Refused: {}", e))),
            Err(e) => (false, Some(format!("Error: {:?}", e))),
        },
    }
}

async fn run_command(cmd: &str, args: &[&str], engine: &ChatEngine) -> Result<String, Error> {
    match cmd {
        "new" => {
            let [customer_id, display_name, rest @ ..] = args else {
                return Err(usage("new <customer_id> <display_name> <message...>"));
            };
            let session = engine.create_session(customer_id, display_name, &join_text(rest)?).await?;
            Ok(format!("Created {}", session_line(&session)))
        }
        "say" => {
            let [session, role, sender_id, rest @ ..] = args else {
                return Err(usage("say <session> <role> <sender_id> <message...>"));
            };
            let role = SenderRole::from_str(role)?;
            let msg = engine.send_message(parse_id(session)?, sender_id, role, &join_text(rest)?).await?;
            Ok(format!("Sent seq {}", msg.seq))
        }
        "escalate" => {
            let session = engine.request_human(one_id(args, "escalate <session>")?).await?;
            Ok(format!("Queued {}", session_line(&session)))
        }
        "accept" => {
            let [session, staff_id] = args else {
                return Err(usage("accept <session> <staff_id>"));
            };
            let session = engine.accept_session(parse_id(session)?, staff_id).await?;
            Ok(format!("Claimed {}", session_line(&session)))
        }
        "close" => {
            let session = engine.close_session(one_id(args, "close <session>")?).await?;
            Ok(format!("Closed {}", session_line(&session)))
        }
        "read" => {
            let [session, audience] = args else {
                return Err(usage("read <session> <customer|staff>"));
            };
            let audience = Audience::from_str(audience)?;
            let session = engine.acknowledge_read(parse_id(session)?, audience).await?;
            Ok(session_line(&session))
        }
        "show" => {
            let session = engine.get_session(one_id(args, "show <session>")?)?;
            Ok(format!("{}\n  handled_by={:?} created={} closed={:?}",
                session_line(&session), session.handled_by, session.created_at, session.closed_at))
        }
        "history" => {
            let Some(session) = args.first() else {
                return Err(usage("history <session> [after_seq] [limit]"));
            };
            let after = args.get(1).map(|s| s.parse::<u64>()).transpose().map_err(|e| Error::Parse(e.to_string()))?;
            let limit = args.get(2).map(|s| s.parse::<usize>()).transpose().map_err(|e| Error::Parse(e.to_string()))?;
            let page = engine.list_messages(parse_id(session)?, after, limit)?;
            let mut out: Vec<String> = page.messages.iter().map(message_line).collect();
            if let Some(cursor) = page.next_cursor {
                out.push(format!("(next cursor: {})", cursor));
            }
            Ok(if out.is_empty() { "No messages.".to_string() } else { out.join("\n") })
        }
        "queue" => Ok(list_lines(&engine.list_for_staff(&StaffFilter::pending()))),
        "all" => Ok(list_lines(&engine.list_for_staff(&StaffFilter::all()))),
        "mine" => {
            let [staff_id] = args else {
                return Err(usage("mine <staff_id>"));
            };
            Ok(list_lines(&engine.list_for_staff(&StaffFilter::active_for(staff_id))))
        }
        "customer" => {
            let [customer_id] = args else {
                return Err(usage("customer <customer_id>"));
            };
            Ok(list_lines(&engine.list_for_customer(customer_id)))
        }
        "current" => {
            let [customer_id] = args else {
                return Err(usage("current <customer_id>"));
            };
            Ok(match engine.find_current_for(customer_id) {
                Some(session) => session_line(&session),
                None => format!("{} has no open session.", customer_id),
            })
        }
        "join" => {
            let [session, audience, viewer_id] = args else {
                return Err(usage("join <session> <customer|staff> <viewer_id>"));
            };
            let viewer = Viewer { viewer_id: viewer_id.to_string(), audience: Audience::from_str(audience)? };
            let joined = engine.join_session(parse_id(session)?, &viewer).await?;
            let mut out = vec![format!("Joined {}", session_line(&joined.session))];
            out.extend(joined.messages.iter().map(message_line));
            spawn_event_printer(viewer.viewer_id.clone(), joined.events);
            Ok(out.join("\n"))
        }
        "leave" => {
            let [viewer_id] = args else {
                return Err(usage("leave <viewer_id>"));
            };
            engine.leave_session(viewer_id).await;
            Ok(format!("{} left.", viewer_id))
        }
        "who" => {
            let viewers = engine.presence(one_id(args, "who <session>")?).await?;
            if viewers.is_empty() {
                return Ok("Nobody is watching.".to_string());
            }
            Ok(viewers
                .iter()
                .map(|v| format!("  {} ({})", v.viewer_id, v.audience))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        "reap" => {
            let [secs] = args else {
                return Err(usage("reap <idle_secs>"));
            };
            let secs = secs.parse::<i64>().map_err(|e| Error::Parse(e.to_string()))?;
            let closed = engine.close_idle_pending(chrono_secs(secs)).await?;
            Ok(format!("Closed {} idle pending session(s).", closed.len()))
        }
        other => Err(Error::Parse(format!("Unknown command '{}'. Type 'help'.", other))),
    }
}

fn chrono_secs(secs: i64) -> chrono::Duration {
    chrono::Duration::seconds(secs.max(0))
}

fn usage(text: &str) -> Error {
    Error::Parse(format!("usage: {}", text))
}

fn parse_id(raw: &str) -> Result<Uuid, Error> {
    Ok(Uuid::parse_str(raw)?)
}

fn one_id(args: &[&str], usage_text: &str) -> Result<Uuid, Error> {
    match args {
        [id] => parse_id(id),
        _ => Err(usage(usage_text)),
    }
}

fn join_text(words: &[&str]) -> Result<String, Error> {
    if words.is_empty() {
        return Err(Error::Parse("message text is empty".into()));
    }
    Ok(words.join(" "))
}

fn session_line(s: &ChatSession) -> String {
    format!(
        "{} [{}] customer={} staff={} unread(staff={}, customer={}) \"{}\"",
        s.id,
        s.state(),
        s.customer_id,
        s.assigned_staff_id.as_deref().unwrap_or("-"),
        s.unread_for_staff,
        s.unread_for_customer,
        s.last_message_preview
    )
}

fn message_line(m: &ChatMessage) -> String {
    format!("  #{} {} {}: {}", m.seq, m.sender_role, m.sender_id, m.content)
}

fn list_lines(sessions: &[ChatSession]) -> String {
    if sessions.is_empty() {
        return "No sessions.".to_string();
    }
    sessions.iter().map(session_line).collect::<Vec<_>>().join("\n")
}

/// Prints a joined viewer's events until they leave.
fn spawn_event_printer(viewer_id: String, mut events: mpsc::Receiver<ChatEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                ChatEvent::MessageAppended { message, .. } => {
                    println!("[{}] {}", viewer_id, message_line(message).trim_start())
                }
                other => println!("[{}] {} {}", viewer_id, other.event_type(), session_line(other.session())),
            }
        }
        debug!("Event printer for {} stopped", viewer_id);
    });
}
