use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use formcall_client::{
    CallController, CallHandle, CallSnapshot, ConnectionPhase, ControllerConfig, NullSpeaker,
    WsConnector,
};
use formcall_core::error::ErrorCode;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::util::{error_json, load_schema};

const HELP: &str = "\
Type to talk to the assistant. Commands:
  /pause /resume     pause or resume the call
  /mute /unmute      toggle the microphone flag
  /form              show the form values
  /set <id> <value>  edit a field (only while no call is connected)
  /stop              end the call";

/// Run a text-mode call until it stops or fails.
///
/// Exit codes: 0=call ended, 1=configuration error, 2=server error,
///             3=connection error, 4=usage error
pub async fn run(call_url: &str, schema_path: Option<&Path>, end_call_delay: Duration) -> i32 {
    let schema = match load_schema(schema_path) {
        Ok(schema) => schema,
        Err(message) => {
            eprintln!("{}", error_json("invalid_schema", &message, None));
            return 4;
        }
    };

    let mut config = ControllerConfig::new(call_url);
    config.initial_form = schema;
    config.termination.end_call_delay = end_call_delay;

    let handle = CallController::spawn(
        config,
        Arc::new(WsConnector),
        Arc::new(NullSpeaker::new()),
    );
    let mut snapshots = handle.snapshots();
    let mut notifications = handle.notifications();
    if handle.start().is_err() {
        eprintln!("{}", error_json("cli_error", "call controller did not start", None));
        return 1;
    }
    eprintln!("{HELP}");

    let mut view = TranscriptView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    tracing::error!("call controller stopped unexpectedly");
                    return 1;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                view.render(&snapshot);
                match snapshot.machine.phase() {
                    ConnectionPhase::Stopped => {
                        tracing::info!(entries = snapshot.conversation.len(), "call ended");
                        return 0;
                    }
                    ConnectionPhase::Errored(code) => {
                        tracing::warn!(code = %code, "call failed");
                        while let Ok(notification) = notifications.try_recv() {
                            eprintln!("{}", error_json("call_error", &notification.message, None));
                        }
                        return exit_code(code);
                    }
                    _ => {}
                }
            }
            Ok(notification) = notifications.recv() => {
                eprintln!("{}", error_json("call_error", &notification.message, None));
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_line(&handle, line.trim()).await,
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    let _ = handle.stop();
                }
            },
        }
    }
}

fn exit_code(code: ErrorCode) -> i32 {
    if code.is_configuration() {
        1
    } else if code == ErrorCode::Connection {
        3
    } else {
        2
    }
}

async fn handle_line(handle: &CallHandle, line: &str) {
    if line.is_empty() {
        return;
    }
    let sent = match line {
        "/pause" => handle.pause(),
        "/resume" => handle.resume(),
        "/mute" => handle.mute(),
        "/unmute" => handle.unmute(),
        "/stop" => handle.stop(),
        "/help" => {
            eprintln!("{HELP}");
            Ok(())
        }
        "/form" => {
            print_form(&handle.snapshot());
            Ok(())
        }
        _ if line.starts_with("/set ") => {
            let mut parts = line["/set ".len()..].splitn(2, ' ');
            let (Some(id), Some(value)) = (parts.next(), parts.next()) else {
                eprintln!("usage: /set <id> <value>");
                return;
            };
            match handle.set_field_value(id, value).await {
                Ok(true) => Ok(()),
                Ok(false) => {
                    eprintln!("no field with id {id}");
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        _ => handle.send_text(line),
    };
    if let Err(e) = sent {
        eprintln!("{}", error_json("cli_error", &e.to_string(), None));
    }
}

fn print_form(snapshot: &CallSnapshot) {
    for field in snapshot.form.sorted_fields() {
        let marker = if field.required { "*" } else { " " };
        println!(
            "{marker} {:<12} {:<20} {}",
            field.id,
            field.label,
            field.value.as_deref().unwrap_or("")
        );
    }
}

/// Prints what changed between snapshots: new transcript entries on stdout,
/// status changes on stderr.
#[derive(Default)]
struct TranscriptView {
    printed: usize,
    status: String,
}

impl TranscriptView {
    fn render(&mut self, snapshot: &CallSnapshot) {
        if snapshot.conversation.len() < self.printed {
            self.printed = 0;
        }
        for entry in snapshot.conversation.since(self.printed) {
            println!("{}", entry.render());
        }
        self.printed = snapshot.conversation.len();

        let status = snapshot.status_message();
        if status != self.status {
            eprintln!("-- {status}");
            self.status = status;
        }
    }
}
