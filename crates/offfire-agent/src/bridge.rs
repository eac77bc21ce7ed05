// SPDX-License-Identifier: AGPL-3.0
// Off Fire Agent - Command Bridge
//
// JSON-lines protocol between a host process and the agent. Each input
// line is one command; each output line is either a reply to a command or
// a sync event from the background loop.

use crate::state::AppState;
use async_channel::{Receiver, Sender};
use offfire_core::{AppError, Language, OrderId, OrderPayload};
use offfire_sync::{NetworkState, NotificationEvent, SignUpProfile, SubmitOutcome, SyncTrigger};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;

/// Commands accepted on the input stream
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AgentCommand {
    Submit {
        payload: OrderPayload,
    },
    Flush,
    ListQueue,
    ClearQueue,
    Status,
    /// Host-reported network state
    SetNetwork {
        state: NetworkState,
    },
    SetPushToken {
        token: String,
    },
    SignIn {
        email: String,
        password: String,
    },
    SignUp {
        email: String,
        password: String,
        profile: SignUpProfile,
        /// Order placed as a guest, attributed to the new account
        #[serde(default)]
        link_order_id: Option<OrderId>,
    },
    SignOut,
    MyOrders,
    LinkOrder {
        order_id: OrderId,
    },
    ResetPassword {
        email: String,
    },
    UpdatePassword {
        password: String,
    },
    SetLanguage {
        language: Language,
    },
    CompleteOnboarding,
    Offer {
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
    Errors,
    ClearErrors,
    Shutdown,
}

/// One input line: a command plus an optional id echoed in the reply
#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    #[serde(flatten)]
    command: AgentCommand,
}

fn reply(id: Option<Value>, result: Result<Value, AppError>) -> Value {
    match result {
        Ok(result) => json!({ "id": id, "ok": true, "result": result }),
        Err(e) => json!({
            "id": id,
            "ok": false,
            "error": e.to_string(),
            "kind": e.kind(),
            "detail": e.backend_failure().map(|f| f.description()),
        }),
    }
}

/// Execute a single command against the application state
pub async fn execute(state: &AppState, command: AgentCommand) -> Result<Value, AppError> {
    match command {
        AgentCommand::Submit { payload } => match state.submitter.submit(payload).await? {
            SubmitOutcome::Queued { local_id } => {
                Ok(json!({ "status": "queued", "localId": local_id }))
            }
            SubmitOutcome::Submitted {
                order,
                notification,
            } => Ok(json!({
                "status": "submitted",
                "order": order,
                "adminNotified": matches!(notification.remote, Some(Ok(()))),
            })),
        },
        AgentCommand::Flush => Ok(serde_json::to_value(
            state.engine.flush(SyncTrigger::Manual).await,
        )?),
        AgentCommand::ListQueue => Ok(serde_json::to_value(state.queue.list_all().await)?),
        AgentCommand::ClearQueue => {
            state.queue.clear_all().await?;
            Ok(Value::Null)
        }
        AgentCommand::Status => {
            let session = state.auth.current_session().await;
            let language = state.preferences.language().await?;
            Ok(json!({
                "network": state.connectivity.current(),
                "online": state.connectivity.is_online(),
                "pending": state.queue.len().await,
                "syncing": state.engine.is_syncing(),
                "session": session,
                "language": language,
                "rtl": language.is_rtl(),
                "hasSeenOnboarding": state.preferences.has_seen_onboarding().await?,
                "remindersScheduled": state.preferences.reminders_scheduled().await?,
            }))
        }
        AgentCommand::SetNetwork { state: network } => {
            let changed = state.connectivity.update(network);
            Ok(json!({ "changed": changed }))
        }
        AgentCommand::SetPushToken { token } => {
            state.preferences.set_push_token(&token).await?;
            state.preferences.set_notifications_enabled(true).await?;
            Ok(Value::Null)
        }
        AgentCommand::SignIn { email, password } => {
            let outcome = state.auth.sign_in(&email, &password).await?;
            Ok(json!({
                "session": outcome.session,
                "adminTokenSync": format!("{:?}", outcome.token_sync),
            }))
        }
        AgentCommand::SignUp {
            email,
            password,
            profile,
            link_order_id,
        } => {
            let outcome = state
                .auth
                .sign_up(&email, &password, &profile, link_order_id)
                .await?;
            Ok(json!({
                "confirmationRequired": outcome.is_none(),
                "session": outcome.as_ref().map(|o| &o.session),
                "adminTokenSync": outcome.map(|o| format!("{:?}", o.token_sync)),
            }))
        }
        AgentCommand::SignOut => {
            state.auth.sign_out().await?;
            Ok(Value::Null)
        }
        AgentCommand::MyOrders => Ok(serde_json::to_value(state.auth.my_orders().await?)?),
        AgentCommand::LinkOrder { order_id } => {
            state.auth.link_order(order_id).await?;
            Ok(Value::Null)
        }
        AgentCommand::ResetPassword { email } => {
            state.auth.reset_password(&email).await?;
            Ok(Value::Null)
        }
        AgentCommand::UpdatePassword { password } => {
            state.auth.update_password(&password).await?;
            Ok(Value::Null)
        }
        AgentCommand::SetLanguage { language } => {
            state.preferences.set_language(language).await?;
            Ok(json!({ "language": language, "rtl": language.is_rtl() }))
        }
        AgentCommand::CompleteOnboarding => {
            state.preferences.mark_onboarding_seen().await?;
            Ok(Value::Null)
        }
        AgentCommand::Offer {
            title,
            description,
            code,
        } => {
            let report = state
                .dispatcher
                .dispatch(NotificationEvent::Offer {
                    title,
                    description,
                    code,
                })
                .await;
            Ok(json!({ "delivered": report.is_ok() }))
        }
        AgentCommand::Errors => Ok(serde_json::to_value(state.error_log.entries().await?)?),
        AgentCommand::ClearErrors => {
            state.error_log.clear().await?;
            Ok(Value::Null)
        }
        AgentCommand::Shutdown => Ok(Value::Null),
    }
}

/// Read lines from `input` and forward parsed requests
async fn read_commands<R>(input: R, command_tx: Sender<Result<Request, String>>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                let parsed = serde_json::from_str::<Request>(&line).map_err(|e| e.to_string());
                if command_tx.send(parsed).await.is_err() {
                    break; // Channel closed
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read command: {}", e);
                break;
            }
        }
    }
}

async fn write_line<W>(output: &mut W, value: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = value.to_string();
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await
}

/// Serve commands from `input` until it closes or a shutdown command arrives
pub async fn run<R, W>(state: &AppState, input: R, output: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (command_tx, command_rx): (_, Receiver<Result<Request, String>>) =
        async_channel::bounded(32);
    let mut events = state.engine.subscribe();

    let reader = tokio::spawn(read_commands(input, command_tx));

    loop {
        tokio::select! {
            // Drain pending events before the next command
            biased;

            // Forward sync events to the host
            event = events.recv() => {
                match event {
                    Ok(event) => write_line(output, &json!({ "event": event })).await?,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dropped {} sync events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            // Handle commands from the host
            request = command_rx.recv() => {
                let request = match request {
                    Ok(Ok(request)) => request,
                    Ok(Err(e)) => {
                        tracing::warn!("Rejected malformed command: {}", e);
                        let error = json!({ "id": null, "ok": false, "error": e, "kind": "validation" });
                        write_line(output, &error).await?;
                        continue;
                    }
                    Err(_) => break, // Channel closed
                };

                let shutdown = matches!(request.command, AgentCommand::Shutdown);
                let result = execute(state, request.command).await;
                write_line(output, &reply(request.id, result)).await?;

                if shutdown {
                    break;
                }
            }
        }
    }

    reader.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use offfire_core::{AppSettings, KeyValueStore, MemoryKeyValueStore, SettingsStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn state() -> (AppState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsStore::open(dir.path().join("settings.json")).unwrap();
        settings
            .update(AppSettings {
                // Nothing listens here; every test stays offline
                backend_url: "http://127.0.0.1:9".to_string(),
                request_timeout_secs: 1,
                ..Default::default()
            })
            .unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let state = AppState::with_store(settings, store).await.unwrap();
        (state, dir)
    }

    async fn run_lines(state: &AppState, input: &'static str) -> Vec<Value> {
        let mut output = Vec::new();
        run(state, tokio::io::BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn replies(lines: &[Value]) -> Vec<&Value> {
        lines.iter().filter(|l| l.get("ok").is_some()).collect()
    }

    #[tokio::test]
    async fn test_offline_submit_queues_and_lists() {
        let (state, _dir) = state().await;

        let lines = run_lines(
            &state,
            concat!(
                r#"{"id":1,"cmd":"submit","payload":{"client_name":"Ali","phone":"0501234567","service_id":2}}"#,
                "\n",
                r#"{"id":2,"cmd":"list_queue"}"#,
                "\n",
                r#"{"id":3,"cmd":"status"}"#,
                "\n",
            ),
        )
        .await;
        let replies = replies(&lines);

        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[0]["result"]["status"], "queued");
        let local_id = replies[0]["result"]["localId"].clone();

        let queued = replies[1]["result"].as_array().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0]["localId"], local_id);
        assert_eq!(queued[0]["status"], "offline_pending");

        assert_eq!(replies[2]["result"]["online"], false);
        assert_eq!(replies[2]["result"]["pending"], 1);
    }

    #[tokio::test]
    async fn test_flush_while_offline_is_skipped() {
        let (state, _dir) = state().await;

        let lines = run_lines(&state, "{\"id\":\"f\",\"cmd\":\"flush\"}\n").await;
        let replies = replies(&lines);
        assert_eq!(replies[0]["result"]["outcome"], "skipped");
        assert_eq!(replies[0]["result"]["reason"], "offline");

        // The skip is also published as an event
        assert!(lines
            .iter()
            .any(|l| l["event"]["type"] == "skipped" && l["event"]["trigger"] == "manual"));
    }

    #[tokio::test]
    async fn test_errors_are_replied_not_fatal() {
        let (state, _dir) = state().await;

        let lines = run_lines(
            &state,
            concat!(
                "not json\n",
                r#"{"id":1,"cmd":"submit","payload":{"client_name":"","phone":"0501234567","service_id":2}}"#,
                "\n",
                r#"{"id":2,"cmd":"clear_queue"}"#,
                "\n",
            ),
        )
        .await;
        let replies = replies(&lines);

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["ok"], false);
        assert_eq!(replies[1]["ok"], false);
        assert_eq!(replies[1]["kind"], "validation");
        assert_eq!(replies[2]["ok"], true);
    }

    #[tokio::test]
    async fn test_shutdown_stops_processing() {
        let (state, _dir) = state().await;

        let lines = run_lines(
            &state,
            "{\"cmd\":\"shutdown\"}\n{\"cmd\":\"clear_queue\"}\n",
        )
        .await;
        assert_eq!(replies(&lines).len(), 1);
    }

    #[tokio::test]
    async fn test_language_and_onboarding_are_persisted() {
        let (state, _dir) = state().await;

        let lines = run_lines(
            &state,
            concat!(
                r#"{"id":1,"cmd":"status"}"#,
                "\n",
                r#"{"id":2,"cmd":"set_language","language":"en"}"#,
                "\n",
                r#"{"id":3,"cmd":"complete_onboarding"}"#,
                "\n",
                r#"{"id":4,"cmd":"status"}"#,
                "\n",
                r#"{"id":5,"cmd":"set_language","language":"fr"}"#,
                "\n",
            ),
        )
        .await;
        let replies = replies(&lines);

        assert_eq!(replies[0]["result"]["language"], "ar");
        assert_eq!(replies[0]["result"]["rtl"], true);
        assert_eq!(replies[0]["result"]["hasSeenOnboarding"], false);

        assert_eq!(replies[1]["result"]["rtl"], false);
        assert_eq!(replies[3]["result"]["language"], "en");
        assert_eq!(replies[3]["result"]["hasSeenOnboarding"], true);

        // Unknown language codes are rejected before reaching preferences
        assert_eq!(replies[4]["ok"], false);
        assert_eq!(state.preferences.language().await.unwrap(), Language::En);
    }

    #[tokio::test]
    async fn test_account_commands_need_session() {
        let (state, _dir) = state().await;

        let lines = run_lines(
            &state,
            concat!(
                r#"{"id":1,"cmd":"my_orders"}"#,
                "\n",
                r#"{"id":2,"cmd":"update_password","password":"new-secret"}"#,
                "\n",
                r#"{"id":3,"cmd":"reset_password","email":" "}"#,
                "\n",
            ),
        )
        .await;
        let replies = replies(&lines);

        assert_eq!(replies[0]["kind"], "auth");
        assert_eq!(replies[1]["kind"], "auth");
        assert_eq!(replies[2]["kind"], "validation");
        assert!(replies[0]["detail"].is_null());
    }

    #[test]
    fn test_backend_failures_carry_description() {
        let reply = reply(
            Some(json!(7)),
            Err(AppError::Backend {
                code: "23505".to_string(),
                message: "duplicate key value".to_string(),
            }),
        );
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["detail"], "This record already exists");
    }

    #[tokio::test]
    async fn test_set_network_and_push_token() {
        let (state, _dir) = state().await;

        let result = execute(
            &state,
            AgentCommand::SetNetwork {
                state: NetworkState {
                    connected: true,
                    internet_reachable: false,
                    connection_type: Default::default(),
                },
            },
        )
        .await
        .unwrap();
        assert_eq!(result["changed"], true);
        assert!(!state.connectivity.is_online());

        execute(
            &state,
            AgentCommand::SetPushToken {
                token: "ExponentPushToken[device]".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            state.preferences.push_token().await.unwrap().as_deref(),
            Some("ExponentPushToken[device]")
        );
        assert!(state.preferences.notifications_enabled().await.unwrap());
    }
}
