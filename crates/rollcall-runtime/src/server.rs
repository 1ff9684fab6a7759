//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::Mutex;

use crate::daemon::DaemonState;

/// Run the UDS JSON-RPC server.
pub async fn run_server(socket_path: &str, state: Arc<Mutex<DaemonState>>) -> anyhow::Result<()> {
    // Socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    state: Arc<Mutex<DaemonState>>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let result = match method {
        "push_event" => {
            let frame = request["params"]["frame"].to_string();
            let now = Utc::now();
            let mut st = state.lock().await;
            match st.push.accept_line(&frame, now) {
                Ok(event) => {
                    let disposition = st.reconciler.apply_event(event, now);
                    serde_json::json!({ "disposition": format!("{disposition:?}") })
                }
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            }
        }
        "list_sessions" => {
            let st = state.lock().await;
            serde_json::to_value(st.reconciler.sessions())?
        }
        "roster" => {
            let session = request["params"]["session_code"].as_str().map(String::from);
            let st = state.lock().await;
            build_roster(&st, session.as_deref())
        }
        "status" => {
            let st = state.lock().await;
            build_status(&st)
        }
        "changes_since" => {
            let since_version = request["params"]["since_version"].as_u64().unwrap_or(0);
            let st = state.lock().await;
            serde_json::json!({
                "changes": st.reconciler.changes_since(since_version),
                "version": st.reconciler.version(),
            })
        }
        _ => {
            let error_response = serde_json::json!({
                "jsonrpc": "2.0",
                "error": {"code": -32601, "message": "method not found"},
                "id": id,
            });
            let mut resp = serde_json::to_string(&error_response)?;
            resp.push('\n');
            writer.write_all(resp.as_bytes()).await?;
            return Ok(());
        }
    };

    let response = serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    });
    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

/// Build a roster response. With no session code, a single tracked
/// session is picked implicitly; anything else is an error entry.
pub(crate) fn build_roster(state: &DaemonState, session: Option<&str>) -> serde_json::Value {
    let sessions = state.reconciler.sessions();
    let code = match session {
        Some(code) => code.to_string(),
        None => match sessions.as_slice() {
            [only] => only.session_code.clone(),
            [] => return serde_json::json!({ "error": "no tracked sessions" }),
            _ => {
                return serde_json::json!({
                    "error": "multiple sessions tracked, specify one",
                    "sessions": sessions.iter().map(|s| &s.session_code).collect::<Vec<_>>(),
                });
            }
        },
    };

    match state.reconciler.roster(&code) {
        Some(entries) => serde_json::json!({
            "session_code": code,
            "host_phase": state.reconciler.host_phase(&code),
            "entries": entries,
        }),
        None => serde_json::json!({ "error": format!("unknown session: {code}") }),
    }
}

/// Build a status summary: counters plus per-session headline numbers.
pub(crate) fn build_status(state: &DaemonState) -> serde_json::Value {
    let sessions: Vec<serde_json::Value> = state
        .reconciler
        .sessions()
        .iter()
        .map(|s| {
            serde_json::json!({
                "session_code": s.session_code,
                "participants": s.participants.len(),
                "host_phase": s.host_phase,
                "host_locked": s.host_locked,
            })
        })
        .collect();

    serde_json::json!({
        "version": state.reconciler.version(),
        "scopes_resolved": state.reconciler.scopes_resolved(),
        "queue_len": state.reconciler.queue_len(),
        "counters": state.reconciler.counters(),
        "push_malformed": state.push.malformed_count(),
        "bridge_duplicates_skipped": state.bridge.duplicates_skipped(),
        "poll_overlaps_skipped": state.poll.overlaps_skipped(),
        "sessions": sessions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rollcall_core::config::EngineConfig;

    fn state_with_session() -> DaemonState {
        let mut state = DaemonState::new(EngineConfig::default());
        let now = Utc::now();
        state.reconciler.confirm_membership(["course-1"], now);
        let frame = r#"{"type":"participant_change","sessionCode":"abc-defg-hij","scopeId":"course-1","participants":[{"name":"Dana Cole","participantId":"p-1","isHost":true}]}"#;
        let event = state.push.accept_line(frame, now).expect("parses");
        state.reconciler.apply_event(event, now);
        state
    }

    #[test]
    fn roster_defaults_to_the_only_session() {
        let state = state_with_session();
        let result = build_roster(&state, None);
        assert_eq!(result["session_code"], "abc-defg-hij");
        let entries = result["entries"].as_array().expect("entries array");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["display_name"], "Dana Cole");
    }

    #[test]
    fn roster_unknown_session_is_an_error_value() {
        let state = state_with_session();
        let result = build_roster(&state, Some("zzz"));
        assert!(result.get("error").is_some());
    }

    #[test]
    fn roster_with_no_sessions_is_an_error_value() {
        let state = DaemonState::new(EngineConfig::default());
        let result = build_roster(&state, None);
        assert!(result.get("error").is_some());
    }

    #[test]
    fn status_reports_counters_and_sessions() {
        let state = state_with_session();
        let result = build_status(&state);
        assert_eq!(result["scopes_resolved"], true);
        assert_eq!(result["queue_len"], 0);
        assert_eq!(result["counters"]["accepted"], 1);
        let sessions = result["sessions"].as_array().expect("sessions array");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["participants"], 1);
    }
}
