//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `rollcall status`: daemon health summary.
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let status = rpc_call(socket_path, "status", serde_json::json!({})).await?;
    println!("{}", format_status(&status));
    Ok(())
}

/// `rollcall roster [SESSION]`: reconciled roster table.
pub async fn cmd_roster(socket_path: &str, session: Option<&str>) -> anyhow::Result<()> {
    let params = match session {
        Some(code) => serde_json::json!({ "session_code": code }),
        None => serde_json::json!({}),
    };
    let roster = rpc_call(socket_path, "roster", params).await?;
    if let Some(error) = roster.get("error") {
        anyhow::bail!("{}", error.as_str().unwrap_or("roster unavailable"));
    }
    println!("{}", format_roster(&roster));
    Ok(())
}

/// `rollcall json`: full session state dump.
pub async fn cmd_json(socket_path: &str) -> anyhow::Result<()> {
    let sessions = rpc_call(socket_path, "list_sessions", serde_json::json!({})).await?;
    println!("{}", serde_json::to_string_pretty(&sessions)?);
    Ok(())
}

/// Pure formatting logic, separated for testability.
pub(crate) fn format_status(status: &serde_json::Value) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "scopes resolved: {}  queue: {}  version: {}\n",
        status["scopes_resolved"], status["queue_len"], status["version"],
    ));
    let counters = &status["counters"];
    out.push_str(&format!(
        "accepted: {}  queued: {}  rejected: {}  malformed: {}  queue timeouts: {}\n",
        counters["accepted"],
        counters["queued"],
        counters["rejected_scope"],
        counters["malformed_dropped"],
        counters["queue_timeouts"],
    ));
    if let Some(sessions) = status["sessions"].as_array() {
        for session in sessions {
            out.push_str(&format!(
                "{}: {} participants, host {}\n",
                session["session_code"].as_str().unwrap_or("?"),
                session["participants"],
                session["host_phase"].as_str().unwrap_or("?"),
            ));
        }
    }
    out.trim_end().to_string()
}

pub(crate) fn format_roster(roster: &serde_json::Value) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "session {}  host {}\n",
        roster["session_code"].as_str().unwrap_or("?"),
        roster["host_phase"].as_str().unwrap_or("?"),
    ));
    if let Some(entries) = roster["entries"].as_array() {
        for entry in entries {
            let trust = if entry["source_trusted"] == false {
                " (untrusted)"
            } else {
                ""
            };
            out.push_str(&format!(
                "{:<24} {:<9} {:<8} {}{}\n",
                entry["display_name"].as_str().unwrap_or("?"),
                entry["category"].as_str().unwrap_or("?"),
                entry["status"].as_str().unwrap_or("?"),
                entry["duration_display"].as_str().unwrap_or("?"),
                trust,
            ));
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_status_summary_lines() {
        let status = serde_json::json!({
            "scopes_resolved": true,
            "queue_len": 0,
            "version": 12,
            "counters": {
                "accepted": 40, "queued": 2, "rejected_scope": 1,
                "malformed_dropped": 0, "queue_timeouts": 0,
            },
            "sessions": [
                {"session_code": "abc-defg-hij", "participants": 5, "host_phase": "present"},
            ],
        });
        let out = format_status(&status);
        assert!(out.contains("scopes resolved: true"));
        assert!(out.contains("accepted: 40"));
        assert!(out.contains("abc-defg-hij: 5 participants, host present"));
    }

    #[test]
    fn format_roster_table() {
        let roster = serde_json::json!({
            "session_code": "abc-defg-hij",
            "host_phase": "present",
            "entries": [
                {
                    "display_name": "Dana Cole", "category": "host", "status": "present",
                    "duration_display": "1:02:05", "source_trusted": true,
                },
                {
                    "display_name": "Avery Kim", "category": "guest", "status": "late",
                    "duration_display": "0:48:00", "source_trusted": false,
                },
            ],
        });
        let out = format_roster(&roster);
        assert!(out.contains("session abc-defg-hij  host present"));
        assert!(out.contains("Dana Cole"));
        assert!(out.contains("1:02:05"));
        assert!(out.contains("Avery Kim"));
        assert!(out.contains("(untrusted)"));
    }
}
