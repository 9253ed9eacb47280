//! Integration tests for the colloquy-web server.
//!
//! These tests start a real axum server on a random port with stub agents
//! and exercise the REST and SSE endpoints.

use std::sync::Arc;
use std::time::Duration;

use colloquy::agent::{Agent, AgentFuture, FnAgent, ModelProfile, SharedAgent};
use colloquy::config::ConversationConfig;
use colloquy::{Error, Message};
use colloquy_web::{ConversationSession, RosterFactory, WebConfig, spawn_web};
use futures::StreamExt;

fn stub_roster(config: &ConversationConfig) -> Result<Vec<SharedAgent>, Error> {
    let size = config.requested_participants();
    if size == 0 {
        return Err(Error::EmptyRoster);
    }
    Ok((1..=size)
        .map(|i| {
            let name = format!("User {i} (stub)");
            let agent: SharedAgent = Arc::new(FnAgent::new(
                name,
                ModelProfile::for_model("stub"),
                |view| Ok(format!("reply to {} messages", view.len())),
            ));
            agent
        })
        .collect())
}

/// An agent that never answers, so a run stays on its first turn.
struct Silent {
    profile: ModelProfile,
}

impl Agent for Silent {
    fn name(&self) -> &str {
        "User 1 (silent)"
    }

    fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    fn generate<'a>(&'a self, _transcript: &'a [Message]) -> AgentFuture<'a> {
        Box::pin(std::future::pending())
    }
}

fn silent_roster(_: &ConversationConfig) -> Result<Vec<SharedAgent>, Error> {
    let agent: SharedAgent = Arc::new(Silent {
        profile: ModelProfile::for_model("stub"),
    });
    Ok(vec![agent])
}

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server(config: ConversationConfig) -> (Arc<ConversationSession>, String) {
    spawn_test_server_with(config, Arc::new(stub_roster)).await
}

async fn spawn_test_server_with(
    config: ConversationConfig,
    factory: RosterFactory,
) -> (Arc<ConversationSession>, String) {
    let session = Arc::new(ConversationSession::new(config, factory));
    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
        ..Default::default()
    };
    let addr = spawn_web(session.clone(), web_config).await.unwrap();
    (session, format!("http://{addr}"))
}

fn two_agents(turns: usize) -> ConversationConfig {
    ConversationConfig::default()
        .with_prompt("Talk among %d.")
        .with_turns(turns)
        .with_openai_participants(2)
        .with_anthropic_participants(0)
        .with_deepseek_participants(0)
        .with_gemini_participants(0)
        .with_ollama_participants(0)
}

async fn wait_for_state(base: &str, want: &str) -> serde_json::Value {
    for _ in 0..200 {
        let json: serde_json::Value = reqwest::get(format!("{base}/api/state"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if json["state"] == want {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("state never became {want}");
}

/// Read `count` SSE `data:` payloads from a streaming response.
async fn read_events(resp: reqwest::Response, count: usize) -> Vec<serde_json::Value> {
    let mut body = resp.bytes_stream();
    let mut buffer = String::new();
    let mut events = Vec::new();
    let read = async {
        while events.len() < count {
            let chunk = body.next().await.expect("stream ended early").unwrap();
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(end) = buffer.find("\n\n") {
                let block: String = buffer.drain(..end + 2).collect();
                for line in block.lines() {
                    if let Some(data) = line.strip_prefix("data:") {
                        events.push(serde_json::from_str(data.trim()).unwrap());
                    }
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), read)
        .await
        .expect("timed out reading events");
    events
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn get_state_before_start_is_idle() {
    let (_session, base) = spawn_test_server(two_agents(3)).await;

    let resp = reqwest::get(format!("{base}/api/state")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["state"], "idle");
    assert_eq!(json["transcript_len"], 0);
    assert_eq!(json["config"]["turns"], 3);
}

#[tokio::test]
async fn configure_rejects_invalid_json() {
    let (_session, base) = spawn_test_server(two_agents(3)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/configure"))
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn configure_then_start_runs_to_completion() {
    let (_session, base) = spawn_test_server(two_agents(3)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/configure"))
        .json(&serde_json::json!({"turns": 4, "openai_participant_size": 3}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let applied: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(applied["turns"], 4);

    let resp = client.post(format!("{base}/start")).send().await.unwrap();
    assert_eq!(resp.status(), 202);
    let started: serde_json::Value = resp.json().await.unwrap();
    // Defaults fill in the omitted provider counts (one each).
    assert_eq!(started["participants"].as_array().unwrap().len(), 7);

    let state = wait_for_state(&base, "completed").await;
    assert_eq!(state["transcript_len"], 5);
    assert_eq!(state["turns_completed"], 4);
    assert_eq!(state["report"]["outcome"], "completed");
}

#[tokio::test]
async fn start_twice_and_late_configure_conflict() {
    let (_session, base) = spawn_test_server(two_agents(2)).await;
    let client = reqwest::Client::new();

    let resp = client.post(format!("{base}/start")).send().await.unwrap();
    assert_eq!(resp.status(), 202);
    let resp = client.post(format!("{base}/start")).send().await.unwrap();
    assert_eq!(resp.status(), 409);

    let resp = client
        .post(format!("{base}/configure"))
        .json(&serde_json::json!({"turns": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn start_with_empty_roster_is_unavailable() {
    let config = two_agents(2).with_openai_participants(0);
    let (_session, base) = spawn_test_server(config).await;

    let client = reqwest::Client::new();
    let resp = client.post(format!("{base}/start")).send().await.unwrap();
    assert_eq!(resp.status(), 503);

    let state: serde_json::Value = reqwest::get(format!("{base}/api/state"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["state"], "idle");
}

#[tokio::test]
async fn stop_without_run_conflicts() {
    let (_session, base) = spawn_test_server(two_agents(2)).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/api/control"))
        .json(&serde_json::json!({"action": "stop"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn stop_cancels_a_running_conversation() {
    let (session, base) = spawn_test_server_with(two_agents(10), Arc::new(silent_roster)).await;
    let client = reqwest::Client::new();

    let resp = client.post(format!("{base}/start")).send().await.unwrap();
    assert_eq!(resp.status(), 202);
    // The System message is out; the first turn is waiting on the agent.
    for _ in 0..200 {
        if session.hub().len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(wait_for_state(&base, "running").await["transcript_len"], 1);

    let resp = client
        .post(format!("{base}/api/control"))
        .json(&serde_json::json!({"action": "stop"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let state = wait_for_state(&base, "cancelled").await;
    assert_eq!(state["transcript_len"], 1);
    assert_eq!(state["turns_completed"], 0);
    assert_eq!(state["report"]["outcome"], "cancelled");

    // Nothing is running any more.
    let resp = client
        .post(format!("{base}/api/control"))
        .json(&serde_json::json!({"action": "stop"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn control_rejects_malformed_body_as_json() {
    let (_session, base) = spawn_test_server(two_agents(2)).await;
    let client = reqwest::Client::new();

    for body in ["{ not json", r#"{"action": "pause"}"#] {
        let resp = client
            .post(format!("{base}/api/control"))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "body {body}");
        let json: serde_json::Value = resp.json().await.unwrap();
        assert!(json["error"].as_str().unwrap().contains("invalid control request"));
    }
}

// ── Streaming Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn sse_replays_history_after_completion() {
    let (_session, base) = spawn_test_server(two_agents(4)).await;
    let client = reqwest::Client::new();

    client.post(format!("{base}/start")).send().await.unwrap();
    wait_for_state(&base, "completed").await;

    let resp = reqwest::get(format!("{base}/history/stream")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let events = read_events(resp, 5).await;
    let from: Vec<&str> = events.iter().map(|e| e["from"].as_str().unwrap()).collect();
    assert_eq!(
        from,
        vec![
            "System",
            "User 1 (stub)",
            "User 2 (stub)",
            "User 1 (stub)",
            "User 2 (stub)"
        ]
    );
    assert_eq!(events[0]["content"], "Talk among 2.");
}

#[tokio::test]
async fn live_only_stream_follows_a_run_from_the_start() {
    let (session, base) = spawn_test_server(two_agents(2)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/history/stream"))
        .json(&serde_json::json!({"sendPrevMessages": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(session.hub().subscriber_count(), 1);

    client.post(format!("{base}/start")).send().await.unwrap();
    let events = read_events(resp, 3).await;
    assert_eq!(events[0]["from"], "System");
    assert_eq!(events[2]["from"], "User 2 (stub)");
}

#[tokio::test]
async fn post_stream_rejects_malformed_body() {
    let (_session, base) = spawn_test_server(two_agents(2)).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/history/stream"))
        .body("sendPrevMessages=yes")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
