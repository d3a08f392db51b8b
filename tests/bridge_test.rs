//! Skill Bridge Integration Tests
//!
//! Drives a full `SkillServer` over in-memory pipes, with the test playing
//! the host: it writes inbound frames, reads outbound frames, and answers
//! the bridge's reverse calls.

use serde_json::{json, Map, Value};
use skillbridge::notes::notes_skill;
use skillbridge::{
    Config, LifecycleHooks, ServeOutcome, SkillContext, SkillDefinition, SkillServer,
    ToolDefinition, ToolHandler, ToolResult,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

struct FakeHost {
    outbound: Option<DuplexStream>,
    inbound: Lines<BufReader<DuplexStream>>,
    server: JoinHandle<anyhow::Result<ServeOutcome>>,
}

impl FakeHost {
    fn start(skill: SkillDefinition) -> Self {
        Self::start_with(skill, Config::default())
    }

    fn start_with(skill: SkillDefinition, config: Config) -> Self {
        let (host_out, bridge_in) = tokio::io::duplex(256 * 1024);
        let (bridge_out, host_in) = tokio::io::duplex(256 * 1024);
        let server = SkillServer::new(skill, config).expect("valid skill");
        Self {
            outbound: Some(host_out),
            inbound: BufReader::new(host_in).lines(),
            server: tokio::spawn(server.serve(bridge_in, bridge_out)),
        }
    }

    async fn send_raw(&mut self, line: &str) {
        let out = self.outbound.as_mut().expect("host stream open");
        out.write_all(line.as_bytes()).await.unwrap();
        out.write_all(b"\n").await.unwrap();
    }

    async fn send_bytes(&mut self, frame: &[u8]) {
        let out = self.outbound.as_mut().expect("host stream open");
        out.write_all(frame).await.unwrap();
    }

    async fn send(&mut self, frame: Value) {
        self.send_raw(&frame.to_string()).await;
    }

    async fn request(&mut self, id: i64, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
    }

    /// Next frame from the bridge, or `None` once it closed its stream
    async fn next(&mut self) -> Option<Value> {
        let line = tokio::time::timeout(Duration::from_secs(5), self.inbound.next_line())
            .await
            .expect("bridge went quiet")
            .unwrap()?;
        Some(serde_json::from_str(&line).expect("bridge wrote invalid JSON"))
    }

    async fn recv(&mut self) -> Value {
        self.next().await.expect("bridge closed its stream")
    }

    /// Answer a reverse call
    async fn reply(&mut self, id: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result})).await;
    }

    fn close(&mut self) {
        self.outbound.take();
    }

    async fn finish(mut self) -> ServeOutcome {
        self.close();
        self.server.await.unwrap().unwrap()
    }
}

fn text_of(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap_or_default()
}

fn tool<F, Fut>(name: &str, f: F) -> ToolHandler
where
    F: Fn(SkillContext, Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<ToolResult>> + Send + 'static,
{
    ToolHandler::new(ToolDefinition::new(name, &format!("{} tool", name)), f)
}

#[tokio::test]
async fn test_tools_list_is_order_stable() {
    let mut host = FakeHost::start(notes_skill());

    host.request(1, "tools/list", json!({})).await;
    let response = host.recv().await;
    assert_eq!(response["id"], 1);

    let tools = response["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["add_note", "get_note", "list_notes", "find_entities"]);
    assert_eq!(tools[0]["inputSchema"]["type"], "object");
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["body", "title"]));

    assert_eq!(host.finish().await, ServeOutcome::Eof);
}

#[tokio::test]
async fn test_add_note_issues_write_then_state_set() {
    let mut host = FakeHost::start(notes_skill());

    host.request(
        2,
        "tools/call",
        json!({"name": "add_note", "arguments": {"title": "x", "body": "y"}}),
    )
    .await;

    let write = host.recv().await;
    assert_eq!(write["method"], "data/write");
    let filename = write["params"]["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("note_") && filename.ends_with(".json"));
    let stored: Value = serde_json::from_str(write["params"]["content"].as_str().unwrap()).unwrap();
    assert_eq!(stored["title"], "x");
    assert_eq!(stored["body"], "y");
    host.reply(&write["id"], json!({})).await;

    let set = host.recv().await;
    assert_eq!(set["method"], "state/set");
    assert_ne!(set["id"], write["id"]);
    let partial = set["params"]["partial"].as_object().unwrap();
    assert_eq!(partial.len(), 1);
    let (key, title) = partial.iter().next().unwrap();
    assert_eq!(format!("note:{}", stored["id"].as_str().unwrap()), *key);
    assert_eq!(title, "x");
    host.reply(&set["id"], json!({})).await;

    let response = host.recv().await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"]["isError"], false);
    assert!(text_of(&response).starts_with("Note 'x' saved as note_"));

    host.finish().await;
}

#[tokio::test]
async fn test_bad_line_does_not_stop_the_loop() {
    let mut host = FakeHost::start(notes_skill());

    host.send_raw("{this is not json").await;
    host.send_raw("").await;
    host.request(3, "tools/list", json!({})).await;

    let response = host.recv().await;
    assert_eq!(response["id"], 3);
    assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 4);

    host.finish().await;
}

#[tokio::test]
async fn test_shutdown_acks_then_stops() {
    let mut host = FakeHost::start(notes_skill());

    host.request(4, "skill/shutdown", json!({})).await;
    let ack = host.recv().await;
    assert_eq!(ack, json!({"jsonrpc": "2.0", "id": 4, "result": {"ok": true}}));

    // the bridge closes its side without reading anything else
    assert!(host.next().await.is_none());
    assert_eq!(host.server.await.unwrap().unwrap(), ServeOutcome::Shutdown);
}

#[tokio::test]
async fn test_reverse_responses_out_of_order() {
    let skill = SkillDefinition::new("pair", "Reads two files at once").with_tool(tool(
        "read_both",
        |ctx: SkillContext, _args: Map<String, Value>| async move {
            let (a, b) = tokio::join!(ctx.read_data("a.txt"), ctx.read_data("b.txt"));
            Ok(ToolResult::text(format!("{}|{}", a?, b?)))
        },
    ));
    let mut host = FakeHost::start(skill);

    host.request(10, "tools/call", json!({"name": "read_both"})).await;
    let first = host.recv().await;
    let second = host.recv().await;
    assert_eq!(first["method"], "data/read");
    assert_eq!(second["method"], "data/read");

    // answer the later request first
    let mut calls = vec![first, second];
    calls.sort_by_key(|c| std::cmp::Reverse(c["id"].as_u64().unwrap()));
    for call in &calls {
        let content = call["params"]["filename"].as_str().unwrap().to_uppercase();
        host.reply(&call["id"], json!({"content": content})).await;
    }

    let response = host.recv().await;
    assert_eq!(response["id"], 10);
    assert_eq!(text_of(&response), "A.TXT|B.TXT");

    host.finish().await;
}

#[tokio::test]
async fn test_other_requests_proceed_while_handler_waits() {
    let skill = SkillDefinition::new("slow", "Waits on the host").with_tool(tool(
        "state_dump",
        |ctx: SkillContext, _args: Map<String, Value>| async move {
            let state = ctx.get_state().await?;
            Ok(ToolResult::text(state.to_string()))
        },
    ));
    let mut host = FakeHost::start(skill);

    host.request(1, "tools/call", json!({"name": "state_dump"})).await;
    let get = host.recv().await;
    assert_eq!(get["method"], "state/get");

    host.request(2, "ping", json!({})).await;
    let pong = host.recv().await;
    assert_eq!(pong["id"], 2);
    assert_eq!(pong["result"], json!({}));

    host.reply(&get["id"], json!({"state": {"count": 1}})).await;
    let response = host.recv().await;
    assert_eq!(response["id"], 1);
    assert_eq!(text_of(&response), r#"{"count":1}"#);

    host.finish().await;
}

#[tokio::test]
async fn test_shutdown_ignores_frames_after_it() {
    let mut host = FakeHost::start(notes_skill());

    host.send_raw(concat!(
        r#"{"jsonrpc":"2.0","id":4,"method":"skill/shutdown"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#,
    ))
    .await;

    let ack = host.recv().await;
    assert_eq!(ack, json!({"jsonrpc": "2.0", "id": 4, "result": {"ok": true}}));
    assert!(host.next().await.is_none());
    assert_eq!(host.finish().await, ServeOutcome::Shutdown);
}

#[tokio::test]
async fn test_loose_host_error_fails_call_promptly() {
    let skill = SkillDefinition::new("fragile", "Trusts the host").with_tool(tool(
        "state_dump",
        |ctx: SkillContext, _args: Map<String, Value>| async move {
            let state = ctx.get_state().await?;
            Ok(ToolResult::text(state.to_string()))
        },
    ));
    let mut host = FakeHost::start(skill);

    host.request(1, "tools/call", json!({"name": "state_dump"})).await;
    let get = host.recv().await;
    assert_eq!(get["method"], "state/get");

    // no code, default reverse timeout still 30s
    host.send(json!({"jsonrpc": "2.0", "id": get["id"], "error": {"message": "boom"}}))
        .await;
    let response = host.recv().await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["message"], "boom");

    host.finish().await;
}

#[tokio::test]
async fn test_non_utf8_frame_is_dropped() {
    let skill = SkillDefinition::new("echo", "Echoes text").with_tool(tool(
        "echo",
        |_ctx: SkillContext, args: Map<String, Value>| async move {
            let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(ToolResult::text(text))
        },
    ));
    let mut host = FakeHost::start(skill);

    host.send_bytes(
        b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"echo\",\"arguments\":{\"text\":\"a\xffb\"}}}\n",
    )
    .await;
    host.request(2, "ping", json!({})).await;

    // nothing answers the garbled call
    let pong = host.recv().await;
    assert_eq!(pong["id"], 2);

    host.finish().await;
}

#[tokio::test]
async fn test_unknown_tool_and_method() {
    let mut host = FakeHost::start(notes_skill());

    host.request(5, "tools/call", json!({"name": "nope", "arguments": {}})).await;
    let response = host.recv().await;
    assert_eq!(response["id"], 5);
    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["message"], "Unknown tool: nope");

    host.request(6, "skill/frobnicate", json!({})).await;
    let response = host.recv().await;
    assert_eq!(response["error"]["code"], -32601);

    host.request(7, "tools/call", json!({"arguments": {}})).await;
    let response = host.recv().await;
    assert_eq!(response["error"]["code"], -32602);

    host.finish().await;
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let hooks = LifecycleHooks::new().on_tick(|_ctx| async { anyhow::bail!("tick failed") });
    let skill = SkillDefinition::new("quiet", "Fails on tick").with_hooks(hooks);
    let mut host = FakeHost::start(skill);

    host.send(json!({"jsonrpc": "2.0", "method": "skill/tick"})).await;
    host.send(json!({"jsonrpc": "2.0", "method": "no/such/method"})).await;
    host.send(json!({"jsonrpc": "2.0", "method": "skill/activate", "params": {}})).await;
    host.request(8, "ping", json!({})).await;

    let response = host.recv().await;
    assert_eq!(response["id"], 8);

    host.request(9, "skill/tick", json!({})).await;
    let response = host.recv().await;
    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["message"], "tick failed");

    host.finish().await;
}

#[tokio::test]
async fn test_tool_registered_from_handler_is_listed() {
    let skill = SkillDefinition::new("grow", "Adds tools at runtime").with_tool(tool(
        "enable_extra",
        |ctx: SkillContext, _args: Map<String, Value>| async move {
            ctx.tools().register(tool(
                "extra",
                |_ctx: SkillContext, _args: Map<String, Value>| async { Ok(ToolResult::text("extra!")) },
            ));
            Ok(ToolResult::text(ctx.tools().list().join(",")))
        },
    ));
    let mut host = FakeHost::start(skill);

    host.request(1, "tools/call", json!({"name": "enable_extra"})).await;
    let response = host.recv().await;
    assert_eq!(text_of(&response), "enable_extra,extra");

    host.request(2, "tools/list", json!({})).await;
    let response = host.recv().await;
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["enable_extra", "extra"]);

    host.request(3, "tools/call", json!({"name": "extra"})).await;
    assert_eq!(text_of(&host.recv().await), "extra!");

    host.finish().await;
}

#[tokio::test]
async fn test_transform_echoes_decision() {
    let hooks = LifecycleHooks::new()
        .on_before_message(|_ctx, message| async move {
            Ok(match message.as_str() {
                "redact" => Some(String::new()),
                _ => None,
            })
        })
        .on_after_response(|_ctx, response| async move { Ok(Some(response.to_uppercase())) });
    let mut host = FakeHost::start(SkillDefinition::new("shape", "Transforms").with_hooks(hooks));

    host.request(1, "skill/beforeMessage", json!({"message": "hello"})).await;
    assert_eq!(host.recv().await["result"], json!({"message": null}));

    host.request(2, "skill/beforeMessage", json!({"message": "redact"})).await;
    assert_eq!(host.recv().await["result"], json!({"message": ""}));

    host.request(3, "skill/afterResponse", json!({"response": "done"})).await;
    assert_eq!(host.recv().await["result"], json!({"response": "DONE"}));

    host.finish().await;
}

#[tokio::test]
async fn test_reverse_call_timeout() {
    let config = Config {
        reverse_call_timeout: Duration::from_millis(100),
        ..Config::default()
    };
    let skill = SkillDefinition::new("impatient", "Gives up quickly").with_tool(tool(
        "state_dump",
        |ctx: SkillContext, _args: Map<String, Value>| async move {
            let state = ctx.get_state().await?;
            Ok(ToolResult::text(state.to_string()))
        },
    ));
    let mut host = FakeHost::start_with(skill, config);

    host.request(1, "tools/call", json!({"name": "state_dump"})).await;
    let get = host.recv().await;

    let response = host.recv().await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["message"], "Reverse RPC timeout: state/get");

    // a late answer is dropped and the bridge keeps serving
    host.reply(&get["id"], json!({"state": {}})).await;
    host.request(2, "ping", json!({})).await;
    assert_eq!(host.recv().await["id"], 2);

    host.finish().await;
}

#[tokio::test]
async fn test_eof_rejects_pending_reverse_calls() {
    let skill = SkillDefinition::new("stranded", "Waits forever").with_tool(tool(
        "state_dump",
        |ctx: SkillContext, _args: Map<String, Value>| async move {
            let state = ctx.get_state().await?;
            Ok(ToolResult::text(state.to_string()))
        },
    ));
    let mut host = FakeHost::start(skill);

    host.request(1, "tools/call", json!({"name": "state_dump"})).await;
    assert_eq!(host.recv().await["method"], "state/get");
    host.close();

    // the in-flight request is still answered before the bridge stops
    let response = host.recv().await;
    assert_eq!(response["id"], 1);
    assert_eq!(response["error"]["message"], "transport closed");
    assert!(host.next().await.is_none());
    assert_eq!(host.server.await.unwrap().unwrap(), ServeOutcome::Eof);
}

#[tokio::test]
async fn test_notes_setup_wizard() {
    let mut host = FakeHost::start(notes_skill());

    host.request(1, "skill/setupStart", json!({})).await;
    let response = host.recv().await;
    assert_eq!(response["result"]["step"]["id"], "profile");

    host.request(
        2,
        "skill/setupSubmit",
        json!({"stepId": "profile", "values": {"username": "  "}}),
    )
    .await;
    let response = host.recv().await;
    assert_eq!(response["result"]["status"], "error");
    assert_eq!(response["result"]["errors"][0]["field"], "username");

    host.request(
        3,
        "skill/setupSubmit",
        json!({"stepId": "profile", "values": {"username": "Sam", "experience": "advanced"}}),
    )
    .await;
    let write = host.recv().await;
    assert_eq!(write["method"], "data/write");
    assert_eq!(write["params"]["filename"], "config.json");
    host.reply(&write["id"], json!({})).await;
    let set = host.recv().await;
    assert_eq!(set["params"]["partial"]["config"]["username"], "Sam");
    host.reply(&set["id"], json!({})).await;

    let response = host.recv().await;
    assert_eq!(response["id"], 3);
    assert_eq!(response["result"]["status"], "complete");
    assert_eq!(response["result"]["message"], "Welcome, Sam!");

    // advanced users get an extra tool
    host.request(4, "tools/list", json!({})).await;
    let tools = host.recv().await["result"]["tools"].clone();
    assert_eq!(tools.as_array().unwrap().len(), 5);
    assert_eq!(tools[4]["name"], "note_stats");

    host.finish().await;
}

#[tokio::test]
async fn test_notes_first_message_gets_profile_context() {
    let mut host = FakeHost::start(notes_skill());

    host.request(1, "skill/sessionStart", json!({"sessionId": "s1"})).await;
    assert_eq!(host.recv().await["result"], json!({"ok": true}));

    host.request(2, "skill/beforeMessage", json!({"message": "hi", "sessionId": "s1"}))
        .await;
    let get = host.recv().await;
    assert_eq!(get["method"], "state/get");
    host.reply(
        &get["id"],
        json!({"state": {"config": {"username": "Sam", "experience": "beginner"}}}),
    )
    .await;
    let response = host.recv().await;
    let message = response["result"]["message"].as_str().unwrap();
    assert!(message.starts_with("hi\n\n[Context from notes skill: user is 'Sam'"));

    // later messages pass through without touching host state
    host.request(3, "skill/beforeMessage", json!({"message": "again", "sessionId": "s1"}))
        .await;
    assert_eq!(host.recv().await["result"], json!({"message": null}));

    host.finish().await;
}
