use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};

use anthropic_bridge::stream::{convert_stream, StreamConverter};

fn chunk(value: &Value) -> String {
    format!("data: {value}\n\n")
}

async fn run(parts: Vec<Vec<u8>>) -> Vec<(String, Value)> {
    let upstream = futures_util::stream::iter(
        parts
            .into_iter()
            .map(|part| Ok::<_, std::io::Error>(Bytes::from(part))),
    );
    let output: Vec<Bytes> = convert_stream(upstream, StreamConverter::new("msg_test".to_string()))
        .collect()
        .await;
    let text: String = output
        .iter()
        .map(|part| String::from_utf8(part.to_vec()).expect("utf8 output"))
        .collect();

    text.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let mut lines = frame.lines();
            let event = lines
                .next()
                .and_then(|line| line.strip_prefix("event: "))
                .expect("event line")
                .to_string();
            let data = lines
                .next()
                .and_then(|line| line.strip_prefix("data: "))
                .expect("data line");
            (event, serde_json::from_str(data).expect("data json"))
        })
        .collect()
}

fn text_delta(content: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": content}}]})
}

fn finish(reason: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {}, "finish_reason": reason}]})
}

fn names(events: &[(String, Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}

#[tokio::test]
async fn test_inline_thinking_split_across_chunks() {
    let events = run(vec![
        chunk(&text_delta("before <thin")).into_bytes(),
        chunk(&text_delta("king>hid")).into_bytes(),
        chunk(&text_delta("den</thinking> after")).into_bytes(),
        chunk(&finish("stop")).into_bytes(),
    ])
    .await;

    let mut blocks: Vec<(String, String)> = Vec::new();
    for (name, data) in &events {
        match name.as_str() {
            "content_block_start" => {
                blocks.push((
                    data["content_block"]["type"].as_str().unwrap().to_string(),
                    String::new(),
                ));
            }
            "content_block_delta" => {
                let delta = &data["delta"];
                let piece = delta["text"]
                    .as_str()
                    .or_else(|| delta["thinking"].as_str())
                    .unwrap_or_default();
                blocks.last_mut().unwrap().1.push_str(piece);
            }
            _ => {}
        }
    }
    assert_eq!(
        blocks,
        vec![
            ("text".to_string(), "before ".to_string()),
            ("thinking".to_string(), "hidden".to_string()),
            ("text".to_string(), "after".to_string()),
        ]
    );
    assert_eq!(names(&events).last().copied(), Some("message_stop"));
}

#[tokio::test]
async fn test_split_tool_identity_opens_one_block() {
    let events = run(vec![
        chunk(&json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "{\"a\""}}
        ]}}]}))
        .into_bytes(),
        chunk(&json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "id": "call_late", "function": {"name": "late_name", "arguments": ":1}"}}
        ]}}]}))
        .into_bytes(),
        chunk(&finish("tool_calls")).into_bytes(),
    ])
    .await;

    let starts: Vec<&Value> = events
        .iter()
        .filter(|(name, _)| name == "content_block_start")
        .map(|(_, data)| data)
        .collect();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0]["content_block"]["type"], "tool_use");
    assert_eq!(starts[0]["content_block"]["name"], "tool_0");
    assert!(starts[0]["content_block"]["id"]
        .as_str()
        .unwrap()
        .starts_with("toolu_"));

    let message_delta = events
        .iter()
        .find(|(name, _)| name == "message_delta")
        .map(|(_, data)| data)
        .unwrap();
    assert_eq!(message_delta["delta"]["stop_reason"], "tool_use");
}

#[tokio::test]
async fn test_parallel_tool_indices_follow_first_appearance() {
    let events = run(vec![
        chunk(&json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 1, "id": "call_b", "function": {"name": "b", "arguments": ""}},
            {"index": 0, "id": "call_a", "function": {"name": "a", "arguments": ""}}
        ]}}]}))
        .into_bytes(),
        chunk(&json!({"choices": [{"index": 0, "delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": "{}"}},
            {"index": 1, "function": {"arguments": "{}"}}
        ]}}]}))
        .into_bytes(),
        chunk(&finish("tool_calls")).into_bytes(),
    ])
    .await;

    let started: Vec<(u64, String)> = events
        .iter()
        .filter(|(name, _)| name == "content_block_start")
        .map(|(_, data)| {
            (
                data["index"].as_u64().unwrap(),
                data["content_block"]["name"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(started, vec![(0, "b".to_string()), (1, "a".to_string())]);

    let stopped: Vec<u64> = events
        .iter()
        .filter(|(name, _)| name == "content_block_stop")
        .map(|(_, data)| data["index"].as_u64().unwrap())
        .collect();
    assert_eq!(stopped, vec![0, 1]);
}

#[tokio::test]
async fn test_utf8_split_across_reads() {
    let frame = chunk(&text_delta("héllo")).into_bytes();
    let split = frame.iter().position(|byte| *byte >= 0x80).unwrap() + 1;
    let events = run(vec![
        frame[..split].to_vec(),
        frame[split..].to_vec(),
        chunk(&finish("length")).into_bytes(),
    ])
    .await;

    let text: String = events
        .iter()
        .filter(|(name, _)| name == "content_block_delta")
        .filter_map(|(_, data)| data["delta"]["text"].as_str())
        .collect();
    assert_eq!(text, "héllo");
    let message_delta = events
        .iter()
        .find(|(name, _)| name == "message_delta")
        .unwrap();
    assert_eq!(message_delta.1["delta"]["stop_reason"], "max_tokens");
}

#[tokio::test]
async fn test_native_reasoning_then_text() {
    let events = run(vec![
        chunk(&json!({"model": "r1", "choices": [{"index": 0, "delta": {"reasoning_content": "step one"}}]}))
            .into_bytes(),
        chunk(&text_delta("answer")).into_bytes(),
        chunk(&finish("stop")).into_bytes(),
    ])
    .await;

    assert_eq!(
        names(&events),
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
    assert_eq!(events[0].1["message"]["model"], "r1");
    assert_eq!(events[1].1["content_block"]["type"], "thinking");
    assert_eq!(events[2].1["delta"]["thinking"], "step one");
    assert_eq!(events[4].1["content_block"]["type"], "text");
    assert_eq!(events[4].1["index"], 1);
}
