//! Messages -> OTel records -> messages.

use agentry_core::message::{Message, Part, ToolCallPart, ToolReturnPart};
use agentry_core::output::RunOutput;
use agentry_replay::{extract_output, messages_to_otel, otel_to_messages};
use serde_json::json;

fn roundtrip(messages: &[Message]) -> Vec<Message> {
    otel_to_messages(&messages_to_otel(messages)).unwrap()
}

fn call(name: &str, args: serde_json::Value, id: &str) -> Part {
    Part::ToolCall(ToolCallPart::new(name, args, id))
}

fn ret(name: &str, content: serde_json::Value, id: &str) -> Part {
    Part::ToolReturn(ToolReturnPart::new(name, id, content))
}

#[test]
fn simple_text() {
    let original = vec![Message::user("hello"), Message::assistant("hi there")];
    assert_eq!(roundtrip(&original), original);
}

#[test]
fn system_then_user_is_one_request() {
    let original = vec![
        Message::request(vec![Part::system("You are helpful."), Part::user("hello")]),
        Message::assistant("hi"),
    ];
    let result = roundtrip(&original);
    assert_eq!(result.len(), 2);
    assert_eq!(
        result[0].parts(),
        &[Part::system("You are helpful."), Part::user("hello")]
    );
}

#[test]
fn tool_call_and_structured_return() {
    let original = vec![
        Message::user("search for cats"),
        Message::response(vec![call("search", json!({"query": "cats"}), "call_123")])
            .with_finish_reason("tool_call"),
        Message::request(vec![ret("search", json!({"results": ["cat1", "cat2"]}), "call_123")]),
        Message::assistant("I found 2 cats."),
    ];
    assert_eq!(roundtrip(&original), original);
}

#[test]
fn parallel_calls_keep_ids_and_order() {
    let original = vec![
        Message::user("compare weather"),
        Message::response(vec![
            call("weather", json!({"city": "NYC"}), "c1"),
            call("weather", json!({"city": "LA"}), "c2"),
        ])
        .with_finish_reason("tool_call"),
        Message::request(vec![
            ret("weather", json!("sunny"), "c1"),
            ret("weather", json!("rainy"), "c2"),
        ]),
        Message::assistant("NYC is sunny, LA is rainy."),
    ];
    let result = roundtrip(&original);

    let call_ids: Vec<&str> = result[1].tool_calls().iter().map(|c| c.call_id.as_str()).collect();
    let return_ids: Vec<&str> = result[2].tool_returns().iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(call_ids, vec!["c1", "c2"]);
    assert_eq!(return_ids, call_ids);
}

#[test]
fn thinking_survives() {
    let original = vec![
        Message::user("think hard"),
        Message::response(vec![
            Part::thinking("Let me think about this..."),
            Part::text("Here's my answer."),
        ]),
    ];
    assert_eq!(roundtrip(&original), original);
}

#[test]
fn finish_reason_survives() {
    let original = vec![
        Message::user("hi"),
        Message::assistant("bye").with_finish_reason("stop"),
    ];
    assert_eq!(roundtrip(&original)[1].finish_reason(), Some("stop"));
}

#[test]
fn string_arguments_come_back_parsed() {
    let original = vec![
        Message::user("go"),
        Message::response(vec![call("search", json!("{\"query\": \"test\"}"), "c1")]),
    ];
    let result = roundtrip(&original);
    assert_eq!(result[1].tool_calls()[0].arguments, json!({"query": "test"}));
}

#[test]
fn empty_conversation() {
    assert!(messages_to_otel(&[]).is_empty());
    assert!(roundtrip(&[]).is_empty());
}

#[test]
fn multi_turn_conversation() {
    let original = vec![
        Message::request(vec![
            Part::system("You are a search assistant."),
            Part::user("find info about Python"),
        ]),
        Message::response(vec![call("search", json!({"q": "Python"}), "c1")])
            .with_finish_reason("tool_call"),
        Message::request(vec![ret("search", json!("Python is a language"), "c1")]),
        Message::assistant("Based on my search, Python is a programming language.")
            .with_finish_reason("stop"),
        Message::user("tell me more"),
        Message::response(vec![call("search", json!({"q": "Python details"}), "c2")])
            .with_finish_reason("tool_call"),
        Message::request(vec![ret("search", json!("Python was created by Guido"), "c2")]),
        Message::assistant("Python was created by Guido van Rossum.").with_finish_reason("stop"),
    ];
    let result = roundtrip(&original);
    assert_eq!(result, original);

    let texts: Vec<String> = result
        .iter()
        .filter(|m| m.is_response())
        .map(Message::text)
        .filter(|t| !t.is_empty())
        .collect();
    assert_eq!(
        texts,
        vec![
            "Based on my search, Python is a programming language.",
            "Python was created by Guido van Rossum.",
        ]
    );
}

#[test]
fn output_extraction() {
    let text = vec![
        Message::user("hi"),
        Message::response(vec![Part::text("a"), Part::text("b")]),
    ];
    assert_eq!(extract_output(&text).unwrap(), RunOutput::Text("ab".into()));

    let structured = vec![
        Message::user("find cats"),
        Message::response(vec![call("search", json!({"q": "cats"}), "c1")]),
        Message::request(vec![ret("search", json!("found cats"), "c1")]),
        Message::response(vec![call("final_result", json!({"answer": "42"}), "c2")]),
        Message::request(vec![ret("final_result", json!("done"), "c2")]),
    ];
    assert_eq!(
        extract_output(&structured).unwrap(),
        RunOutput::Structured(json!({"answer": "42"}))
    );

    // An empty text part still counts as a text answer
    let empty_text_and_call = vec![
        Message::user("q"),
        Message::response(vec![
            Part::text(""),
            call("final_result", json!({"answer": "42"}), "c1"),
        ]),
    ];
    assert_eq!(
        extract_output(&empty_text_and_call).unwrap(),
        RunOutput::Text(String::new())
    );
    assert_eq!(
        extract_output(&roundtrip(&empty_text_and_call)).unwrap(),
        RunOutput::Text(String::new())
    );

    assert_eq!(extract_output(&[]).unwrap(), RunOutput::Text(String::new()));
}
