use riptide::api::stream::StreamParser;
use riptide::api::{DeltaAssembler, RawEvent};
use riptide::types::{StreamEvent, TokenUsage, ToolCall};

fn assemble(parser: &mut StreamParser, assembler: &mut DeltaAssembler, chunk: &[u8]) -> Vec<StreamEvent> {
    parser
        .process(chunk)
        .expect("parser never fails")
        .into_iter()
        .filter_map(|event| assembler.accept(event))
        .collect()
}

#[test]
fn test_fragmented_frames() {
    let mut parser = StreamParser::new();

    let chunk1 = b"data: {\"choices\":[{\"index\":0,\"delta\":{\"con";
    let events1 = parser.process(chunk1).expect("first chunk parse");
    assert!(events1.is_empty());

    let chunk2 = b"tent\":\"Hi\"}}]}\n\n";
    let events2 = parser.process(chunk2).expect("second chunk parse");
    assert_eq!(events2, vec![RawEvent::Content("Hi".to_string())]);
}

#[test]
fn test_parse_error_is_skipped() {
    let mut parser = StreamParser::new();

    let chunk = b"data: {invalid json}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n";
    let events = parser
        .process(chunk)
        .expect("error handling should not fail parser");
    assert_eq!(events, vec![RawEvent::Content("ok".to_string())]);
}

#[test]
fn test_reasoning_precedes_content_within_one_chunk() {
    let mut parser = StreamParser::new();

    let chunk = br#"data: {"choices":[{"index":0,"delta":{"reasoning_content":"hmm","content":"Hi"}}]}

"#;
    let events = parser.process(chunk).expect("parse");
    assert_eq!(
        events,
        vec![
            RawEvent::Reasoning("hmm".to_string()),
            RawEvent::Content("Hi".to_string()),
        ]
    );
}

#[test]
fn test_done_sentinel_ends_transport() {
    let mut parser = StreamParser::new();
    let events = parser.process(b"data: [DONE]\n\n").expect("parse");
    assert_eq!(events, vec![RawEvent::EndOfTransport]);
}

#[test]
fn test_tool_call_stream_assembles_one_complete_list() {
    let mut parser = StreamParser::new();
    let mut assembler = DeltaAssembler::new();

    let chunk1 = br#"data: {"choices":[{"index":0,"delta":{"content":"Reading file now. "},"finish_reason":null}]}

"#;
    assert_eq!(
        assemble(&mut parser, &mut assembler, chunk1),
        vec![StreamEvent::Content("Reading file now. ".to_string())]
    );

    let chunk2 = br#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_abc","type":"function","function":{"name":"read_file","arguments":"{\"file_pa"}}]},"finish_reason":null}]}

"#;
    assert!(assemble(&mut parser, &mut assembler, chunk2).is_empty());

    let chunk3 = br#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"th\":\"main.rs\"}"}}]},"finish_reason":"tool_calls"}]}

"#;
    assert_eq!(
        assemble(&mut parser, &mut assembler, chunk3),
        vec![StreamEvent::ToolCalls(vec![ToolCall::function(
            "call_abc",
            "read_file",
            r#"{"file_path":"main.rs"}"#,
        )])]
    );

    let chunk4 = b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":40,\"completion_tokens\":9,\"prompt_cache_hit_tokens\":32}}\n\ndata: [DONE]\n\n";
    assert_eq!(
        assemble(&mut parser, &mut assembler, chunk4),
        vec![StreamEvent::Done(Some(TokenUsage {
            input_tokens: 8,
            output_tokens: 9,
            cached_tokens: 32,
        }))]
    );
    assert!(assembler.is_finished());
}
