use std::fs;
use std::sync::{Arc, Mutex};

use dat_connectors::builtin_registry;
use dat_protocol::{Catalog, CombinedState, DocumentStream, Level, Message};
use pipeline_common::{
    ChannelPipeline, GenerateStage, Pipeline, PipelineError, ReadPump, ResolveError, WriteStage,
};
use serde_json::json;

fn config(module_name: &str, name: &str, options: serde_json::Value) -> String {
    json!({
        "module_name": module_name,
        "name": name,
        "connection_specification": options,
    })
    .to_string()
}

#[test]
fn read_generate_write_through_files() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(
        input.path().join("users.jsonl"),
        "{\"id\":1,\"secret\":\"a\"}\n{\"id\":2,\"secret\":\"b\"}\n{\"id\":3,\"secret\":\"c\"}\n",
    )
    .unwrap();

    let registry = builtin_registry();
    let source = registry
        .source(&config("file", "JsonLines", json!({ "dir": input.path() })))
        .unwrap();
    let catalog = source.discover().unwrap();
    let generator = registry
        .generator(&config("transform", "SelectFields", json!({ "fields": ["id"] })))
        .unwrap();
    let destination = registry
        .destination(&config("file", "JsonLines", json!({ "dir": output.path() })))
        .unwrap();

    let lines = ReadPump::new(source, catalog.clone(), CombinedState::new()).map(Ok);
    let pipeline = Pipeline::new()
        .add_processor(GenerateStage::new(generator))
        .add_processor(WriteStage::with_batch_size(destination, catalog, 2));

    let mut out = Vec::new();
    let mut sink = |line: String| {
        out.push(line);
        Ok::<(), PipelineError>(())
    };
    pipeline.process(lines, &mut sink).unwrap();

    let written = fs::read_to_string(output.path().join("users.jsonl")).unwrap();
    assert_eq!(written, "{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n");

    // STATE passes through generate and write, acks come from both flushes
    let messages: Vec<Message> = out.iter().map(|l| Message::from_line(l).unwrap()).collect();
    let kinds: Vec<_> = messages.iter().map(|m| m.message_type().as_str()).collect();
    assert_eq!(kinds, vec!["LOG", "STATE", "LOG"]);
}

#[test]
fn source_failure_ends_read_with_one_error_line() {
    let registry = builtin_registry();
    let source = registry
        .source(&config("sequence", "Counter", json!({ "count": 10, "fail_after": 4 })))
        .unwrap();
    let lines: Vec<String> =
        ReadPump::new(source, Catalog::default(), CombinedState::new()).collect();

    assert_eq!(lines.len(), 5);
    let last = Message::from_line(&lines[4]).unwrap();
    let log = last.as_log().unwrap();
    assert_eq!(log.level, Level::Error);
    assert_eq!(log.message, "Source error: counter stopped after 4 records");
}

#[test]
fn plugin_specific_fields_are_validated_at_resolution() {
    let registry = builtin_registry();
    let result = registry.generator(&config("transform", "SelectFields", json!({})));
    assert!(matches!(
        result,
        Err(ResolveError::InvalidPluginSpecification { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn in_process_stages_over_channels() {
    let output = tempfile::tempdir().unwrap();
    let registry = builtin_registry();
    let catalog = Catalog {
        document_streams: vec![DocumentStream::new("numbers")],
    };
    let source = registry
        .source(&config("sequence", "Counter", json!({ "count": 1000 })))
        .unwrap();
    let generator = registry
        .generator(&json!({"module_name": "transform", "name": "Passthrough"}).to_string())
        .unwrap();
    let destination = registry
        .destination(&config("file", "JsonLines", json!({ "dir": output.path() })))
        .unwrap();

    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    let delivered = ChannelPipeline::new()
        .with_channel_size(4)
        .add_processor(GenerateStage::new(generator))
        .add_processor(WriteStage::new(destination, catalog.clone()))
        .run(
            ReadPump::new(source, catalog, CombinedState::new()),
            move |line| {
                sink.lock().unwrap().push(line);
                Ok(())
            },
        )
        .await
        .unwrap();

    // 999 records, then the final flush of 1
    assert_eq!(delivered, 2);
    let acks: Vec<String> = collected
        .lock()
        .unwrap()
        .iter()
        .map(|l| Message::from_line(l).unwrap().as_log().unwrap().message.clone())
        .collect();
    assert_eq!(acks, vec!["wrote 999 records to numbers", "wrote 1 records to numbers"]);
    let written = fs::read_to_string(output.path().join("numbers.jsonl")).unwrap();
    assert_eq!(written.lines().count(), 1000);
}
