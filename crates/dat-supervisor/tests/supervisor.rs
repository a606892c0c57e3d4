use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dat_supervisor::{
    JOB_ENDED, JOB_STARTED, JobPool, JobSupervisor, SupervisorConfig, SupervisorError,
};
use dat_telemetry::{MemoryPublisher, TelemetryMessage, TelemetryPublisher};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn connection(id: &str) -> String {
    json!({
        "id": id,
        "name": "test connection",
        "source": { "module_name": "sequence", "name": "Counter" },
        "generator": { "module_name": "transform", "name": "Passthrough" },
        "destination": { "module_name": "file", "name": "JsonLines" },
        "catalog": { "document_streams": [] }
    })
    .to_string()
}

/// Supervisor whose pipeline is `/bin/sh -c <script>`. The connection file
/// path arrives as `$2` (after `--connection` as `$1`).
fn supervisor(script: &str, tmp_dir: &Path) -> (JobSupervisor, Arc<MemoryPublisher>) {
    let memory = Arc::new(MemoryPublisher::new());
    let config = SupervisorConfig {
        program: "/bin/sh".into(),
        args: vec!["-c".to_string(), script.to_string(), "pipeline".to_string()],
        tmp_dir: tmp_dir.to_path_buf(),
    };
    (
        JobSupervisor::new(config, TelemetryPublisher::new(memory.clone())),
        memory,
    )
}

fn log_messages(messages: &[TelemetryMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.dat_message["log"]["message"].as_str().unwrap_or("").to_string())
        .collect()
}

#[tokio::test]
async fn forwards_only_log_messages_between_lifecycle_events() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let script = r#"
echo '{"type":"LOG","log":{"level":"INFO","message":"x"},"hint":"kept"}'
echo '{"type":"RECORD","record":{"stream":{"name":"s"},"data":{"id":1}}}'
echo 'not a message'
"#;
    let (supervisor, memory) = supervisor(script, tmp.path());

    let report = supervisor.run(&connection("conn-1")).await.unwrap();

    let messages = memory.messages();
    assert_eq!(log_messages(&messages), vec![JOB_STARTED, "x", JOB_ENDED]);
    assert!(messages.iter().all(|m| m.connection_id == "conn-1"));
    // forwarded as emitted, unknown fields included
    assert_eq!(messages[1].dat_message["hint"], "kept");

    assert_eq!(report.connection_id, "conn-1");
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(report.forwarded_logs, 1);
    assert_eq!(report.dropped_lines, 1);
    assert!(!report.cancelled);
}

#[tokio::test]
async fn connection_is_handed_over_in_a_temporary_file() {
    let tmp = tempfile::tempdir().unwrap();
    let script = r#"
case "$(basename "$2")" in
  cnctn_src_*) ;;
  *) exit 9 ;;
esac
[ "$1" = "--connection" ] || exit 8
grep -q '"conn-7"' "$2" || exit 7
echo '{"type":"LOG","log":{"level":"INFO","message":"found connection"}}'
"#;
    let (supervisor, memory) = supervisor(script, &tmp.path().join("nested"));

    let report = supervisor.run(&connection("conn-7")).await.unwrap();
    assert_eq!(report.exit_code, Some(0));
    assert_eq!(
        log_messages(&memory.messages()),
        vec![JOB_STARTED, "found connection", JOB_ENDED]
    );
    // the file is gone once the job has ended
    let left: Vec<_> = std::fs::read_dir(tmp.path().join("nested")).unwrap().collect();
    assert!(left.is_empty());
}

#[tokio::test]
async fn ended_is_published_when_spawn_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let memory = Arc::new(MemoryPublisher::new());
    let config = SupervisorConfig {
        program: "/definitely/not/a/program".into(),
        args: Vec::new(),
        tmp_dir: tmp.path().to_path_buf(),
    };
    let supervisor = JobSupervisor::new(config, TelemetryPublisher::new(memory.clone()));

    let result = supervisor.run(&connection("conn-2")).await;
    assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
    assert_eq!(log_messages(&memory.messages()), vec![JOB_STARTED, JOB_ENDED]);
}

#[tokio::test]
async fn nonzero_exit_is_reported_not_raised() {
    let tmp = tempfile::tempdir().unwrap();
    let (supervisor, memory) = supervisor("echo '{\"type\":\"STATE\"}'; exit 3", tmp.path());

    let report = supervisor.run(&connection("conn-3")).await.unwrap();
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(log_messages(&memory.messages()), vec![JOB_STARTED, JOB_ENDED]);
}

#[tokio::test]
async fn invalid_connection_publishes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let (supervisor, memory) = supervisor("true", tmp.path());

    let result = supervisor.run("{\"name\": \"no id\"}").await;
    assert!(matches!(result, Err(SupervisorError::Serialization(_))));
    assert!(memory.published().is_empty());
}

#[tokio::test]
async fn cancellation_kills_the_child_and_still_ends() {
    let tmp = tempfile::tempdir().unwrap();
    let script = concat!(
        r#"echo '{"type":"LOG","log":{"level":"INFO","message":"working"}}'; "#,
        "exec sleep 30"
    );
    let (supervisor, memory) = supervisor(script, tmp.path());

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        canceller.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run_with_cancel(&connection("conn-4"), token),
    )
    .await
    .expect("cancelled job must finish promptly")
    .unwrap();

    assert!(report.cancelled);
    assert_ne!(report.exit_code, Some(0));
    assert_eq!(
        log_messages(&memory.messages()),
        vec![JOB_STARTED, "working", JOB_ENDED]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_runs_each_job_with_its_own_events() {
    let tmp = tempfile::tempdir().unwrap();
    let script = r#"echo '{"type":"LOG","log":{"level":"INFO","message":"step"}}'"#;
    let (supervisor, memory) = supervisor(script, tmp.path());
    let pool = JobPool::with_limit(Arc::new(supervisor), 2);

    let ids = ["a", "b", "c"];
    let results = pool
        .run_all(ids.iter().map(|id| connection(id)).collect())
        .await;

    assert_eq!(results.len(), 3);
    for (id, result) in ids.iter().zip(&results) {
        assert_eq!(&result.as_ref().unwrap().connection_id, id);
    }

    let messages = memory.messages();
    for id in ids {
        let per_job: Vec<TelemetryMessage> = messages
            .iter()
            .filter(|m| m.connection_id == id)
            .cloned()
            .collect();
        assert_eq!(log_messages(&per_job), vec![JOB_STARTED, "step", JOB_ENDED]);
    }
}

#[tokio::test]
async fn shut_down_pool_refuses_jobs() {
    let tmp = tempfile::tempdir().unwrap();
    let (supervisor, memory) = supervisor("true", tmp.path());
    let pool = JobPool::new(Arc::new(supervisor));
    pool.shutdown();

    let results = pool.run_all(vec![connection("late")]).await;
    assert!(matches!(results[0], Err(SupervisorError::PoolClosed)));
    assert!(memory.published().is_empty());
}
