use relgate_audit::{read_jsonl, verify_chain, AuditLogError, ChainError, JsonlAuditLog};
use relgate_core::{
    AuditSink, Decision, IncidentId, RunId, Stage, StageStatus, StageTransition, WorkflowEvent,
    WorkflowOutcome,
};
use tempfile::tempdir;

fn transition(stage: Stage) -> StageTransition {
    StageTransition::new(RunId::new(), IncidentId::new("INC-5"), stage, StageStatus::Completed)
}

#[tokio::test]
async fn appends_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");

    {
        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.append(transition(Stage::Plan).into()).await.unwrap();
        log.append(transition(Stage::Stress).into()).await.unwrap();
    }

    let log = JsonlAuditLog::open(&path).await.unwrap();
    let receipt = log
        .append(
            WorkflowEvent::new(
                RunId::new(),
                IncidentId::new("INC-5"),
                Decision::BlockAndEscalate,
                WorkflowOutcome::Overridden,
            )
            .by("sre-lead")
            .into(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.seq, 2);

    let entries = read_jsonl(&path).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(verify_chain(&entries).is_ok());
    assert_eq!(entries[2].record.kind(), "workflow");
}

#[tokio::test]
async fn edited_line_fails_verification() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let log = JsonlAuditLog::open(&path).await.unwrap();
    log.append(transition(Stage::Gate).with_details("block_and_escalate").into())
        .await
        .unwrap();
    log.append(transition(Stage::Escalate).into()).await.unwrap();
    drop(log);

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replacen("block_and_escalate", "execute", 1)).unwrap();

    let entries = read_jsonl(&path).await.unwrap();
    assert_eq!(verify_chain(&entries), Err(ChainError::Tampered { seq: 0 }));
    assert!(matches!(
        JsonlAuditLog::open(&path).await,
        Err(AuditLogError::Chain(ChainError::Tampered { seq: 0 }))
    ));
}

#[tokio::test]
async fn garbage_line_reports_line_number() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let log = JsonlAuditLog::open(&path).await.unwrap();
    log.append(transition(Stage::Plan).into()).await.unwrap();
    drop(log);

    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("not json\n");
    std::fs::write(&path, text).unwrap();

    assert!(matches!(
        read_jsonl(&path).await,
        Err(AuditLogError::Parse { line: 2, .. })
    ));
}

#[tokio::test]
async fn torn_final_line_is_dropped_on_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let log = JsonlAuditLog::open(&path).await.unwrap();
    log.append(transition(Stage::Plan).into()).await.unwrap();
    drop(log);

    // half of a second entry, as left by a failed write
    let intact = std::fs::read_to_string(&path).unwrap();
    let fragment = &intact[..intact.len() / 2];
    std::fs::write(&path, format!("{intact}{fragment}")).unwrap();

    let log = JsonlAuditLog::open(&path).await.unwrap();
    let receipt = log.append(transition(Stage::Stress).into()).await.unwrap();
    assert_eq!(receipt.seq, 1);
    drop(log);

    let entries = read_jsonl(&path).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(verify_chain(&entries).is_ok());
}

#[tokio::test]
async fn complete_final_line_without_newline_is_kept() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let log = JsonlAuditLog::open(&path).await.unwrap();
    log.append(transition(Stage::Plan).into()).await.unwrap();
    drop(log);

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.trim_end()).unwrap();

    let log = JsonlAuditLog::open(&path).await.unwrap();
    log.append(transition(Stage::Stress).into()).await.unwrap();
    drop(log);

    let entries = read_jsonl(&path).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(verify_chain(&entries).is_ok());
}
