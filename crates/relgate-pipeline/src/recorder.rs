//! Run-scoped audit writer

use relgate_core::{
    AuditConfig, AuditReceipt, AuditRecord, AuditSink, GateState, IncidentId, PersistenceFailure,
    RunId, Stage, StageStatus, StageTransition, ToolCall,
};
use std::sync::Arc;

/// Stamps records with the run context and appends them
#[derive(Clone)]
pub struct RunRecorder {
    sink: Arc<dyn AuditSink>,
    run_id: RunId,
    incident_id: IncidentId,
}

impl RunRecorder {
    /// Create recorder for one run
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, run_id: RunId, incident_id: IncidentId) -> Self {
        Self {
            sink,
            run_id,
            incident_id,
        }
    }

    /// Run ID
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Incident ID
    #[inline]
    #[must_use]
    pub fn incident_id(&self) -> &IncidentId {
        &self.incident_id
    }

    /// Append a record
    ///
    /// # Errors
    /// `PersistenceFailure` if the sink did not acknowledge.
    pub async fn record(
        &self,
        record: impl Into<AuditRecord>,
    ) -> Result<AuditReceipt, PersistenceFailure> {
        self.sink.append(record.into()).await
    }

    /// Append a record, retrying with doubling backoff
    ///
    /// # Errors
    /// The last `PersistenceFailure` once retries are exhausted.
    pub async fn record_with_retry(
        &self,
        record: impl Into<AuditRecord>,
        policy: &AuditConfig,
    ) -> Result<AuditReceipt, PersistenceFailure> {
        let record = record.into();
        let mut retry = 0;
        loop {
            match self.sink.append(record.clone()).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) if retry < policy.post_write_retries => {
                    retry += 1;
                    tracing::warn!(
                        incident_id = %self.incident_id,
                        kind = record.kind(),
                        retry,
                        error = %e,
                        "audit append failed, retrying"
                    );
                    tokio::time::sleep(policy.backoff(retry)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Append a stage transition
    ///
    /// # Errors
    /// `PersistenceFailure` if the sink did not acknowledge.
    pub async fn stage(
        &self,
        stage: Stage,
        status: StageStatus,
        state: Option<GateState>,
        details: impl Into<String>,
    ) -> Result<AuditReceipt, PersistenceFailure> {
        let mut transition =
            StageTransition::new(self.run_id, self.incident_id.clone(), stage, status)
                .with_details(details);
        if let Some(state) = state {
            transition = transition.in_state(state);
        }
        self.record(transition).await
    }

    /// Append one `ToolInvocation` per call, in order
    ///
    /// # Errors
    /// The first `PersistenceFailure`; later calls are not written.
    pub async fn tool_calls(
        &self,
        calls: impl IntoIterator<Item = ToolCall>,
    ) -> Result<(), PersistenceFailure> {
        for call in calls {
            self.record(call.into_record(self.run_id, self.incident_id.clone()))
                .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RunRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRecorder")
            .field("run_id", &self.run_id)
            .field("incident_id", &self.incident_id)
            .finish_non_exhaustive()
    }
}
