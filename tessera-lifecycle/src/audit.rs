//! Fire-and-forget audit delivery.
//!
//! Lifecycle operations hand audit events to an [`AuditSender`] after their
//! transaction commits. A background worker drains the channel into an
//! [`AuditSink`]. A full channel, a stopped worker, or a failing sink only
//! produces a WARN log; the operation that emitted the event has already
//! succeeded.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tessera_core::{AuditEvent, TesseraResult};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default capacity of the audit channel.
pub const DEFAULT_AUDIT_CHANNEL_CAPACITY: usize = 1024;

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> TesseraResult<()>;
}

/// Writes audit events to the `tessera::audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> TesseraResult<()> {
        info!(
            target: "tessera::audit",
            event_id = %event.event_id,
            action = ?event.action,
            tenant_id = %event.tenant_id,
            process_id = %event.process_id,
            actor = event.actor.as_deref().unwrap_or("-"),
            environment = %event.environment,
            old_version_number = ?event.old_version_number,
            new_version_number = event.new_version_number,
            source_version_number = ?event.source_version_number,
            "Version lifecycle event"
        );
        Ok(())
    }
}

/// Keeps every event in memory. Used by tests and local tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> TesseraResult<()> {
        let mut events = self.events.lock().map_err(|_| {
            tessera_core::StorageError::LockPoisoned
        })?;
        events.push(event.clone());
        Ok(())
    }
}

/// Sending half of the audit channel. Cheap to clone; never blocks.
#[derive(Debug, Clone)]
pub struct AuditSender {
    tx: Option<mpsc::Sender<AuditEvent>>,
}

impl AuditSender {
    /// A sender that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Hand an event to the worker. Never waits and never fails the caller.
    pub fn emit(&self, event: AuditEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("channel full", event),
                mpsc::error::TrySendError::Closed(event) => ("worker stopped", event),
            };
            warn!(
                event_id = %event.event_id,
                tenant_id = %event.tenant_id,
                process_id = %event.process_id,
                reason,
                "Audit event dropped"
            );
        }
    }
}

/// Spawn the worker that drains audit events into `sink`.
///
/// The worker exits once every [`AuditSender`] clone has been dropped.
/// Must be called from within a tokio runtime.
pub fn spawn_audit_worker(
    sink: Arc<dyn AuditSink>,
    capacity: usize,
) -> (AuditSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = sink.record(&event).await {
                warn!(
                    event_id = %event.event_id,
                    tenant_id = %event.tenant_id,
                    error = %e,
                    "Audit sink failed"
                );
            }
        }
        info!("Audit worker stopped");
    });
    (AuditSender { tx: Some(tx) }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tessera_core::{AuditAction, Environment, ProviderError, TesseraError};
    use uuid::Uuid;

    fn event() -> AuditEvent {
        AuditEvent::new(
            AuditAction::VersionPromoted,
            Uuid::now_v7(),
            Uuid::now_v7(),
            Some("user-1".into()),
            Environment::Production,
            Some(1),
            3,
            Some(2),
            Utc::now(),
        )
    }

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _event: &AuditEvent) -> TesseraResult<()> {
            Err(TesseraError::Provider(ProviderError::RequestFailed {
                reason: "sink down".into(),
            }))
        }
    }

    #[tokio::test]
    async fn test_worker_delivers_events() {
        let sink = MemoryAuditSink::new();
        let (sender, handle) = spawn_audit_worker(Arc::new(sink.clone()), 8);
        let e = event();
        sender.emit(e.clone());
        drop(sender);
        handle.await.unwrap();
        assert_eq!(sink.events(), vec![e]);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_stop_worker() {
        let (sender, handle) = spawn_audit_worker(Arc::new(FailingSink), 8);
        sender.emit(event());
        sender.emit(event());
        drop(sender);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_emit_never_blocks_when_full_or_closed() {
        let (tx, rx) = mpsc::channel(1);
        let sender = AuditSender { tx: Some(tx) };
        sender.emit(event());
        sender.emit(event());
        drop(rx);
        sender.emit(event());
        AuditSender::disabled().emit(event());
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_events() {
        assert!(TracingAuditSink.record(&event()).await.is_ok());
    }
}
