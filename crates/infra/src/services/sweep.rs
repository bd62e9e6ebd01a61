use serde_json::Value as JsonValue;
use tracing::{info, warn};

use quoteflow_events::{EventBus, EventEnvelope};
use quoteflow_rfq::{ExpireRfq, RfqCommand, RfqStatus};

use super::ProcurementService;
use crate::event_store::EventStore;

/// Outcome of one expiry pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    pub failed: usize,
}

impl<S, B> ProcurementService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Expire every RFQ whose response deadline has passed.
    ///
    /// Candidates come from the RFQ directory; the aggregate makes the final
    /// call, so a stale directory row costs one no-op dispatch. Safe to run
    /// repeatedly and from several workers.
    pub fn expire_due_rfqs(&self) -> SweepReport {
        self.sync_read_models();
        let now = self.now();
        let mut report = SweepReport::default();

        for (tenant_id, rfq_id) in self.directory.due_for_expiry(now) {
            report.examined += 1;
            let command = RfqCommand::ExpireRfq(ExpireRfq {
                tenant_id,
                rfq_id,
                occurred_at: now,
            });
            match self.run_rfq(tenant_id, rfq_id, command) {
                Ok(rfq) if rfq.status() == RfqStatus::Expired => report.expired += 1,
                Ok(_) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(tenant_id = %tenant_id, rfq_id = %rfq_id, error = %err, "rfq expiry failed");
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                expired = report.expired,
                failed = report.failed,
                "rfq expiry sweep finished"
            );
        }
        report
    }
}
