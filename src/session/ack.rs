//! What a submit outcome does to the pending slot and the KPI counters.

use super::kpi::SessionKpi;
use super::PendingResult;
use crate::transport::SendOutcome;

/// Pending slot after an outcome, and whether the cycle succeeded.
#[derive(Debug, PartialEq)]
pub struct AckDecision {
    pub pending: Option<PendingResult>,
    pub success: bool,
}

/// Acks and permanent rejects consume the pending result; retryable
/// failures hand it back for another attempt.
pub fn apply_send_outcome(
    outcome: SendOutcome,
    pending: Option<PendingResult>,
    kpi: &mut SessionKpi,
) -> AckDecision {
    match outcome {
        SendOutcome::Acked => {
            kpi.send_ok += 1;
            AckDecision {
                pending: None,
                success: true,
            }
        }
        SendOutcome::FallbackAcked => {
            kpi.send_ok += 1;
            kpi.send_fallback_ok += 1;
            AckDecision {
                pending: None,
                success: true,
            }
        }
        SendOutcome::PermanentRejected => {
            kpi.send_fail += 1;
            kpi.send_permanent_reject += 1;
            AckDecision {
                pending: None,
                success: false,
            }
        }
        SendOutcome::RetryableFailure => {
            kpi.send_fail += 1;
            AckDecision {
                pending,
                success: false,
            }
        }
    }
}
