//! Pure settlement planning. Maps the provider's reported transaction status
//! onto our payment lifecycle without touching the database, so the rules are
//! testable in isolation and the executor in `reconcile` stays thin.

use nx_schemas::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// Move the payment to this status.
    Apply(PaymentStatus),
    /// Payment is already terminal; duplicate or late notifications are no-ops.
    AlreadySettled(PaymentStatus),
    /// Provider status we do not recognize. Leave the payment untouched and
    /// flag the webhook for review.
    Unrecognized,
}

/// Provider status strings are matched case-insensitively; the set covers
/// both the webhook vocabulary (ACCEPTED, REFUSED) and the check-endpoint
/// vocabulary (SUCCESS, PENDING).
pub fn plan_transition(current: PaymentStatus, provider_status: &str) -> TransitionPlan {
    if current.is_terminal() {
        return TransitionPlan::AlreadySettled(current);
    }

    match provider_status.trim().to_ascii_lowercase().as_str() {
        "accepted" | "success" | "completed" | "paid" => {
            TransitionPlan::Apply(PaymentStatus::Completed)
        }
        "pending" | "processing" | "waiting_for_customer" | "waiting" => {
            TransitionPlan::Apply(PaymentStatus::Processing)
        }
        "refused" | "failed" | "error" => TransitionPlan::Apply(PaymentStatus::Failed),
        "cancelled" | "canceled" | "expired" => TransitionPlan::Apply(PaymentStatus::Cancelled),
        _ => TransitionPlan::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_completes_a_processing_payment() {
        assert_eq!(
            plan_transition(PaymentStatus::Processing, "ACCEPTED"),
            TransitionPlan::Apply(PaymentStatus::Completed)
        );
    }

    #[test]
    fn status_matching_is_case_insensitive() {
        assert_eq!(
            plan_transition(PaymentStatus::Pending, "Success"),
            TransitionPlan::Apply(PaymentStatus::Completed)
        );
        assert_eq!(
            plan_transition(PaymentStatus::Pending, "REFUSED"),
            TransitionPlan::Apply(PaymentStatus::Failed)
        );
    }

    #[test]
    fn pending_keeps_payment_in_flight() {
        assert_eq!(
            plan_transition(PaymentStatus::Pending, "PENDING"),
            TransitionPlan::Apply(PaymentStatus::Processing)
        );
    }

    #[test]
    fn terminal_payment_never_regresses() {
        assert_eq!(
            plan_transition(PaymentStatus::Completed, "REFUSED"),
            TransitionPlan::AlreadySettled(PaymentStatus::Completed)
        );
        assert_eq!(
            plan_transition(PaymentStatus::Refunded, "ACCEPTED"),
            TransitionPlan::AlreadySettled(PaymentStatus::Refunded)
        );
    }

    #[test]
    fn unknown_status_is_flagged_not_applied() {
        assert_eq!(
            plan_transition(PaymentStatus::Pending, "SOMETHING_NEW"),
            TransitionPlan::Unrecognized
        );
    }
}
