//! Lifecycle decisions for collaborations
//!
//! Status only moves forward along
//! NEGO < GAGNE < EN_COURS < PUBLIE < FACTURE_RECUE < PAYE. PERDU leaves the
//! path and is terminal.

use rust_decimal::Decimal;

use super::model::{Collaboration, CollaborationStatus};
use crate::error::{ApiError, ApiResult};

use CollaborationStatus::*;

/// Target of a document-driven move, or `None` when the collaboration is
/// already there, further along, or lost
pub fn advance_target(
    current: CollaborationStatus,
    target: CollaborationStatus,
) -> Option<CollaborationStatus> {
    match (current.rank(), target.rank()) {
        (Some(from), Some(to)) if to > from => Some(target),
        _ => None,
    }
}

/// Explicit lifecycle move requested by a user
pub fn ensure_transition(
    current: CollaborationStatus,
    target: CollaborationStatus,
) -> ApiResult<()> {
    let allowed: &[CollaborationStatus] = match target {
        EnCours => &[Nego, Gagne],
        Publie => &[Gagne, EnCours],
        FactureRecue => &[Gagne, EnCours, Publie, FactureRecue],
        Paye => &[FactureRecue],
        Perdu => &[Nego, Gagne, EnCours, Publie, FactureRecue],
        Nego | Gagne => &[],
    };

    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(ApiError::state_conflict(
            format!("Cannot move a {} collaboration to {}", current, target),
            current,
        ))
    }
}

pub fn ensure_can_validate_talent_invoice(collaboration: &Collaboration) -> ApiResult<()> {
    if collaboration.status.is_terminal() {
        return Err(ApiError::state_conflict(
            "Collaboration is closed",
            collaboration.status,
        ));
    }
    if collaboration.talent_invoice_url.is_none() {
        return Err(ApiError::validation(
            "talent_invoice_url",
            "No talent invoice has been received",
        ));
    }
    Ok(())
}

/// The talent is paid only against a validated invoice
pub fn ensure_can_pay_talent(collaboration: &Collaboration) -> ApiResult<()> {
    ensure_transition(collaboration.status, Paye)?;
    if !collaboration.talent_invoice_validated {
        return Err(ApiError::validation(
            "talent_invoice_validated",
            "The talent invoice must be validated before payment",
        ));
    }
    Ok(())
}

pub fn ensure_amount_editable(collaboration: &Collaboration, gross: Decimal) -> ApiResult<()> {
    if collaboration.status.is_terminal() {
        return Err(ApiError::state_conflict(
            "Amounts of a closed collaboration are frozen",
            collaboration.status,
        ));
    }
    if gross < Decimal::ZERO {
        return Err(ApiError::validation("gross_amount", "Amount cannot be negative"));
    }
    Ok(())
}

pub fn ensure_reason(reason: &str) -> ApiResult<&str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApiError::validation("reason", "A reason is required"));
    }
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_only_moves_forward() {
        assert_eq!(advance_target(Gagne, EnCours), Some(EnCours));
        assert_eq!(advance_target(Nego, Gagne), Some(Gagne));
        assert_eq!(advance_target(EnCours, Gagne), None);
        assert_eq!(advance_target(Gagne, Gagne), None);
        assert_eq!(advance_target(Paye, EnCours), None);
    }

    #[test]
    fn test_lost_is_terminal() {
        assert_eq!(advance_target(Perdu, EnCours), None);
        assert!(ensure_transition(Perdu, EnCours).is_err());
        assert!(ensure_transition(Perdu, Perdu).is_err());
        assert!(ensure_transition(Paye, Perdu).is_err());
    }

    #[test]
    fn test_explicit_transitions() {
        assert!(ensure_transition(Gagne, EnCours).is_ok());
        assert!(ensure_transition(EnCours, Publie).is_ok());
        assert!(ensure_transition(Publie, FactureRecue).is_ok());
        assert!(ensure_transition(FactureRecue, Paye).is_ok());
        assert!(ensure_transition(EnCours, Perdu).is_ok());

        let err = ensure_transition(Publie, EnCours).unwrap_err();
        match err {
            ApiError::StateConflict { current_state, .. } => assert_eq!(current_state, "PUBLIE"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(ensure_transition(EnCours, Paye).is_err());
    }

    #[test]
    fn test_reason_required() {
        assert!(ensure_reason("   ").is_err());
        assert_eq!(ensure_reason("  budget cut ").unwrap(), "budget cut");
    }
}
