//! Transition rules for negotiations
//!
//! BROUILLON -> EN_ATTENTE -> EN_DISCUSSION, then VALIDEE or REFUSEE. A
//! reviewer may also validate or refuse straight from BROUILLON.

use rust_decimal::Decimal;
use validator::Validate;

use super::model::{DeliverableInput, Negotiation, NegotiationDeliverable, NegotiationStatus};
use crate::error::{ApiError, ApiResult};

use NegotiationStatus::*;

/// States a reviewer can validate or refuse from
pub const REVIEWABLE: [NegotiationStatus; 3] = [Brouillon, EnAttente, EnDiscussion];

/// A converted negotiation never changes again
pub fn ensure_not_converted(negotiation: &Negotiation) -> ApiResult<()> {
    if negotiation.collaboration_id.is_some() {
        return Err(ApiError::state_conflict(
            format!(
                "Negotiation {} was already converted to a collaboration",
                negotiation.reference
            ),
            negotiation.status,
        ));
    }
    Ok(())
}

pub fn ensure_editable(negotiation: &Negotiation) -> ApiResult<()> {
    ensure_not_converted(negotiation)?;
    if negotiation.status.is_terminal() {
        return Err(ApiError::state_conflict(
            "A closed negotiation cannot be edited",
            negotiation.status,
        ));
    }
    Ok(())
}

/// Once submitted, a negotiation keeps at least one deliverable
pub fn ensure_deliverables_kept(
    negotiation: &Negotiation,
    replacement: Option<&[DeliverableInput]>,
) -> ApiResult<()> {
    match replacement {
        Some([]) if negotiation.status != Brouillon => Err(ApiError::validation(
            "deliverables",
            "A submitted negotiation needs at least one deliverable",
        )),
        _ => Ok(()),
    }
}

pub fn ensure_can_submit(negotiation: &Negotiation, deliverable_count: usize) -> ApiResult<()> {
    ensure_not_converted(negotiation)?;
    if negotiation.status != Brouillon {
        return Err(ApiError::state_conflict(
            "Only a draft negotiation can be submitted",
            negotiation.status,
        ));
    }
    if deliverable_count == 0 {
        return Err(ApiError::validation(
            "deliverables",
            "At least one deliverable is required to submit",
        ));
    }
    Ok(())
}

pub fn ensure_can_discuss(negotiation: &Negotiation) -> ApiResult<()> {
    ensure_not_converted(negotiation)?;
    if negotiation.status != EnAttente {
        return Err(ApiError::state_conflict(
            "Only a submitted negotiation can move to discussion",
            negotiation.status,
        ));
    }
    Ok(())
}

pub fn ensure_can_review(negotiation: &Negotiation) -> ApiResult<()> {
    ensure_not_converted(negotiation)?;
    if !REVIEWABLE.contains(&negotiation.status) {
        return Err(ApiError::state_conflict(
            format!("Negotiation {} is already {}", negotiation.reference, negotiation.status),
            negotiation.status,
        ));
    }
    Ok(())
}

pub fn ensure_can_delete(negotiation: &Negotiation) -> ApiResult<()> {
    ensure_not_converted(negotiation)
}

/// Final, then desired, then brand budget, then zero
pub fn gross_amount(negotiation: &Negotiation) -> Decimal {
    negotiation
        .final_budget
        .or(negotiation.desired_budget)
        .or(negotiation.brand_budget)
        .unwrap_or(Decimal::ZERO)
}

/// Final, then desired, then requested price, then zero
pub fn deliverable_unit_price(deliverable: &NegotiationDeliverable) -> Decimal {
    deliverable
        .final_price
        .or(deliverable.desired_price)
        .or(deliverable.requested_price)
        .unwrap_or(Decimal::ZERO)
}

/// Field-level checks on each deliverable, then the amounts
pub fn validate_deliverables(
    budgets: [Option<Decimal>; 3],
    deliverables: &[DeliverableInput],
) -> ApiResult<()> {
    for (index, deliverable) in deliverables.iter().enumerate() {
        if let Err(errors) = deliverable.validate() {
            let message = errors.to_string();
            return Err(ApiError::validation(format!("deliverables[{}]", index), message));
        }
    }
    validate_amounts(budgets, deliverables)
}

/// Amounts that validator attributes cannot express
pub fn validate_amounts(
    budgets: [Option<Decimal>; 3],
    deliverables: &[DeliverableInput],
) -> ApiResult<()> {
    if budgets.iter().flatten().any(|b| *b < Decimal::ZERO) {
        return Err(ApiError::validation("budget", "Budgets cannot be negative"));
    }
    for (index, deliverable) in deliverables.iter().enumerate() {
        let prices = [
            deliverable.requested_price,
            deliverable.desired_price,
            deliverable.final_price,
        ];
        if prices.iter().flatten().any(|p| *p < Decimal::ZERO) {
            return Err(ApiError::validation(
                format!("deliverables[{}]", index),
                "Prices cannot be negative",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DealSource;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn negotiation(status: NegotiationStatus) -> Negotiation {
        Negotiation {
            id: Uuid::new_v4(),
            reference: "NEG-2025-0001".into(),
            talent_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            title: "Summer campaign".into(),
            source: DealSource::Outbound,
            status,
            brand_budget: None,
            desired_budget: None,
            final_budget: None,
            notes: None,
            submitted_at: None,
            reviewed_by: None,
            reviewed_at: None,
            refusal_reason: None,
            collaboration_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn deliverable(
        requested: Option<Decimal>,
        desired: Option<Decimal>,
        final_price: Option<Decimal>,
    ) -> NegotiationDeliverable {
        NegotiationDeliverable {
            id: Uuid::new_v4(),
            negotiation_id: Uuid::new_v4(),
            position: 0,
            kind: "Reel".into(),
            description: None,
            quantity: 1,
            requested_price: requested,
            desired_price: desired,
            final_price,
        }
    }

    #[test]
    fn test_submit_requires_draft_and_deliverables() {
        assert!(ensure_can_submit(&negotiation(Brouillon), 1).is_ok());
        assert!(matches!(
            ensure_can_submit(&negotiation(Brouillon), 0),
            Err(ApiError::ValidationError { .. })
        ));
        assert!(matches!(
            ensure_can_submit(&negotiation(EnAttente), 2),
            Err(ApiError::StateConflict { .. })
        ));
    }

    #[test]
    fn test_submitted_negotiation_cannot_drop_all_deliverables() {
        let post = DeliverableInput {
            kind: "Post".into(),
            description: None,
            quantity: 1,
            requested_price: None,
            desired_price: None,
            final_price: None,
        };

        assert!(ensure_deliverables_kept(&negotiation(Brouillon), Some(&[])).is_ok());
        for status in [EnAttente, EnDiscussion] {
            match ensure_deliverables_kept(&negotiation(status), Some(&[])).unwrap_err() {
                ApiError::ValidationError { field, .. } => assert_eq!(field, "deliverables"),
                other => panic!("unexpected {:?}", other),
            }
            assert!(ensure_deliverables_kept(&negotiation(status), None).is_ok());
            assert!(ensure_deliverables_kept(&negotiation(status), Some(&[post.clone()])).is_ok());
        }
    }

    #[test]
    fn test_review_allowed_from_draft_shortcut() {
        for status in REVIEWABLE {
            assert!(ensure_can_review(&negotiation(status)).is_ok());
        }
        assert!(ensure_can_review(&negotiation(Refusee)).is_err());
        assert!(ensure_can_review(&negotiation(Validee)).is_err());
    }

    #[test]
    fn test_converted_negotiation_is_frozen() {
        let mut n = negotiation(Validee);
        n.collaboration_id = Some(Uuid::new_v4());

        assert!(ensure_can_review(&n).is_err());
        assert!(ensure_editable(&n).is_err());
        assert!(ensure_can_delete(&n).is_err());
        assert!(ensure_can_discuss(&n).is_err());

        match ensure_can_delete(&n).unwrap_err() {
            ApiError::StateConflict { current_state, .. } => assert_eq!(current_state, "VALIDEE"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_refused_negotiation_can_still_be_deleted() {
        assert!(ensure_can_delete(&negotiation(Refusee)).is_ok());
        assert!(ensure_editable(&negotiation(Refusee)).is_err());
    }

    #[test]
    fn test_discussion_only_from_submitted() {
        assert!(ensure_can_discuss(&negotiation(EnAttente)).is_ok());
        assert!(ensure_can_discuss(&negotiation(Brouillon)).is_err());
        assert!(ensure_can_discuss(&negotiation(EnDiscussion)).is_err());
    }

    #[test]
    fn test_gross_amount_fallback_chain() {
        let mut n = negotiation(EnAttente);
        assert_eq!(gross_amount(&n), Decimal::ZERO);
        n.brand_budget = Some(dec!(800));
        assert_eq!(gross_amount(&n), dec!(800));
        n.desired_budget = Some(dec!(900));
        assert_eq!(gross_amount(&n), dec!(900));
        n.final_budget = Some(dec!(1000));
        assert_eq!(gross_amount(&n), dec!(1000));
    }

    #[test]
    fn test_deliverable_price_fallback_chain() {
        assert_eq!(deliverable_unit_price(&deliverable(None, None, None)), Decimal::ZERO);
        assert_eq!(
            deliverable_unit_price(&deliverable(Some(dec!(500)), None, None)),
            dec!(500)
        );
        assert_eq!(
            deliverable_unit_price(&deliverable(Some(dec!(500)), Some(dec!(600)), None)),
            dec!(600)
        );
        assert_eq!(
            deliverable_unit_price(&deliverable(Some(dec!(500)), Some(dec!(600)), Some(dec!(1000)))),
            dec!(1000)
        );
    }

    #[test]
    fn test_deliverable_quantity_must_be_positive() {
        let zero = DeliverableInput {
            kind: "Story".into(),
            description: None,
            quantity: 0,
            requested_price: None,
            desired_price: None,
            final_price: None,
        };
        assert!(matches!(
            validate_deliverables([None, None, None], &[zero]),
            Err(ApiError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        assert!(validate_amounts([Some(dec!(-1)), None, None], &[]).is_err());
        assert!(validate_amounts([Some(dec!(0)), Some(dec!(10)), None], &[]).is_ok());

        let bad = DeliverableInput {
            kind: "Post".into(),
            description: None,
            quantity: 1,
            requested_price: None,
            desired_price: Some(dec!(-5)),
            final_price: None,
        };
        match validate_amounts([None, None, None], &[bad]).unwrap_err() {
            ApiError::ValidationError { field, .. } => assert_eq!(field, "deliverables[0]"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
