//! Credit note planning
//!
//! Pure computations: which lines a credit note carries, its totals, and
//! whether it exhausts the invoice. Credit note lines keep positive
//! quantities and negated unit prices, so every amount is negative.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use uuid::Uuid;

use super::model::{CreditLineRequest, Document, DocumentLine};
use crate::error::{ApiError, ApiResult};
use crate::pricing::{compute_document, is_storable, ComputedDocument, LineInput};

#[derive(Debug, Clone, PartialEq)]
pub struct CreditPlan {
    pub computed: ComputedDocument,
    /// The credit note brings the invoice's remaining amount to zero
    pub cancels_invoice: bool,
}

/// TTC still open on an invoice after the credit notes already issued
/// (whose totals are negative)
pub fn remaining_amount(invoice: &Document, credited_ttc: &[Decimal]) -> Decimal {
    invoice.amount_ttc + credited_ttc.iter().copied().sum::<Decimal>()
}

/// Credit the requested quantities of specific invoice lines.
///
/// `already_credited` maps an invoice line to the quantity earlier credit
/// notes took from it; `remaining` is the invoice's open TTC.
pub fn plan_partial_credit(
    invoice: &Document,
    invoice_lines: &[DocumentLine],
    already_credited: &HashMap<Uuid, Decimal>,
    remaining: Decimal,
    requested: &[CreditLineRequest],
) -> ApiResult<CreditPlan> {
    if requested.is_empty() {
        return Err(ApiError::validation("lines", "At least one line must be credited"));
    }
    if remaining <= Decimal::ZERO {
        return Err(ApiError::state_conflict(
            format!("{} has nothing left to credit", invoice.reference),
            invoice.status,
        ));
    }

    let by_id: HashMap<Uuid, &DocumentLine> = invoice_lines.iter().map(|l| (l.id, l)).collect();
    let mut seen = HashSet::new();
    let mut inputs = Vec::with_capacity(requested.len());

    for (index, request) in requested.iter().enumerate() {
        let field = format!("lines[{}]", index);
        let line = by_id.get(&request.line_id).ok_or_else(|| {
            ApiError::validation(field.clone(), format!("Line {} is not on {}", request.line_id, invoice.reference))
        })?;
        if !seen.insert(request.line_id) {
            return Err(ApiError::validation(field, "Each line can be credited once per credit note"));
        }
        if request.quantity <= Decimal::ZERO {
            return Err(ApiError::validation(field, "Quantity must be positive"));
        }
        if !is_storable(request.quantity) {
            return Err(ApiError::validation(field, "Quantity takes at most two decimals"));
        }

        let credited = already_credited.get(&line.id).copied().unwrap_or(Decimal::ZERO);
        let available = line.quantity - credited;
        if request.quantity > available {
            return Err(ApiError::validation(
                field,
                format!("Only {} of '{}' is left to credit", available, line.description),
            ));
        }

        inputs.push(LineInput {
            description: line.description.clone(),
            quantity: request.quantity,
            unit_price: -line.unit_price,
            source_line_id: Some(line.id),
        });
    }

    let computed = compute_document(&inputs, invoice.vat_rate);
    let credited_ttc = -computed.totals.amount_ttc;

    // Taking every remaining quantity closes the invoice even when per-line
    // rounding leaves a cent either way
    let exhausts_lines = invoice_lines.iter().all(|line| {
        let before = already_credited.get(&line.id).copied().unwrap_or(Decimal::ZERO);
        let now = inputs
            .iter()
            .filter(|i| i.source_line_id == Some(line.id))
            .map(|i| i.quantity)
            .sum::<Decimal>();
        before + now >= line.quantity
    });

    if credited_ttc > remaining && !exhausts_lines {
        return Err(ApiError::validation(
            "lines",
            format!(
                "Credit of {} exceeds the {} left on {}",
                credited_ttc, remaining, invoice.reference
            ),
        ));
    }

    Ok(CreditPlan {
        cancels_invoice: exhausts_lines || credited_ttc >= remaining,
        computed,
    })
}

/// Invert every line of the invoice
pub fn plan_full_credit(invoice: &Document, invoice_lines: &[DocumentLine]) -> CreditPlan {
    let inputs: Vec<LineInput> = invoice_lines
        .iter()
        .map(|line| LineInput {
            description: line.description.clone(),
            quantity: line.quantity,
            unit_price: -line.unit_price,
            source_line_id: Some(line.id),
        })
        .collect();

    CreditPlan {
        computed: compute_document(&inputs, invoice.vat_rate),
        cancels_invoice: true,
    }
}

/// Lines of the draft that replaces a cancelled invoice
pub fn replacement_lines(invoice_lines: &[DocumentLine]) -> Vec<LineInput> {
    invoice_lines
        .iter()
        .map(|line| LineInput::new(line.description.clone(), line.quantity, line.unit_price))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentStatus, DocumentType};
    use crate::vat::VatRegime;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn invoice_with(lines: &[(Decimal, Decimal)]) -> (Document, Vec<DocumentLine>) {
        let id = Uuid::new_v4();
        let computed = compute_document(
            &lines
                .iter()
                .map(|(q, p)| LineInput::new("Item", *q, *p))
                .collect::<Vec<_>>(),
            dec!(20),
        );
        let document = Document {
            id,
            reference: "FACTURE-2025-0001".into(),
            doc_type: DocumentType::Facture,
            status: DocumentStatus::Envoye,
            collaboration_id: None,
            brand_id: Uuid::new_v4(),
            title: "Campaign".into(),
            vat_regime: VatRegime::France,
            vat_rate: dec!(20),
            vat_mention: None,
            amount_ht: computed.totals.amount_ht,
            amount_tva: computed.totals.amount_tva,
            amount_ttc: computed.totals.amount_ttc,
            issue_date: None,
            due_date: None,
            validated_at: None,
            payment_date: None,
            payment_reference: None,
            payment_method: None,
            invoice_ref: None,
            credited_document_id: None,
            credit_note_ref: None,
            notes: None,
            pdf_url: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let lines = computed
            .lines
            .into_iter()
            .map(|l| DocumentLine {
                id: Uuid::new_v4(),
                document_id: id,
                position: l.position,
                description: l.description,
                quantity: l.quantity,
                unit_price: l.unit_price,
                vat_rate: l.vat_rate,
                total_ht: l.total_ht,
                source_line_id: None,
            })
            .collect();
        (document, lines)
    }

    #[test]
    fn test_full_credit_mirrors_invoice() {
        let (invoice, lines) = invoice_with(&[(dec!(1), dec!(1000))]);
        let plan = plan_full_credit(&invoice, &lines);
        assert_eq!(plan.computed.totals.amount_ttc, dec!(-1200));
        assert_eq!(plan.computed.totals.amount_ht, -invoice.amount_ht);
        assert!(plan.cancels_invoice);
        assert!(plan.computed.lines.iter().all(|l| l.source_line_id.is_some()));
    }

    #[test]
    fn test_partial_credit_keeps_invoice_open() {
        let (invoice, lines) = invoice_with(&[(dec!(2), dec!(500)), (dec!(1), dec!(300))]);
        let plan = plan_partial_credit(
            &invoice,
            &lines,
            &HashMap::new(),
            invoice.amount_ttc,
            &[CreditLineRequest {
                line_id: lines[0].id,
                quantity: dec!(1),
            }],
        )
        .unwrap();

        assert_eq!(plan.computed.totals.amount_ht, dec!(-500));
        assert_eq!(plan.computed.totals.amount_ttc, dec!(-600));
        assert!(!plan.cancels_invoice);
    }

    #[test]
    fn test_last_partial_credit_cancels() {
        let (invoice, lines) = invoice_with(&[(dec!(2), dec!(500))]);
        let credited: HashMap<Uuid, Decimal> = [(lines[0].id, dec!(1))].into_iter().collect();
        let remaining = remaining_amount(&invoice, &[dec!(-600)]);
        assert_eq!(remaining, dec!(600));

        let plan = plan_partial_credit(
            &invoice,
            &lines,
            &credited,
            remaining,
            &[CreditLineRequest {
                line_id: lines[0].id,
                quantity: dec!(1),
            }],
        )
        .unwrap();
        assert!(plan.cancels_invoice);
    }

    #[test]
    fn test_credit_beyond_remaining_quantity_fails() {
        let (invoice, lines) = invoice_with(&[(dec!(2), dec!(500))]);
        let credited: HashMap<Uuid, Decimal> = [(lines[0].id, dec!(1.5))].into_iter().collect();
        let err = plan_partial_credit(
            &invoice,
            &lines,
            &credited,
            dec!(600),
            &[CreditLineRequest {
                line_id: lines[0].id,
                quantity: dec!(1),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError { .. }));
    }

    #[test]
    fn test_credit_beyond_remaining_amount_fails() {
        let (invoice, lines) = invoice_with(&[(dec!(1), dec!(500)), (dec!(1), dec!(500))]);
        // Something already took most of the amount without touching line 0
        let err = plan_partial_credit(
            &invoice,
            &lines,
            &HashMap::new(),
            dec!(100),
            &[CreditLineRequest {
                line_id: lines[0].id,
                quantity: dec!(1),
            }],
        )
        .unwrap_err();
        match err {
            ApiError::ValidationError { field, .. } => assert_eq!(field, "lines"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_or_duplicate_lines_rejected() {
        let (invoice, lines) = invoice_with(&[(dec!(1), dec!(100))]);
        let unknown = CreditLineRequest {
            line_id: Uuid::new_v4(),
            quantity: dec!(1),
        };
        assert!(plan_partial_credit(&invoice, &lines, &HashMap::new(), dec!(120), &[unknown]).is_err());

        let twice = CreditLineRequest {
            line_id: lines[0].id,
            quantity: dec!(0.5),
        };
        assert!(
            plan_partial_credit(&invoice, &lines, &HashMap::new(), dec!(120), &[twice, twice]).is_err()
        );
        assert!(plan_partial_credit(&invoice, &lines, &HashMap::new(), dec!(120), &[]).is_err());
    }

    #[test]
    fn test_credit_quantity_with_three_decimals_rejected() {
        let (invoice, lines) = invoice_with(&[(dec!(2), dec!(500))]);
        let err = plan_partial_credit(
            &invoice,
            &lines,
            &HashMap::new(),
            invoice.amount_ttc,
            &[CreditLineRequest {
                line_id: lines[0].id,
                quantity: dec!(0.333),
            }],
        )
        .unwrap_err();
        match err {
            ApiError::ValidationError { field, .. } => assert_eq!(field, "lines[0]"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_replacement_copies_amounts() {
        let (invoice, lines) = invoice_with(&[(dec!(3), dec!(333.33))]);
        let copy = compute_document(&replacement_lines(&lines), invoice.vat_rate);
        assert_eq!(copy.totals, invoice.totals());
        assert!(copy.lines.iter().all(|l| l.source_line_id.is_none()));
    }
}
