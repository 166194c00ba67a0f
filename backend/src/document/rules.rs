//! Transition rules for commercial documents
//!
//! Quotes: BROUILLON -> ENVOYE -> VALIDE | REFUSE, a VALIDE quote converts to
//! a draft invoice. Invoices: BROUILLON -> ENVOYE -> PAYE, or ANNULE once
//! fully credited. Credit notes are issued directly as ENVOYE.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use super::model::{Document, DocumentStatus, DocumentType};
use crate::error::{ApiError, ApiResult};
use crate::pricing::{checked_line_total, is_storable, round2, LineInput, MAX_AMOUNT};
use crate::vat::STANDARD_VAT_RATE;

use DocumentStatus::*;

fn wrong_state(document: &Document, action: &str) -> ApiError {
    ApiError::state_conflict(
        format!("Cannot {} {} while it is {}", action, document.reference, document.status),
        document.status,
    )
}

fn ensure_type(document: &Document, expected: DocumentType, action: &str) -> ApiResult<()> {
    if document.doc_type != expected {
        return Err(ApiError::validation(
            "doc_type",
            format!("Only a {} can {}, {} is a {}", expected, action, document.reference, document.doc_type),
        ));
    }
    Ok(())
}

/// Finalized documents, credit notes and invoices already credited are
/// never edited
pub fn ensure_can_edit(document: &Document, existing_credit_notes: usize) -> ApiResult<()> {
    if document.doc_type == DocumentType::Avoir {
        return Err(ApiError::validation("doc_type", "Credit notes cannot be edited"));
    }
    if matches!(document.status, Valide | Paye | Annule) {
        return Err(wrong_state(document, "edit"));
    }
    if existing_credit_notes > 0 || document.credit_note_ref.is_some() {
        return Err(ApiError::state_conflict(
            format!("{} has a credit note and can no longer be edited", document.reference),
            document.status,
        ));
    }
    Ok(())
}

pub fn ensure_can_send(document: &Document) -> ApiResult<()> {
    if document.doc_type == DocumentType::Avoir {
        return Err(ApiError::validation("doc_type", "Credit notes are issued on creation"));
    }
    if document.status != Brouillon {
        return Err(wrong_state(document, "send"));
    }
    Ok(())
}

pub fn ensure_can_accept(document: &Document) -> ApiResult<()> {
    ensure_type(document, DocumentType::Devis, "be accepted")?;
    if document.status != Envoye {
        return Err(wrong_state(document, "accept"));
    }
    Ok(())
}

pub fn ensure_can_refuse(document: &Document) -> ApiResult<()> {
    ensure_type(document, DocumentType::Devis, "be refused")?;
    if document.status != Envoye {
        return Err(wrong_state(document, "refuse"));
    }
    Ok(())
}

pub fn ensure_can_convert(document: &Document) -> ApiResult<()> {
    ensure_type(document, DocumentType::Devis, "be converted")?;
    if document.status != Valide {
        return Err(wrong_state(document, "convert"));
    }
    Ok(())
}

pub fn ensure_can_mark_paid(document: &Document) -> ApiResult<()> {
    ensure_type(document, DocumentType::Facture, "be paid")?;
    if !matches!(document.status, Brouillon | Envoye) {
        return Err(wrong_state(document, "mark paid"));
    }
    Ok(())
}

pub fn ensure_can_reverse_payment(document: &Document) -> ApiResult<()> {
    ensure_type(document, DocumentType::Facture, "have its payment reversed")?;
    if document.status != Paye {
        return Err(wrong_state(document, "reverse the payment of"));
    }
    Ok(())
}

/// Only an issued, unpaid, live invoice can be credited
pub fn ensure_can_credit(document: &Document) -> ApiResult<()> {
    ensure_type(document, DocumentType::Facture, "be credited")?;
    match document.status {
        Envoye => Ok(()),
        Paye => Err(ApiError::state_conflict(
            format!("{} is paid, reverse the payment before crediting it", document.reference),
            document.status,
        )),
        _ => Err(wrong_state(document, "credit")),
    }
}

/// Full replacement needs an invoice no credit note touched yet
pub fn ensure_can_replace(document: &Document, existing_credit_notes: usize) -> ApiResult<()> {
    ensure_can_credit(document)?;
    if existing_credit_notes > 0 || document.credit_note_ref.is_some() {
        return Err(ApiError::state_conflict(
            format!("{} already has a credit note", document.reference),
            document.status,
        ));
    }
    Ok(())
}

/// Lines of a quote, invoice or purchase order. Quantities and prices must
/// be storable as is, and the totals must fit a money column at any rate.
pub fn validate_lines(lines: &[LineInput]) -> ApiResult<()> {
    if lines.is_empty() {
        return Err(ApiError::validation("lines", "At least one line is required"));
    }
    let mut amount_ht = Decimal::ZERO;
    for (index, line) in lines.iter().enumerate() {
        let field = format!("lines[{}]", index);
        if line.description.trim().is_empty() {
            return Err(ApiError::validation(field, "Description is required"));
        }
        if line.quantity <= Decimal::ZERO {
            return Err(ApiError::validation(field, "Quantity must be positive"));
        }
        if line.unit_price < Decimal::ZERO {
            return Err(ApiError::validation(field, "Unit price cannot be negative"));
        }
        if line.source_line_id.is_some() {
            return Err(ApiError::validation(field, "Only credit note lines reference an invoice line"));
        }
        if !is_storable(line.quantity) || !is_storable(line.unit_price) {
            return Err(ApiError::validation(
                field,
                format!("Quantity and unit price take at most two decimals and {} at most", MAX_AMOUNT),
            ));
        }

        amount_ht = checked_line_total(line.quantity, line.unit_price)
            .and_then(|total| amount_ht.checked_add(total))
            .filter(|sum| *sum <= MAX_AMOUNT)
            .ok_or_else(|| ApiError::validation(field, "Amount is too large"))?;
    }

    let worst_ttc = round2(amount_ht * (Decimal::ONE + STANDARD_VAT_RATE / Decimal::ONE_HUNDRED));
    if worst_ttc > MAX_AMOUNT {
        return Err(ApiError::validation("lines", "Document total is too large"));
    }
    Ok(())
}

/// Payment terms counted from the issue date
pub fn due_date(issue_date: NaiveDate, payment_terms_days: i64) -> NaiveDate {
    issue_date + Duration::days(payment_terms_days.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vat::VatRegime;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn document(doc_type: DocumentType, status: DocumentStatus) -> Document {
        Document {
            id: Uuid::new_v4(),
            reference: "FACTURE-2025-0001".into(),
            doc_type,
            status,
            collaboration_id: None,
            brand_id: Uuid::new_v4(),
            title: "Campaign".into(),
            vat_regime: VatRegime::France,
            vat_rate: dec!(20),
            vat_mention: None,
            amount_ht: dec!(1000),
            amount_tva: dec!(200),
            amount_ttc: dec!(1200),
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
        }
    }

    #[test]
    fn test_edit_blocked_on_final_states() {
        assert!(ensure_can_edit(&document(DocumentType::Facture, Brouillon), 0).is_ok());
        assert!(ensure_can_edit(&document(DocumentType::Facture, Envoye), 0).is_ok());
        for status in [Valide, Paye, Annule] {
            assert!(matches!(
                ensure_can_edit(&document(DocumentType::Devis, status), 0),
                Err(ApiError::StateConflict { .. })
            ));
        }
        assert!(ensure_can_edit(&document(DocumentType::Avoir, Envoye), 0).is_err());
    }

    #[test]
    fn test_credited_invoice_cannot_be_edited() {
        let invoice = document(DocumentType::Facture, Envoye);
        match ensure_can_edit(&invoice, 1).unwrap_err() {
            ApiError::StateConflict { current_state, .. } => assert_eq!(current_state, "ENVOYE"),
            other => panic!("unexpected {:?}", other),
        }

        let mut pointed = document(DocumentType::Facture, Envoye);
        pointed.credit_note_ref = Some("AVOIR-2025-0001".into());
        assert!(matches!(
            ensure_can_edit(&pointed, 0),
            Err(ApiError::StateConflict { .. })
        ));
    }

    #[test]
    fn test_quote_transitions() {
        assert!(ensure_can_accept(&document(DocumentType::Devis, Envoye)).is_ok());
        assert!(ensure_can_accept(&document(DocumentType::Devis, Brouillon)).is_err());
        assert!(ensure_can_refuse(&document(DocumentType::Devis, Envoye)).is_ok());
        assert!(ensure_can_convert(&document(DocumentType::Devis, Valide)).is_ok());
        assert!(ensure_can_convert(&document(DocumentType::Devis, Envoye)).is_err());

        // Invoices are never accepted
        assert!(matches!(
            ensure_can_accept(&document(DocumentType::Facture, Envoye)),
            Err(ApiError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_paid_twice_is_state_conflict() {
        assert!(ensure_can_mark_paid(&document(DocumentType::Facture, Envoye)).is_ok());
        match ensure_can_mark_paid(&document(DocumentType::Facture, Paye)).unwrap_err() {
            ApiError::StateConflict { current_state, .. } => assert_eq!(current_state, "PAYE"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(ensure_can_mark_paid(&document(DocumentType::Facture, Annule)).is_err());
        assert!(ensure_can_mark_paid(&document(DocumentType::Devis, Envoye)).is_err());
    }

    #[test]
    fn test_credit_guards() {
        assert!(ensure_can_credit(&document(DocumentType::Facture, Envoye)).is_ok());
        assert!(ensure_can_credit(&document(DocumentType::Facture, Paye)).is_err());
        assert!(ensure_can_credit(&document(DocumentType::Facture, Brouillon)).is_err());
        assert!(ensure_can_credit(&document(DocumentType::Facture, Annule)).is_err());

        let mut credited = document(DocumentType::Facture, Envoye);
        assert!(ensure_can_replace(&credited, 0).is_ok());
        assert!(ensure_can_replace(&credited, 1).is_err());
        credited.credit_note_ref = Some("AVOIR-2025-0001".into());
        assert!(ensure_can_replace(&credited, 0).is_err());
    }

    #[test]
    fn test_reverse_payment_requires_paid_invoice() {
        assert!(ensure_can_reverse_payment(&document(DocumentType::Facture, Paye)).is_ok());
        assert!(ensure_can_reverse_payment(&document(DocumentType::Facture, Envoye)).is_err());
    }

    #[test]
    fn test_line_validation() {
        assert!(validate_lines(&[]).is_err());
        assert!(validate_lines(&[LineInput::new("Reel", dec!(1), dec!(1000))]).is_ok());
        assert!(validate_lines(&[LineInput::new("Reel", dec!(0), dec!(1000))]).is_err());
        assert!(validate_lines(&[LineInput::new("Reel", dec!(1), dec!(-1))]).is_err());
        assert!(validate_lines(&[LineInput::new(" ", dec!(1), dec!(1))]).is_err());
    }

    #[test]
    fn test_lines_must_be_storable_as_given() {
        // 3 x 0.335 would be stored as 3 x 0.34 and drift on the next recompute
        assert!(matches!(
            validate_lines(&[LineInput::new("Story", dec!(3), dec!(0.335))]),
            Err(ApiError::ValidationError { .. })
        ));
        assert!(validate_lines(&[LineInput::new("Story", dec!(1.005), dec!(10))]).is_err());
        assert!(validate_lines(&[LineInput::new("Story", dec!(3), dec!(0.340))]).is_ok());
    }

    #[test]
    fn test_oversized_amounts_are_validation_errors() {
        let huge = Decimal::from_i128_with_scale(10_i128.pow(22), 0);
        assert!(matches!(
            validate_lines(&[LineInput::new("Reel", huge, huge)]),
            Err(ApiError::ValidationError { .. })
        ));
        assert!(validate_lines(&[LineInput::new("Reel", dec!(100000), dec!(100000000))]).is_err());

        // Each line fits, the sum does not
        let half = LineInput::new("Reel", dec!(1), dec!(6000000000));
        assert!(validate_lines(&[half.clone()]).is_ok());
        assert!(validate_lines(&[half.clone(), half]).is_err());

        // HT fits, TTC at the standard rate does not
        assert!(validate_lines(&[LineInput::new("Reel", dec!(1), dec!(9000000000))]).is_err());
    }

    #[test]
    fn test_due_date_from_terms() {
        let issue = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(due_date(issue, 30), NaiveDate::from_ymd_opt(2025, 2, 14).unwrap());
        assert_eq!(due_date(issue, 0), issue);
    }
}
