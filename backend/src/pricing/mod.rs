//! Money arithmetic shared by every write path
//!
//! Commission, line totals and document totals are all computed here so that
//! generation, update, conversion and credit notes round the same way.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DealSource;
use crate::talent::Talent;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Largest value a `NUMERIC(12,2)` money column holds: 9 999 999 999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// Money and quantities are stored with two decimals
pub const MONEY_SCALE: u32 = 2;

/// Fits a money column without being rounded by the database
pub fn is_storable(value: Decimal) -> bool {
    value.normalize().scale() <= MONEY_SCALE && value.abs() <= MAX_AMOUNT
}

/// Half away from zero at two decimals, symmetric for negative amounts
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommissionBreakdown {
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub net_amount: Decimal,
}

/// Commission at the talent's rate for the deal's source
pub fn compute_commission(gross: Decimal, source: DealSource, talent: &Talent) -> CommissionBreakdown {
    let rate = match source {
        DealSource::Inbound => talent.commission_inbound,
        DealSource::Outbound => talent.commission_outbound,
    };
    commission_for_rate(gross, rate)
}

pub fn commission_for_rate(gross: Decimal, rate: Decimal) -> CommissionBreakdown {
    let commission_amount = round2(gross * rate / HUNDRED);
    CommissionBreakdown {
        commission_rate: rate,
        commission_amount,
        net_amount: gross - commission_amount,
    }
}

/// A line as supplied by a caller, before any totals exist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Invoice line this one credits, credit notes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_line_id: Option<Uuid>,
}

impl LineInput {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            source_line_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedLine {
    pub position: i32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub total_ht: Decimal,
    pub source_line_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentTotals {
    pub amount_ht: Decimal,
    pub amount_tva: Decimal,
    pub amount_ttc: Decimal,
}

impl DocumentTotals {
    pub const ZERO: DocumentTotals = DocumentTotals {
        amount_ht: Decimal::ZERO,
        amount_tva: Decimal::ZERO,
        amount_ttc: Decimal::ZERO,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedDocument {
    pub lines: Vec<ComputedLine>,
    pub totals: DocumentTotals,
}

pub fn line_total(quantity: Decimal, unit_price: Decimal) -> Decimal {
    round2(quantity * unit_price)
}

/// Line total, or `None` when it overflows or cannot be stored
pub fn checked_line_total(quantity: Decimal, unit_price: Decimal) -> Option<Decimal> {
    quantity
        .checked_mul(unit_price)
        .map(round2)
        .filter(|total| total.abs() <= MAX_AMOUNT)
}

/// TTC from HT at `vat_rate` percent; TVA is whatever makes HT + TVA = TTC
pub fn totals_for(amount_ht: Decimal, vat_rate: Decimal) -> DocumentTotals {
    let amount_ttc = round2(amount_ht * (Decimal::ONE + vat_rate / HUNDRED));
    DocumentTotals {
        amount_ht,
        amount_tva: amount_ttc - amount_ht,
        amount_ttc,
    }
}

/// Recompute every line and the aggregates from scratch.
///
/// HT is the sum of the already rounded line totals, never a rounding of the
/// unrounded sum.
pub fn compute_document(lines: &[LineInput], vat_rate: Decimal) -> ComputedDocument {
    let lines: Vec<ComputedLine> = lines
        .iter()
        .enumerate()
        .map(|(index, line)| ComputedLine {
            position: index as i32,
            description: line.description.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            vat_rate,
            total_ht: line_total(line.quantity, line.unit_price),
            source_line_id: line.source_line_id,
        })
        .collect();

    let amount_ht = lines.iter().map(|l| l.total_ht).sum();

    ComputedDocument {
        totals: totals_for(amount_ht, vat_rate),
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn talent(inbound: Decimal, outbound: Decimal) -> Talent {
        Talent {
            id: Uuid::new_v4(),
            first_name: "Léa".into(),
            last_name: "Martin".into(),
            email: None,
            commission_inbound: inbound,
            commission_outbound: outbound,
            manager_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(1.004)), dec!(1.00));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
    }

    #[test]
    fn test_commission_uses_source_rate() {
        let t = talent(dec!(20), dec!(30));

        let outbound = compute_commission(dec!(1000), DealSource::Outbound, &t);
        assert_eq!(outbound.commission_rate, dec!(30));
        assert_eq!(outbound.commission_amount, dec!(300.00));
        assert_eq!(outbound.net_amount, dec!(700.00));

        let inbound = compute_commission(dec!(1000), DealSource::Inbound, &t);
        assert_eq!(inbound.commission_amount, dec!(200.00));
        assert_eq!(inbound.net_amount, dec!(800.00));
    }

    #[test]
    fn test_commission_rounds_once() {
        let c = commission_for_rate(dec!(333.33), dec!(15));
        // 49.9995 -> 50.00
        assert_eq!(c.commission_amount, dec!(50.00));
        assert_eq!(c.net_amount, dec!(283.33));
        assert_eq!(c.net_amount + c.commission_amount, dec!(333.33));
    }

    #[test]
    fn test_zero_gross() {
        let c = commission_for_rate(Decimal::ZERO, dec!(25));
        assert_eq!(c.commission_amount, Decimal::ZERO);
        assert_eq!(c.net_amount, Decimal::ZERO);
    }

    #[test]
    fn test_document_french_vat() {
        let doc = compute_document(&[LineInput::new("Reel Instagram", dec!(1), dec!(1000))], dec!(20));
        assert_eq!(doc.lines[0].total_ht, dec!(1000));
        assert_eq!(doc.totals.amount_ht, dec!(1000));
        assert_eq!(doc.totals.amount_tva, dec!(200.00));
        assert_eq!(doc.totals.amount_ttc, dec!(1200.00));
    }

    #[test]
    fn test_ht_is_sum_of_rounded_lines() {
        // 3 x 0.335 = 1.005 -> 1.01 per line, twice
        let lines = vec![
            LineInput::new("Story", dec!(3), dec!(0.335)),
            LineInput::new("Story", dec!(3), dec!(0.335)),
        ];
        let doc = compute_document(&lines, dec!(20));
        assert_eq!(doc.totals.amount_ht, dec!(2.02));
        assert_eq!(doc.totals.amount_ttc, dec!(2.42));
        assert_eq!(doc.totals.amount_ht + doc.totals.amount_tva, doc.totals.amount_ttc);
    }

    #[test]
    fn test_negated_lines_mirror_exactly() {
        let lines = vec![
            LineInput::new("Post", dec!(2), dec!(333.335)),
            LineInput::new("Video", dec!(1), dec!(1234.565)),
        ];
        let negated: Vec<LineInput> = lines
            .iter()
            .map(|l| LineInput::new(l.description.clone(), l.quantity, -l.unit_price))
            .collect();

        let original = compute_document(&lines, dec!(20));
        let credit = compute_document(&negated, dec!(20));
        assert_eq!(credit.totals.amount_ht, -original.totals.amount_ht);
        assert_eq!(credit.totals.amount_tva, -original.totals.amount_tva);
        assert_eq!(credit.totals.amount_ttc, -original.totals.amount_ttc);
    }

    #[test]
    fn test_positions_follow_input_order() {
        let doc = compute_document(
            &[
                LineInput::new("a", dec!(1), dec!(1)),
                LineInput::new("b", dec!(1), dec!(1)),
            ],
            Decimal::ZERO,
        );
        assert_eq!(doc.lines[0].position, 0);
        assert_eq!(doc.lines[1].description, "b");
        assert_eq!(doc.totals.amount_tva, Decimal::ZERO);
    }

    #[test]
    fn test_empty_document_is_zero() {
        assert_eq!(compute_document(&[], dec!(20)).totals, DocumentTotals::ZERO);
    }

    #[test]
    fn test_max_amount_matches_money_columns() {
        assert_eq!(MAX_AMOUNT, dec!(9999999999.99));
        assert!(is_storable(MAX_AMOUNT));
        assert!(!is_storable(MAX_AMOUNT + dec!(0.01)));
        assert!(is_storable(dec!(12.50)));
        assert!(is_storable(dec!(12.500)));
        assert!(!is_storable(dec!(0.335)));
    }

    #[test]
    fn test_checked_line_total_refuses_overflow() {
        assert_eq!(checked_line_total(dec!(3), dec!(0.34)), Some(dec!(1.02)));
        assert_eq!(checked_line_total(Decimal::MAX, dec!(2)), None);
        assert_eq!(checked_line_total(dec!(100000), dec!(100000000)), None);
    }
}
