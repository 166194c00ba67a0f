//! Reference families and the `<PREFIX>-<year>-<seq>` format

use serde::{Deserialize, Serialize};

use crate::document::DocumentType;

/// Each family owns an independent sequence per year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceFamily {
    Negotiation,
    Collaboration,
    Quote,
    Invoice,
    CreditNote,
    PurchaseOrder,
}

impl ReferenceFamily {
    pub const ALL: [ReferenceFamily; 6] = [
        ReferenceFamily::Negotiation,
        ReferenceFamily::Collaboration,
        ReferenceFamily::Quote,
        ReferenceFamily::Invoice,
        ReferenceFamily::CreditNote,
        ReferenceFamily::PurchaseOrder,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceFamily::Negotiation => "NEG",
            ReferenceFamily::Collaboration => "COL",
            ReferenceFamily::Quote => "DEVIS",
            ReferenceFamily::Invoice => "FACTURE",
            ReferenceFamily::CreditNote => "AVOIR",
            ReferenceFamily::PurchaseOrder => "BDC",
        }
    }

    /// Key of the counter row
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceFamily::Negotiation => "negotiation",
            ReferenceFamily::Collaboration => "collaboration",
            ReferenceFamily::Quote => "quote",
            ReferenceFamily::Invoice => "invoice",
            ReferenceFamily::CreditNote => "credit_note",
            ReferenceFamily::PurchaseOrder => "purchase_order",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.prefix() == prefix)
    }

    pub fn for_document(doc_type: DocumentType) -> Self {
        match doc_type {
            DocumentType::Devis => ReferenceFamily::Quote,
            DocumentType::Facture => ReferenceFamily::Invoice,
            DocumentType::Avoir => ReferenceFamily::CreditNote,
            DocumentType::BonDeCommande => ReferenceFamily::PurchaseOrder,
        }
    }
}

/// `COL-2025-0004`; sequences past 9999 simply widen
pub fn format_reference(family: ReferenceFamily, year: i32, sequence: i32) -> String {
    format!("{}-{}-{:04}", family.prefix(), year, sequence)
}

/// A reference split back into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedReference {
    pub family: ReferenceFamily,
    pub year: i32,
    pub sequence: i32,
}

pub fn parse_reference(reference: &str) -> Option<ParsedReference> {
    let mut parts = reference.splitn(3, '-');
    let family = ReferenceFamily::from_prefix(parts.next()?)?;

    let year_part = parts.next()?;
    let sequence_part = parts.next()?;
    if year_part.len() != 4 || sequence_part.len() < 4 {
        return None;
    }
    if !year_part.bytes().all(|b| b.is_ascii_digit())
        || !sequence_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    Some(ParsedReference {
        family,
        year: year_part.parse().ok()?,
        sequence: sequence_part.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_is_zero_padded() {
        assert_eq!(
            format_reference(ReferenceFamily::Collaboration, 2025, 4),
            "COL-2025-0004"
        );
        assert_eq!(
            format_reference(ReferenceFamily::CreditNote, 2025, 1),
            "AVOIR-2025-0001"
        );
        assert_eq!(
            format_reference(ReferenceFamily::Invoice, 2026, 12345),
            "FACTURE-2026-12345"
        );
    }

    #[test]
    fn test_parse_inverts_format() {
        let parsed = parse_reference("NEG-2025-0001").unwrap();
        assert_eq!(parsed.family, ReferenceFamily::Negotiation);
        assert_eq!(parsed.year, 2025);
        assert_eq!(parsed.sequence, 1);

        for family in ReferenceFamily::ALL {
            let formatted = format_reference(family, 2024, 73);
            let parsed = parse_reference(&formatted).unwrap();
            assert_eq!(parsed.family, family);
            assert_eq!(parsed.sequence, 73);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_reference("XYZ-2025-0001").is_none());
        assert!(parse_reference("COL-25-0001").is_none());
        assert!(parse_reference("COL-2025-01").is_none());
        assert!(parse_reference("COL-2025-00a1").is_none());
        assert!(parse_reference("COL-2025").is_none());
    }

    #[test]
    fn test_document_families() {
        assert_eq!(
            ReferenceFamily::for_document(DocumentType::Facture).prefix(),
            "FACTURE"
        );
        assert_eq!(
            ReferenceFamily::for_document(DocumentType::Devis).prefix(),
            "DEVIS"
        );
        assert_eq!(
            ReferenceFamily::for_document(DocumentType::BonDeCommande).prefix(),
            "BDC"
        );
    }

    #[test]
    fn test_zero_padding_keeps_lexical_order_within_a_year() {
        let mut refs: Vec<String> = [9, 10, 1, 100]
            .iter()
            .map(|n| format_reference(ReferenceFamily::Quote, 2025, *n))
            .collect();
        refs.sort();
        assert_eq!(
            refs,
            vec![
                "DEVIS-2025-0001",
                "DEVIS-2025-0009",
                "DEVIS-2025-0010",
                "DEVIS-2025-0100"
            ]
        );
    }
}
