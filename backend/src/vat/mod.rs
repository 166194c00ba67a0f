//! VAT regime resolution for a France-based seller
//!
//! [`resolve`] is a pure function of the buyer's country and VAT number. Every
//! document write path calls it (or [`VatResolution::for_regime`] on an
//! explicit override) so the rate on a document is never inherited from a
//! stale value.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Domestic standard rate, percent
pub const STANDARD_VAT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

pub const REVERSE_CHARGE_MENTION: &str =
    "Autoliquidation - TVA due par le preneur, article 196 de la directive 2006/112/CE";
pub const EXPORT_MENTION: &str =
    "TVA non applicable - article 259-1 du CGI, prestation de services hors Union europeenne";

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "vat_regime", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VatRegime {
    France,
    /// EU buyer with a VAT number: reverse charge
    EuIntracom,
    /// EU buyer without a VAT number, taxed as a consumer sale
    EuSansTva,
    HorsEu,
}

impl VatRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            VatRegime::France => "FRANCE",
            VatRegime::EuIntracom => "EU_INTRACOM",
            VatRegime::EuSansTva => "EU_SANS_TVA",
            VatRegime::HorsEu => "HORS_EU",
        }
    }
}

impl std::fmt::Display for VatRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VatResolution {
    pub regime: VatRegime,
    pub rate: Decimal,
    pub legal_mention: Option<String>,
}

impl VatResolution {
    /// Rate and mention implied by a regime
    pub fn for_regime(regime: VatRegime) -> Self {
        let (rate, legal_mention) = match regime {
            VatRegime::France | VatRegime::EuSansTva => (STANDARD_VAT_RATE, None),
            VatRegime::EuIntracom => (Decimal::ZERO, Some(REVERSE_CHARGE_MENTION)),
            VatRegime::HorsEu => (Decimal::ZERO, Some(EXPORT_MENTION)),
        };
        Self {
            regime,
            rate,
            legal_mention: legal_mention.map(str::to_string),
        }
    }
}

/// Resolve the regime for a buyer. An empty country counts as France.
pub fn resolve(country: &str, vat_number: Option<&str>) -> VatResolution {
    let regime = match classify_country(country) {
        CountryZone::France => VatRegime::France,
        CountryZone::EuropeanUnion => {
            if vat_number.map(is_valid_vat_number).unwrap_or(false) {
                VatRegime::EuIntracom
            } else {
                VatRegime::EuSansTva
            }
        }
        CountryZone::Outside => VatRegime::HorsEu,
    };
    VatResolution::for_regime(regime)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CountryZone {
    France,
    EuropeanUnion,
    Outside,
}

const FRANCE_NAMES: &[&str] = &["fr", "fra", "france", "republique francaise"];

/// Member states other than France: ISO code, then English and French names
const EU_COUNTRIES: &[&[&str]] = &[
    &["at", "austria", "autriche", "osterreich"],
    &["be", "belgium", "belgique", "belgie"],
    &["bg", "bulgaria", "bulgarie"],
    &["hr", "croatia", "croatie"],
    &["cy", "cyprus", "chypre"],
    &["cz", "czechia", "czech republic", "tchequie", "republique tcheque"],
    &["dk", "denmark", "danemark"],
    &["ee", "estonia", "estonie"],
    &["fi", "finland", "finlande"],
    &["de", "germany", "allemagne", "deutschland"],
    &["gr", "el", "greece", "grece"],
    &["hu", "hungary", "hongrie"],
    &["ie", "ireland", "irlande"],
    &["it", "italy", "italie", "italia"],
    &["lv", "latvia", "lettonie"],
    &["lt", "lithuania", "lituanie"],
    &["lu", "luxembourg"],
    &["mt", "malta", "malte"],
    &["nl", "netherlands", "the netherlands", "pays bas", "holland", "hollande"],
    &["pl", "poland", "pologne"],
    &["pt", "portugal"],
    &["ro", "romania", "roumanie"],
    &["sk", "slovakia", "slovaquie"],
    &["si", "slovenia", "slovenie"],
    &["es", "spain", "espagne", "espana"],
    &["se", "sweden", "suede"],
];

fn classify_country(country: &str) -> CountryZone {
    let normalized = normalize_country(country);
    if normalized.is_empty() || FRANCE_NAMES.contains(&normalized.as_str()) {
        CountryZone::France
    } else if EU_COUNTRIES
        .iter()
        .any(|names| names.contains(&normalized.as_str()))
    {
        CountryZone::EuropeanUnion
    } else {
        CountryZone::Outside
    }
}

/// Lowercase, accents folded, hyphens and repeated spaces collapsed
fn normalize_country(country: &str) -> String {
    let folded: String = country
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' => 'i',
            'ô' | 'ö' | 'ó' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            '-' | '_' => ' ',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Two-letter prefix, then 2 to 13 alphanumerics including at least one digit.
/// Spaces, dots and dashes are ignored.
pub fn is_valid_vat_number(vat_number: &str) -> bool {
    let compact: String = vat_number
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '-'))
        .collect::<String>()
        .to_uppercase();

    if compact.len() < 4 || compact.len() > 15 || !compact.is_ascii() {
        return false;
    }
    let (prefix, body) = compact.split_at(2);
    prefix.chars().all(|c| c.is_ascii_alphabetic())
        && body.chars().all(|c| c.is_ascii_alphanumeric())
        && body.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_france_standard_rate() {
        let r = resolve("France", None);
        assert_eq!(r.regime, VatRegime::France);
        assert_eq!(r.rate, Decimal::from(20));
        assert!(r.legal_mention.is_none());

        // French buyer with a VAT number still pays French VAT
        assert_eq!(resolve("FR", Some("FR40303265045")).regime, VatRegime::France);
        assert_eq!(resolve("", None).regime, VatRegime::France);
    }

    #[test]
    fn test_eu_with_vat_number_is_reverse_charge() {
        let r = resolve("Germany", Some("DE 123 456 789"));
        assert_eq!(r.regime, VatRegime::EuIntracom);
        assert_eq!(r.rate, Decimal::ZERO);
        assert_eq!(r.legal_mention.as_deref(), Some(REVERSE_CHARGE_MENTION));

        assert_eq!(resolve("Allemagne", Some("DE123456789")).regime, VatRegime::EuIntracom);
        assert_eq!(resolve("Pays-Bas", Some("NL123456789B01")).regime, VatRegime::EuIntracom);
        assert_eq!(resolve("  belgique ", Some("BE0123456789")).regime, VatRegime::EuIntracom);
    }

    #[test]
    fn test_eu_without_vat_number_is_consumer_sale() {
        let r = resolve("Espagne", None);
        assert_eq!(r.regime, VatRegime::EuSansTva);
        assert_eq!(r.rate, STANDARD_VAT_RATE);
        assert!(r.legal_mention.is_none());

        // An unusable number counts as none
        assert_eq!(resolve("Italy", Some("   ")).regime, VatRegime::EuSansTva);
        assert_eq!(resolve("Italy", Some("ITABCDEF")).regime, VatRegime::EuSansTva);
    }

    #[test]
    fn test_outside_eu_is_export() {
        for country in ["United States", "Suisse", "United Kingdom", "Japon"] {
            let r = resolve(country, Some("CHE123456789"));
            assert_eq!(r.regime, VatRegime::HorsEu, "{}", country);
            assert_eq!(r.rate, Decimal::ZERO);
            assert_eq!(r.legal_mention.as_deref(), Some(EXPORT_MENTION));
        }
    }

    #[test]
    fn test_accents_and_case_are_folded() {
        assert_eq!(resolve("SUÈDE", None).regime, VatRegime::EuSansTva);
        assert_eq!(resolve("République Tchèque", None).regime, VatRegime::EuSansTva);
        assert_eq!(resolve("Grèce", None).regime, VatRegime::EuSansTva);
    }

    #[test]
    fn test_vat_number_shape() {
        assert!(is_valid_vat_number("DE123456789"));
        assert!(is_valid_vat_number("de-123.456.789"));
        assert!(is_valid_vat_number("ESX1234567X"));
        assert!(!is_valid_vat_number(""));
        assert!(!is_valid_vat_number("DE"));
        assert!(!is_valid_vat_number("12345678901"));
        assert!(!is_valid_vat_number("DE12345678901234"));
    }

    #[test]
    fn test_override_rates() {
        assert_eq!(VatResolution::for_regime(VatRegime::EuSansTva).rate, STANDARD_VAT_RATE);
        assert_eq!(VatResolution::for_regime(VatRegime::HorsEu).rate, Decimal::ZERO);
    }
}
