//! Recomputes expected withholdings and compares them with declared values.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, warn};

use super::rates::{RetentionKind, rate_table};
use crate::document::extractor::{extract_metadata, extract_values};
use crate::document::Document;
use crate::error::ValidationError;
use crate::models::invoice::{InvoiceMetadata, InvoiceValueBundle};

/// Absolute tolerance, in currency units, for every comparison: 0.05
pub const RETENTION_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Expected value of one check and whether the declared value matched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldCheck {
    pub expected: Decimal,
    pub matched: bool,
}

/// Outcome of a successful validation run.
///
/// `NetValue` is present only when all four withholdings matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ValidationResult {
    /// Expected value and match flag per kind.
    Detailed(BTreeMap<RetentionKind, FieldCheck>),
    /// Match flag per kind.
    Simple(BTreeMap<RetentionKind, bool>),
}

impl ValidationResult {
    /// Match flag for a kind, `None` if it was not evaluated.
    pub fn matched(&self, kind: RetentionKind) -> Option<bool> {
        match self {
            ValidationResult::Detailed(checks) => checks.get(&kind).map(|c| c.matched),
            ValidationResult::Simple(flags) => flags.get(&kind).copied(),
        }
    }

    /// Expected value for a kind. Always `None` for the simple form.
    pub fn expected(&self, kind: RetentionKind) -> Option<Decimal> {
        match self {
            ValidationResult::Detailed(checks) => checks.get(&kind).map(|c| c.expected),
            ValidationResult::Simple(_) => None,
        }
    }

    /// Whether every evaluated kind matched.
    pub fn all_matched(&self) -> bool {
        match self {
            ValidationResult::Detailed(checks) => checks.values().all(|c| c.matched),
            ValidationResult::Simple(flags) => flags.values().all(|m| *m),
        }
    }

    /// Evaluated kinds in report order.
    pub fn kinds(&self) -> Vec<RetentionKind> {
        match self {
            ValidationResult::Detailed(checks) => checks.keys().copied().collect(),
            ValidationResult::Simple(flags) => flags.keys().copied().collect(),
        }
    }

    /// Drop expected values, keeping only the match flags.
    pub fn simplify(self) -> Self {
        match self {
            ValidationResult::Detailed(checks) => ValidationResult::Simple(
                checks.into_iter().map(|(k, c)| (k, c.matched)).collect(),
            ),
            simple => simple,
        }
    }
}

/// Values and metadata of one loaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedInvoice {
    pub values: InvoiceValueBundle,
    pub metadata: InvoiceMetadata,
}

impl LoadedInvoice {
    /// Sum of the four declared withholdings.
    pub fn total_retained(&self) -> Decimal {
        self.values.total_retained()
    }

    /// Whether any withholding is declared.
    pub fn has_retentions(&self) -> bool {
        self.total_retained() != Decimal::ZERO
    }
}

/// Retention validator over the static rate table.
#[derive(Debug, Clone)]
pub struct RetentionValidator {
    tolerance: Decimal,
}

impl RetentionValidator {
    /// Create a validator with the statutory tolerance.
    pub fn new() -> Self {
        Self {
            tolerance: RETENTION_TOLERANCE,
        }
    }

    /// Extract metadata, then values, from a parsed document.
    pub fn load(&self, document: &Document, source_reference: &str) -> crate::Result<LoadedInvoice> {
        let metadata = extract_metadata(document, source_reference)?;
        let values = extract_values(document)?;

        debug!(
            "Loaded {}: gross={}, net={}, retained={}",
            source_reference,
            values.gross_service_value,
            values.net_value,
            values.total_retained()
        );

        Ok(LoadedInvoice { values, metadata })
    }

    /// Parse and load a document from its XML source.
    pub fn load_str(&self, source: &str, source_reference: &str) -> crate::Result<LoadedInvoice> {
        let document = Document::parse(source)?;
        self.load(&document, source_reference)
    }

    /// Check each declared withholding against `gross * rate`.
    ///
    /// When all four match, the declared net value is checked against
    /// `round(gross - total_retained, 2)`; a net mismatch is reported in the
    /// result, not as an error. When any withholding mismatches, the net
    /// value is not evaluated and [`ValidationError::RetentionMismatch`]
    /// names every offending kind. Amounts whose arithmetic leaves the
    /// `Decimal` range fail with [`ValidationError::AmountOverflow`].
    pub fn validate(
        &self,
        invoice: &LoadedInvoice,
        show_expected: bool,
    ) -> Result<ValidationResult, ValidationError> {
        let values = &invoice.values;
        let gross = values.gross_service_value;

        let mut checks = BTreeMap::new();
        let mut mismatched = Vec::new();

        for (kind, rate) in rate_table() {
            let expected = gross
                .checked_mul(*rate)
                .ok_or_else(|| overflow(invoice))?;
            let matched = self.within_tolerance(values.declared(*kind), expected);
            if !matched {
                mismatched.push(*kind);
            }
            checks.insert(*kind, FieldCheck { expected, matched });
        }

        if !mismatched.is_empty() {
            let meta = &invoice.metadata;
            warn!(
                "Withholding mismatch in {}: {:?}",
                meta.source_reference, mismatched
            );
            return Err(ValidationError::RetentionMismatch {
                kinds: mismatched,
                provider_tax_id: meta.provider_tax_id.clone(),
                customer_tax_id: meta.customer_tax_id.clone(),
                source_reference: meta.source_reference.clone(),
            });
        }

        let expected_net = values
            .checked_total_retained()
            .and_then(|total| gross.checked_sub(total))
            .ok_or_else(|| overflow(invoice))?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let net_matched = self.within_tolerance(values.net_value, expected_net);
        if !net_matched {
            warn!(
                "Net value of {} is {}, expected {}",
                invoice.metadata.source_reference, values.net_value, expected_net
            );
        }
        checks.insert(
            RetentionKind::NetValue,
            FieldCheck {
                expected: expected_net,
                matched: net_matched,
            },
        );

        let result = ValidationResult::Detailed(checks);
        Ok(if show_expected { result } else { result.simplify() })
    }

    fn within_tolerance(&self, declared: Decimal, expected: Decimal) -> bool {
        declared
            .checked_sub(expected)
            .is_some_and(|diff| diff.abs() <= self.tolerance)
    }
}

fn overflow(invoice: &LoadedInvoice) -> ValidationError {
    ValidationError::AmountOverflow {
        source_reference: invoice.metadata.source_reference.clone(),
    }
}

impl Default for RetentionValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn invoice(gross: &str, irpj: &str, csll: &str, pis: &str, cofins: &str, net: &str) -> LoadedInvoice {
        LoadedInvoice {
            values: InvoiceValueBundle {
                gross_service_value: dec(gross),
                net_value: dec(net),
                irpj: dec(irpj),
                csll: dec(csll),
                pis: dec(pis),
                cofins: dec(cofins),
            },
            metadata: InvoiceMetadata {
                provider_tax_id: "11222333000181".to_string(),
                customer_tax_id: "44555666000199".to_string(),
                issue_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
                source_reference: "xml/nota.xml".to_string(),
                cancelled: false,
            },
        }
    }

    #[test]
    fn test_all_match() {
        let inv = invoice("1000.00", "15.00", "10.00", "6.50", "30.00", "938.50");
        assert_eq!(inv.total_retained(), dec("61.50"));
        assert!(inv.has_retentions());

        let result = RetentionValidator::new().validate(&inv, true).unwrap();

        assert!(result.all_matched());
        assert_eq!(result.expected(RetentionKind::Irpj), Some(dec("15")));
        assert_eq!(result.expected(RetentionKind::Csll), Some(dec("10")));
        assert_eq!(result.expected(RetentionKind::Pis), Some(dec("6.5")));
        assert_eq!(result.expected(RetentionKind::Cofins), Some(dec("30")));
        assert_eq!(result.expected(RetentionKind::NetValue), Some(dec("938.50")));
        assert_eq!(result.matched(RetentionKind::NetValue), Some(true));
    }

    #[test]
    fn test_simple_form_by_default_flag() {
        let inv = invoice("1000.00", "15.00", "10.00", "6.50", "30.00", "938.50");
        let result = RetentionValidator::new().validate(&inv, false).unwrap();

        let expected: BTreeMap<RetentionKind, bool> = [
            (RetentionKind::Irpj, true),
            (RetentionKind::Csll, true),
            (RetentionKind::Pis, true),
            (RetentionKind::Cofins, true),
            (RetentionKind::NetValue, true),
        ]
        .into_iter()
        .collect();
        assert_eq!(result, ValidationResult::Simple(expected));
    }

    #[test]
    fn test_single_mismatch_skips_net() {
        let inv = invoice("1000.00", "20.00", "10.00", "6.50", "30.00", "938.50");
        let err = RetentionValidator::new().validate(&inv, true).unwrap_err();

        assert_eq!(
            err,
            ValidationError::RetentionMismatch {
                kinds: vec![RetentionKind::Irpj],
                provider_tax_id: "11222333000181".to_string(),
                customer_tax_id: "44555666000199".to_string(),
                source_reference: "xml/nota.xml".to_string(),
            }
        );
    }

    #[test]
    fn test_every_mismatch_is_named() {
        let inv = invoice("1000.00", "0", "10.00", "0", "31.00", "938.50");
        match RetentionValidator::new().validate(&inv, false) {
            Err(ValidationError::RetentionMismatch { kinds, .. }) => assert_eq!(
                kinds,
                vec![RetentionKind::Irpj, RetentionKind::Pis, RetentionKind::Cofins]
            ),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_tolerance_boundary() {
        // 15.05 is exactly 0.05 away from 15.00
        let inside = invoice("1000.00", "15.05", "10.00", "6.50", "30.00", "938.45");
        assert!(RetentionValidator::new().validate(&inside, false).is_ok());

        let outside = invoice("1000.00", "15.06", "10.00", "6.50", "30.00", "938.44");
        assert!(RetentionValidator::new().validate(&outside, false).is_err());
    }

    #[test]
    fn test_net_mismatch_is_reported_not_raised() {
        let inv = invoice("1000.00", "15.00", "10.00", "6.50", "30.00", "900.00");
        let result = RetentionValidator::new().validate(&inv, true).unwrap();

        assert_eq!(result.matched(RetentionKind::NetValue), Some(false));
        assert!(!result.all_matched());
    }

    #[test]
    fn test_zero_gross_matches_zero_withholdings() {
        let inv = invoice("0", "0", "0", "0", "0", "0");
        assert!(!inv.has_retentions());

        let result = RetentionValidator::new().validate(&inv, true).unwrap();
        assert!(result.all_matched());
        assert_eq!(result.expected(RetentionKind::Irpj), Some(Decimal::ZERO));
    }

    #[test]
    fn test_extreme_amounts_do_not_panic() {
        let mut inv = invoice("0", "0", "0", "0", "0", "0");
        inv.values.irpj = Decimal::MAX;
        inv.values.csll = Decimal::MAX;

        let err = RetentionValidator::new().validate(&inv, true).unwrap_err();
        assert_eq!(
            err,
            ValidationError::RetentionMismatch {
                kinds: vec![RetentionKind::Irpj, RetentionKind::Csll],
                provider_tax_id: "11222333000181".to_string(),
                customer_tax_id: "44555666000199".to_string(),
                source_reference: "xml/nota.xml".to_string(),
            }
        );

        // largest representable gross value
        let mut inv = invoice("0", "0", "0", "0", "0", "0");
        inv.values.gross_service_value = Decimal::MAX;
        for kind in RetentionKind::WITHHOLDINGS {
            let expected = Decimal::MAX * kind.rate().unwrap();
            match kind {
                RetentionKind::Irpj => inv.values.irpj = expected,
                RetentionKind::Csll => inv.values.csll = expected,
                RetentionKind::Pis => inv.values.pis = expected,
                RetentionKind::Cofins => inv.values.cofins = expected,
                RetentionKind::NetValue => {}
            }
        }
        inv.values.net_value = Decimal::MAX;
        assert!(RetentionValidator::new().validate(&inv, true).is_ok());
    }

    #[test]
    fn test_deterministic() {
        let inv = invoice("2537.40", "38.06", "25.37", "16.49", "76.12", "2381.36");
        let validator = RetentionValidator::new();
        let first = validator.validate(&inv, true).unwrap();
        let second = validator.validate(&inv, true).unwrap();
        assert_eq!(first, second);
        assert!(first.all_matched());
    }

    #[test]
    fn test_per_kind_property_over_gross_values() {
        let validator = RetentionValidator::new();
        for gross in ["1.00", "99.99", "1234.56", "50000.00"] {
            let g = dec(gross);
            for kind in RetentionKind::WITHHOLDINGS {
                let rate = kind.rate().unwrap();
                for (offset, should_match) in [("0", true), ("0.04", true), ("-0.05", true), ("0.06", false)] {
                    let mut inv = invoice(gross, "0", "0", "0", "0", "0");
                    for other in RetentionKind::WITHHOLDINGS {
                        let value = g * other.rate().unwrap();
                        match other {
                            RetentionKind::Irpj => inv.values.irpj = value,
                            RetentionKind::Csll => inv.values.csll = value,
                            RetentionKind::Pis => inv.values.pis = value,
                            RetentionKind::Cofins => inv.values.cofins = value,
                            RetentionKind::NetValue => {}
                        }
                    }
                    let declared = g * rate + dec(offset);
                    match kind {
                        RetentionKind::Irpj => inv.values.irpj = declared,
                        RetentionKind::Csll => inv.values.csll = declared,
                        RetentionKind::Pis => inv.values.pis = declared,
                        RetentionKind::Cofins => inv.values.cofins = declared,
                        RetentionKind::NetValue => {}
                    }

                    match validator.validate(&inv, false) {
                        Ok(result) => {
                            assert!(should_match, "{kind} at {gross} + {offset} should fail");
                            assert_eq!(result.matched(kind), Some(true));
                        }
                        Err(ValidationError::RetentionMismatch { kinds, .. }) => {
                            assert!(!should_match, "{kind} at {gross} + {offset} should pass");
                            assert_eq!(kinds, vec![kind]);
                        }
                        Err(other) => panic!("unexpected error {other:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_load_from_xml() {
        let xml = r#"<CompNfse><Nfse><InfNfse>
            <DataEmissao>2024-01-10</DataEmissao>
            <Servico><Valores>
              <ValorServicos>1000.00</ValorServicos>
              <ValorIr>15.00</ValorIr>
              <ValorLiquidoNfse>985.00</ValorLiquidoNfse>
            </Valores></Servico>
            <PrestadorServico><IdentificacaoPrestador><Cnpj>11222333000181</Cnpj></IdentificacaoPrestador></PrestadorServico>
            <TomadorServico><IdentificacaoTomador><CpfCnpj><Cnpj>44555666000199</Cnpj></CpfCnpj></IdentificacaoTomador></TomadorServico>
        </InfNfse></Nfse></CompNfse>"#;

        let inv = RetentionValidator::new().load_str(xml, "a.xml").unwrap();
        assert_eq!(inv.total_retained(), dec("15.00"));
        assert_eq!(inv.values.csll, Decimal::ZERO);
        assert_eq!(inv.metadata.customer_tax_id, "44555666000199");
    }
}
