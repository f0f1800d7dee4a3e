//! Field extraction from NFS-e (ABRASF layout) documents.
//!
//! Section lookup follows a first-match policy: when a document holds
//! several elements with the same name, only the first one in document
//! order is used and the rest are ignored without error.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use super::{Document, Element, Result};
use crate::error::{ExtractionError, NfseError, ValidationError};
use crate::models::invoice::{InvoiceMetadata, InvoiceValueBundle};
use crate::models::tax_id::digits_only;

/// Element under which invoice sections are searched by default.
pub const DEFAULT_SEARCH_ROOT: &str = "InfNfse";

/// Element under which the cancellation confirmation lives.
pub const CANCELLATION_ROOT: &str = "CancelamentoNfse";

/// Find the first `section_name` below the first `search_root`.
///
/// `search_root` is looked up among the descendants of the document root;
/// the section is then looked up among the descendants of that element.
/// Both lookups are first-match in document order.
pub fn find_section<'a>(
    document: &'a Document,
    section_name: &str,
    search_root: &str,
) -> Option<&'a Element> {
    document
        .root()
        .find_descendant(search_root)?
        .find_descendant(section_name)
}

/// Text of the direct child `primary_tag`, else of `fallback_tag`.
///
/// The primary tag wins whenever it is present, even when the fallback is
/// also present.
pub fn extract_field(element: &Element, primary_tag: &str, fallback_tag: Option<&str>) -> Result<String> {
    if let Some(found) = element.child(primary_tag) {
        return Ok(found.text().to_string());
    }

    match fallback_tag {
        Some(fallback) => element
            .child(fallback)
            .map(|found| found.text().to_string())
            .ok_or_else(|| ExtractionError::MissingFieldWithFallback {
                primary: primary_tag.to_string(),
                fallback: fallback.to_string(),
            }),
        None => Err(ExtractionError::MissingField {
            tag: primary_tag.to_string(),
        }),
    }
}

/// Decimal value of the direct child `tag`.
///
/// Absent tags and empty text read as zero; any other text must parse as a
/// non-negative decimal number.
pub fn extract_numeric(element: &Element, tag: &str) -> Result<Decimal> {
    let text = match element.child(tag) {
        Some(found) => found.text().trim(),
        None => return Ok(Decimal::ZERO),
    };

    if text.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let value = Decimal::from_str(text).map_err(|_| ExtractionError::NumericFormat {
        tag: tag.to_string(),
        value: text.to_string(),
    })?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(ExtractionError::NegativeAmount {
            tag: tag.to_string(),
            value: text.to_string(),
        });
    }

    Ok(value)
}

/// Extract provider/customer identifiers, issue date and cancellation state.
pub fn extract_metadata(document: &Document, source_reference: &str) -> crate::Result<InvoiceMetadata> {
    let provider_tax_id = extract_provider_tax_id(document)?;
    let customer_tax_id = extract_customer_tax_id(document)?;

    let issue_date = find_section(document, "DataEmissao", DEFAULT_SEARCH_ROOT)
        .ok_or_else(|| ExtractionError::MissingField {
            tag: "DataEmissao".to_string(),
        })
        .and_then(|e| parse_issue_date(e.text()))?;

    let cancelled = is_cancelled(document);

    debug!(
        "Metadata for {}: provider={}, customer={}, issued={}, cancelled={}",
        source_reference, provider_tax_id, customer_tax_id, issue_date, cancelled
    );

    Ok(InvoiceMetadata {
        provider_tax_id,
        customer_tax_id,
        issue_date,
        source_reference: source_reference.to_string(),
        cancelled,
    })
}

/// Extract the declared service values from `Servico → Valores`.
pub fn extract_values(document: &Document) -> Result<InvoiceValueBundle> {
    let values = find_section(document, "Servico", DEFAULT_SEARCH_ROOT)
        .ok_or_else(|| ExtractionError::MissingField {
            tag: "Servico".to_string(),
        })?
        .child("Valores")
        .ok_or_else(|| ExtractionError::MissingField {
            tag: "Valores".to_string(),
        })?;

    let bundle = InvoiceValueBundle {
        gross_service_value: extract_numeric(values, "ValorServicos")?,
        net_value: extract_numeric(values, "ValorLiquidoNfse")?,
        irpj: extract_numeric(values, "ValorIr")?,
        csll: extract_numeric(values, "ValorCsll")?,
        pis: extract_numeric(values, "ValorPis")?,
        cofins: extract_numeric(values, "ValorCofins")?,
    };

    if bundle.checked_total_retained().is_none() {
        return Err(ExtractionError::AmountOverflow(
            "sum of ValorIr, ValorCsll, ValorPis and ValorCofins".to_string(),
        ));
    }

    Ok(bundle)
}

/// Whether a successful cancellation confirmation is attached.
///
/// A missing link anywhere along the path is the normal case of an active
/// document and reads as not cancelled.
pub fn is_cancelled(document: &Document) -> bool {
    find_section(document, "ConfirmacaoCancelamento", CANCELLATION_ROOT)
        .and_then(|c| c.child("InfConfirmacaoCancelamento"))
        .and_then(|c| c.child("Sucesso"))
        .is_some()
}

/// Parse `DataEmissao`, which may carry a time and offset after the date.
pub fn parse_issue_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    let date_part = text.get(..10).unwrap_or(text);

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| ExtractionError::InvalidDate {
        field: "DataEmissao".to_string(),
        value: text.to_string(),
    })
}

fn extract_provider_tax_id(document: &Document) -> crate::Result<String> {
    let identification = find_section(document, "PrestadorServico", DEFAULT_SEARCH_ROOT)
        .and_then(|p| p.child("IdentificacaoPrestador"))
        .ok_or_else(|| invalid_input("provider identification (PrestadorServico/IdentificacaoPrestador) is absent"))?;

    let cnpj = extract_field(identification, "Cnpj", None).map_err(|e| invalid_input(&format!("provider {}", e)))?;
    non_empty_digits(cnpj, "provider CNPJ is empty")
}

fn extract_customer_tax_id(document: &Document) -> crate::Result<String> {
    let identification = find_section(document, "TomadorServico", DEFAULT_SEARCH_ROOT)
        .and_then(|t| t.child("IdentificacaoTomador"))
        .and_then(|i| i.child("CpfCnpj"))
        .ok_or_else(|| invalid_input("customer identification (TomadorServico/IdentificacaoTomador/CpfCnpj) is absent"))?;

    let id = extract_field(identification, "Cnpj", Some("Cpf"))
        .map_err(|e| invalid_input(&format!("customer {}", e)))?;
    non_empty_digits(id, "customer CPF/CNPJ is empty")
}

fn non_empty_digits(raw: String, reason: &str) -> crate::Result<String> {
    let digits = digits_only(&raw);
    if digits.is_empty() {
        return Err(invalid_input(reason));
    }
    Ok(digits)
}

fn invalid_input(reason: &str) -> NfseError {
    ValidationError::InvalidInput(reason.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NOTA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CompNfse>
  <Nfse>
    <InfNfse>
      <Numero>1024</Numero>
      <DataEmissao>2024-03-15T10:22:31</DataEmissao>
      <Servico>
        <Valores>
          <ValorServicos>1000.00</ValorServicos>
          <ValorPis>6.50</ValorPis>
          <ValorCofins>30.00</ValorCofins>
          <ValorIr>15.00</ValorIr>
          <ValorCsll>10.00</ValorCsll>
          <ValorLiquidoNfse>938.50</ValorLiquidoNfse>
        </Valores>
      </Servico>
      <PrestadorServico>
        <IdentificacaoPrestador>
          <Cnpj>11222333000181</Cnpj>
        </IdentificacaoPrestador>
      </PrestadorServico>
      <TomadorServico>
        <IdentificacaoTomador>
          <CpfCnpj>
            <Cpf>52998224725</Cpf>
          </CpfCnpj>
        </IdentificacaoTomador>
      </TomadorServico>
    </InfNfse>
  </Nfse>
</CompNfse>"#;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn element(xml: &str) -> Element {
        Document::parse(xml).unwrap().root().clone()
    }

    #[test]
    fn test_extract_field_prefers_primary() {
        let e = element("<CpfCnpj><Cpf>52998224725</Cpf><Cnpj>11222333000181</Cnpj></CpfCnpj>");
        assert_eq!(extract_field(&e, "Cnpj", Some("Cpf")).unwrap(), "11222333000181");
    }

    #[test]
    fn test_extract_field_uses_fallback_when_primary_absent() {
        let e = element("<CpfCnpj><Cpf>52998224725</Cpf></CpfCnpj>");
        assert_eq!(extract_field(&e, "Cnpj", Some("Cpf")).unwrap(), "52998224725");
    }

    #[test]
    fn test_extract_field_missing_without_fallback() {
        let e = element("<CpfCnpj><Cpf>52998224725</Cpf></CpfCnpj>");
        assert_eq!(
            extract_field(&e, "Cnpj", None),
            Err(ExtractionError::MissingField { tag: "Cnpj".to_string() })
        );
    }

    #[test]
    fn test_extract_field_missing_with_fallback() {
        let e = element("<CpfCnpj/>");
        assert_eq!(
            extract_field(&e, "Cnpj", Some("Cpf")),
            Err(ExtractionError::MissingFieldWithFallback {
                primary: "Cnpj".to_string(),
                fallback: "Cpf".to_string(),
            })
        );
    }

    #[test]
    fn test_extract_numeric() {
        let e = element("<Valores><ValorIr>15.00</ValorIr><ValorPis></ValorPis><ValorCsll> 3.5 </ValorCsll></Valores>");
        assert_eq!(extract_numeric(&e, "ValorIr").unwrap(), dec("15.00"));
        assert_eq!(extract_numeric(&e, "ValorPis").unwrap(), Decimal::ZERO);
        assert_eq!(extract_numeric(&e, "ValorCofins").unwrap(), Decimal::ZERO);
        assert_eq!(extract_numeric(&e, "ValorCsll").unwrap(), dec("3.5"));
    }

    #[test]
    fn test_extract_numeric_rejects_garbage() {
        let e = element("<Valores><ValorIr>abc</ValorIr></Valores>");
        assert_eq!(
            extract_numeric(&e, "ValorIr"),
            Err(ExtractionError::NumericFormat {
                tag: "ValorIr".to_string(),
                value: "abc".to_string(),
            })
        );
    }

    #[test]
    fn test_extract_numeric_rejects_negative() {
        let e = element("<Valores><ValorIr>-15.00</ValorIr><ValorPis>-0.00</ValorPis></Valores>");
        assert_eq!(
            extract_numeric(&e, "ValorIr"),
            Err(ExtractionError::NegativeAmount {
                tag: "ValorIr".to_string(),
                value: "-15.00".to_string(),
            })
        );
        assert!(extract_numeric(&e, "ValorPis").unwrap().is_zero());
    }

    #[test]
    fn test_offsetting_negative_withholding_is_not_skipped() {
        let xml = NOTA
            .replace("<ValorIr>15.00</ValorIr>", "<ValorIr>-15.00</ValorIr>")
            .replace("<ValorCsll>10.00</ValorCsll>", "<ValorCsll>15.00</ValorCsll>");
        let doc = Document::parse(&xml).unwrap();
        assert!(matches!(
            extract_values(&doc),
            Err(ExtractionError::NegativeAmount { .. })
        ));
    }

    #[test]
    fn test_extract_values_rejects_overflowing_withholdings() {
        let xml = NOTA
            .replace("<ValorIr>15.00</ValorIr>", "<ValorIr>79228162514264337593543950335</ValorIr>")
            .replace("<ValorCsll>10.00</ValorCsll>", "<ValorCsll>79228162514264337593543950335</ValorCsll>");
        let doc = Document::parse(&xml).unwrap();
        assert!(matches!(
            extract_values(&doc),
            Err(ExtractionError::AmountOverflow(_))
        ));
    }

    #[test]
    fn test_find_section_first_match_wins() {
        let doc = Document::parse(
            "<r><InfNfse><Servico><Id>1</Id></Servico><Servico><Id>2</Id></Servico></InfNfse>\
             <InfNfse><Servico><Id>3</Id></Servico></InfNfse></r>",
        )
        .unwrap();
        let section = find_section(&doc, "Servico", DEFAULT_SEARCH_ROOT).unwrap();
        assert_eq!(section.child("Id").unwrap().text(), "1");
    }

    #[test]
    fn test_find_section_absent() {
        let doc = Document::parse("<r><Outro><Servico/></Outro></r>").unwrap();
        assert!(find_section(&doc, "Servico", DEFAULT_SEARCH_ROOT).is_none());
        assert!(find_section(&doc, "Tomador", "Outro").is_none());
    }

    #[test]
    fn test_extract_metadata() {
        let doc = Document::parse(NOTA).unwrap();
        let meta = extract_metadata(&doc, "xml/nota.xml").unwrap();

        assert_eq!(meta.provider_tax_id, "11222333000181");
        assert_eq!(meta.customer_tax_id, "52998224725");
        assert_eq!(meta.issue_date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(meta.source_reference, "xml/nota.xml");
        assert!(!meta.cancelled);
    }

    #[test]
    fn test_extract_values() {
        let doc = Document::parse(NOTA).unwrap();
        let values = extract_values(&doc).unwrap();

        assert_eq!(values.gross_service_value, dec("1000.00"));
        assert_eq!(values.net_value, dec("938.50"));
        assert_eq!(values.irpj, dec("15.00"));
        assert_eq!(values.csll, dec("10.00"));
        assert_eq!(values.pis, dec("6.50"));
        assert_eq!(values.cofins, dec("30.00"));
    }

    #[test]
    fn test_missing_provider_is_invalid_input() {
        let doc = Document::parse(
            "<CompNfse><Nfse><InfNfse><DataEmissao>2024-03-15</DataEmissao></InfNfse></Nfse></CompNfse>",
        )
        .unwrap();
        let err = extract_metadata(&doc, "x.xml").unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn test_missing_values_section() {
        let doc = Document::parse("<r><InfNfse><Servico/></InfNfse></r>").unwrap();
        assert_eq!(
            extract_values(&doc),
            Err(ExtractionError::MissingField { tag: "Valores".to_string() })
        );
    }

    #[test]
    fn test_cancellation() {
        let cancelled = Document::parse(
            "<CompNfse><NfseCancelamento><CancelamentoNfse><ConfirmacaoCancelamento>\
             <InfConfirmacaoCancelamento><Sucesso>true</Sucesso></InfConfirmacaoCancelamento>\
             </ConfirmacaoCancelamento></CancelamentoNfse></NfseCancelamento></CompNfse>",
        )
        .unwrap();
        assert!(is_cancelled(&cancelled));

        let partial = Document::parse(
            "<CompNfse><CancelamentoNfse><ConfirmacaoCancelamento/></CancelamentoNfse></CompNfse>",
        )
        .unwrap();
        assert!(!is_cancelled(&partial));

        assert!(!is_cancelled(&Document::parse(NOTA).unwrap()));
    }

    #[test]
    fn test_parse_issue_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_issue_date("2024-03-15").unwrap(), expected);
        assert_eq!(parse_issue_date("2024-03-15T10:22:31-03:00").unwrap(), expected);
        assert!(parse_issue_date("15/03/2024").is_err());
        assert!(parse_issue_date("").is_err());
    }
}
