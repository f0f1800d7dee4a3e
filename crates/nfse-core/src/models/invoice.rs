//! Value bundle and metadata extracted from a single NFS-e document.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::retention::RetentionKind;

use super::tax_id::TaxIdKind;

/// Monetary values declared on the invoice.
///
/// Gross and net values are read independently of the four withholdings;
/// their relationship is only checked by the validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceValueBundle {
    /// Total declared service value (`ValorServicos`).
    pub gross_service_value: Decimal,

    /// Declared value after withholdings (`ValorLiquidoNfse`).
    pub net_value: Decimal,

    /// Withheld income tax (`ValorIr`).
    pub irpj: Decimal,

    /// Withheld social contribution on net profit (`ValorCsll`).
    pub csll: Decimal,

    /// Withheld PIS (`ValorPis`).
    pub pis: Decimal,

    /// Withheld COFINS (`ValorCofins`).
    pub cofins: Decimal,
}

impl InvoiceValueBundle {
    /// Declared amount for a withholding kind.
    ///
    /// `NetValue` maps to the declared net value.
    pub fn declared(&self, kind: RetentionKind) -> Decimal {
        match kind {
            RetentionKind::Irpj => self.irpj,
            RetentionKind::Csll => self.csll,
            RetentionKind::Pis => self.pis,
            RetentionKind::Cofins => self.cofins,
            RetentionKind::NetValue => self.net_value,
        }
    }

    /// Sum of the four withholdings, excluding gross and net values.
    ///
    /// Saturates at `Decimal::MAX`; bundles returned by the extractor are
    /// known to fit.
    pub fn total_retained(&self) -> Decimal {
        RetentionKind::WITHHOLDINGS
            .iter()
            .fold(Decimal::ZERO, |total, kind| total.saturating_add(self.declared(*kind)))
    }

    /// Sum of the four withholdings, `None` on overflow.
    pub fn checked_total_retained(&self) -> Option<Decimal> {
        RetentionKind::WITHHOLDINGS
            .iter()
            .try_fold(Decimal::ZERO, |total, kind| total.checked_add(self.declared(*kind)))
    }
}

/// Identifying data of the invoice. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceMetadata {
    /// Provider CNPJ (providers are always companies).
    pub provider_tax_id: String,

    /// Customer CNPJ or CPF.
    pub customer_tax_id: String,

    /// Issue date (`DataEmissao`).
    pub issue_date: NaiveDate,

    /// Where the document came from, used in error messages.
    pub source_reference: String,

    /// Whether a successful cancellation confirmation is attached.
    pub cancelled: bool,
}

impl InvoiceMetadata {
    /// Whether the customer is an individual (11-digit CPF).
    pub fn customer_is_individual(&self) -> bool {
        TaxIdKind::classify(&self.customer_tax_id) == TaxIdKind::Individual
    }
}
