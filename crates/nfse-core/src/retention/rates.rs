//! Statutory withholding rates for service invoices.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kinds of values checked on an invoice.
///
/// The four withholdings carry a fixed rate. `NetValue` is a marker for the
/// net-value check and has no rate of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionKind {
    /// Income tax (IRPJ): 1.5%
    Irpj,
    /// Social contribution on net profit (CSLL): 1%
    Csll,
    /// PIS: 0.65%
    Pis,
    /// COFINS: 3%
    Cofins,
    /// Declared net value after withholdings.
    NetValue,
}

lazy_static! {
    static ref RATES: BTreeMap<RetentionKind, Decimal> = {
        let mut rates = BTreeMap::new();
        rates.insert(RetentionKind::Irpj, Decimal::new(15, 3));
        rates.insert(RetentionKind::Csll, Decimal::new(1, 2));
        rates.insert(RetentionKind::Pis, Decimal::new(65, 4));
        rates.insert(RetentionKind::Cofins, Decimal::new(3, 2));
        rates
    };
}

/// The rate table, built once and never mutated.
pub fn rate_table() -> &'static BTreeMap<RetentionKind, Decimal> {
    &RATES
}

impl RetentionKind {
    /// The four withholdings, in report order.
    pub const WITHHOLDINGS: [RetentionKind; 4] = [
        RetentionKind::Irpj,
        RetentionKind::Csll,
        RetentionKind::Pis,
        RetentionKind::Cofins,
    ];

    /// Rate as a decimal multiplier (e.g. 0.015 for 1.5%).
    ///
    /// `None` for `NetValue`.
    pub fn rate(&self) -> Option<Decimal> {
        RATES.get(self).copied()
    }

    /// Name used in reports and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetentionKind::Irpj => "irpj",
            RetentionKind::Csll => "csll",
            RetentionKind::Pis => "pis",
            RetentionKind::Cofins => "cofins",
            RetentionKind::NetValue => "net_value",
        }
    }

    /// XML tag holding the declared value.
    pub fn tag(&self) -> &'static str {
        match self {
            RetentionKind::Irpj => "ValorIr",
            RetentionKind::Csll => "ValorCsll",
            RetentionKind::Pis => "ValorPis",
            RetentionKind::Cofins => "ValorCofins",
            RetentionKind::NetValue => "ValorLiquidoNfse",
        }
    }

    /// Parse a kind from its report name or its tax acronym.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "irpj" | "ir" => Some(RetentionKind::Irpj),
            "csll" => Some(RetentionKind::Csll),
            "pis" => Some(RetentionKind::Pis),
            "cofins" => Some(RetentionKind::Cofins),
            "net_value" | "valor_liquido" => Some(RetentionKind::NetValue),
            _ => None,
        }
    }
}

impl fmt::Display for RetentionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
