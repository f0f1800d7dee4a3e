//! Brazilian taxpayer identifiers: CPF (individuals) and CNPJ (companies).

use serde::{Deserialize, Serialize};

/// Kind of taxpayer identifier, decided by digit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxIdKind {
    /// CPF, 11 digits.
    Individual,
    /// CNPJ, 14 digits.
    Company,
    /// Any other length.
    Unknown,
}

impl TaxIdKind {
    /// Classify an identifier by its number of digits.
    pub fn classify(tax_id: &str) -> Self {
        match digits_only(tax_id).len() {
            11 => TaxIdKind::Individual,
            14 => TaxIdKind::Company,
            _ => TaxIdKind::Unknown,
        }
    }
}

/// Strip everything but ASCII digits.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validate a CPF using its two mod-11 check digits.
pub fn validate_cpf(cpf: &str) -> bool {
    let digits = to_digits(cpf);

    if digits.len() != 11 || all_same(&digits) {
        return false;
    }

    let first = cpf_check_digit(&digits[..9]);
    let second = cpf_check_digit(&digits[..10]);

    digits[9] == first && digits[10] == second
}

/// Validate a CNPJ using its two mod-11 check digits.
///
/// Weights: 5,4,3,2,9,8,7,6,5,4,3,2 then 6,5,4,3,2,9,8,7,6,5,4,3,2
pub fn validate_cnpj(cnpj: &str) -> bool {
    let digits = to_digits(cnpj);

    if digits.len() != 14 || all_same(&digits) {
        return false;
    }

    let first = cnpj_check_digit(&digits[..12], &[5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]);
    let second = cnpj_check_digit(&digits[..13], &[6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2]);

    digits[12] == first && digits[13] == second
}

/// Validate an identifier of either kind.
pub fn validate_tax_id(tax_id: &str) -> bool {
    match TaxIdKind::classify(tax_id) {
        TaxIdKind::Individual => validate_cpf(tax_id),
        TaxIdKind::Company => validate_cnpj(tax_id),
        TaxIdKind::Unknown => false,
    }
}

/// Format as `000.000.000-00` (CPF) or `00.000.000/0000-00` (CNPJ).
///
/// Identifiers of any other length are returned unchanged.
pub fn format_tax_id(tax_id: &str) -> String {
    let d = digits_only(tax_id);

    match d.len() {
        11 => format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11]),
        14 => format!(
            "{}.{}.{}/{}-{}",
            &d[0..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..14]
        ),
        _ => tax_id.to_string(),
    }
}

fn to_digits(s: &str) -> Vec<u32> {
    s.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn all_same(digits: &[u32]) -> bool {
    digits.windows(2).all(|w| w[0] == w[1])
}

fn cpf_check_digit(digits: &[u32]) -> u32 {
    let start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (start - i as u32))
        .sum();

    match (sum * 10) % 11 {
        10 => 0,
        r => r,
    }
}

fn cnpj_check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights.iter()).map(|(d, w)| d * w).sum();

    match sum % 11 {
        r if r < 2 => 0,
        r => 11 - r,
    }
}
