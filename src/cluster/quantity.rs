//! Kubernetes Quantity Parsing
//!
//! Converts resource quantities (`123456Ki`, `1.5Gi`, `250m`, `12345678n`)
//! into plain numbers so usage samples can be rendered the way `kubectl top`
//! renders them.

use crate::error::{Error, Result};

const KI: f64 = 1024.0;

/// Parse a memory quantity into bytes
pub fn parse_memory_bytes(quantity: &str) -> Result<f64> {
    let quantity = quantity.trim();
    let (number, multiplier) = split_suffix(
        quantity,
        &[
            ("Ki", KI),
            ("Mi", KI * KI),
            ("Gi", KI * KI * KI),
            ("Ti", KI * KI * KI * KI),
            ("Pi", KI * KI * KI * KI * KI),
            ("k", 1e3),
            ("M", 1e6),
            ("G", 1e9),
            ("T", 1e12),
            ("m", 1e-3),
        ],
    );

    parse_number(number, quantity).map(|n| n * multiplier)
}

/// Parse a CPU quantity into millicores
pub fn parse_cpu_millis(quantity: &str) -> Result<f64> {
    let quantity = quantity.trim();
    let (number, multiplier) = split_suffix(quantity, &[("n", 1e-6), ("u", 1e-3), ("m", 1.0)]);
    let multiplier = if number.len() == quantity.len() {
        1000.0
    } else {
        multiplier
    };

    parse_number(number, quantity).map(|n| n * multiplier)
}

/// Render bytes as whole mebibytes, e.g. `412Mi`
pub fn format_mebibytes(bytes: f64) -> String {
    format!("{}Mi", (bytes / (KI * KI)).round() as u64)
}

/// Render millicores, e.g. `37m`
pub fn format_millicores(millis: f64) -> String {
    format!("{}m", millis.round() as u64)
}

fn split_suffix<'a>(quantity: &'a str, suffixes: &[(&str, f64)]) -> (&'a str, f64) {
    for (suffix, multiplier) in suffixes {
        if let Some(number) = quantity.strip_suffix(suffix) {
            return (number, *multiplier);
        }
    }
    (quantity, 1.0)
}

fn parse_number(number: &str, quantity: &str) -> Result<f64> {
    number
        .parse::<f64>()
        .map_err(|_| Error::QuantityParse(quantity.to_string()))
}
