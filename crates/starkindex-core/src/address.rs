//! Address canonicalization.
//!
//! Configuration files and chain data disagree on how a felt address is
//! written (`0x49d3…`, `0x049D3…`, zero-padded to 64 digits). Every comparison
//! and every storage/topic key goes through [`normalize_address`].

/// Number of hex digits in a padded Starknet felt.
pub const FELT_HEX_DIGITS: usize = 64;

/// Canonical form: `0x` prefix, lowercase, left-padded with zeros to
/// [`FELT_HEX_DIGITS`] digits.
pub fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .trim_start_matches('0')
        .to_ascii_lowercase();
    format!("0x{digits:0>width$}", width = FELT_HEX_DIGITS)
}

/// Returns `true` if both strings denote the same address.
pub fn same_address(a: &str, b: &str) -> bool {
    normalize_address(a) == normalize_address(b)
}
