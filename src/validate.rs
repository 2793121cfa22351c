//! Input validation
//!
//! Pure checks over user-entered strings. An empty string or a literal `"0"`
//! always passes and means "use the estimated default".

/// Validate a non-negative decimal amount with a bounded number of fractional
/// digits. `decimals == 0` disables the fractional part entirely. The value
/// must be nonzero unless it is empty or the literal `"0"`.
pub fn amount(value: &str, decimals: u32) -> bool {
    if value.is_empty() || value == "0" {
        return true;
    }
    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (value, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    // no leading zeros on a nonzero integer part
    if int_part.len() > 1 && int_part.starts_with('0') {
        return false;
    }
    if let Some(frac) = frac_part {
        if decimals == 0
            || frac.is_empty()
            || frac.len() > decimals as usize
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return false;
        }
    }
    // nonzero under numeric coercion: "0.000" is not a valid custom amount
    value.bytes().any(|b| (b'1'..=b'9').contains(&b))
}

/// Validate a fee: a tez amount with up to six fractional digits
pub fn fee(value: &str) -> bool {
    amount(value, 6)
}

/// Validate a gas limit: empty/zero, or a strictly positive integer
pub fn gas(value: &str) -> bool {
    if value.is_empty() || value == "0" {
        return true;
    }
    value.bytes().all(|b| b.is_ascii_digit())
        && value.parse::<u64>().map(|v| v > 0).unwrap_or(false)
}

/// Validate a storage limit: same grammar as a gas limit
pub fn storage(value: &str) -> bool {
    gas(value)
}

/// Validate a lowercase hex string, as returned by a device signer
pub fn hex_string(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Validate a signing derivation path: `44'/1729'` or `44'/1729'/<i>'/...`
pub fn derivation_path(path: &str) -> bool {
    if path == "44'/1729'" {
        return true;
    }
    let Some(rest) = path.strip_prefix("44'/1729") else {
        return false;
    };
    let Some(mut rest) = rest.strip_suffix('\'') else {
        return false;
    };
    let mut seen = false;
    while !rest.is_empty() {
        let Some(r) = rest.strip_prefix("'/") else {
            return false;
        };
        let end = r
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(r.len());
        if end == 0 {
            return false;
        }
        rest = &r[end..];
        seen = true;
    }
    seen
}
