#![allow(dead_code)]

use std::num::ParseIntError;

/// Parses a string representation of a hexadecimal or decimal number.
///
/// This function attempts to parse the input string as a hexadecimal number if it
/// starts with "0x" or "0X". If it does not, it tries to parse it as a decimal
/// integer.
///
/// # Parameters
///
/// * `s`: A string slice containing the number to be parsed.
///
/// # Returns
///
/// Returns `Ok(u32)` if the parsing is successful, or an error of type `ParseIntError`
/// if the string cannot be parsed as a valid integer.
pub fn hex_parser(s: &str) -> Result<u32, ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse::<u32>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parser_accepts_hex_and_decimal() {
        assert_eq!(hex_parser("0x10").unwrap(), 16);
        assert_eq!(hex_parser("0X10").unwrap(), 16);
        assert_eq!(hex_parser("42").unwrap(), 42);
        assert!(hex_parser("zz").is_err());
    }
}
