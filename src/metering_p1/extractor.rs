//! Bracket-delimited value extraction from a single telegram line.
//!
//! OBIS prefixes have fixed lengths, so the opening bracket of a well-formed
//! line always lands in a narrow window. Anything outside the windows below
//! is treated as a malformed line and produces no value.

use log::debug;

/// Window for the opening bracket of a numeric value, e.g. `1-0:1.8.1(`.
pub const NUMBER_BRACKET_MIN: usize = 8;
pub const NUMBER_BRACKET_MAX: usize = 32;
/// Maximum characters between `(` and `*` (or `)`).
pub const NUMBER_TOKEN_MAX: usize = 12;

pub const TEXT_BRACKET_MIN: usize = 8;
/// Window end for a text token searched from the end of the line.
pub const TEXT_END_BRACKET_MAX: usize = 39;
/// Window end for a text token searched from the start of the line.
pub const TEXT_START_BRACKET_MAX: usize = 12;
pub const TEXT_TOKEN_MAX: usize = 31;

/* Number of decimals kept when normalising to integer sub-units */
const MILLI_DIGITS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// Value used as transmitted, e.g. the DSMR version `42`
    Unscaled,
    /// Value multiplied by 1000, e.g. `000992.992` kWh becomes `992992` Wh
    Milli,
}

/* Limits the line to max_len and cuts the trailing line terminator */
fn content(line: &[u8], max_len: usize) -> &[u8] {
    let mut end = max_len.min(line.len());
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn find_last(line: &[u8], search: u8) -> Option<usize> {
    line.iter().rposition(|&c| c == search)
}

fn find_first(line: &[u8], search: u8, from: usize) -> Option<usize> {
    line.iter().skip(from).position(|&c| c == search).map(|p| p + from)
}

/// Reads the last bracketed number of a line like `1-0:1.8.1(000992.992*kWh)`.
///
/// The value ends at the last `*` (unit separator) or, when there is no
/// unit, at the last `)`. Returns `None` for anything malformed; callers
/// must then leave their destination untouched.
pub fn last_number(line: &[u8], max_len: usize, scale: Scale) -> Option<u64> {
    let line = content(line, max_len);

    let start = find_last(line, b'(')?;
    if !(NUMBER_BRACKET_MIN..=NUMBER_BRACKET_MAX).contains(&start) {
        debug!("Number bracket at {start} is outside the expected window");
        return None;
    }

    let end = find_last(line, b'*').or_else(|| find_last(line, b')'))?;
    if end <= start {
        return None;
    }

    let token = &line[start + 1..end];
    if token.is_empty() || token.len() > NUMBER_TOKEN_MAX {
        debug!("Number token of {} characters rejected", token.len());
        return None;
    }

    parse_decimal(token, scale)
}

/// Parses digits with at most one decimal point.
///
/// Decimals beyond the third are truncated in `Milli` mode and dropped
/// entirely in `Unscaled` mode.
pub fn parse_decimal(token: &[u8], scale: Scale) -> Option<u64> {
    let mut integer: u64 = 0;
    let mut fraction: u64 = 0;
    let mut fraction_digits: u32 = 0;
    let mut digits = 0;
    let mut seen_point = false;

    for &c in token {
        match c {
            b'0'..=b'9' => {
                let digit = (c - b'0') as u64;
                if !seen_point {
                    integer = integer.checked_mul(10)?.checked_add(digit)?;
                } else if fraction_digits < MILLI_DIGITS {
                    fraction = fraction * 10 + digit;
                    fraction_digits += 1;
                }
                digits += 1;
            }
            b'.' if !seen_point => seen_point = true,
            _ => {
                debug!("Invalid character {:?} in number token", c as char);
                return None;
            }
        }
    }

    if digits == 0 {
        return None;
    }

    match scale {
        Scale::Unscaled => Some(integer),
        Scale::Milli => {
            let fraction = fraction * 10u64.pow(MILLI_DIGITS - fraction_digits);
            integer.checked_mul(1000)?.checked_add(fraction)
        }
    }
}

/// Reads the last bracketed text of a line like `0-0:1.0.0(101209113020W)`.
pub fn text_from_end(line: &[u8], max_len: usize) -> Option<String> {
    let line = content(line, max_len);

    let start = find_last(line, b'(')?;
    if !(TEXT_BRACKET_MIN..=TEXT_END_BRACKET_MAX).contains(&start) {
        return None;
    }

    let end = find_last(line, b')')?;
    if end <= start {
        return None;
    }

    text_token(&line[start + 1..end])
}

/// Reads the first bracketed text of a line, e.g. the timestamp in
/// `0-1:24.2.1(150531200000S)(00811.923*m3)`.
pub fn text_from_start(line: &[u8], max_len: usize) -> Option<String> {
    let line = content(line, max_len);

    let start = find_first(line, b'(', 0)?;
    if !(TEXT_BRACKET_MIN..=TEXT_START_BRACKET_MAX).contains(&start) {
        return None;
    }

    let end = find_first(line, b')', start + 1)?;
    text_token(&line[start + 1..end])
}

fn text_token(token: &[u8]) -> Option<String> {
    if token.is_empty() || token.len() > TEXT_TOKEN_MAX {
        return None;
    }

    if !token.iter().all(|c| c.is_ascii_graphic() || *c == b' ') {
        return None;
    }

    String::from_utf8(token.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 250;

    #[test]
    fn test_scaled_energy_value() {
        let line = b"1-0:1.8.1(000992.992*kWh)\r\n";
        assert_eq!(last_number(line, line.len(), Scale::Milli), Some(992992));
    }

    #[test]
    fn test_unscaled_without_unit() {
        let line = b"1-3:0.2.8(42)\r\n";
        assert_eq!(last_number(line, line.len(), Scale::Unscaled), Some(42));
        assert_eq!(last_number(b"1-3:0.2.8(42)", MAX, Scale::Unscaled), Some(42));
        assert_eq!(last_number(b"0-0:96.14.0(0002)\r\n", MAX, Scale::Unscaled), Some(2));
    }

    #[test]
    fn test_power_in_kw_becomes_watt() {
        assert_eq!(last_number(b"1-0:1.7.0(00.424*kW)\r\n", MAX, Scale::Milli), Some(424));
        assert_eq!(last_number(b"1-0:61.7.0(01.2*kW)\r\n", MAX, Scale::Milli), Some(1200));
    }

    #[test]
    fn test_gas_value_uses_last_bracket() {
        let line = b"0-1:24.2.1(150531200000S)(00811.923*m3)\r\n";
        assert_eq!(last_number(line, MAX, Scale::Milli), Some(811923));
    }

    #[test]
    fn test_bracket_outside_window() {
        /* '(' at position 7 */
        assert_eq!(last_number(b"1-0:1.8(000992.992*kWh)\r\n", MAX, Scale::Milli), None);
        /* '(' at position 33 */
        let line = format!("{}(1*kWh)\r\n", "1".repeat(33));
        assert_eq!(last_number(line.as_bytes(), MAX, Scale::Milli), None);
        /* '(' at position 32 */
        let line = format!("{}(1*kWh)\r\n", "1".repeat(32));
        assert_eq!(last_number(line.as_bytes(), MAX, Scale::Milli), Some(1000));
    }

    #[test]
    fn test_no_bracket() {
        assert_eq!(last_number(b"1-0:1.8.1 000992.992\r\n", MAX, Scale::Milli), None);
        assert_eq!(last_number(b"\r\n", MAX, Scale::Milli), None);
        assert_eq!(last_number(b"", MAX, Scale::Milli), None);
    }

    #[test]
    fn test_non_numeric_content() {
        assert_eq!(last_number(b"1-0:1.8.1(0009X2.992*kWh)\r\n", MAX, Scale::Milli), None);
        assert_eq!(last_number(b"1-0:1.8.1(-00992.992*kWh)\r\n", MAX, Scale::Milli), None);
        assert_eq!(last_number(b"1-0:1.8.1(00.992.992*kWh)\r\n", MAX, Scale::Milli), None);
        assert_eq!(last_number(b"1-0:1.8.1(.*kWh)\r\n", MAX, Scale::Milli), None);
    }

    #[test]
    fn test_token_length_boundaries() {
        assert_eq!(last_number(b"1-0:1.8.1(*kWh)\r\n", MAX, Scale::Milli), None);
        assert_eq!(last_number(b"1-0:1.8.1()\r\n", MAX, Scale::Unscaled), None);
        assert_eq!(last_number(b"1-0:1.8.1(7*kWh)\r\n", MAX, Scale::Milli), Some(7000));
        assert_eq!(last_number(b"1-0:1.8.1(123456789012*kWh)\r\n", MAX, Scale::Unscaled), Some(123456789012));
        assert_eq!(last_number(b"1-0:1.8.1(12345678.123*kWh)\r\n", MAX, Scale::Milli), Some(12345678123));
        assert_eq!(last_number(b"1-0:1.8.1(1234567890123*kWh)\r\n", MAX, Scale::Unscaled), None);
    }

    #[test]
    fn test_unit_before_bracket_rejected() {
        assert_eq!(last_number(b"1-0:1*8.1(000992.992)\r\n", MAX, Scale::Milli), None);
    }

    #[test]
    fn test_max_len_is_respected() {
        let line = b"1-0:1.8.1(000992.992*kWh)\r\n";
        /* cut inside the token: the '*' is gone and there is no ')' */
        assert_eq!(last_number(line, 15, Scale::Milli), None);
        assert_eq!(last_number(line, 1000, Scale::Milli), Some(992992));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(b"000992.992", Scale::Milli), Some(992992));
        assert_eq!(parse_decimal(b"1.5", Scale::Milli), Some(1500));
        assert_eq!(parse_decimal(b"1.23456", Scale::Milli), Some(1234));
        assert_eq!(parse_decimal(b"12.", Scale::Milli), Some(12000));
        assert_eq!(parse_decimal(b".5", Scale::Milli), Some(500));
        assert_eq!(parse_decimal(b"12.9", Scale::Unscaled), Some(12));
        assert_eq!(parse_decimal(b"", Scale::Unscaled), None);
        assert_eq!(parse_decimal(b"1 2", Scale::Unscaled), None);
    }

    #[test]
    fn test_text_from_end() {
        assert_eq!(text_from_end(b"0-0:1.0.0(101209113020W)\r\n", MAX), Some("101209113020W".to_string()));
        assert_eq!(text_from_end(b"0-0:1.0.0()\r\n", MAX), None);
        assert_eq!(text_from_end(b"0-0:1.0.0(101209113020W\r\n", MAX), None);
        assert_eq!(text_from_end(b"0-0(101209113020W)\r\n", MAX), None);
        let long = format!("0-0:1.0.0({})\r\n", "A".repeat(32));
        assert_eq!(text_from_end(long.as_bytes(), MAX), None);
        let longest = format!("0-0:1.0.0({})\r\n", "A".repeat(31));
        assert_eq!(text_from_end(longest.as_bytes(), MAX), Some("A".repeat(31)));
    }

    #[test]
    fn test_text_from_start() {
        let line = b"0-1:24.2.1(150531200000S)(00811.923*m3)\r\n";
        assert_eq!(text_from_start(line, MAX), Some("150531200000S".to_string()));
        assert_eq!(text_from_start(b"0-1:24.2.1 (150531200000S)(00811.923*m3)\r\n", MAX), Some("150531200000S".to_string()));
        assert_eq!(text_from_start(b"0-1:24.2.1   (150531200000S)\r\n", MAX), None);
        assert_eq!(text_from_start(b"0-1:24.2.1(150531200000S\r\n", MAX), None);
    }

    #[test]
    fn test_text_rejects_control_characters() {
        assert_eq!(text_from_end(b"0-0:1.0.0(1012\x0709113020W)\r\n", MAX), None);
    }
}
