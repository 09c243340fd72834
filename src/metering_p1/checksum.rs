/* CRC-16/ARC as used by DSMR 4+ telegrams: reflected polynomial 0xA001, init 0x0000 */
const POLYNOMIAL: u16 = 0xA001;

/// Folds `bytes` into the running checksum `crc` and returns the new value.
///
/// Starting from `0x0000` and feeding every byte from `/` up to and including
/// `!` yields the value the meter transmits after the `!`.
pub fn accumulate(crc: u16, bytes: &[u8]) -> u16 {
    let mut crc = crc;

    for &byte in bytes {
        crc ^= byte as u16;

        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Parses the four hex digits following `!` on a checksum line.
pub fn parse_transmitted(digits: &[u8]) -> Option<u16> {
    if digits.len() < 4 {
        return None;
    }

    let digits = &digits[..4];
    if !digits.iter().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    /* all four are ascii hex digits, so this is valid utf8 */
    let text = std::str::from_utf8(digits).ok()?;
    u16::from_str_radix(text, 16).ok()
}
