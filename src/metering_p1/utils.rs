use super::structs::DeviceIdentification;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use log::debug;

pub fn parse_identification_line(line: &str) -> Option<DeviceIdentification> {
    // Example formats:
    // /KFM5KAIFA-METER
    // /ISk5\2MT382-1000
    // /XMX5LGBBFFB231215493

    let start = line.rfind('/')?;
    let content = line[start + 1..].trim();

    if content.len() < 4 || !content.is_char_boundary(3) {
        return None;
    }

    let identification = DeviceIdentification {
        manufacturer: content[..3].to_uppercase(),
        model: content[3..].to_string(),
        full_id: content.to_string(),
    };

    debug!("Parsed identification - Manufacturer: {}, Model: {}",
           identification.manufacturer, identification.model);

    Some(identification)
}

/// Converts a meter timestamp `YYMMDDhhmmssX` into a date with offset.
///
/// `X` is `S` for summer time (UTC+2) or `W` for winter time (UTC+1).
pub fn parse_p1_timestamp(token: &str) -> Option<DateTime<FixedOffset>> {
    if token.len() != 13 || !token.is_ascii() {
        return None;
    }

    let (stamp, season) = token.split_at(12);
    let offset_hours = match season {
        "S" => 2,
        "W" => 1,
        _ => return None,
    };

    let naive = NaiveDateTime::parse_from_str(stamp, "%y%m%d%H%M%S").ok()?;
    let offset = FixedOffset::east_opt(offset_hours * 3600)?;
    offset.from_local_datetime(&naive).single()
}
