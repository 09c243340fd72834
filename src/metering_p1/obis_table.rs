use super::extractor::{self, Scale};
use super::structs::{MeterReading, NumericField, TextField};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extraction {
    /// Last bracketed number of the line
    Number(NumericField, Scale),
    /// Last bracketed text of the line
    Text(TextField),
    /// Last bracketed number plus the first bracketed text (gas line)
    NumberWithLeadingText(NumericField, Scale, TextField),
}

#[derive(Debug)]
pub struct ObisEntry {
    pub prefix: &'static str,
    pub description: &'static str,
    pub extraction: Extraction,
}

/// DSMR 4 objects taken from a telegram, matched by line prefix.
///
/// No prefix is a prefix of another entry, so at most one entry matches a
/// line. Should that ever change, `lookup` returns the first match.
pub static OBIS_TABLE: &[ObisEntry] = &[
    ObisEntry { prefix: "1-3:0.2.8", description: "DSMR version",
        extraction: Extraction::Number(NumericField::DsmrVersion, Scale::Unscaled) },
    ObisEntry { prefix: "0-0:1.0.0", description: "Date and time",
        extraction: Extraction::Text(TextField::PowerTimestamp) },
    ObisEntry { prefix: "0-0:96.14.0", description: "Tariff indicator",
        extraction: Extraction::Number(NumericField::PowerTariff, Scale::Unscaled) },
    ObisEntry { prefix: "1-0:1.8.1", description: "Energy consumed (tariff 1)",
        extraction: Extraction::Number(NumericField::ConsumptionLow, Scale::Milli) },
    ObisEntry { prefix: "1-0:1.8.2", description: "Energy consumed (tariff 2)",
        extraction: Extraction::Number(NumericField::ConsumptionHigh, Scale::Milli) },
    ObisEntry { prefix: "1-0:2.8.1", description: "Energy returned (tariff 1)",
        extraction: Extraction::Number(NumericField::ReturnLow, Scale::Milli) },
    ObisEntry { prefix: "1-0:2.8.2", description: "Energy returned (tariff 2)",
        extraction: Extraction::Number(NumericField::ReturnHigh, Scale::Milli) },
    ObisEntry { prefix: "1-0:1.7.0", description: "Power consumed",
        extraction: Extraction::Number(NumericField::PowerConsumption, Scale::Milli) },
    ObisEntry { prefix: "1-0:2.7.0", description: "Power returned",
        extraction: Extraction::Number(NumericField::PowerReturn, Scale::Milli) },
    ObisEntry { prefix: "1-0:21.7.0", description: "Power consumed (L1)",
        extraction: Extraction::Number(NumericField::PowerConsumptionL1, Scale::Milli) },
    ObisEntry { prefix: "1-0:41.7.0", description: "Power consumed (L2)",
        extraction: Extraction::Number(NumericField::PowerConsumptionL2, Scale::Milli) },
    ObisEntry { prefix: "1-0:61.7.0", description: "Power consumed (L3)",
        extraction: Extraction::Number(NumericField::PowerConsumptionL3, Scale::Milli) },
    ObisEntry { prefix: "1-0:22.7.0", description: "Power returned (L1)",
        extraction: Extraction::Number(NumericField::PowerReturnL1, Scale::Milli) },
    ObisEntry { prefix: "1-0:42.7.0", description: "Power returned (L2)",
        extraction: Extraction::Number(NumericField::PowerReturnL2, Scale::Milli) },
    ObisEntry { prefix: "1-0:62.7.0", description: "Power returned (L3)",
        extraction: Extraction::Number(NumericField::PowerReturnL3, Scale::Milli) },
    ObisEntry { prefix: "0-1:24.2.1", description: "Gas delivered",
        extraction: Extraction::NumberWithLeadingText(NumericField::GasTotal, Scale::Milli, TextField::GasTimestamp) },
];

pub fn lookup(line: &[u8]) -> Option<&'static ObisEntry> {
    OBIS_TABLE.iter().find(|entry| line.starts_with(entry.prefix.as_bytes()))
}

pub fn description_of(field: NumericField) -> Option<&'static str> {
    OBIS_TABLE.iter().find_map(|entry| match entry.extraction {
        Extraction::Number(f, _) | Extraction::NumberWithLeadingText(f, _, _) if f == field => Some(entry.description),
        _ => None,
    })
}

impl ObisEntry {
    /// Runs the extraction and stores every value that parsed.
    ///
    /// Returns the number of fields written; a failed extraction leaves its
    /// destination untouched.
    pub fn apply(&self, line: &[u8], max_len: usize, reading: &mut MeterReading) -> usize {
        let mut updated = 0;

        match self.extraction {
            Extraction::Number(field, scale) => {
                if let Some(value) = extractor::last_number(line, max_len, scale) {
                    reading.set_numeric(field, value);
                    updated += 1;
                }
            }
            Extraction::Text(field) => {
                if let Some(text) = extractor::text_from_end(line, max_len) {
                    reading.set_text(field, text);
                    updated += 1;
                }
            }
            Extraction::NumberWithLeadingText(field, scale, text_field) => {
                if let Some(value) = extractor::last_number(line, max_len, scale) {
                    reading.set_numeric(field, value);
                    updated += 1;
                }
                if let Some(text) = extractor::text_from_start(line, max_len) {
                    reading.set_text(text_field, text);
                    updated += 1;
                }
            }
        }

        if updated == 0 {
            debug!("No value extracted for {} ({})", self.prefix, self.description);
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /* A-B:C.D.E with every group numeric */
    fn is_obis_code(code: &str) -> bool {
        let Some((ab, cde)) = code.split_once(':') else {
            return false;
        };
        let groups: Vec<&str> = ab.split('-').chain(cde.split('.')).collect();
        groups.len() == 5 && groups.iter().all(|g| g.parse::<u8>().is_ok())
    }

    #[test]
    fn test_table_prefixes_are_obis_codes() {
        for entry in OBIS_TABLE {
            assert!(is_obis_code(entry.prefix), "{} is not an OBIS code", entry.prefix);
        }
    }

    #[test]
    fn test_no_prefix_overlap() {
        for a in OBIS_TABLE {
            for b in OBIS_TABLE {
                if std::ptr::eq(a, b) {
                    continue;
                }
                assert!(!b.prefix.starts_with(a.prefix), "{} shadows {}", a.prefix, b.prefix);
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(b"1-0:1.8.1(000992.992*kWh)\r\n").map(|e| e.prefix), Some("1-0:1.8.1"));
        assert_eq!(lookup(b"1-0:21.7.0(00.100*kW)\r\n").map(|e| e.prefix), Some("1-0:21.7.0"));
        assert_eq!(lookup(b"1-0:2.7.0(00.000*kW)\r\n").map(|e| e.prefix), Some("1-0:2.7.0"));
        assert!(lookup(b"1-0:32.7.0(230.1*V)\r\n").is_none());
        assert!(lookup(b" 1-0:1.8.1(000992.992*kWh)\r\n").is_none());
        assert!(lookup(b"").is_none());
    }

    #[test]
    fn test_apply_gas_line() {
        let mut reading = MeterReading::default();
        let line = b"0-1:24.2.1(150531200000S)(00811.923*m3)\r\n";
        let entry = lookup(line).unwrap();

        assert_eq!(entry.apply(line, line.len(), &mut reading), 2);
        assert_eq!(reading.gas_total, 811923);
        assert_eq!(reading.gas_timestamp, "150531200000S");
    }

    #[test]
    fn test_apply_failure_keeps_previous_value() {
        let mut reading = MeterReading::default();
        reading.consumption_low = 5;
        let line = b"1-0:1.8.1(0009X2.992*kWh)\r\n";

        assert_eq!(lookup(line).unwrap().apply(line, line.len(), &mut reading), 0);
        assert_eq!(reading.consumption_low, 5);
    }

    #[test]
    fn test_description_of() {
        assert_eq!(description_of(NumericField::GasTotal), Some("Gas delivered"));
        assert_eq!(description_of(NumericField::ConsumptionLow), Some("Energy consumed (tariff 1)"));
    }
}
