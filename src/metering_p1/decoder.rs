use super::checksum;
use super::line_reader::{LineBuffer, DEFAULT_MAX_LINE_LENGTH};
use super::obis_table;
use super::structs::MeterReading;
use super::utils::parse_identification_line;
use super::P1Error;
use log::{debug, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingStart,
    InTelegram,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
pub struct DecoderStats {
    pub lines: u64,
    pub telegrams_valid: u64,
    pub telegrams_invalid: u64,
    pub lines_rejected: u64,
}

/// Line driven DSMR telegram decoder.
///
/// Every line is folded into the running CRC and, if its prefix is known,
/// parsed into the owned `MeterReading`. Only the `!` line closing a
/// telegram that started with `/` and whose CRC matches reports `true`.
pub struct TelegramDecoder {
    state: DecoderState,
    crc: u16,
    /* set when a line of the current telegram had to be dropped */
    corrupted: bool,
    buffer: LineBuffer,
    reading: MeterReading,
    stats: DecoderStats,
}

impl Default for TelegramDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramDecoder {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            state: DecoderState::AwaitingStart,
            crc: 0,
            corrupted: false,
            buffer: LineBuffer::with_capacity(max_line_length),
            reading: MeterReading::default(),
            stats: DecoderStats::default(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn reading(&self) -> &MeterReading {
        &self.reading
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Decodes one line including its terminator.
    ///
    /// Returns `Ok(true)` only for the checksum line of a valid telegram. A
    /// line longer than the buffer is refused with `LineTooLong` and spoils
    /// the telegram it belongs to.
    pub fn decode_line(&mut self, line: &[u8]) -> Result<bool, P1Error> {
        self.stats.lines += 1;

        if let Err(e) = self.buffer.fill(line) {
            self.reject_line();
            return Err(e);
        }

        Ok(self.decode_buffered())
    }

    /// Records a line the line source had to drop.
    pub fn reject_line(&mut self) {
        self.stats.lines_rejected += 1;
        if self.state == DecoderState::InTelegram {
            debug!("Current telegram will fail, a line was dropped");
            self.corrupted = true;
        }
    }

    fn decode_buffered(&mut self) -> bool {
        let line = self.buffer.as_bytes();

        /* Start of telegram, restart the CRC at the '/' */
        if let Some(start) = line.iter().rposition(|&c| c == b'/') {
            if self.state == DecoderState::InTelegram {
                warn!("New telegram started before the previous one was closed");
            }

            self.crc = checksum::accumulate(0, &line[start..]);
            self.state = DecoderState::InTelegram;
            self.corrupted = false;

            if let Some(ident) = parse_identification_line(&String::from_utf8_lossy(&line[start..])) {
                self.reading.meter_identification = ident.full_id;
            }
            return false;
        }

        /* End of telegram, the '!' is the last byte covered by the CRC */
        if let Some(end) = line.iter().rposition(|&c| c == b'!') {
            self.crc = checksum::accumulate(self.crc, &line[end..=end]);
            let transmitted = checksum::parse_transmitted(&line[end + 1..]);

            let valid = match (self.state, transmitted) {
                (DecoderState::AwaitingStart, _) => {
                    debug!("Checksum line without telegram start");
                    false
                }
                (DecoderState::InTelegram, _) if self.corrupted => {
                    warn!("Telegram dropped, it contained an oversized line");
                    false
                }
                (DecoderState::InTelegram, Some(crc)) if crc == self.crc => {
                    info!("Valid telegram received (CRC {:04X})", crc);
                    true
                }
                (DecoderState::InTelegram, Some(crc)) => {
                    warn!("Telegram CRC mismatch: transmitted {:04X}, calculated {:04X}", crc, self.crc);
                    false
                }
                (DecoderState::InTelegram, None) => {
                    warn!("Telegram checksum line without valid CRC digits");
                    false
                }
            };

            if valid {
                self.stats.telegrams_valid += 1;
            } else {
                self.stats.telegrams_invalid += 1;
            }

            self.crc = 0;
            self.state = DecoderState::AwaitingStart;
            self.corrupted = false;
            return valid;
        }

        self.crc = checksum::accumulate(self.crc, line);

        if let Some(entry) = obis_table::lookup(line) {
            entry.apply(line, line.len(), &mut self.reading);
        }
        false
    }
}
