use crate::config::{ConfigBases, MqttConfig, P1Config, P1Transport};
use crate::get_config_or_panic;
use crate::mqtt::ha_interface::p1_discovery;
use crate::mqtt::{SubscribeData, Transmission};
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::sync::mpsc::Sender;
use tokio::sync::RwLock;

pub mod checksum;
pub mod extractor;
pub mod obis_table;
pub mod structs;
pub mod decoder;
pub mod line_reader;
pub mod transport;
pub mod utils;

use decoder::{DecoderStats, TelegramDecoder};
use line_reader::{split_lines, LineEvent, LineReader};
use structs::MeterReading;

#[derive(Error, Debug)]
pub enum P1Error {
    #[error("Line of {len} bytes exceeds the limit of {max} bytes")]
    LineTooLong { len: usize, max: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Serial(String),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// What the rest of the application may see of the decoder.
#[derive(Clone, Default, Serialize)]
pub struct P1Status {
    /// Snapshot taken on the last valid telegram
    pub last_reading: Option<MeterReading>,
    pub last_valid_telegram: Option<u64>,
    pub stats: DecoderStats,
}

lazy_static! {
    pub static ref P1_STATUS: RwLock<P1Status> = RwLock::new(P1Status::default());
}

pub async fn get_p1_status() -> P1Status {
    P1_STATUS.read().await.clone()
}

pub struct P1Manager {
    sender: Sender<Transmission>,
    config: P1Config,
    mqtt: MqttConfig,
    decoder: TelegramDecoder,
    discovery_sent: bool,
}

impl P1Manager {
    pub fn new(sender: Sender<Transmission>) -> Self {
        let config = get_config_or_panic!("p1", ConfigBases::P1);
        let mqtt = get_config_or_panic!("mqtt", ConfigBases::Mqtt);
        Self::with_config(sender, config, mqtt)
    }

    pub fn with_config(sender: Sender<Transmission>, config: P1Config, mqtt: MqttConfig) -> Self {
        let decoder = TelegramDecoder::with_max_line_length(config.max_line_length);
        Self {
            sender,
            config,
            mqtt,
            decoder,
            discovery_sent: false,
        }
    }

    pub fn decoder(&self) -> &TelegramDecoder {
        &self.decoder
    }

    pub async fn start_thread(&mut self) {
        info!("Starting P1 thread using {:?} transport", self.config.transport);

        if self.config.transport == P1Transport::Mqtt {
            self.run_mqtt_input().await;
            return;
        }

        loop {
            match transport::open(&self.config).await {
                Ok(stream) => match self.run_stream(stream).await {
                    Ok(()) => warn!("P1 stream closed"),
                    Err(e) => error!("P1 stream failed: {e}"),
                },
                Err(e) => error!("Unable to open P1 transport: {e}"),
            }

            tokio::time::sleep(Duration::from_secs(self.config.reconnect_delay)).await;
            info!("Reopening P1 transport");
        }
    }

    /// Decodes lines until the stream ends.
    pub async fn run_stream<R: AsyncBufRead + Unpin>(&mut self, stream: R) -> Result<(), P1Error> {
        let mut reader = LineReader::new(stream, self.config.max_line_length);

        while let Some(event) = reader.next_event().await? {
            self.handle_event(event).await;
        }
        Ok(())
    }

    async fn run_mqtt_input(&mut self) {
        let (sender, mut receiver) = tokio::sync::mpsc::channel(10);

        let register = Transmission::Subscribe(SubscribeData {
            topic: "p1_input".to_string(),
            sender,
        });
        let _ = self.sender.send(register).await;

        info!("Waiting for P1 telegrams on MQTT");
        while let Some(payload) = receiver.recv().await {
            for event in split_lines(payload.as_bytes(), self.config.max_line_length) {
                self.handle_event(event).await;
            }
        }
        warn!("P1 MQTT input closed");
    }

    /// Feeds one line event to the decoder, publishing on a valid telegram.
    pub async fn handle_event(&mut self, event: LineEvent) -> bool {
        let valid = match event {
            LineEvent::Line(line) => {
                debug!("P1 line: {}", String::from_utf8_lossy(&line).trim_end());
                match self.decoder.decode_line(&line) {
                    Ok(valid) => valid,
                    Err(e) => {
                        warn!("P1 line rejected: {e}");
                        false
                    }
                }
            }
            LineEvent::Overflow(len) => {
                warn!("P1 line of {len} bytes dropped");
                self.decoder.reject_line();
                false
            }
        };

        P1_STATUS.write().await.stats = self.decoder.stats().clone();

        if valid {
            self.publish().await;
        }
        valid
    }

    async fn publish(&mut self) {
        let snapshot = self.decoder.reading().clone();

        {
            let mut status = P1_STATUS.write().await;
            status.last_reading = Some(snapshot.clone());
            status.last_valid_telegram = Some(crate::get_unix_ts());
        }

        if self.mqtt.ha_enabled && !self.discovery_sent {
            let discovery = p1_discovery(&self.config.meter_name, &snapshot, &self.mqtt.topic);
            if self.sender.send(Transmission::AutoDiscovery(discovery)).await.is_ok() {
                self.discovery_sent = true;
            }
        }

        if let Err(e) = self.sender.send(Transmission::Reading(snapshot)).await {
            error!("Unable to hand reading to MQTT: {e}");
        }
    }
}
