pub mod ha_interface;

use std::collections::HashMap;
use lazy_static::lazy_static;
use tokio::sync::RwLock;
use std::io::Error;
use crate::mqtt::ha_interface::HaDiscover;
use crate::config::{ConfigBases, MqttConfig};
use crate::get_config_or_panic;
use crate::metering_p1::structs::MeterReading;
use crate::metering_p1::utils::parse_p1_timestamp;
use log::{debug, error, info};
use tokio::sync::mpsc::{Receiver, Sender};
use serde::{Serialize, Deserialize};
use serde_json::json;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::{Duration, Instant};


#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MqttConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Clone)]
pub struct MqttHealthStatus {
    pub status: MqttConnectionStatus,
    pub last_connected: Option<Instant>,
    pub last_message_sent: Option<Instant>,
    pub connection_attempts: u64,
}

#[derive(Clone)]
pub struct AppStatus {
    pub start_time: Instant,
    pub mqtt_health: MqttHealthStatus,
}

impl MqttHealthStatus {
    pub fn new() -> Self {
        Self {
            status: MqttConnectionStatus::Disconnected,
            last_connected: None,
            last_message_sent: None,
            connection_attempts: 0,
        }
    }
}

impl AppStatus {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            mqtt_health: MqttHealthStatus::new(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub struct PublishData {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

pub struct SubscribeData {
    pub topic: String,
    pub sender: tokio::sync::mpsc::Sender<String>
}

pub enum Transmission {
    Reading(MeterReading),
    AutoDiscovery(HaDiscover),
    Subscribe(SubscribeData),
    Publish(PublishData)
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    client: AsyncClient,
    config: MqttConfig,
}

pub struct Callbacks {
    calls: HashMap<String, Vec<tokio::sync::mpsc::Sender<String>>>,
}

impl Callbacks {
    pub fn new() -> Self {
        return Callbacks { calls: HashMap::new() };
    }

    pub fn insert(&mut self, topic: String, callback: tokio::sync::mpsc::Sender<String>) {
        debug!("Adding callback for topic {topic}");
        self.calls.entry(topic).or_default().push(callback);
    }

    pub async fn send(&self, topic: &str, payload: String) {
        let Some(v) = self.calls.get(topic) else {
            debug!("Send for unknown topic {topic}");
            return;
        };

        for call in v {
            if call.send(payload.clone()).await.is_err() {
                debug!("Callback for {topic} is gone");
            }
        }
    }

    pub fn get_topics(&self) -> Vec<String> {
        return self.calls.keys().cloned().collect();
    }
}

lazy_static! {
    pub static ref CALLBACKS: RwLock<Callbacks> = RwLock::new(Callbacks::new());
    pub static ref APP_STATUS: RwLock<AppStatus> = RwLock::new(AppStatus::new());
}

fn timestamp_value(token: &str) -> serde_json::Value {
    match parse_p1_timestamp(token) {
        Some(ts) => ts.to_rfc3339().into(),
        None => token.into(),
    }
}

/// Nested JSON document published for every valid telegram.
pub fn reading_payload(reading: &MeterReading) -> serde_json::Value {
    json!({
        "meter": {
            "identification": reading.meter_identification,
            "dsmr_version": reading.dsmr_version,
        },
        "electricity": {
            "timestamp": timestamp_value(&reading.power_timestamp),
            "tariff": reading.power_tariff,
            "consumption": { "low": reading.consumption_low, "high": reading.consumption_high },
            "return": { "low": reading.return_low, "high": reading.return_high },
            "power": {
                "consumption": reading.power_consumption,
                "return": reading.power_return,
                "l1": { "consumption": reading.power_consumption_l1, "return": reading.power_return_l1 },
                "l2": { "consumption": reading.power_consumption_l2, "return": reading.power_return_l2 },
                "l3": { "consumption": reading.power_consumption_l3, "return": reading.power_return_l3 },
            },
        },
        "gas": {
            "timestamp": timestamp_value(&reading.gas_timestamp),
            "total": reading.gas_total,
        },
    })
}

fn qos_from(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

impl MqttManager {
    pub fn new() -> Result<(Self, Sender<Transmission>), Error> {
        let config = get_config_or_panic!("mqtt", ConfigBases::Mqtt);
        return Self::with_config(config);
    }

    pub fn with_config(config: MqttConfig) -> Result<(Self, Sender<Transmission>), Error> {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);

        info!("MQTT connection to {}:{} starting up", config.host, config.port);
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        // Spawn a new task to drive the connection and route incoming messages
        let reconnect_c = client.clone();
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let payload = String::from_utf8_lossy(&p.payload).to_string();
                        debug!("Received MQTT message on {}", p.topic);

                        let callbacks = CALLBACKS.read().await;
                        callbacks.send(&p.topic, payload).await;
                    },
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected, resubscribing everything");
                        {
                            let mut app_status = APP_STATUS.write().await;
                            app_status.mqtt_health.status = MqttConnectionStatus::Connected;
                            app_status.mqtt_health.last_connected = Some(Instant::now());
                        }

                        let topics = CALLBACKS.read().await.get_topics();
                        for topic in topics {
                            let client_clone = reconnect_c.clone();
                            tokio::spawn(async move {
                                if let Err(e) = client_clone.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                                    error!("Resubscribing {topic} failed: {e}");
                                }
                            });
                        }
                    },
                    Ok(_) => {},
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting", e);
                        {
                            let mut app_status = APP_STATUS.write().await;
                            app_status.mqtt_health.status = MqttConnectionStatus::Error(e.to_string());
                            app_status.mqtt_health.connection_attempts += 1;
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        return Ok((MqttManager {
            client,
            rx: mrx,
            config,
        }, mtx));
    }

    pub async fn start_thread(&mut self) {
        while let Some(transmission) = self.rx.recv().await {
            match transmission {
                Transmission::Reading(reading) => {
                    let payload = reading_payload(&reading).to_string();
                    debug!("Publishing reading to {}: {}", self.config.topic, payload);

                    match self.client.publish(self.config.topic.clone(), QoS::AtLeastOnce, self.config.retain, payload).await {
                        Err(e) => { error!("Error sending: {}", e); },
                        Ok(_) => {
                            debug!("Send successfully");
                            APP_STATUS.write().await.mqtt_health.last_message_sent = Some(Instant::now());
                        }
                    }
                },
                Transmission::AutoDiscovery(disc) => {
                    info!("Publishing Home Assistant discovery for {}", disc.get_dev_id());
                    match serde_json::to_string(&disc) {
                        Ok(payload) => {
                            let _ = self.client.publish(disc.discover_topic.clone(), QoS::AtLeastOnce, true, payload).await;
                        }
                        Err(e) => error!("Unable to serialize discovery: {e}"),
                    }
                },
                Transmission::Subscribe(subscribe_data) => {
                    let topic = format!("{}/{}", self.config.base_topic, subscribe_data.topic);
                    if self.client.subscribe(topic.clone(), QoS::AtLeastOnce).await.is_ok() {
                        CALLBACKS.write().await.insert(topic.clone(), subscribe_data.sender);
                        info!("Registered Callback {topic}");
                    }
                },
                Transmission::Publish(publish_data) => {
                    match self.client.publish(
                        publish_data.topic,
                        qos_from(publish_data.qos),
                        publish_data.retain,
                        publish_data.payload
                    ).await {
                        Err(e) => { error!("Error publishing: {}", e); },
                        Ok(_) => { debug!("Published successfully"); }
                    }
                },
            };
        }

        info!("All senders gone, MQTT thread exits");
    }
}

pub async fn get_app_status() -> AppStatus {
    APP_STATUS.read().await.clone()
}

pub async fn publish_uptime(mqtt_sender: &Sender<Transmission>, base_topic: &str) {
    let app_status = get_app_status().await;

    let uptime_publish = PublishData {
        topic: format!("{base_topic}/status/uptime"),
        payload: app_status.uptime_seconds().to_string(),
        qos: 1,
        retain: true,
    };
    let _ = mqtt_sender.send(Transmission::Publish(uptime_publish)).await;
}
