use lazy_static::lazy_static;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;

use crate::metering_p1::line_reader::DEFAULT_MAX_LINE_LENGTH;

/* Looked up in this order */
const CONFIG_PATHS: [&str; 2] = ["config/p1.yaml", "p1.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("No config file found, tried {0}")]
    NotFound(String),
}

fn httpd_enabled_default() -> bool { return true }
fn httpd_port_default() -> u16 { return 8241 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct HttpdConfig {
    #[serde(default="httpd_enabled_default")]
    pub enabled: bool,
    #[serde(default="httpd_port_default")]
    pub port: u16
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "dsmr2mqtt".to_string() }
fn mqtt_topic_default() -> String { return "sensor/dsmr".to_string() }
fn mqtt_base_topic_default() -> String { return "dsmr2mqtt".to_string() }
fn mqtt_retain_default() -> bool { return true }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    /* empty user means anonymous */
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    /// Topic the meter reading document is published to
    #[serde(default="mqtt_topic_default")]
    pub topic: String,
    /// Prefix for our own topics (raw input, status)
    #[serde(default="mqtt_base_topic_default")]
    pub base_topic: String,
    #[serde(default="mqtt_retain_default")]
    pub retain: bool,
    #[serde(default)]
    pub ha_enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub enum P1Transport {
    Serial,
    Tcp,
    Mqtt,
}

fn p1_transport_default() -> P1Transport { P1Transport::Serial }
fn p1_device_default() -> String { "/dev/ttyUSB0".to_string() }
fn p1_baud_rate_default() -> u32 { 115200 }
fn p1_max_line_length_default() -> usize { DEFAULT_MAX_LINE_LENGTH }
fn p1_reconnect_delay_default() -> u64 { 5 }
fn p1_meter_name_default() -> String { "p1_meter".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct P1Config {
    #[serde(default="p1_transport_default")]
    pub transport: P1Transport,
    #[serde(default="p1_device_default")]
    pub device: String,
    #[serde(default="p1_baud_rate_default")]
    pub baud_rate: u32,
    pub host: Option<String>,       // Tcp only
    pub port: Option<u16>,          // Tcp only
    #[serde(default="p1_max_line_length_default")]
    pub max_line_length: usize,
    #[serde(default="p1_reconnect_delay_default")]
    pub reconnect_delay: u64,       // Seconds before reopening the transport
    #[serde(default="p1_meter_name_default")]
    pub meter_name: String,
}

fn httpd_default() -> HttpdConfig { return HttpdConfig { enabled: httpd_enabled_default(), port: httpd_port_default() } }
fn p1_default() -> P1Config {
    return P1Config {
        transport: p1_transport_default(),
        device: p1_device_default(),
        baud_rate: p1_baud_rate_default(),
        host: None,
        port: None,
        max_line_length: p1_max_line_length_default(),
        reconnect_delay: p1_reconnect_delay_default(),
        meter_name: p1_meter_name_default(),
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default="httpd_default")]
    pub httpd: HttpdConfig,
    pub mqtt: MqttConfig,
    #[serde(default="p1_default")]
    pub p1: P1Config,
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        return Ok(serde_yml::from_str(contents)?);
    }

    /// Copy safe to hand out, the broker password is masked.
    pub fn redacted(&self) -> Config {
        let mut c = self.clone();
        if !c.mqtt.pass.is_empty() {
            c.mqtt.pass = "********".to_string();
        }
        return c;
    }
}

pub struct ConfigHolder {
    pub config: Config,
    pub base_path: String,
}

pub enum ConfigBases {
    Httpd(HttpdConfig),
    Mqtt(MqttConfig),
    P1(P1Config),
}

impl ConfigHolder {
    pub fn load() -> Self {
        match Self::find_and_load(&CONFIG_PATHS) {
            Ok(holder) => holder,
            Err(e) => panic!("Unable to load the config on config/p1.yaml or p1.yaml: {e}"),
        }
    }

    pub fn find_and_load(paths: &[&str]) -> Result<Self, ConfigError> {
        for path in paths {
            if Path::new(path).exists() {
                return Self::load_from(path);
            }
            debug!("No config at {path}");
        }
        return Err(ConfigError::NotFound(paths.join(", ")));
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = Config::from_yaml(&contents)?;

        let base_path = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        info!("Config loaded from {path}");
        return Ok(ConfigHolder { config, base_path });
    }

    pub fn get_copy(&self, base: &str) -> Result<ConfigBases, Box<dyn Error>> {
        match base {
            "httpd" => { return Ok(ConfigBases::Httpd(self.config.httpd.clone())) },
            "mqtt" => { return Ok(ConfigBases::Mqtt(self.config.mqtt.clone())) },
            "p1" => { return Ok(ConfigBases::P1(self.config.p1.clone())) },
            _ => { Err("Type not known")? }
        }
    }

    pub fn get_complete_config(&self) -> Config {
        return self.config.clone();
    }
}

lazy_static! {
    pub static ref CONFIG: RwLock<ConfigHolder> = RwLock::new(ConfigHolder::load());
}

#[macro_export]
macro_rules! get_config_or_panic {
    ($base: expr, $pat: path) => {
        {
            let c = $crate::CONFIG.read().unwrap().get_copy($base).unwrap();
            if let $pat(a) = c {
                a
            } else {
                panic!(
                    "mismatch variant when cast to {}",
                    stringify!($pat));
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = "
mqtt:
  host: 192.168.1.30
";

    #[test]
    fn test_defaults() {
        let c = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(c.mqtt.host, "192.168.1.30");
        assert_eq!(c.mqtt.port, 1883);
        assert_eq!(c.mqtt.topic, "sensor/dsmr");
        assert!(c.mqtt.retain);
        assert!(!c.mqtt.ha_enabled);
        assert!(c.httpd.enabled);
        assert_eq!(c.httpd.port, 8241);
        assert_eq!(c.p1.transport, P1Transport::Serial);
        assert_eq!(c.p1.device, "/dev/ttyUSB0");
        assert_eq!(c.p1.baud_rate, 115200);
        assert_eq!(c.p1.max_line_length, 250);
    }

    #[test]
    fn test_full_config() {
        let yaml = "
mqtt:
  host: broker
  port: 8883
  user: homeassistant
  pass: secret
  client_name: dsmr4
  topic: home/energy
  ha_enabled: true
httpd:
  enabled: false
p1:
  transport: Tcp
  host: p1-bridge.local
  port: 2001
  max_line_length: 512
";
        let c = Config::from_yaml(yaml).unwrap();
        assert_eq!(c.mqtt.client_name, "dsmr4");
        assert_eq!(c.mqtt.topic, "home/energy");
        assert!(!c.httpd.enabled);
        assert_eq!(c.p1.transport, P1Transport::Tcp);
        assert_eq!(c.p1.host.as_deref(), Some("p1-bridge.local"));
        assert_eq!(c.p1.port, Some(2001));
        assert_eq!(c.p1.max_line_length, 512);
    }

    #[test]
    fn test_missing_mqtt_is_an_error() {
        assert!(matches!(Config::from_yaml("p1:\n  device: /dev/ttyAMA0\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_redacted() {
        let mut c = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(c.redacted().mqtt.pass, "");
        c.mqtt.pass = "secret".to_string();
        assert_eq!(c.redacted().mqtt.pass, "********");
        assert_eq!(c.mqtt.pass, "secret");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p1.yaml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let path = path.to_string_lossy().to_string();
        let holder = ConfigHolder::find_and_load(&["does/not/exist.yaml", path.as_str()]).unwrap();
        assert_eq!(holder.config.mqtt.host, "192.168.1.30");
        assert_eq!(holder.base_path, dir.path().to_string_lossy());

        match holder.get_copy("p1").unwrap() {
            ConfigBases::P1(p1) => assert_eq!(p1.meter_name, "p1_meter"),
            _ => panic!("wrong config base"),
        }
        assert!(holder.get_copy("modbus").is_err());
    }

    #[test]
    fn test_not_found() {
        assert!(matches!(ConfigHolder::find_and_load(&["nope/p1.yaml"]), Err(ConfigError::NotFound(_))));
    }
}
