use serde::Serialize;
use crate::metering_p1::structs::MeterReading;
use crate::metering_p1::utils::parse_identification_line;


#[derive(Serialize)]
pub struct HaDevice {
    ids: String,
    name: String,
    manufacturer: String,
    model: String,
}
#[derive(Serialize)]
pub struct HaOrigin {
    pub name: String,
    pub sw_version: String,
    pub support_url: String,
}

fn is_none_str(value: &String) -> bool {
    return value.is_empty() || value == "NONE";
}

#[derive(Serialize)]
pub struct HaComponent {
    pub p: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub device_class: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub unit_of_measurement: String,
    pub value_template: String,
    pub unique_id: String,
    pub object_id: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub state_class: String,
}

impl HaComponent {
    /// Sensor reading `value_template` out of the reading document.
    pub fn new_sensor(device: &str, name: &str, device_class: &str, unit: &str, state_class: &str, value_template: String) -> Self {
        let safe_name = name.replace(' ', "_");
        return HaComponent {
            p: "sensor".to_string(),
            name: name.to_string(),
            device_class: device_class.to_string(),
            unit_of_measurement: unit.to_string(),
            value_template,
            unique_id: format!("dsmr2mqtt_{device}_{safe_name}").to_lowercase(),
            object_id: format!("{device}_{safe_name}").to_lowercase(),
            state_class: state_class.to_string(),
        }
    }

    pub fn new_energy(device: &str, name: &str, json_path: &str) -> Self {
        Self::new_sensor(device, name, "energy", "Wh", "total_increasing", format!("{{{{ value_json.{json_path} }}}}"))
    }

    pub fn new_power(device: &str, name: &str, json_path: &str) -> Self {
        Self::new_sensor(device, name, "power", "W", "measurement", format!("{{{{ value_json.{json_path} }}}}"))
    }
}

#[derive(Serialize)]
pub struct HaDiscover {
    pub dev: HaDevice,
    pub o: HaOrigin,
    pub cmps: serde_json::Map<String, serde_json::Value>,
    pub state_topic: String,
    pub qos: u32,
    #[serde(skip_serializing)]
    pub discover_topic: String,
}

impl HaDiscover {
    pub fn new(name: &str, manu: String, model: String, state_topic: &str) -> Self {
        return HaDiscover {
            discover_topic: format!("homeassistant/device/dsmr2mqtt_{name}/config"),
            dev: HaDevice {
                ids: format!("dsmr2mqtt_{name}"),
                name: name.to_string(),
                manufacturer: manu,
                model,
            },
            o: HaOrigin {
                name: "dsmr2mqtt".to_string(),
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
                support_url: "https://www.netbeheernederland.nl/dossiers/slimme-meter-15".to_string()
            },
            cmps: serde_json::Map::new(),
            state_topic: state_topic.to_string(),
            qos: 1
        }
    }

    pub fn add(&mut self, component: HaComponent) {
        if let Ok(value) = serde_json::to_value(&component) {
            self.cmps.insert(component.object_id.clone(), value);
        }
    }

    pub fn get_dev_id(&self) -> String {
        return self.dev.ids.clone();
    }
}

/// Device discovery for a P1 meter, built from its first valid reading.
pub fn p1_discovery(meter_name: &str, reading: &MeterReading, state_topic: &str) -> HaDiscover {
    let (manu, model) = match parse_identification_line(&format!("/{}", reading.meter_identification)) {
        Some(ident) => (ident.manufacturer, ident.model),
        None => ("Unknown".to_string(), "DSMR P1 meter".to_string()),
    };

    let mut disc = HaDiscover::new(meter_name, manu, model, state_topic);

    disc.add(HaComponent::new_energy(meter_name, "Consumption low", "electricity.consumption.low"));
    disc.add(HaComponent::new_energy(meter_name, "Consumption high", "electricity.consumption.high"));
    disc.add(HaComponent::new_energy(meter_name, "Return low", "electricity.return.low"));
    disc.add(HaComponent::new_energy(meter_name, "Return high", "electricity.return.high"));

    disc.add(HaComponent::new_power(meter_name, "Power consumption", "electricity.power.consumption"));
    disc.add(HaComponent::new_power(meter_name, "Power return", "electricity.power.return"));
    for phase in ["l1", "l2", "l3"] {
        let upper = phase.to_uppercase();
        disc.add(HaComponent::new_power(meter_name, &format!("Power consumption {upper}"), &format!("electricity.power.{phase}.consumption")));
        disc.add(HaComponent::new_power(meter_name, &format!("Power return {upper}"), &format!("electricity.power.{phase}.return")));
    }

    disc.add(HaComponent::new_sensor(meter_name, "Tariff", "NONE", "NONE", "NONE",
        "{{ value_json.electricity.tariff }}".to_string()));

    /* gas is delivered in dm3 */
    disc.add(HaComponent::new_sensor(meter_name, "Gas", "gas", "m³", "total_increasing",
        "{{ value_json.gas.total / 1000 }}".to_string()));

    return disc;
}
