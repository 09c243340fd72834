use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentification {
    pub manufacturer: String,
    pub model: String,
    pub full_id: String,
}

/// Latest known value of every field the decoder extracts.
///
/// Fields keep their last successfully parsed value until a later line
/// overwrites them; nothing is reset between telegrams. Energy and gas
/// totals are stored in 1/1000 of the transmitted unit (Wh, 1/1000 m³),
/// power in W.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
pub struct MeterReading {
    pub meter_identification: String,
    pub dsmr_version: u64,
    pub power_timestamp: String,
    pub power_tariff: u64,

    pub consumption_low: u64,
    pub consumption_high: u64,
    pub return_low: u64,
    pub return_high: u64,

    pub power_consumption: u64,
    pub power_return: u64,
    pub power_consumption_l1: u64,
    pub power_consumption_l2: u64,
    pub power_consumption_l3: u64,
    pub power_return_l1: u64,
    pub power_return_l2: u64,
    pub power_return_l3: u64,

    pub gas_timestamp: String,
    pub gas_total: u64,
}

/// Numeric destinations in a `MeterReading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    DsmrVersion,
    PowerTariff,
    ConsumptionLow,
    ConsumptionHigh,
    ReturnLow,
    ReturnHigh,
    PowerConsumption,
    PowerReturn,
    PowerConsumptionL1,
    PowerConsumptionL2,
    PowerConsumptionL3,
    PowerReturnL1,
    PowerReturnL2,
    PowerReturnL3,
    GasTotal,
}

/// Text destinations in a `MeterReading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    PowerTimestamp,
    GasTimestamp,
}

impl MeterReading {
    pub fn set_numeric(&mut self, field: NumericField, value: u64) {
        let slot = match field {
            NumericField::DsmrVersion => &mut self.dsmr_version,
            NumericField::PowerTariff => &mut self.power_tariff,
            NumericField::ConsumptionLow => &mut self.consumption_low,
            NumericField::ConsumptionHigh => &mut self.consumption_high,
            NumericField::ReturnLow => &mut self.return_low,
            NumericField::ReturnHigh => &mut self.return_high,
            NumericField::PowerConsumption => &mut self.power_consumption,
            NumericField::PowerReturn => &mut self.power_return,
            NumericField::PowerConsumptionL1 => &mut self.power_consumption_l1,
            NumericField::PowerConsumptionL2 => &mut self.power_consumption_l2,
            NumericField::PowerConsumptionL3 => &mut self.power_consumption_l3,
            NumericField::PowerReturnL1 => &mut self.power_return_l1,
            NumericField::PowerReturnL2 => &mut self.power_return_l2,
            NumericField::PowerReturnL3 => &mut self.power_return_l3,
            NumericField::GasTotal => &mut self.gas_total,
        };
        *slot = value;
    }

    pub fn numeric(&self, field: NumericField) -> u64 {
        match field {
            NumericField::DsmrVersion => self.dsmr_version,
            NumericField::PowerTariff => self.power_tariff,
            NumericField::ConsumptionLow => self.consumption_low,
            NumericField::ConsumptionHigh => self.consumption_high,
            NumericField::ReturnLow => self.return_low,
            NumericField::ReturnHigh => self.return_high,
            NumericField::PowerConsumption => self.power_consumption,
            NumericField::PowerReturn => self.power_return,
            NumericField::PowerConsumptionL1 => self.power_consumption_l1,
            NumericField::PowerConsumptionL2 => self.power_consumption_l2,
            NumericField::PowerConsumptionL3 => self.power_consumption_l3,
            NumericField::PowerReturnL1 => self.power_return_l1,
            NumericField::PowerReturnL2 => self.power_return_l2,
            NumericField::PowerReturnL3 => self.power_return_l3,
            NumericField::GasTotal => self.gas_total,
        }
    }

    pub fn set_text(&mut self, field: TextField, value: String) {
        match field {
            TextField::PowerTimestamp => self.power_timestamp = value,
            TextField::GasTimestamp => self.gas_timestamp = value,
        }
    }

    pub fn text(&self, field: TextField) -> &str {
        match field {
            TextField::PowerTimestamp => &self.power_timestamp,
            TextField::GasTimestamp => &self.gas_timestamp,
        }
    }
}
