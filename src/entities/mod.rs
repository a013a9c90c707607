pub mod xx1_aux;
pub mod xx1_lan;

use crate::{
    controller::EntityController,
    dispatch::AddressListener,
    registers::Address,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Serialize, Debug, PartialEq, Eq, Copy, Clone)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

#[derive(Serialize, Debug, PartialEq, Eq, Copy, Clone)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    ApparentPower,
    Battery,
    BatteryCharging,
    Connectivity,
    Current,
    Energy,
    Frequency,
    Power,
    Problem,
    ReactivePower,
    Temperature,
    Voltage,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub struct SensorDecoding {
    pub scale: f64,
    pub signed: bool,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: StateClass,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct BinarySensorDecoding {
    pub device_class: Option<DeviceClass>,
    pub on_value: u16,
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub struct NumberDecoding {
    pub scale: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct SelectDecoding {
    pub options: &'static [(u16, &'static str)],
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum EntityKind {
    Sensor(SensorDecoding),
    BinarySensor(BinarySensorDecoding),
    Number(NumberDecoding),
    Select(SelectDecoding),
}

impl EntityKind {
    /// Home Assistant component name.
    pub fn component(&self) -> &'static str {
        match self {
            EntityKind::Sensor(_) => "sensor",
            EntityKind::BinarySensor(_) => "binary_sensor",
            EntityKind::Number(_) => "number",
            EntityKind::Select(_) => "select",
        }
    }
}

/// Static description of one entity and the single register it reads.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct EntityDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub address: Address,
    pub kind: EntityKind,
}

/// Instantaneous sensor reading of one register.
pub(super) const fn measurement(
    key: &'static str,
    name: &'static str,
    address: Address,
    scale: f64,
    signed: bool,
    unit: &'static str,
    device_class: DeviceClass,
) -> EntityDescriptor {
    EntityDescriptor {
        key,
        name,
        address,
        kind: EntityKind::Sensor(SensorDecoding {
            scale,
            signed,
            unit: Some(unit),
            device_class: Some(device_class),
            state_class: StateClass::Measurement,
        }),
    }
}

#[derive(Serialize, Debug, PartialEq, Clone)]
#[serde(untagged)]
pub enum EntityValue {
    Number(f64),
    Flag(bool),
    Label(&'static str),
}

impl EntityValue {
    /// Payload published on the state topic.
    pub fn to_payload(&self) -> String {
        match self {
            EntityValue::Number(n) => n.to_string(),
            EntityValue::Flag(true) => "ON".to_owned(),
            EntityValue::Flag(false) => "OFF".to_owned(),
            EntityValue::Label(o) => (*o).to_owned(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum EntityError {
    #[error("no value has been read yet for register {0}")]
    NoData(Address),

    #[error("register {address} holds {raw}, which is not a known option of {key}")]
    UnknownRawOption { key: &'static str, address: Address, raw: u16 },

    #[error("{key} is read-only")]
    ReadOnly { key: &'static str },

    #[error("invalid value {payload:?} for {key}")]
    InvalidPayload { key: &'static str, payload: String },

    #[error("{value} is outside {min}..={max} for {key}")]
    OutOfRange { key: &'static str, value: f64, min: f64, max: f64 },

    #[error("state channel closed")]
    StateChannelClosed,
}

fn round_scaled(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

impl EntityDescriptor {
    pub fn decode(&self, raw: u16) -> Result<EntityValue, EntityError> {
        match self.kind {
            EntityKind::Sensor(sensor) => {
                let value = if sensor.signed { f64::from(raw as i16) } else { f64::from(raw) };
                Ok(EntityValue::Number(round_scaled(value * sensor.scale)))
            },
            EntityKind::BinarySensor(binary) => Ok(EntityValue::Flag(raw == binary.on_value)),
            EntityKind::Number(number) => Ok(EntityValue::Number(round_scaled(f64::from(raw) * number.scale))),
            EntityKind::Select(select) => select
                .options
                .iter()
                .find(|(value, _)| *value == raw)
                .map(|(_, label)| EntityValue::Label(*label))
                .ok_or(EntityError::UnknownRawOption {
                    key: self.key,
                    address: self.address,
                    raw,
                }),
        }
    }

    /// Converts an incoming command payload into the raw register value to write.
    pub fn encode(&self, payload: &str) -> Result<u16, EntityError> {
        let invalid = || EntityError::InvalidPayload {
            key: self.key,
            payload: payload.to_owned(),
        };

        match self.kind {
            EntityKind::Number(number) => {
                let value: f64 = payload.trim().parse().map_err(|_| invalid())?;

                if !value.is_finite() {
                    return Err(invalid());
                }

                if value < number.min || value > number.max {
                    return Err(EntityError::OutOfRange {
                        key: self.key,
                        value,
                        min: number.min,
                        max: number.max,
                    });
                }

                let raw = (value / number.scale).round();
                if raw < 0.0 || raw > f64::from(u16::MAX) {
                    return Err(invalid());
                }

                Ok(raw as u16)
            },
            EntityKind::Select(select) => select
                .options
                .iter()
                .find(|(_, label)| *label == payload)
                .map(|(value, _)| *value)
                .ok_or_else(invalid),
            EntityKind::Sensor(_) | EntityKind::BinarySensor(_) => Err(EntityError::ReadOnly { key: self.key }),
        }
    }
}

/// Per-inverter context handed to every constructed entity.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InverterDetails {
    pub friendly_name: String,
    pub model: String,
    pub connection_type: String,
}

impl InverterDetails {
    pub fn device_name(&self) -> String {
        if self.friendly_name.is_empty() {
            "FoxESS - Modbus".to_owned()
        } else {
            format!("FoxESS - Modbus ({})", self.friendly_name)
        }
    }

    pub fn device_model(&self) -> String {
        format!("{} - {}", self.model, self.connection_type)
    }

    pub fn device_identifier(&self) -> String {
        if self.friendly_name.is_empty() {
            format!("foxess_modbus_{}_{}", self.model, self.connection_type)
        } else {
            format!("foxess_modbus_{}_{}_{}", self.model, self.connection_type, self.friendly_name)
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct EntityState {
    pub unique_id: String,
    pub value: EntityValue,
}

#[derive(Debug, Clone)]
pub struct EntityContext {
    pub details: Arc<InverterDetails>,
    pub states: mpsc::UnboundedSender<EntityState>,
}

pub struct ModbusEntity {
    controller: Arc<EntityController>,
    descriptor: EntityDescriptor,
    context: EntityContext,
}

impl ModbusEntity {
    pub fn new(controller: Arc<EntityController>, descriptor: EntityDescriptor, context: EntityContext) -> Self {
        Self {
            controller,
            descriptor,
            context,
        }
    }

    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn details(&self) -> &InverterDetails {
        &self.context.details
    }

    pub fn controller(&self) -> &Arc<EntityController> {
        &self.controller
    }

    pub fn unique_id(&self) -> String {
        let friendly_name = &self.context.details.friendly_name;

        if friendly_name.is_empty() {
            format!("foxess_modbus_{}", self.descriptor.key)
        } else {
            format!("foxess_modbus_{friendly_name}_{}", self.descriptor.key)
        }
    }

    pub fn name(&self) -> String {
        let friendly_name = &self.context.details.friendly_name;

        if friendly_name.is_empty() {
            self.descriptor.name.to_owned()
        } else {
            format!("{} ({friendly_name})", self.descriptor.name)
        }
    }

    pub fn current_value(&self) -> Result<EntityValue, EntityError> {
        let raw = self
            .controller
            .value(self.descriptor.address)
            .ok_or(EntityError::NoData(self.descriptor.address))?;

        self.descriptor.decode(raw)
    }
}

impl AddressListener for ModbusEntity {
    fn responds_to_address(&self, address: Address) -> bool {
        self.descriptor.address == address
    }

    fn refresh(&self) -> Result<(), EntityError> {
        let value = self.current_value()?;

        self.context
            .states
            .send(EntityState {
                unique_id: self.unique_id(),
                value,
            })
            .map_err(|_| EntityError::StateChannelClosed)
    }

    fn describe(&self) -> String {
        self.unique_id()
    }
}
