//! Inverter models, the connection types they support, and what each combination exposes.

use crate::{
    controller::EntityController,
    entities::{xx1_aux, xx1_lan, EntityContext, EntityDescriptor, ModbusEntity},
    registers::{self, Address, AddressRangeSet, PlanError, ReadPlan, RegisterType},
};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ConnectionType {
    pub key: &'static str,
    pub register_type: RegisterType,
}

pub const AUX: ConnectionType = ConnectionType {
    key: "AUX",
    register_type: RegisterType::Input,
};

pub const LAN: ConnectionType = ConnectionType {
    key: "LAN",
    register_type: RegisterType::Holding,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
    #[error("unknown inverter model {0:?}")]
    UnknownModel(String),

    #[error("inverter model {model:?} does not support connection type {connection_type:?}")]
    UnknownConnectionType { model: String, connection_type: String },
}

/// What an inverter model exposes when connected to over one particular interface.
#[derive(Debug, Clone)]
pub struct InverterCapabilityProfile {
    pub connection_type: ConnectionType,
    pub sensors: Vec<EntityDescriptor>,
    pub binary_sensors: Vec<EntityDescriptor>,
    pub numbers: Vec<EntityDescriptor>,
    pub selects: Vec<EntityDescriptor>,
    address_ranges: AddressRangeSet,
}

impl InverterCapabilityProfile {
    pub fn new(
        connection_type: ConnectionType,
        sensors: Vec<EntityDescriptor>,
        binary_sensors: Vec<EntityDescriptor>,
        numbers: Vec<EntityDescriptor>,
        selects: Vec<EntityDescriptor>,
        address_ranges: AddressRangeSet,
    ) -> Self {
        Self {
            connection_type,
            sensors,
            binary_sensors,
            numbers,
            selects,
            address_ranges,
        }
    }

    pub fn address_ranges(&self) -> &AddressRangeSet {
        &self.address_ranges
    }

    pub fn contains_address(&self, address: Address) -> bool {
        self.address_ranges.contains(address)
    }

    /// Reads covering every register of this profile, none longer than `max_read`.
    pub fn create_read_plan(&self, max_read: u32) -> Result<ReadPlan<'_>, PlanError> {
        registers::plan(&self.address_ranges, max_read)
    }

    fn instantiate(
        descriptors: &[EntityDescriptor],
        controller: &Arc<EntityController>,
        context: &EntityContext,
    ) -> Vec<Arc<ModbusEntity>> {
        descriptors
            .iter()
            .map(|descriptor| Arc::new(ModbusEntity::new(controller.clone(), *descriptor, context.clone())))
            .collect()
    }

    pub fn create_sensors(&self, controller: &Arc<EntityController>, context: &EntityContext) -> Vec<Arc<ModbusEntity>> {
        Self::instantiate(&self.sensors, controller, context)
    }

    pub fn create_binary_sensors(
        &self,
        controller: &Arc<EntityController>,
        context: &EntityContext,
    ) -> Vec<Arc<ModbusEntity>> {
        Self::instantiate(&self.binary_sensors, controller, context)
    }

    pub fn create_numbers(&self, controller: &Arc<EntityController>, context: &EntityContext) -> Vec<Arc<ModbusEntity>> {
        Self::instantiate(&self.numbers, controller, context)
    }

    pub fn create_selects(&self, controller: &Arc<EntityController>, context: &EntityContext) -> Vec<Arc<ModbusEntity>> {
        Self::instantiate(&self.selects, controller, context)
    }

    pub fn create_entities(&self, controller: &Arc<EntityController>, context: &EntityContext) -> Vec<Arc<ModbusEntity>> {
        let mut entities = self.create_sensors(controller, context);
        entities.extend(self.create_binary_sensors(controller, context));
        entities.extend(self.create_numbers(controller, context));
        entities.extend(self.create_selects(controller, context));
        entities
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.sensors
            .iter()
            .chain(&self.binary_sensors)
            .chain(&self.numbers)
            .chain(&self.selects)
    }
}

#[derive(Debug, Clone)]
pub struct InverterModelProfile {
    pub model: &'static str,
    connection_types: HashMap<&'static str, InverterCapabilityProfile>,
}

impl InverterModelProfile {
    pub fn new(model: &'static str, connection_types: impl IntoIterator<Item = InverterCapabilityProfile>) -> Self {
        Self {
            model,
            connection_types: connection_types
                .into_iter()
                .map(|profile| (profile.connection_type.key, profile))
                .collect(),
        }
    }

    pub fn connection_type(&self, key: &str) -> Option<&InverterCapabilityProfile> {
        self.connection_types.get(key)
    }
}

/// Lookup from (model, connection type) to a capability profile. Never mutated once built.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    models: HashMap<&'static str, InverterModelProfile>,
}

impl ProfileRegistry {
    pub fn new(models: impl IntoIterator<Item = InverterModelProfile>) -> Self {
        Self {
            models: models.into_iter().map(|model| (model.model, model)).collect(),
        }
    }

    /// Every model this bridge knows how to talk to.
    pub fn builtin() -> Self {
        Self::new([
            InverterModelProfile::new("H1", [xx1_aux_profile(true), xx1_lan_profile(true)]),
            InverterModelProfile::new("AC1", [xx1_aux_profile(false), xx1_lan_profile(false)]),
            InverterModelProfile::new("AIO-H1", [xx1_aux_profile(true), xx1_lan_profile(true)]),
        ])
    }

    pub fn resolve(&self, model: &str, connection_type: &str) -> Result<&InverterCapabilityProfile, ProfileError> {
        self.models
            .get(model)
            .ok_or_else(|| ProfileError::UnknownModel(model.to_owned()))?
            .connection_type(connection_type)
            .ok_or_else(|| ProfileError::UnknownConnectionType {
                model: model.to_owned(),
                connection_type: connection_type.to_owned(),
            })
    }

    pub fn models(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.models.keys().copied()
    }
}

fn xx1_aux_profile(has_pv: bool) -> InverterCapabilityProfile {
    let mut sensors = Vec::new();
    if has_pv {
        sensors.extend_from_slice(xx1_aux::H1_SENSORS);
    }
    sensors.extend_from_slice(xx1_aux::H1_AC1_SENSORS);

    InverterCapabilityProfile::new(
        AUX,
        sensors,
        xx1_aux::BINARY_SENSORS.to_vec(),
        xx1_aux::NUMBERS.to_vec(),
        xx1_aux::SELECTS.to_vec(),
        AddressRangeSet::new([(11000, 11050), (41000, 41012)]),
    )
}

fn xx1_lan_profile(has_pv: bool) -> InverterCapabilityProfile {
    let mut sensors = Vec::new();
    if has_pv {
        sensors.extend_from_slice(xx1_lan::H1_SENSORS);
    }
    sensors.extend_from_slice(xx1_lan::H1_AC1_SENSORS);

    InverterCapabilityProfile::new(
        LAN,
        sensors,
        Vec::new(),
        Vec::new(),
        Vec::new(),
        AddressRangeSet::new([(31000, 31025)]),
    )
}
