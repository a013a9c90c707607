//! Registers of the H1 / AC1 / AIO-H1 family read over the RS485 (AUX) port.

use super::{
    measurement, BinarySensorDecoding, DeviceClass, EntityDescriptor, EntityKind, NumberDecoding, SelectDecoding,
};

const fn limit(key: &'static str, name: &'static str, address: u32, min: f64, max: f64, unit: &'static str) -> EntityDescriptor {
    EntityDescriptor {
        key,
        name,
        address,
        kind: EntityKind::Number(NumberDecoding {
            scale: 1.0,
            min,
            max,
            step: 1.0,
            unit: Some(unit),
            device_class: None,
        }),
    }
}

const fn charge_current(key: &'static str, name: &'static str, address: u32) -> EntityDescriptor {
    EntityDescriptor {
        key,
        name,
        address,
        kind: EntityKind::Number(NumberDecoding {
            scale: 0.1,
            min: 0.0,
            max: 50.0,
            step: 0.1,
            unit: Some("A"),
            device_class: Some(DeviceClass::Current),
        }),
    }
}

/// Only present on hybrid models with PV strings.
pub const H1_SENSORS: &[EntityDescriptor] = &[
    measurement("pv1_voltage", "PV1 Voltage", 11000, 0.1, false, "V", DeviceClass::Voltage),
    measurement("pv1_current", "PV1 Current", 11001, 0.1, true, "A", DeviceClass::Current),
    measurement("pv1_power", "PV1 Power", 11002, 0.001, true, "kW", DeviceClass::Power),
    measurement("pv2_voltage", "PV2 Voltage", 11003, 0.1, false, "V", DeviceClass::Voltage),
    measurement("pv2_current", "PV2 Current", 11004, 0.1, true, "A", DeviceClass::Current),
    measurement("pv2_power", "PV2 Power", 11005, 0.001, true, "kW", DeviceClass::Power),
];

pub const H1_AC1_SENSORS: &[EntityDescriptor] = &[
    measurement("grid_voltage", "Grid Voltage", 11006, 0.1, false, "V", DeviceClass::Voltage),
    measurement("grid_current", "Grid Current", 11007, 0.1, true, "A", DeviceClass::Current),
    measurement("grid_power", "Grid Power", 11008, 0.001, true, "kW", DeviceClass::Power),
    measurement("grid_frequency", "Grid Frequency", 11009, 0.01, false, "Hz", DeviceClass::Frequency),
    measurement("eps_voltage", "EPS Voltage", 11010, 0.1, false, "V", DeviceClass::Voltage),
    measurement("eps_power", "EPS Power", 11012, 0.001, true, "kW", DeviceClass::Power),
    measurement("load_power", "Load Power", 11023, 0.001, true, "kW", DeviceClass::Power),
    measurement("inverter_temp", "Inverter Temperature", 11024, 0.1, true, "°C", DeviceClass::Temperature),
    measurement("ambient_temp", "Ambient Temperature", 11025, 0.1, true, "°C", DeviceClass::Temperature),
    measurement("battery_voltage", "Battery Voltage", 11034, 0.1, false, "V", DeviceClass::Voltage),
    measurement("battery_current", "Battery Current", 11035, 0.1, true, "A", DeviceClass::Current),
    measurement("battery_soc", "Battery SoC", 11036, 1.0, false, "%", DeviceClass::Battery),
    measurement("battery_temp", "Battery Temperature", 11038, 0.1, true, "°C", DeviceClass::Temperature),
    measurement("bms_charge_rate", "BMS Charge Rate", 11041, 0.1, false, "A", DeviceClass::Current),
    measurement("bms_discharge_rate", "BMS Discharge Rate", 11042, 0.1, false, "A", DeviceClass::Current),
];

pub const BINARY_SENSORS: &[EntityDescriptor] = &[
    EntityDescriptor {
        key: "grid_connected",
        name: "Grid Connected",
        address: 11045,
        kind: EntityKind::BinarySensor(BinarySensorDecoding {
            device_class: Some(DeviceClass::Connectivity),
            on_value: 1,
        }),
    },
    EntityDescriptor {
        key: "bms_connected",
        name: "BMS Connected",
        address: 11046,
        kind: EntityKind::BinarySensor(BinarySensorDecoding {
            device_class: Some(DeviceClass::Connectivity),
            on_value: 1,
        }),
    },
];

pub const NUMBERS: &[EntityDescriptor] = &[
    charge_current("max_charge_current", "Max Charge Current", 41007),
    charge_current("max_discharge_current", "Max Discharge Current", 41008),
    limit("min_soc", "Min SoC", 41009, 10.0, 100.0, "%"),
    limit("max_soc", "Max SoC", 41010, 10.0, 100.0, "%"),
    limit("min_soc_on_grid", "Min SoC (On Grid)", 41011, 10.0, 100.0, "%"),
];

pub const SELECTS: &[EntityDescriptor] = &[EntityDescriptor {
    key: "work_mode",
    name: "Work Mode",
    address: 41000,
    kind: EntityKind::Select(SelectDecoding {
        options: &[(0, "Self Use"), (1, "Feed-in First"), (2, "Back-up")],
    }),
}];
