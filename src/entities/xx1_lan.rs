//! Registers of the H1 / AC1 / AIO-H1 family read over the LAN port. These are read-only.

use super::{measurement, DeviceClass, EntityDescriptor};

pub const H1_SENSORS: &[EntityDescriptor] = &[
    measurement("pv1_voltage", "PV1 Voltage", 31000, 0.1, false, "V", DeviceClass::Voltage),
    measurement("pv1_current", "PV1 Current", 31001, 0.1, true, "A", DeviceClass::Current),
    measurement("pv1_power", "PV1 Power", 31002, 0.001, true, "kW", DeviceClass::Power),
    measurement("pv2_voltage", "PV2 Voltage", 31003, 0.1, false, "V", DeviceClass::Voltage),
    measurement("pv2_current", "PV2 Current", 31004, 0.1, true, "A", DeviceClass::Current),
    measurement("pv2_power", "PV2 Power", 31005, 0.001, true, "kW", DeviceClass::Power),
];

pub const H1_AC1_SENSORS: &[EntityDescriptor] = &[
    measurement("grid_voltage", "Grid Voltage", 31006, 0.1, false, "V", DeviceClass::Voltage),
    measurement("grid_current", "Grid Current", 31007, 0.1, true, "A", DeviceClass::Current),
    measurement("grid_power", "Grid Power", 31008, 0.001, true, "kW", DeviceClass::Power),
    measurement("grid_frequency", "Grid Frequency", 31009, 0.01, false, "Hz", DeviceClass::Frequency),
    measurement("eps_voltage", "EPS Voltage", 31010, 0.1, false, "V", DeviceClass::Voltage),
    measurement("eps_power", "EPS Power", 31012, 0.001, true, "kW", DeviceClass::Power),
    measurement("load_power", "Load Power", 31016, 0.001, true, "kW", DeviceClass::Power),
    measurement("inverter_temp", "Inverter Temperature", 31018, 0.1, true, "°C", DeviceClass::Temperature),
    measurement("ambient_temp", "Ambient Temperature", 31019, 0.1, true, "°C", DeviceClass::Temperature),
    measurement("battery_voltage", "Battery Voltage", 31020, 0.1, false, "V", DeviceClass::Voltage),
    measurement("battery_current", "Battery Current", 31021, 0.1, true, "A", DeviceClass::Current),
    measurement("battery_power", "Battery Power", 31022, 0.001, true, "kW", DeviceClass::Power),
    measurement("battery_temp", "Battery Temperature", 31023, 0.1, true, "°C", DeviceClass::Temperature),
    measurement("battery_soc", "Battery SoC", 31024, 1.0, false, "%", DeviceClass::Battery),
];
