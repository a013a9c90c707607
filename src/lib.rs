//! Polls FoxESS inverters over Modbus and exposes their registers to Home Assistant via MQTT.

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod entities;
pub mod eventloop;
pub mod mqtt;
pub mod profiles;
pub mod registers;
pub mod transport;
