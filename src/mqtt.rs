use paho_mqtt::{AsyncClient, Message, QOS_1 as QOS_AT_LEAST_ONCE};
use serde::Serialize;

use crate::entities::{DeviceClass, EntityKind, EntityState, ModbusEntity, StateClass};

const MQTT_DISCOVERY_TOPIC: &str = "homeassistant";

fn mqtt_avail_topic(client_id: &str) -> String {
    format!("{client_id}/bridge/state")
}

pub async fn register_devices(client: &AsyncClient, payloads: &[ConfigPayload]) -> anyhow::Result<()> {
    for payload in payloads {
        let body = serde_json::to_string(payload)?;

        tracing::debug!(topic = %payload.config_topic, payload = %body, "MQTT publish");

        client
            .publish(Message::new_retained(&payload.config_topic, body, QOS_AT_LEAST_ONCE))
            .await?;

        if let Some(command_topic) = payload.specific.command_topic() {
            client.subscribe(command_topic, QOS_AT_LEAST_ONCE).await?;
        }
    }

    Ok(())
}

pub async fn announce_online(client_id: &str, client: &AsyncClient) -> anyhow::Result<()> {
    client
        .publish(Message::new_retained(
            mqtt_avail_topic(client_id),
            b"online".to_owned(),
            QOS_AT_LEAST_ONCE,
        ))
        .await?;
    Ok(())
}

pub fn offline_message(client_id: &str) -> Message {
    Message::new_retained(mqtt_avail_topic(client_id), "offline".to_owned(), QOS_AT_LEAST_ONCE)
}

pub async fn announce_offline(client_id: &str, client: &AsyncClient) -> anyhow::Result<()> {
    client.publish(offline_message(client_id)).await?;
    Ok(())
}

pub async fn publish_state(client: &AsyncClient, client_id: &str, state: &EntityState) -> anyhow::Result<()> {
    let topic = state_topic(client_id, &state.unique_id);
    let payload = state.value.to_payload();

    tracing::trace!(%topic, %payload, "MQTT publish");

    client
        .publish(Message::new(topic, payload, QOS_AT_LEAST_ONCE))
        .await?;

    Ok(())
}

pub fn command_topic(client_id: &str, unique_id: &str) -> String {
    format!("{client_id}/{unique_id}/set")
}

pub fn state_topic(client_id: &str, unique_id: &str) -> String {
    format!("{client_id}/{unique_id}/state")
}

#[derive(Serialize, Debug, PartialEq, Clone)]
pub struct AvailabilityPayload {
    topic: String,
}

#[derive(Serialize, Debug, PartialEq, Clone)]
pub struct DevicePayload {
    name: String,
    identifiers: Vec<String>,
    manufacturer: String,
    model: String,
}

#[derive(Serialize, Debug, PartialEq, Clone)]
#[serde(untagged)]
pub enum DeviceSpecificConfig {
    Sensor {
        state_topic: String,
        state_class: StateClass,

        #[serde(skip_serializing_if = "Option::is_none")]
        unit_of_measurement: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_class: Option<DeviceClass>,
    },
    BinarySensor {
        state_topic: String,

        #[serde(skip_serializing_if = "Option::is_none")]
        device_class: Option<DeviceClass>,
    },
    Number {
        state_topic: String,
        command_topic: String,
        min: f64,
        max: f64,
        step: f64,

        #[serde(skip_serializing_if = "Option::is_none")]
        unit_of_measurement: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_class: Option<DeviceClass>,
    },
    Select {
        state_topic: String,
        command_topic: String,
        options: Vec<String>,
    },
}

impl DeviceSpecificConfig {
    pub fn command_topic(&self) -> Option<&str> {
        match self {
            DeviceSpecificConfig::Number { command_topic, .. } | DeviceSpecificConfig::Select { command_topic, .. } => {
                Some(command_topic.as_str())
            },
            DeviceSpecificConfig::Sensor { .. } | DeviceSpecificConfig::BinarySensor { .. } => None,
        }
    }
}

#[derive(Serialize, Debug, PartialEq, Clone)]
pub struct ConfigPayload {
    pub name: String,
    pub unique_id: String,
    pub availability: Vec<AvailabilityPayload>,
    pub device: DevicePayload,

    #[serde(skip)]
    pub config_topic: String,

    #[serde(flatten)]
    pub specific: DeviceSpecificConfig,
}

impl ConfigPayload {
    pub fn from_entity(client_id: &str, entity: &ModbusEntity) -> Self {
        let unique_id = entity.unique_id();
        let descriptor = entity.descriptor();
        let details = entity.details();

        let state_topic = state_topic(client_id, &unique_id);
        let unit = |unit: Option<&str>| unit.map(str::to_owned);

        let specific = match descriptor.kind {
            EntityKind::Sensor(sensor) => DeviceSpecificConfig::Sensor {
                state_topic,
                state_class: sensor.state_class,
                unit_of_measurement: unit(sensor.unit),
                device_class: sensor.device_class,
            },
            EntityKind::BinarySensor(binary) => DeviceSpecificConfig::BinarySensor {
                state_topic,
                device_class: binary.device_class,
            },
            EntityKind::Number(number) => DeviceSpecificConfig::Number {
                state_topic,
                command_topic: command_topic(client_id, &unique_id),
                min: number.min,
                max: number.max,
                step: number.step,
                unit_of_measurement: unit(number.unit),
                device_class: number.device_class,
            },
            EntityKind::Select(select) => DeviceSpecificConfig::Select {
                state_topic,
                command_topic: command_topic(client_id, &unique_id),
                options: select.options.iter().map(|(_, label)| (*label).to_owned()).collect(),
            },
        };

        Self {
            config_topic: format!(
                "{MQTT_DISCOVERY_TOPIC}/{component}/{unique_id}/config",
                component = descriptor.kind.component()
            ),
            name: entity.name(),
            availability: vec![AvailabilityPayload {
                topic: mqtt_avail_topic(client_id),
            }],
            device: DevicePayload {
                name: details.device_name(),
                identifiers: vec![details.device_identifier()],
                manufacturer: "FoxESS".to_owned(),
                model: details.device_model(),
            },
            unique_id,
            specific,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controller::EntityController,
        entities::{EntityContext, EntityValue, InverterDetails},
        profiles::ProfileRegistry,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn entities(friendly_name: &str) -> Vec<Arc<ModbusEntity>> {
        let registry = ProfileRegistry::builtin();
        let profile = registry.resolve("H1", "AUX").unwrap();
        let controller = Arc::new(EntityController::new(profile.connection_type.register_type));
        let (tx, _rx) = mpsc::unbounded_channel();

        profile.create_entities(
            &controller,
            &EntityContext {
                details: Arc::new(InverterDetails {
                    friendly_name: friendly_name.to_owned(),
                    model: "H1".to_owned(),
                    connection_type: "AUX".to_owned(),
                }),
                states: tx,
            },
        )
    }

    fn find<'a>(entities: &'a [Arc<ModbusEntity>], key: &str) -> &'a ModbusEntity {
        entities.iter().find(|e| e.descriptor().key == key).unwrap()
    }

    #[test]
    fn select_discovery_payload() {
        let entities = entities("");
        let payload = ConfigPayload::from_entity("foxess2mqtt", find(&entities, "work_mode"));

        assert_eq!(payload.config_topic, "homeassistant/select/foxess_modbus_work_mode/config");
        assert_eq!(
            payload.specific.command_topic(),
            Some("foxess2mqtt/foxess_modbus_work_mode/set")
        );
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "name": "Work Mode",
                "unique_id": "foxess_modbus_work_mode",
                "availability": [{ "topic": "foxess2mqtt/bridge/state" }],
                "device": {
                    "name": "FoxESS - Modbus",
                    "identifiers": ["foxess_modbus_H1_AUX"],
                    "manufacturer": "FoxESS",
                    "model": "H1 - AUX",
                },
                "state_topic": "foxess2mqtt/foxess_modbus_work_mode/state",
                "command_topic": "foxess2mqtt/foxess_modbus_work_mode/set",
                "options": ["Self Use", "Feed-in First", "Back-up"],
            })
        );
    }

    #[test]
    fn sensor_discovery_payload() {
        let entities = entities("garage");
        let payload = ConfigPayload::from_entity("bridge", find(&entities, "battery_soc"));

        assert_eq!(payload.config_topic, "homeassistant/sensor/foxess_modbus_garage_battery_soc/config");
        assert_eq!(payload.specific.command_topic(), None);

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["name"], "Battery SoC (garage)");
        assert_eq!(value["device_class"], "battery");
        assert_eq!(value["state_class"], "measurement");
        assert_eq!(value["unit_of_measurement"], "%");
        assert_eq!(value["device"]["name"], "FoxESS - Modbus (garage)");
    }

    #[test]
    fn number_discovery_payload() {
        let entities = entities("");
        let payload = ConfigPayload::from_entity("bridge", find(&entities, "min_soc"));
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["min"], 10.0);
        assert_eq!(value["max"], 100.0);
        assert_eq!(value["command_topic"], "bridge/foxess_modbus_min_soc/set");
    }

    #[test]
    fn topics() {
        assert_eq!(state_topic("c", "u"), "c/u/state");
        assert_eq!(command_topic("c", "u"), "c/u/set");
        assert_eq!(EntityValue::Flag(false).to_payload(), "OFF");
    }
}
