use lazy_static::lazy_static;
use serde::{de::Error, Deserialize, Deserializer};
use std::net::{IpAddr, SocketAddr};

lazy_static! {
    static ref IDENTIFIER_REGEX: regex::Regex = regex::Regex::new("^[a-zA-Z0-9_]*$").unwrap();
}

const fn default_mqtt_port() -> u16 {
    1883
}
const fn default_modbus_port() -> u16 {
    502
}
const fn default_unit_id() -> u8 {
    247
}
const fn default_max_read() -> u32 {
    50
}
const fn default_polling_delay_ms() -> u64 {
    10_000
}
const fn default_timeout_ms() -> u64 {
    5_000
}
fn default_client_id() -> String {
    "foxess2mqtt".to_owned()
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_client_id")]
    pub client_id: String,

    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub broker_port: u16,

    pub inverters: Vec<InverterConfig>,
}

/// Used inside MQTT topics and entity ids, so restricted to `[a-zA-Z0-9_]`. May be empty.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Identifier(pub String);

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = String::deserialize(de)?;

        if IDENTIFIER_REGEX.is_match(&id) {
            Ok(Identifier(id))
        } else {
            Err(Error::custom("identifier must match [a-zA-Z0-9_]*"))
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct InverterConfig {
    #[serde(default)]
    pub friendly_name: Identifier,

    pub model: String,
    pub connection_type: String,

    pub host: IpAddr,

    #[serde(default = "default_modbus_port")]
    pub port: u16,

    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    #[serde(default = "default_max_read")]
    pub max_read: u32,

    #[serde(default = "default_polling_delay_ms")]
    pub polling_delay_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl InverterConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
