use anyhow::{bail, Context, Result};
use paho_mqtt::{AsyncClient, ConnectOptionsBuilder, CreateOptionsBuilder, PersistenceType};
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    sync::Arc,
};
use tokio::{select, sync::mpsc, time::Duration};
use tokio_util::sync::CancellationToken;

use foxess2mqtt::{
    config,
    controller::EntityController,
    entities::{EntityContext, EntityDescriptor, InverterDetails},
    eventloop::{self, PollSettings, WriteCommand},
    mqtt, profiles, transport,
};

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json_logging = std::env::var("FOXESS2MQTT_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

struct CommandRoute {
    descriptor: EntityDescriptor,
    inverter: mpsc::Sender<WriteCommand>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = if cfg!(debug_assertions) {
        "./foxess2mqtt.yaml"
    } else {
        "/etc/foxess2mqtt.yaml"
    };

    let config = File::open(config_path).with_context(|| format!("Failed to open config file {config_path:?}"))?;

    let config: config::Config =
        serde_yaml::from_reader(config).with_context(|| format!("Failed to parse config file {config_path:?}"))?;

    let registry = profiles::ProfileRegistry::builtin();
    let shutdown = CancellationToken::new();

    let (states_tx, mut states_rx) = mpsc::unbounded_channel();

    let mut payloads = Vec::new();
    let mut command_routes = HashMap::new();
    let mut attached = Vec::new();
    let mut pollers = Vec::new();
    let mut unique_ids = HashSet::new();

    for inverter_conf in &config.inverters {
        let profile = registry
            .resolve(&inverter_conf.model, &inverter_conf.connection_type)
            .with_context(|| {
                format!(
                    "Unsupported inverter at {} (known models: {})",
                    inverter_conf.host,
                    registry.models().collect::<Vec<_>>().join(", ")
                )
            })?;

        for descriptor in profile.descriptors() {
            if !profile.contains_address(descriptor.address) {
                tracing::warn!(
                    key = descriptor.key,
                    address = descriptor.address,
                    "Entity register is not covered by any read range and will never update"
                );
            }
        }

        let reads = profile
            .create_read_plan(inverter_conf.max_read)
            .with_context(|| format!("Invalid max_read for inverter at {}", inverter_conf.host))?
            .count();

        let details = Arc::new(InverterDetails {
            friendly_name: inverter_conf.friendly_name.0.clone(),
            model: inverter_conf.model.clone(),
            connection_type: inverter_conf.connection_type.clone(),
        });

        let controller = Arc::new(EntityController::new(profile.connection_type.register_type));
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        let entities = profile.create_entities(
            &controller,
            &EntityContext {
                details: details.clone(),
                states: states_tx.clone(),
            },
        );

        for entity in &entities {
            let payload = mqtt::ConfigPayload::from_entity(&config.client_id, entity);

            if !unique_ids.insert(payload.unique_id.clone()) {
                bail!(
                    "Duplicate entity {}: give every inverter a distinct friendly_name",
                    payload.unique_id
                );
            }

            if let Some(command_topic) = payload.specific.command_topic() {
                command_routes.insert(
                    command_topic.to_owned(),
                    CommandRoute {
                        descriptor: *entity.descriptor(),
                        inverter: cmd_tx.clone(),
                    },
                );
            }

            let handle = controller.add_update_listener(entity);
            attached.push((entity.clone(), handle));
            payloads.push(payload);
        }

        tracing::info!(
            model = %details.model,
            connection_type = %details.connection_type,
            listeners = controller.dispatcher().listener_count(),
            reads_per_cycle = reads,
            "Configured inverter {}",
            details.device_name()
        );

        pollers.push((
            format!("{} ({})", inverter_conf.host, details.device_model()),
            PollSettings {
                polling_delay: Duration::from_millis(inverter_conf.polling_delay_ms),
                request_timeout: Duration::from_millis(inverter_conf.timeout_ms),
                max_read: inverter_conf.max_read,
            },
            profile.clone(),
            controller,
            transport::ModbusTransport::new(inverter_conf.socket_addr(), inverter_conf.unit_id),
            cmd_rx,
        ));
    }

    let mut mqtt_client = AsyncClient::new(
        CreateOptionsBuilder::new()
            .server_uri(format!(
                "tcp://{host}:{port}",
                host = config.broker,
                port = config.broker_port
            ))
            .client_id(&config.client_id)
            .persistence(PersistenceType::None)
            .finalize(),
    )
    .context("Failed to create MQTT client")?;

    let mqtt_stream = mqtt_client.get_stream(128);

    mqtt_client
        .connect(
            ConnectOptionsBuilder::new()
                .automatic_reconnect(Duration::from_secs(2u64.pow(3)), Duration::from_secs(2u64.pow(12)))
                .max_inflight(128)
                .will_message(mqtt::offline_message(&config.client_id))
                .finalize(),
        )
        .await
        .context("Failed to connect to MQTT broker")?;

    mqtt::announce_online(&config.client_id, &mqtt_client)
        .await
        .context("Failed to announce online status")?;

    mqtt::register_devices(&mqtt_client, &payloads)
        .await
        .context("Failed to register devices")?;

    for (name, settings, profile, controller, transport, cmd_rx) in pollers {
        tokio::spawn(eventloop::inverter_poll_loop(
            name,
            settings,
            profile,
            controller,
            transport,
            cmd_rx,
            shutdown.clone(),
        ));
    }

    let (tx, mut rx) = mpsc::channel(1);
    tokio::spawn(eventloop::mqtt_message_event_loop(mqtt_stream, tx));

    let result = loop {
        select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            Some(state) = states_rx.recv() => {
                if let Err(e) = mqtt::publish_state(&mqtt_client, &config.client_id, &state).await {
                    break Err(e.context("Unable to publish state"));
                }
            },
            event = rx.recv() => {
                let Some(eventloop::Message::MqttEvent(msg)) = event else {
                    break Err(anyhow::anyhow!("MQTT event loop terminated"));
                };

                let payload = match std::str::from_utf8(msg.payload()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("MQTT payload error: {e}");
                        continue;
                    }
                };

                tracing::info!(topic = msg.topic(), payload, "MQTT command incoming");

                let Some(route) = command_routes.get(msg.topic()) else {
                    tracing::warn!("MQTT command error: unknown entity at {}", msg.topic());
                    continue;
                };

                let value = match route.descriptor.encode(payload) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("MQTT payload error: {e}");
                        continue;
                    },
                };

                let cmd = WriteCommand { address: route.descriptor.address, value };
                if route.inverter.send(cmd).await.is_err() {
                    tracing::warn!("Poll loop for {} is gone, dropping command", msg.topic());
                }
            },
        }
    };

    shutdown.cancel();

    for (entity, handle) in attached {
        entity.controller().remove_update_listener(&entity, handle);
    }

    let _ = mqtt::announce_offline(&config.client_id, &mqtt_client).await;

    result
}
