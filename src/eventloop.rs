use crate::{
    controller::EntityController,
    profiles::InverterCapabilityProfile,
    registers::Address,
    transport::RegisterTransport,
};
use std::{future::Future, sync::Arc};
use tokio::{
    select,
    sync::mpsc,
    time::{self, Duration},
};
use tokio_util::sync::CancellationToken;

const FAILURE_BACKOFF: Duration = Duration::from_secs(60);

pub enum Message {
    MqttEvent(paho_mqtt::Message),
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct WriteCommand {
    pub address: Address,
    pub value: u16,
}

#[derive(Debug, Copy, Clone)]
pub struct PollSettings {
    pub polling_delay: Duration,
    pub request_timeout: Duration,
    pub max_read: u32,
}

pub fn mqtt_message_event_loop(
    mqtt_stream: paho_mqtt::AsyncReceiver<Option<paho_mqtt::Message>>,
    tx: mpsc::Sender<Message>,
) -> impl Future<Output = ()> {
    async move {
        loop {
            let Ok(event) = mqtt_stream.recv().await else {
                break;
            };

            match event {
                Some(event) => {
                    if tx.send(Message::MqttEvent(event)).await.is_err() {
                        break;
                    }
                },
                None => tracing::warn!("Lost connection to MQTT broker"),
            }
        }

        tracing::info!("Shutting down MQTT client");
    }
}

/// Polls one inverter until `shutdown` fires, executing queued register writes between cycles.
pub fn inverter_poll_loop<T>(
    name: String,
    settings: PollSettings,
    profile: InverterCapabilityProfile,
    controller: Arc<EntityController>,
    mut transport: T,
    mut commands: mpsc::Receiver<WriteCommand>,
    shutdown: CancellationToken,
) -> impl Future<Output = ()>
where
    T: RegisterTransport,
{
    let mut timer = time::interval(settings.polling_delay);
    timer.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    async move {
        loop {
            select! {
                _ = shutdown.cancelled() => break,
                Some(cmd) = commands.recv() => {
                    match controller.write(&mut transport, cmd.address, cmd.value, settings.request_timeout).await {
                        Ok(_) => tracing::info!(inverter = %name, address = cmd.address, value = cmd.value, "Wrote register"),
                        Err(e) => tracing::warn!(inverter = %name, address = cmd.address, "Unable to write register: {e}"),
                    }
                },
                _ = timer.tick() => {
                    let plan = match profile.create_read_plan(settings.max_read) {
                        Ok(plan) => plan,
                        Err(e) => {
                            tracing::error!(inverter = %name, "Unable to plan reads: {e}");
                            break;
                        },
                    };

                    let failure = match controller.poll(&mut transport, plan, settings.request_timeout).await {
                        Ok(summary) => {
                            tracing::debug!(inverter = %name, notified = summary.notified, failed = summary.failed, "Polled inverter");
                            None
                        },
                        Err(e) => Some(e),
                    };

                    if let Some(e) = failure {
                        tracing::warn!(
                            inverter = %name,
                            timeout = ?settings.request_timeout,
                            "Unable to read from inverter: {e}, trying again in 1 minute"
                        );

                        select! {
                            _ = shutdown.cancelled() => break,
                            _ = time::sleep(FAILURE_BACKOFF) => timer.reset(),
                        }
                    }
                },
            }
        }

        tracing::info!(inverter = %name, "Shutting down poll loop");
    }
}
