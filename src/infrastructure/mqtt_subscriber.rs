// MQTT subscriber - feeds controller frames into the ingestion pipeline
use crate::application::ingestion_pipeline::{IngestError, PipelineHandle};
use crate::infrastructure::config::MqttSettings;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    qos: QoS,
    reconnect_delay: Duration,
}

impl MqttSubscriber {
    pub fn new(settings: &MqttSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, 16);
        Self {
            client,
            eventloop,
            topic: settings.topic.clone(),
            qos: qos_level(settings.qos),
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
        }
    }

    /// Polls the broker connection forever. Connection errors are logged and
    /// retried after the reconnect delay; the subscription is renewed on
    /// every ConnAck.
    pub async fn run(mut self, pipeline: PipelineHandle) {
        info!("MQTT subscriber starting for topic {}", self.topic);
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT connected, subscribing to {}", self.topic);
                    if let Err(e) = self.client.try_subscribe(&self.topic, self.qos) {
                        warn!("MQTT subscribe request failed: {}", e);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    match pipeline.on_raw_frame(&msg.payload) {
                        Ok(()) => {}
                        Err(IngestError::Stopped) => {
                            info!("Pipeline stopped, MQTT subscriber exiting");
                            return;
                        }
                        // Already logged and counted by the pipeline.
                        Err(_) => {}
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("MQTT subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "MQTT connection error: {}, retrying in {:?}",
                        e, self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }
}

fn qos_level(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
