use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcaster::ChannelBroadcaster;
use crate::channel::Channel;
use crate::config::{BridgeConfig, SERIAL_CHANNEL};
use crate::error::Result;
use crate::serial::SerialBridge;
use crate::source::SourceListener;
use crate::subscription::SubscriptionServer;

/// Bound addresses and shared state of one running channel.
#[derive(Debug, Clone)]
pub struct ChannelEndpoints {
    pub name: String,
    pub source_addr: SocketAddr,
    pub subscribe_addr: SocketAddr,
    pub channel: Arc<Channel>,
}

/// Bound address and broadcaster of the serial channel.
#[derive(Debug, Clone)]
pub struct SerialEndpoint {
    pub device: String,
    pub subscribe_addr: SocketAddr,
    pub broadcaster: ChannelBroadcaster,
}

/// Entry point for starting a bridge.
pub struct Bridge;

impl Bridge {
    /// Validate `config`, bind every listener, then start serving.
    ///
    /// Nothing is spawned until all listeners are bound, so a port conflict
    /// leaves no half-running bridge behind. Must be called inside a tokio
    /// runtime.
    pub async fn start(
        config: &BridgeConfig,
        shutdown: CancellationToken,
    ) -> Result<RunningBridge> {
        config.validate()?;

        let mut channels = Vec::with_capacity(config.channels.len());
        let mut servers = Vec::with_capacity(config.channels.len());
        for channel_config in &config.channels {
            let channel = Arc::new(Channel::new(channel_config, &config.subscriber)?);
            let source_addr = config.source_addr(channel_config);
            let source = SourceListener::bind(source_addr, Arc::clone(&channel)).await?;
            let subscribers = SubscriptionServer::bind(
                config.subscribe_addr(channel_config),
                channel.broadcaster().clone(),
                config.subscriber.write_timeout(),
            )
            .await?;

            channels.push(ChannelEndpoints {
                name: channel_config.name.clone(),
                source_addr: source.local_addr()?,
                subscribe_addr: subscribers.local_addr()?,
                channel,
            });
            servers.push((source, subscribers));
        }

        let serial_server = match &config.serial {
            Some(serial) => {
                let broadcaster =
                    ChannelBroadcaster::new(SERIAL_CHANNEL, config.subscriber.queue_depth);
                let server = SubscriptionServer::bind(
                    SocketAddr::new(config.host, serial.subscribe_port),
                    broadcaster.clone(),
                    config.subscriber.write_timeout(),
                )
                .await?;
                Some((serial, broadcaster, server))
            }
            None => None,
        };

        let mut serial = None;
        let mut serial_bridge = None;
        let mut tasks = Vec::new();

        if let Some((serial_config, broadcaster, server)) = serial_server {
            let subscribe_addr = server.local_addr()?;
            let bridge = SerialBridge::start(serial_config, broadcaster.clone(), shutdown.clone())?;
            serial = Some(SerialEndpoint {
                device: serial_config.device.clone(),
                subscribe_addr,
                broadcaster,
            });
            tasks.push(tokio::spawn(server.run(shutdown.clone())));
            serial_bridge = Some(bridge);
        }

        for (source, subscribers) in servers {
            tasks.push(tokio::spawn(source.run(shutdown.clone())));
            tasks.push(tokio::spawn(subscribers.run(shutdown.clone())));
        }

        for endpoints in &channels {
            info!(
                channel = %endpoints.name,
                source = %endpoints.source_addr,
                subscribe = %endpoints.subscribe_addr,
                "channel ready"
            );
        }
        if let Some(serial) = &serial {
            info!(
                device = %serial.device,
                subscribe = %serial.subscribe_addr,
                "serial channel ready"
            );
        }

        Ok(RunningBridge {
            channels,
            serial,
            tasks,
            shutdown,
            serial_bridge,
        })
    }
}

/// Handle to a started bridge.
#[derive(Debug)]
pub struct RunningBridge {
    channels: Vec<ChannelEndpoints>,
    serial: Option<SerialEndpoint>,
    tasks: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    serial_bridge: Option<SerialBridge>,
}

impl RunningBridge {
    pub fn channels(&self) -> &[ChannelEndpoints] {
        &self.channels
    }

    /// Look up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelEndpoints> {
        self.channels.iter().find(|endpoints| endpoints.name == name)
    }

    pub fn serial(&self) -> Option<&SerialEndpoint> {
        self.serial.as_ref()
    }

    /// Token that stops the bridge when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown without waiting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for shutdown to be requested and every listener to stop.
    pub async fn wait(mut self) {
        self.shutdown.cancelled().await;
        debug!(tasks = self.tasks.len(), "waiting for listeners to stop");

        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(error = %err, "listener task failed");
            }
        }

        if let Some(mut bridge) = self.serial_bridge.take() {
            let joined = tokio::task::spawn_blocking(move || bridge.join()).await;
            if let Err(err) = joined {
                warn!(error = %err, "serial bridge did not stop cleanly");
            }
        }

        info!("bridge stopped");
    }
}
