use crate::chat::ChatCore;
use crate::client::ZeroChatClient;
use crate::config::ZeroChatConfig;
use crate::discovery::DiscoveryBackend;
use crate::error::{Result as ChatResult, ZeroChatError};
use crate::events::{
    ConnectionId, DiscoveryEvent, DiscoveryListener, Notifier, TransportEvent, TransportSink,
};
use crate::mdns::MdnsBackend;
use crate::models::{ChatSnapshot, ClientNotification, DiscoveredService};
use crate::transport::{TransportConnector, WsConnector};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Messages processed by the chat actor: user intents (with a reply port)
/// and events pushed by the discovery backend and the transport.
pub enum ChatMessage {
    StartScan(RpcReplyPort<ChatResult<()>>),
    StopScan(RpcReplyPort<ChatResult<()>>),
    Connect {
        service: DiscoveredService,
        reply: RpcReplyPort<ChatResult<()>>,
    },
    ConnectByName {
        name: String,
        reply: RpcReplyPort<ChatResult<()>>,
    },
    Disconnect(RpcReplyPort<ChatResult<()>>),
    Send {
        text: String,
        reply: RpcReplyPort<ChatResult<()>>,
    },
    Snapshot(RpcReplyPort<ChatResult<ChatSnapshot>>),
    Discovery(DiscoveryEvent),
    Transport {
        id: ConnectionId,
        event: TransportEvent,
    },
}

pub struct ChatArguments {
    pub config: ZeroChatConfig,
    pub backend: Option<Box<dyn DiscoveryBackend>>,
    pub connector: Box<dyn TransportConnector>,
    pub notification_tx: mpsc::Sender<ClientNotification>,
}

/// Owns the [`ChatCore`]; every transition happens inside `handle`, one
/// message at a time.
pub struct ChatActor;

#[async_trait]
impl Actor for ChatActor {
    type Msg = ChatMessage;
    type State = ChatCore;
    type Arguments = ChatArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        let notifier = Notifier::new(args.notification_tx);

        let transport_ref = myself.clone();
        let sink: TransportSink = Arc::new(move |id: ConnectionId, event: TransportEvent| {
            if let Err(e) = transport_ref.cast(ChatMessage::Transport { id, event }) {
                warn!("[LIB] Dropping transport event for {}: {}", id, e);
            }
        });

        let mut core = ChatCore::new(&args.config, args.connector, sink, notifier.clone());

        match args.backend {
            Some(backend) => {
                let discovery_ref = myself.clone();
                let listener: DiscoveryListener = Arc::new(move |event: DiscoveryEvent| {
                    if let Err(e) = discovery_ref.cast(ChatMessage::Discovery(event)) {
                        warn!("[LIB] Dropping discovery event: {}", e);
                    }
                });
                core.attach_backend(backend, listener);
            }
            None => {
                warn!("[LIB] Starting without a discovery backend");
                notifier.error(ZeroChatError::backend_unavailable(
                    "discovery backend could not be created",
                ));
            }
        }

        if args.config.discovery.scan_on_start && core.discovery().has_backend() {
            // Reported through notifications; a failed first scan can be retried.
            let _ = core.start_scan();
        }

        info!("[LIB] Chat actor started");
        Ok(core)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        core: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            ChatMessage::StartScan(reply) => {
                let _ = reply.send(core.start_scan());
            }
            ChatMessage::StopScan(reply) => {
                core.stop_scan();
                let _ = reply.send(Ok(()));
            }
            ChatMessage::Connect { service, reply } => {
                let _ = reply.send(core.connect(service).map(|_| ()));
            }
            ChatMessage::ConnectByName { name, reply } => {
                let _ = reply.send(core.connect_by_name(&name).map(|_| ()));
            }
            ChatMessage::Disconnect(reply) => {
                core.disconnect();
                let _ = reply.send(Ok(()));
            }
            ChatMessage::Send { text, reply } => {
                let _ = reply.send(core.send(&text));
            }
            ChatMessage::Snapshot(reply) => {
                let _ = reply.send(Ok(core.snapshot()));
            }
            ChatMessage::Discovery(event) => core.handle_discovery_event(event),
            ChatMessage::Transport { id, event } => core.handle_transport_event(id, event),
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        core: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        core.shutdown();
        info!("[LIB] Chat actor stopped");
        Ok(())
    }
}

/// A running chat core. Dropping it does not stop the actor; call
/// [`shutdown`](Self::shutdown).
pub struct ZeroChat {
    actor: ActorRef<ChatMessage>,
    handle: JoinHandle<()>,
}

impl ZeroChat {
    pub fn client(&self) -> ZeroChatClient {
        ZeroChatClient {
            actor: self.actor.clone(),
        }
    }

    /// Stops discovery, closes any session and waits for the actor to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.actor.stop(Some("shutdown".to_string()));
        self.handle.await.context("chat actor panicked")?;
        Ok(())
    }
}

/// Starts the chat core with mDNS discovery and WebSocket transport.
///
/// Failing to create the mDNS daemon is not fatal: the core starts without a
/// backend and reports `BackendUnavailable` through `notification_tx`.
pub async fn start(
    config: ZeroChatConfig,
    notification_tx: mpsc::Sender<ClientNotification>,
) -> Result<ZeroChat> {
    let backend: Option<Box<dyn DiscoveryBackend>> = match MdnsBackend::new() {
        Ok(backend) => Some(Box::new(backend)),
        Err(e) => {
            error!("[LIB] Failed to initialize mDNS discovery: {:#}", e);
            None
        }
    };
    start_with(config, backend, Box::new(WsConnector), notification_tx).await
}

/// Starts the chat core with the given discovery backend and transport
/// connector.
pub async fn start_with(
    config: ZeroChatConfig,
    backend: Option<Box<dyn DiscoveryBackend>>,
    connector: Box<dyn TransportConnector>,
    notification_tx: mpsc::Sender<ClientNotification>,
) -> Result<ZeroChat> {
    let args = ChatArguments {
        config,
        backend,
        connector,
        notification_tx,
    };
    let (actor, handle) = Actor::spawn(None, ChatActor, args)
        .await
        .map_err(|e| anyhow::anyhow!("failed to spawn chat actor: {}", e))?;
    Ok(ZeroChat { actor, handle })
}
