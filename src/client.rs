use crate::error::{Result, ZeroChatError};
use crate::manager::ChatMessage;
use crate::models::{ChatSnapshot, DiscoveredService};

use ractor::{ActorRef, RpcReplyPort, rpc::CallResult};
use std::fmt::Debug;

/// Handle for driving a running chat core.
///
/// Every call is processed by the chat actor in arrival order, so callers on
/// different tasks never observe a half-applied transition. Failures are
/// returned here *and* published as [`ClientNotification::Error`].
///
/// [`ClientNotification::Error`]: crate::models::ClientNotification::Error
#[derive(Clone, Debug)]
pub struct ZeroChatClient {
    pub(crate) actor: ActorRef<ChatMessage>,
}

impl ZeroChatClient {
    async fn call_actor<TResponse>(
        &self,
        msg_builder: impl FnOnce(RpcReplyPort<Result<TResponse>>) -> ChatMessage,
    ) -> Result<TResponse>
    where
        TResponse: Send + 'static + Debug,
    {
        let rpc_result = self.actor.call(msg_builder, None).await;

        match rpc_result {
            Ok(CallResult::Success(r)) => r,
            Ok(other) => Err(ZeroChatError::ActorUnavailable(format!(
                "non-success call result: {:?}",
                other
            ))),
            Err(e) => Err(ZeroChatError::ActorUnavailable(e.to_string())),
        }
    }

    /// Clears the registry and starts browsing for the configured service type.
    pub async fn start_scan(&self) -> Result<()> {
        self.call_actor(ChatMessage::StartScan).await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.call_actor(ChatMessage::StopScan).await
    }

    /// Opens a session to `service`, replacing any current one.
    ///
    /// Returns once the connection attempt has started; watch for
    /// `ConnectionStateChanged` to learn when it is open.
    pub async fn connect(&self, service: DiscoveredService) -> Result<()> {
        self.call_actor(|reply| ChatMessage::Connect { service, reply })
            .await
    }

    /// Like [`connect`](Self::connect), looking the service up in the registry.
    ///
    /// # Arguments
    ///
    /// * `name` - The instance name, e.g. `"Mac-1"`.
    pub async fn connect_by_name(&self, name: impl Into<String>) -> Result<()> {
        self.call_actor(|reply| ChatMessage::ConnectByName {
            name: name.into(),
            reply,
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call_actor(ChatMessage::Disconnect).await
    }

    /// Sends `text` (trimmed) to the connected peer.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        self.call_actor(|reply| ChatMessage::Send {
            text: text.into(),
            reply,
        })
        .await
    }

    /// A copy of the current scan state, registry, session and message log.
    pub async fn snapshot(&self) -> Result<ChatSnapshot> {
        self.call_actor(ChatMessage::Snapshot).await
    }
}
