//! Node bootstrap, listener, and per-system routing.

use crate::codec::{read_frame, wrap_envelope, write_frame, CodecError};
use crate::instance::{InstanceHandle, InstanceRunner};
use paxon_core::{Body, Message};
use paxon_stack::StackConfig;
use paxon_types::{Membership, Port, SystemId};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// How long the listener waits for a complete frame on an accepted
/// connection before giving up on it.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors fatal to node bootstrap.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to bind listening socket on port {port}: {source}")]
    Bind {
        port: Port,
        source: std::io::Error,
    },

    #[error("failed to register with the hub at {addr}: {source}")]
    Registration { addr: String, source: CodecError },
}

/// Node configuration, straight from the CLI.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listening port; also this node's identity within every instance.
    pub node_port: Port,
    pub hub_host: String,
    pub hub_port: Port,
    /// Registration owner name.
    pub owner: String,
    /// Registration index under the owner.
    pub index: u32,
    pub stack: StackConfig,
}

impl NodeConfig {
    fn hub_addr(&self) -> String {
        format!("{}:{}", self.hub_host, self.hub_port)
    }
}

/// One node process: registers with the hub, accepts framed messages,
/// and routes them to consensus instances by system id.
///
/// A fresh system id arriving with an `AppPropose` envelope creates a new
/// instance; all other traffic goes to the existing instance or, when
/// none exists yet, is dropped. The hub's proposal is what brings an
/// instance into being.
pub struct Node {
    config: NodeConfig,
    instances: HashMap<SystemId, InstanceHandle>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            instances: HashMap::new(),
        }
    }

    /// Bind, register with the hub, and serve until the task is aborted.
    ///
    /// Bootstrap failures (bind, registration) are fatal; everything
    /// after that is logged and survived.
    pub async fn run(mut self) -> Result<(), NodeError> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.node_port))
            .await
            .map_err(|source| NodeError::Bind {
                port: self.config.node_port,
                source,
            })?;

        self.register_with_hub().await?;
        info!(
            port = self.config.node_port,
            hub = %self.config.hub_addr(),
            owner = %self.config.owner,
            index = self.config.index,
            "node listening"
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    warn!(%error, "accept failed");
                    continue;
                }
            };
            match tokio::time::timeout(READ_TIMEOUT, read_one(stream)).await {
                Ok(Ok(message)) => self.route(message).await,
                Ok(Err(error)) => debug!(%peer, %error, "dropping undecodable frame"),
                Err(_) => debug!(%peer, "connection idle, dropping"),
            }
        }
    }

    /// Announce this node to the hub so it can be included in proposals.
    async fn register_with_hub(&self) -> Result<(), NodeError> {
        let addr = self.config.hub_addr();
        let registration = wrap_envelope(
            Message::new(Body::AppRegistration {
                owner: self.config.owner.clone(),
                index: self.config.index,
            }),
            None,
            None,
            self.config.node_port,
        );
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| NodeError::Registration {
                addr: addr.clone(),
                source: CodecError::Io(source),
            })?;
        write_frame(&mut stream, &registration)
            .await
            .map_err(|source| NodeError::Registration { addr, source })
    }

    async fn route(&mut self, message: Message) {
        let Body::Network { message: inner, .. } = &message.body else {
            debug!(
                message = message.type_name(),
                "inbound frame is not an envelope, dropping"
            );
            return;
        };

        let Some(system_id) = message.system_id.clone() else {
            debug!("envelope without a system id, dropping");
            return;
        };

        if let Body::AppPropose { processes, value } = &inner.body {
            if self.instances.contains_key(&system_id) {
                debug!(%system_id, "duplicate proposal for a running instance, dropping");
                return;
            }
            let proposal = Message::new(Body::AppPropose {
                processes: processes.clone(),
                value: *value,
            })
            .with_system(system_id.clone());
            let handle = InstanceRunner::spawn(
                system_id.clone(),
                self.config.node_port,
                self.config.hub_addr(),
                self.config.stack.clone(),
                proposal,
                Membership::new(processes.clone()),
            );
            self.instances.insert(system_id, handle);
            return;
        }

        match self.instances.get(&system_id) {
            Some(handle) => handle.deliver(message).await,
            None => debug!(%system_id, "message for an unknown instance, dropping"),
        }
    }
}

async fn read_one(mut stream: TcpStream) -> Result<Message, CodecError> {
    read_frame(&mut stream).await
}
