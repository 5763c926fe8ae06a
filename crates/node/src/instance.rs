//! Per-instance runner task.

use crate::codec::{encode_frame, wrap_envelope};
use crate::timer::HeartbeatTimer;
use paxon_core::{Action, Body, Dispatcher, Message, TimerId};
use paxon_stack::{Application, StackConfig};
use paxon_types::{Membership, Port, ProcessId, SystemId};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sleep between sweeps when the queue holds only unclaimed messages.
const IDLE_SLEEP: Duration = Duration::from_millis(10);

const CHANNEL_CAPACITY: usize = 1024;

/// Handle for feeding decoded wire messages into a running instance.
#[derive(Clone)]
pub struct InstanceHandle {
    tx: mpsc::Sender<Message>,
}

impl InstanceHandle {
    pub async fn deliver(&self, message: Message) {
        if self.tx.send(message).await.is_err() {
            debug!("instance task is gone, dropping message");
        }
    }
}

/// One consensus instance: a dispatcher owned by a single tokio task.
///
/// The task ingests decoded envelopes (translating them to `PlDeliver`
/// through the membership list), timer markers, and the initial hub
/// proposal; sweeps the dispatcher; and executes the drained actions.
/// All abstraction state lives on this task.
pub struct InstanceRunner {
    system_id: SystemId,
    node_port: Port,
    hub_addr: String,
    membership: Membership,
    dispatcher: Dispatcher,
    rx: mpsc::Receiver<Message>,
    timer: HeartbeatTimer,
}

impl InstanceRunner {
    /// Create an instance for a hub proposal and spawn its task. The
    /// proposal itself is the first message through the dispatcher.
    pub fn spawn(
        system_id: SystemId,
        node_port: Port,
        hub_addr: String,
        config: StackConfig,
        proposal: Message,
        membership: Membership,
    ) -> InstanceHandle {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut dispatcher = Dispatcher::new(system_id.clone());
        dispatcher.register(Box::new(Application::new(
            system_id.clone(),
            node_port,
            config,
        )));
        dispatcher.trigger(proposal);

        let runner = Self {
            system_id,
            node_port,
            hub_addr,
            membership,
            dispatcher,
            rx,
            timer: HeartbeatTimer::new(tx.clone()),
        };
        tokio::spawn(runner.run());
        InstanceHandle { tx }
    }

    async fn run(mut self) {
        debug!(system_id = %self.system_id, "instance task started");
        loop {
            self.sweep();
            tokio::select! {
                biased;

                maybe = self.rx.recv() => match maybe {
                    Some(message) => self.ingest(message),
                    None => break,
                },

                // Unclaimed messages may become claimable once pending
                // work (a new epoch instance) lands; retry after a short
                // yield rather than busy-spinning.
                _ = tokio::time::sleep(IDLE_SLEEP), if self.dispatcher.has_pending() => {}
            }
            while let Ok(message) = self.rx.try_recv() {
                self.ingest(message);
            }
        }
        debug!(system_id = %self.system_id, "instance task stopped");
    }

    /// Translate one inbound message and enqueue it.
    fn ingest(&mut self, message: Message) {
        match message.body {
            Body::Network {
                message: inner,
                sender_listening_port,
                ..
            } => match self.membership.by_port(sender_listening_port) {
                Some(sender) => {
                    self.dispatcher.trigger(Message {
                        system_id: message.system_id,
                        abstraction: message.abstraction,
                        body: Body::PlDeliver {
                            sender: sender.clone(),
                            message: inner,
                        },
                    });
                }
                None => debug!(
                    system_id = %self.system_id,
                    port = sender_listening_port,
                    "message from a port outside the membership, dropping"
                ),
            },
            // Timer markers and the bootstrap proposal go in as they are.
            _ => self.dispatcher.trigger(message),
        }
    }

    /// Sweep until no message is claimed, executing actions after every
    /// pass.
    fn sweep(&mut self) {
        loop {
            let progressed = self.dispatcher.step();
            for action in self.dispatcher.drain_actions() {
                self.execute(action);
            }
            if !progressed {
                break;
            }
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Send {
                destination,
                message,
                abstraction,
            } => {
                let envelope = wrap_envelope(
                    message,
                    abstraction,
                    Some(self.system_id.clone()),
                    self.node_port,
                );
                send_to(peer_addr(&destination), envelope);
            }
            Action::SendToHub { message } => {
                let envelope = wrap_envelope(
                    message,
                    None,
                    Some(self.system_id.clone()),
                    self.node_port,
                );
                send_to(self.hub_addr.clone(), envelope);
            }
            Action::SetTimer {
                id: TimerId::Heartbeat,
                duration,
            } => self.timer.arm(duration),
        }
    }
}

fn peer_addr(process: &ProcessId) -> String {
    // The hub leaves the host empty for processes on the local machine.
    let host = if process.host.is_empty() {
        "127.0.0.1"
    } else {
        process.host.as_str()
    };
    format!("{host}:{}", process.port)
}

/// Fire-and-forget framed send over a short-lived connection. Failures
/// are transient by the error model: log and drop, the layers above
/// retransmit.
fn send_to(addr: String, envelope: Message) {
    let frame = match encode_frame(&envelope) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(%addr, %error, "failed to encode outbound message");
            return;
        }
    };
    tokio::spawn(async move {
        match TcpStream::connect(&addr).await {
            Ok(mut stream) => {
                if let Err(error) = stream.write_all(&frame).await {
                    warn!(%addr, %error, "send failed, dropping message");
                }
            }
            Err(error) => {
                warn!(%addr, %error, "connect failed, dropping message");
            }
        }
    });
}
