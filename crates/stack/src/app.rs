//! Application layer: hub-facing bootstrap and decision reporting.

use crate::{
    BestEffortBroadcast, EpochChange, EventualLeaderDetector, EventuallyPerfectFailureDetector,
    InstanceCtx, PerfectLink, StackConfig, UniformConsensus,
};
use paxon_core::{Abstraction, Action, Body, Message, Outbox};
use paxon_types::{Membership, Port, SystemId};
use std::sync::Arc;
use tracing::{info, warn};

/// Bootstraps one consensus instance from the hub's proposal and reports
/// the decision back.
///
/// On `AppPropose` it installs the membership, identifies the local
/// process by the node's listening port, registers the stack in
/// dependency order, and feeds the proposal into uniform consensus. On
/// `UcDecide` it hands an `AppDecide` to the runner for delivery to the
/// hub.
pub struct Application {
    system_id: SystemId,
    node_port: Port,
    config: StackConfig,
}

impl Application {
    pub fn new(system_id: SystemId, node_port: Port, config: StackConfig) -> Self {
        Self {
            system_id,
            node_port,
            config,
        }
    }
}

impl Abstraction for Application {
    fn name(&self) -> &'static str {
        "app"
    }

    fn handle(&mut self, message: &Message, out: &mut Outbox) -> bool {
        match &message.body {
            Body::AppPropose { processes, value } => {
                let membership = Membership::new(processes.clone());
                let Some(own) = membership.by_port(self.node_port).cloned() else {
                    warn!(
                        system_id = %self.system_id,
                        node_port = self.node_port,
                        "proposal does not include this node, ignoring"
                    );
                    return true;
                };
                info!(
                    system_id = %self.system_id,
                    own = %own,
                    members = membership.len(),
                    value = %value,
                    "starting consensus instance"
                );
                let ctx = Arc::new(InstanceCtx {
                    system_id: self.system_id.clone(),
                    membership,
                    own,
                });
                out.register(Box::new(PerfectLink));
                out.register(Box::new(EventuallyPerfectFailureDetector::new(
                    ctx.clone(),
                    self.config.delta,
                )));
                out.register(Box::new(EventualLeaderDetector::new(ctx.clone())));
                out.register(Box::new(BestEffortBroadcast::new(ctx.clone())));
                out.register(Box::new(EpochChange::new(ctx.clone())));
                out.register(Box::new(UniformConsensus::new(ctx)));
                out.trigger(Message::new(Body::UcPropose { value: *value }));
                true
            }
            Body::UcDecide { value } => {
                info!(system_id = %self.system_id, value = %value, "reporting decision to hub");
                out.act(Action::SendToHub {
                    message: Message::new(Body::AppDecide { value: *value })
                        .with_system(self.system_id.clone()),
                });
                true
            }
            _ => false,
        }
    }
}
