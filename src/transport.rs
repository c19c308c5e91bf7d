//! Message delivery between nodes.
//!
//! The driver only needs "send to a named peer" and "receive the next message". Delivery is
//! unreliable: dropped messages show up as missed deadlines, never as errors the protocol
//! inspects.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{trace, warn};

use crate::error::TransportError;
use crate::messages::SigningMessage;
use crate::tree::NodeId;

pub trait Transport: Send + Sync {
    fn send(&self, message: SigningMessage) -> Result<(), TransportError>;
}

#[derive(Default)]
struct Links {
    inboxes: HashMap<NodeId, UnboundedSender<Vec<u8>>>,
    down: HashSet<NodeId>,
    cut: HashSet<(NodeId, NodeId)>,
}

/// In-process network. Messages travel as encoded bytes over unbounded channels; nodes and
/// single directed links can be taken down to simulate failures.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    links: Arc<Mutex<Links>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `id` to the network, replacing any earlier inbox.
    pub fn register(&self, id: NodeId) -> Inbox {
        let (sender, receiver) = unbounded_channel();
        self.lock().inboxes.insert(id, sender);
        Inbox { id, receiver }
    }

    /// A node that is down neither sends nor receives.
    pub fn set_down(&self, id: NodeId) {
        self.lock().down.insert(id);
    }

    pub fn set_up(&self, id: NodeId) {
        self.lock().down.remove(&id);
    }

    /// Drop everything sent from `from` to `to`.
    pub fn cut(&self, from: NodeId, to: NodeId) {
        self.lock().cut.insert((from, to));
    }

    pub fn restore(&self, from: NodeId, to: NodeId) {
        self.lock().cut.remove(&(from, to));
    }

    fn lock(&self) -> MutexGuard<'_, Links> {
        self.links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for LocalNetwork {
    fn send(&self, message: SigningMessage) -> Result<(), TransportError> {
        let links = self.lock();
        let (from, to) = (message.from, message.to);
        let inbox = links
            .inboxes
            .get(&to)
            .ok_or(TransportError::UnknownPeer(to))?;
        if links.down.contains(&from) || links.down.contains(&to) || links.cut.contains(&(from, to))
        {
            trace!(%from, %to, kind = message.body.name(), "dropped");
            return Ok(());
        }
        let bytes = message
            .to_bytes()
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        inbox.send(bytes).map_err(|_| TransportError::Closed(to))
    }
}

/// Receiving end of one node's link to a [`LocalNetwork`].
pub struct Inbox {
    id: NodeId,
    receiver: UnboundedReceiver<Vec<u8>>,
}

impl Inbox {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Next message that decodes; `None` once the network is gone.
    pub async fn recv(&mut self) -> Option<SigningMessage> {
        loop {
            let bytes = self.receiver.recv().await?;
            match SigningMessage::from_bytes(&bytes) {
                Ok(message) => return Some(message),
                Err(e) => warn!(node = %self.id, error = %e, "undecodable message dropped"),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messages::MessageBody;

    fn close_all(from: u32, to: u32) -> SigningMessage {
        SigningMessage {
            from: NodeId(from),
            to: NodeId(to),
            view: 0,
            round: 0,
            last_seen_vote: 0,
            body: MessageBody::CloseAll,
        }
    }

    #[tokio::test]
    async fn delivers_and_drops() {
        let network = LocalNetwork::new();
        let mut a = network.register(NodeId(0));
        let _b = network.register(NodeId(1));

        network.send(close_all(1, 0)).unwrap();
        assert_eq!(a.recv().await, Some(close_all(1, 0)));

        network.set_down(NodeId(1));
        network.send(close_all(1, 0)).unwrap();
        network.set_up(NodeId(1));
        network.cut(NodeId(1), NodeId(0));
        network.send(close_all(1, 0)).unwrap();
        network.restore(NodeId(1), NodeId(0));
        network.send(close_all(1, 0)).unwrap();
        assert_eq!(a.recv().await, Some(close_all(1, 0)));
        assert!(a.receiver.try_recv().is_err());

        assert_eq!(
            network.send(close_all(0, 9)),
            Err(TransportError::UnknownPeer(NodeId(9)))
        );
    }
}
