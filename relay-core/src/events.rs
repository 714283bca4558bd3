//! Event Fan-out (spec §4.H): a publish-subscribe topic keyed by "relay".
//! Delivery is best-effort per-client; a slow or disconnected client never
//! blocks the Match Engine.

use bitcoin::Txid;
use tokio::sync::broadcast;

use crate::codec::RequestId;

/// Payload of a "requests satisfied" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestsSatisfied {
    pub txid: Txid,
    pub height: u32,
    pub satisfied: Vec<RequestId>,
}

/// Typed event enum (spec §9: "an explicit publish-subscribe hub with a
/// typed event enum" in place of untyped emitter/listener pairs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    RequestsSatisfied(RequestsSatisfied),
}

/// The "relay" topic. One hub per running engine.
pub struct EventHub {
    sender: broadcast::Sender<RelayEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        EventHub { sender }
    }

    /// A subscription handle; dropping it releases the topic slot.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Best-effort: never blocks on a slow client, and succeeds even with
    /// zero subscribers.
    pub fn publish(&self, event: RelayEvent) {
        let _ = self.sender.send(event);
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<RelayEvent>,
}

impl Subscription {
    /// Skips past any events missed due to lag rather than erroring the
    /// caller; a slow client drops the backlog, not the connection.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
