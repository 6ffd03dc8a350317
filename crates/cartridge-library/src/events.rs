//! Change notifications for the view layer

use crate::tree::NodeRef;
use std::sync::mpsc::{Receiver, Sender, channel};

/// What happened to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Removed,
    MetadataChanged,
    /// The node's children were reordered
    Sorted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEvent {
    pub node: NodeRef,
    pub change: ChangeKind,
}

impl CatalogEvent {
    pub fn new(node: NodeRef, change: ChangeKind) -> Self {
        Self { node, change }
    }
}

/// Fans events out to every live subscriber
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<CatalogEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new receiver
    pub fn subscribe(&mut self) -> Receiver<CatalogEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver an event. Subscribers whose receiver was dropped are
    /// forgotten.
    pub fn publish(&mut self, event: CatalogEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    pub fn publish_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = CatalogEvent>,
    {
        for event in events {
            if self.subscribers.is_empty() {
                return;
            }
            self.publish(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;
    use crate::tree::{NodeKind, Tree, TreeId};

    fn node_ref() -> NodeRef {
        let mut tree = Tree::new("/roms/nes");
        let root = tree.root();
        let id = tree.add_child(root, NodeKind::Game, "/roms/nes/a.rom", Metadata::new());
        NodeRef::new(TreeId::System(0), id)
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let mut bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        let event = CatalogEvent::new(node_ref(), ChangeKind::Added);
        bus.publish(event);

        assert_eq!(first.try_recv().unwrap(), event);
        assert_eq!(second.try_recv().unwrap(), event);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish_all([
            CatalogEvent::new(node_ref(), ChangeKind::MetadataChanged),
            CatalogEvent::new(node_ref(), ChangeKind::Sorted),
        ]);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_iter().count(), 2);
    }

    #[test]
    fn test_no_subscribers_is_fine() {
        let mut bus = EventBus::new();
        bus.publish(CatalogEvent::new(node_ref(), ChangeKind::Removed));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
