//! Fire-and-forget notifications for an external search index.

use crate::repository::RepositoryId;
use std::fmt::Debug;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    Stored { repository: RepositoryId, path: PathBuf },
    Deleted { repository: RepositoryId, path: PathBuf },
}

impl IndexEvent {
    pub fn repository(&self) -> &RepositoryId {
        match self {
            Self::Stored { repository, .. } | Self::Deleted { repository, .. } => repository,
        }
    }
}

/// Receives an event after every successful store or delete.
///
/// Implementations must return immediately; the engine neither waits for
/// nor inspects the outcome.
pub trait IndexNotifier: Send + Sync + Debug {
    fn notify(&self, event: IndexEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl IndexNotifier for NoopNotifier {
    fn notify(&self, _event: IndexEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: UnboundedSender<IndexEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<IndexEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl IndexNotifier for ChannelNotifier {
    fn notify(&self, event: IndexEvent) {
        if let Err(err) = self.sender.send(event) {
            tracing::debug!(repository = %err.0.repository(), "index listener gone, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_notifier() {
        let (notifier, mut receiver) = ChannelNotifier::new();
        let event = IndexEvent::Stored {
            repository: RepositoryId::new("s", "releases"),
            path: PathBuf::from("com/acme/lib/1.0/lib-1.0.jar"),
        };
        notifier.notify(event.clone());
        assert_eq!(receiver.try_recv().unwrap(), event);

        drop(receiver);
        notifier.notify(event);
    }
}
