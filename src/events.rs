//! Process-wide event channel for semantic pipeline lifecycle events (§9).

use std::sync::mpsc::{Receiver, SyncSender};

#[derive(Debug, Clone, PartialEq)]
pub enum RepoEngineEvent {
    SemanticIndexBuildStarted { repo_id: String },
    SemanticIndexBuildFinished { repo_id: String, files_processed: u64, chunks_embedded: u64, duration_ms: u64 },
    SemanticIndexUpdateStarted { repo_id: String },
    SemanticIndexUpdateFinished { repo_id: String, changed_files: u64, removed_files: u64, duration_ms: u64 },
}

/// A bounded, single-consumer event bus. `mpsc` is single-consumer by
/// nature; fan-out to multiple subscribers is done by cloning the sender to
/// each subscriber's own channel at construction time.
pub struct EventBus {
    sender: SyncSender<RepoEngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> (Self, Receiver<RepoEngineEvent>) {
        let (sender, receiver) = std::sync::mpsc::sync_channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn sender(&self) -> SyncSender<RepoEngineEvent> {
        self.sender.clone()
    }

    pub fn emit(&self, event: RepoEngineEvent) {
        // A full or disconnected channel must never block or panic the pipeline.
        let _ = self.sender.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_observed_in_order() {
        let (bus, rx) = EventBus::new(8);
        bus.emit(RepoEngineEvent::SemanticIndexBuildStarted { repo_id: "r1".into() });
        bus.emit(RepoEngineEvent::SemanticIndexBuildFinished {
            repo_id: "r1".into(),
            files_processed: 3,
            chunks_embedded: 9,
            duration_ms: 42,
        });

        let first = rx.recv().unwrap();
        assert!(matches!(first, RepoEngineEvent::SemanticIndexBuildStarted { .. }));
        let second = rx.recv().unwrap();
        assert!(matches!(second, RepoEngineEvent::SemanticIndexBuildFinished { .. }));
    }

    #[test]
    fn update_events_are_observed_in_order() {
        let (bus, rx) = EventBus::new(8);
        bus.emit(RepoEngineEvent::SemanticIndexUpdateStarted { repo_id: "r1".into() });
        bus.emit(RepoEngineEvent::SemanticIndexUpdateFinished {
            repo_id: "r1".into(),
            changed_files: 2,
            removed_files: 1,
            duration_ms: 7,
        });

        let first = rx.recv().unwrap();
        assert!(matches!(first, RepoEngineEvent::SemanticIndexUpdateStarted { .. }));
        let second = rx.recv().unwrap();
        assert!(matches!(second, RepoEngineEvent::SemanticIndexUpdateFinished { .. }));
    }

    #[test]
    fn emit_does_not_panic_with_no_receiver() {
        let (bus, rx) = EventBus::new(1);
        drop(rx);
        bus.emit(RepoEngineEvent::SemanticIndexUpdateStarted { repo_id: "r1".into() });
    }
}
