use std::sync::Arc;

use futures::{stream, Stream};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::{
    error::AppError,
    models::{suggestion::Suggestion, trip::Trip},
    services::store::BoardStore,
};

/// Everything a client needs to render the board, as of one point in time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardSnapshot {
    pub version: u64,
    pub trips: Vec<Trip>,
    pub suggestions: Vec<Suggestion>,
}

impl BoardSnapshot {
    pub fn trip(&self, id: &str) -> Option<&Trip> {
        self.trips.iter().find(|trip| trip.id == id)
    }

    pub fn suggestion(&self, id: &str) -> Option<&Suggestion> {
        self.suggestions.iter().find(|card| card.id == id)
    }

    pub fn suggestions_for(&self, trip_id: &str) -> Vec<Suggestion> {
        self.suggestions
            .iter()
            .filter(|card| card.trip_id == trip_id)
            .cloned()
            .collect()
    }

    pub fn trip_ids(&self) -> Vec<String> {
        self.trips.iter().map(|trip| trip.id.clone()).collect()
    }
}

/// Publishes whole-board snapshots to every subscriber.
///
/// Published snapshots are immutable; a change replaces the shared value.
#[derive(Clone)]
pub struct SyncHub {
    tx: Arc<watch::Sender<Arc<BoardSnapshot>>>,
    reload: Arc<Mutex<()>>,
}

impl SyncHub {
    pub fn new(initial: BoardSnapshot) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self {
            tx: Arc::new(tx),
            reload: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load(store: &BoardStore) -> Result<Self, AppError> {
        let snapshot = BoardSnapshot {
            version: 0,
            trips: store.list_trips().await?,
            suggestions: store.list_all_suggestions().await?,
        };
        Ok(Self::new(snapshot))
    }

    pub fn current(&self) -> Arc<BoardSnapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Re-reads the whole board from `store` and publishes it.
    ///
    /// Reloads are serialized, so a snapshot is never replaced by an older one.
    pub async fn refresh(&self, store: &BoardStore) -> Result<Arc<BoardSnapshot>, AppError> {
        let _guard = self.reload.lock().await;
        let trips = store.list_trips().await?;
        let suggestions = store.list_all_suggestions().await?;
        let snapshot = Arc::new(BoardSnapshot {
            version: self.tx.borrow().version + 1,
            trips,
            suggestions,
        });
        self.tx.send_replace(snapshot.clone());
        debug!(
            version = snapshot.version,
            subscribers = self.subscriber_count(),
            "published board snapshot"
        );
        Ok(snapshot)
    }

    /// Like [`SyncHub::refresh`], for callers whose write already succeeded.
    ///
    /// A failed reload leaves the previous snapshot in place.
    pub async fn refresh_after_write(&self, store: &BoardStore) -> Arc<BoardSnapshot> {
        match self.refresh(store).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("snapshot reload failed: {err}");
                self.current()
            }
        }
    }
}

/// A live view of the board. Dropping it unsubscribes.
pub struct Subscription {
    rx: watch::Receiver<Arc<BoardSnapshot>>,
}

impl Subscription {
    pub fn current(&mut self) -> Arc<BoardSnapshot> {
        self.rx.borrow_and_update().clone()
    }

    /// Waits for the next published snapshot. `None` once the hub is gone.
    pub async fn changed(&mut self) -> Option<Arc<BoardSnapshot>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// The current snapshot followed by every later one.
    pub fn into_stream(self) -> impl Stream<Item = Arc<BoardSnapshot>> + Send + 'static {
        stream::unfold((self, true), |(mut sub, first)| async move {
            let snapshot = if first {
                sub.current()
            } else {
                sub.changed().await?
            };
            Some((snapshot, (sub, false)))
        })
    }
}
