use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::entry::TimetableEntry;
use super::live_data::{LiveData, LiveDataEvent};
use crate::error::CoreError;
use crate::provider::models::{EntrySnapshot, TimetableSnapshot};
use crate::provider::TrainApi;

/// Capacity of the per-instance event channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub enum TimetableEvent {
    /// The entry the train is currently at changed.
    CurrentChanged { entry: TimetableEntry },
}

/// The schedule of one train, kept in step with its live position.
///
/// Cheap to clone; clones share state. The entry list is rebuilt wholesale
/// by [`Timetable::update`]; the current position is derived from the
/// train's [`LiveData`] and never stored here.
#[derive(Clone)]
pub struct Timetable {
    inner: Arc<TimetableInner>,
}

pub(crate) struct TimetableInner {
    api: Arc<dyn TrainApi>,
    server_code: String,
    train_number: String,
    live_data: LiveData,
    entries: RwLock<Vec<TimetableEntry>>,
    events: broadcast::Sender<TimetableEvent>,
    /// Task forwarding live data index changes as CurrentChanged
    forwarder: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

/// Handle identity, not value equality.
impl PartialEq for Timetable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Timetable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timetable")
            .field("server_code", &self.inner.server_code)
            .field("train_number", &self.inner.train_number)
            .field("size", &self.inner.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl Timetable {
    pub(crate) fn new(
        api: Arc<dyn TrainApi>,
        server_code: &str,
        train_number: &str,
        live_data: LiveData,
        snapshot: &TimetableSnapshot,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(TimetableInner {
            api,
            server_code: server_code.to_string(),
            train_number: train_number.to_string(),
            live_data,
            entries: RwLock::new(Vec::new()),
            events,
            forwarder: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        });
        *inner.entries.write() = build_entries(&inner, &snapshot.timetable);
        *inner.forwarder.lock() = Some(spawn_forwarder(&inner));
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Arc<TimetableInner>) -> Self {
        Self { inner }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimetableEvent> {
        self.inner.events.subscribe()
    }

    fn check_destroyed(&self) -> Result<(), CoreError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(CoreError::ObjectDestroyed);
        }
        Ok(())
    }

    pub fn server_code(&self) -> &str {
        &self.inner.server_code
    }

    pub fn train_number(&self) -> &str {
        &self.inner.train_number
    }

    pub fn size(&self) -> Result<usize, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.entries.read().len())
    }

    pub fn entries(&self) -> Result<Vec<TimetableEntry>, CoreError> {
        self.check_destroyed()?;
        Ok(self.inner.entries.read().clone())
    }

    pub fn entry(&self, index: usize) -> Result<TimetableEntry, CoreError> {
        self.check_destroyed()?;
        let entries = self.inner.entries.read();
        entries
            .get(index)
            .cloned()
            .ok_or(CoreError::IndexOutOfRange {
                index,
                size: entries.len(),
            })
    }

    /// Index of the entry the train is currently at, if known.
    pub fn current_index(&self) -> Result<Option<usize>, CoreError> {
        self.check_destroyed()?;
        self.inner.live_data.timetable_index()
    }

    /// The entry the train is currently at.
    pub fn current(&self) -> Result<TimetableEntry, CoreError> {
        let index = self.current_index()?.ok_or(CoreError::NoLiveData)?;
        self.entry(index)
    }

    /// Entries already passed, oldest first.
    pub fn history(&self) -> Result<Vec<TimetableEntry>, CoreError> {
        let index = self.current_index()?.ok_or(CoreError::NoLiveData)?;
        let entries = self.inner.entries.read();
        Ok(entries[..index.min(entries.len())].to_vec())
    }

    /// The current entry and everything still ahead.
    pub fn upcoming(&self) -> Result<Vec<TimetableEntry>, CoreError> {
        let index = self.current_index()?.ok_or(CoreError::NoLiveData)?;
        let entries = self.inner.entries.read();
        Ok(entries[index.min(entries.len())..].to_vec())
    }

    /// Re-fetch the schedule and rebuild every entry. Handles to old
    /// entries stay usable but navigate against the fresh list.
    pub async fn update(&self) -> Result<(), CoreError> {
        self.check_destroyed()?;
        let snapshot = self
            .inner
            .api
            .timetable(&self.inner.server_code, &self.inner.train_number)
            .await?;
        self.check_destroyed()?;
        *self.inner.entries.write() = build_entries(&self.inner, &snapshot.timetable);
        Ok(())
    }

    pub(crate) fn destroy(&self) -> Result<(), CoreError> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Err(CoreError::ObjectDestroyed);
        }
        if let Some(handle) = self.inner.forwarder.lock().take() {
            handle.abort();
        }
        Ok(())
    }
}

fn build_entries(
    inner: &Arc<TimetableInner>,
    snapshots: &[EntrySnapshot],
) -> Vec<TimetableEntry> {
    let size = snapshots.len();
    snapshots
        .iter()
        .enumerate()
        .map(|(index, snapshot)| {
            TimetableEntry::from_snapshot(Arc::downgrade(inner), index, size, snapshot)
        })
        .collect()
}

fn spawn_forwarder(inner: &Arc<TimetableInner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let mut receiver = inner.live_data.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(LiveDataEvent::TimetableIndexChanged { index }) => {
                    let Some(inner) = weak.upgrade() else { break };
                    let timetable = Timetable::from_inner(inner);
                    // resolve the entry from the index the event carries;
                    // re-reading the live state here would collapse quick
                    // successive transitions into the latest one. A
                    // position that cannot be resolved is skipped.
                    if let Some(entry) =
                        index.and_then(|index| timetable.entry(index).ok())
                    {
                        let _ = timetable
                            .inner
                            .events
                            .send(TimetableEvent::CurrentChanged { entry });
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "timetable fell behind the live data events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
