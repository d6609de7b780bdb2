use serde::Serialize;
use std::sync::{Arc, Weak};

use super::timetable::{Timetable, TimetableInner};
use crate::error::CoreError;
use crate::provider::models::EntrySnapshot;

/// What a train does at a timetable point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopKind {
    /// Scheduled passenger stop.
    PassengerStop {
        arrives_at: Option<String>,
        local_track: Option<u32>,
        platform: Option<String>,
        station_category: Option<String>,
    },
    /// Operational stop without passenger exchange.
    TimingStop { arrives_at: Option<String> },
    /// The train passes without stopping.
    Passthrough,
}

impl StopKind {
    pub(crate) fn classify(snapshot: &EntrySnapshot) -> Self {
        match snapshot.stop_type.as_deref() {
            Some("CommercialStop") => StopKind::PassengerStop {
                arrives_at: snapshot.arrival_time.clone(),
                local_track: snapshot.track,
                platform: snapshot.platform.clone(),
                station_category: snapshot.station_category.clone(),
            },
            Some("NoncommercialStop") => StopKind::TimingStop {
                arrives_at: snapshot.arrival_time.clone(),
            },
            _ => StopKind::Passthrough,
        }
    }
}

/// Serializable view of one timetable entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryData {
    pub index: usize,
    pub first: bool,
    pub last: bool,
    pub name: String,
    pub point_id: String,
    pub line: u32,
    pub kilometrage: f64,
    pub max_speed: u32,
    pub train_type: String,
    pub departs_at: Option<String>,
    pub radio_channels: Option<String>,
    pub supervised_by: Option<String>,
    pub kind: StopKind,
}

/// One point in a train's timetable.
///
/// Entries are immutable; a timetable refresh replaces the whole list and
/// old handles keep their values but navigate against the fresh list.
#[derive(Debug, Clone)]
pub struct TimetableEntry {
    inner: Arc<EntryInner>,
}

#[derive(Debug)]
struct EntryInner {
    timetable: Weak<TimetableInner>,
    index: usize,
    first: bool,
    last: bool,
    name: String,
    point_id: String,
    line: u32,
    kilometrage: f64,
    max_speed: u32,
    train_type: String,
    departs_at: Option<String>,
    radio_channels: Option<String>,
    supervised_by: Option<String>,
    kind: StopKind,
}

/// Handle identity, not value equality.
impl PartialEq for TimetableEntry {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl TimetableEntry {
    pub(crate) fn from_snapshot(
        timetable: Weak<TimetableInner>,
        index: usize,
        size: usize,
        snapshot: &EntrySnapshot,
    ) -> Self {
        Self {
            inner: Arc::new(EntryInner {
                timetable,
                index,
                first: index == 0,
                last: index + 1 == size,
                name: snapshot.name_of_point.clone(),
                point_id: snapshot.point_id.clone(),
                line: snapshot.line,
                kilometrage: snapshot.mileage,
                max_speed: snapshot.max_speed,
                train_type: snapshot.train_type.clone(),
                departs_at: snapshot.departure_time.clone(),
                radio_channels: snapshot.radio_channels.clone(),
                supervised_by: snapshot.supervised_by.clone(),
                kind: StopKind::classify(snapshot),
            }),
        }
    }

    fn timetable(&self) -> Result<Timetable, CoreError> {
        self.inner
            .timetable
            .upgrade()
            .map(Timetable::from_inner)
            .ok_or(CoreError::ObjectDestroyed)
    }

    /// The entry after this one in the current timetable.
    pub fn next(&self) -> Result<TimetableEntry, CoreError> {
        self.timetable()?.entry(self.inner.index + 1)
    }

    /// The entry before this one in the current timetable.
    pub fn previous(&self) -> Result<TimetableEntry, CoreError> {
        let timetable = self.timetable()?;
        if self.inner.index == 0 {
            return Err(CoreError::IndexOutOfRange {
                index: 0,
                size: timetable.size()?,
            });
        }
        timetable.entry(self.inner.index - 1)
    }

    pub fn index(&self) -> usize {
        self.inner.index
    }

    pub fn first(&self) -> bool {
        self.inner.first
    }

    pub fn last(&self) -> bool {
        self.inner.last
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn point_id(&self) -> &str {
        &self.inner.point_id
    }

    pub fn line(&self) -> u32 {
        self.inner.line
    }

    pub fn kilometrage(&self) -> f64 {
        self.inner.kilometrage
    }

    pub fn max_speed(&self) -> u32 {
        self.inner.max_speed
    }

    pub fn train_type(&self) -> &str {
        &self.inner.train_type
    }

    pub fn departs_at(&self) -> Option<&str> {
        self.inner.departs_at.as_deref()
    }

    pub fn radio_channels(&self) -> Option<&str> {
        self.inner.radio_channels.as_deref()
    }

    pub fn supervised_by(&self) -> Option<&str> {
        self.inner.supervised_by.as_deref()
    }

    pub fn kind(&self) -> &StopKind {
        &self.inner.kind
    }

    pub fn data(&self) -> EntryData {
        EntryData {
            index: self.inner.index,
            first: self.inner.first,
            last: self.inner.last,
            name: self.inner.name.clone(),
            point_id: self.inner.point_id.clone(),
            line: self.inner.line,
            kilometrage: self.inner.kilometrage,
            max_speed: self.inner.max_speed,
            train_type: self.inner.train_type.clone(),
            departs_at: self.inner.departs_at.clone(),
            radio_channels: self.inner.radio_channels.clone(),
            supervised_by: self.inner.supervised_by.clone(),
            kind: self.inner.kind.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.data())?)
    }
}
