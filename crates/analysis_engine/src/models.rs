use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

const NO_FILTER: usize = usize::MAX;

/// A record that belongs to one stream of the source.
pub trait StreamRecord: Clone {
    fn stream_index(&self) -> usize;
}

/// One syntax unit (NAL unit, start code or transport packet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    pub index: u64,
    pub stream: usize,
    pub offset: u64,
    pub size: u64,
    pub kind: String,
}

impl StreamRecord for PacketRecord {
    fn stream_index(&self) -> usize {
        self.stream
    }
}

/// Bytes carried by one stream within one window of units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitrateRecord {
    pub stream: usize,
    pub window: u64,
    pub units: u32,
    pub bytes: u64,
}

impl StreamRecord for BitrateRecord {
    fn stream_index(&self) -> usize {
        self.stream
    }
}

/// Append-only table shared between a worker (writer) and display surfaces (readers).
///
/// The stream filter is applied when reading; changing it never discards rows.
/// Neither does color coding, which only changes [`RecordModel::color_key`].
#[derive(Debug)]
pub struct RecordModel<T> {
    rows: RwLock<Vec<T>>,
    filter: AtomicUsize,
    color_coded: AtomicBool,
}

pub type PacketModel = RecordModel<PacketRecord>;
pub type BitrateModel = RecordModel<BitrateRecord>;

impl<T: StreamRecord> Default for RecordModel<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            filter: AtomicUsize::new(NO_FILTER),
            color_coded: AtomicBool::new(false),
        }
    }
}

impl<T: StreamRecord> RecordModel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: T) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn set_filter(&self, stream: Option<usize>) {
        self.filter
            .store(stream.unwrap_or(NO_FILTER), Ordering::Relaxed);
    }

    pub fn filter(&self) -> Option<usize> {
        match self.filter.load(Ordering::Relaxed) {
            NO_FILTER => None,
            stream => Some(stream),
        }
    }

    pub fn set_color_coding(&self, enabled: bool) {
        self.color_coded.store(enabled, Ordering::Relaxed);
    }

    pub fn color_coding(&self) -> bool {
        self.color_coded.load(Ordering::Relaxed)
    }

    /// Palette slot for `row`: its stream index while color coding is on.
    pub fn color_key(&self, row: &T) -> Option<usize> {
        self.color_coding().then(|| row.stream_index())
    }

    /// Number of rows regardless of the filter.
    pub fn total_len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Copy of the rows that pass the current filter.
    pub fn visible_rows(&self) -> Vec<T> {
        let filter = self.filter();
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|row| filter.map_or(true, |stream| row.stream_index() == stream))
            .cloned()
            .collect()
    }

    pub fn visible_len(&self) -> usize {
        let Some(stream) = self.filter() else {
            return self.total_len();
        };
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|row| row.stream_index() == stream)
            .count()
    }
}
