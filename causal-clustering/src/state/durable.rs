use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::marshal::Marshal;

/// State that can live in a [`DurableStateStorage`].
pub trait DurableState: Marshal + Clone {
    /// State used when nothing has been persisted yet.
    fn start_state() -> Self;

    /// Monotonic position of this state; recovery keeps the higher one.
    fn ordinal(&self) -> i64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    A,
    B,
}

impl Slot {
    fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Rotating pair of append-only files holding full state snapshots.
///
/// Each `persist` appends one complete record to the active file and syncs
/// it. After `rotation_size` records the other file is truncated and becomes
/// active, so the previous file always holds a complete older state.
///
/// # Recovery
///
/// On open the last complete record of each file is read; a torn trailing
/// record is ignored. The file with the higher ordinal wins. The losing file
/// is truncated, receives the recovered state and becomes the active file.
pub struct DurableStateStorage<S> {
    file_a: PathBuf,
    file_b: PathBuf,
    active: Slot,
    writer: File,
    entries_in_active: usize,
    rotation_size: usize,
    recovered: S,
}

impl<S: DurableState> DurableStateStorage<S> {
    pub fn open(dir: &Path, name: &str, rotation_size: usize) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file_a = dir.join(format!("{name}.a"));
        let file_b = dir.join(format!("{name}.b"));

        let from_a = read_last_record::<S>(&file_a)?;
        let from_b = read_last_record::<S>(&file_b)?;

        let (recovered, active) = match (from_a, from_b) {
            (None, None) => (S::start_state(), Slot::A),
            (Some(a), None) => (a, Slot::B),
            (None, Some(b)) => (b, Slot::A),
            (Some(a), Some(b)) if a.ordinal() >= b.ordinal() => (a, Slot::B),
            (Some(_), Some(b)) => (b, Slot::A),
        };

        let active_path = match active {
            Slot::A => &file_a,
            Slot::B => &file_b,
        };
        let writer = truncate_for_append(active_path)?;
        info!(
            state = name,
            ordinal = recovered.ordinal(),
            active = ?active,
            "recovered durable state"
        );

        let mut storage = Self {
            file_a,
            file_b,
            active,
            writer,
            entries_in_active: 0,
            rotation_size: rotation_size.max(1),
            recovered,
        };
        let recovered = storage.recovered.clone();
        storage.append(&recovered)?;
        Ok(storage)
    }

    /// State found on disk when this storage was opened.
    pub fn initial_state(&self) -> &S {
        &self.recovered
    }

    pub fn persist_store_data(&mut self, state: &S) -> io::Result<()> {
        if self.entries_in_active >= self.rotation_size {
            self.switch_file()?;
        }
        self.append(state)
    }

    pub fn active_path(&self) -> &Path {
        match self.active {
            Slot::A => &self.file_a,
            Slot::B => &self.file_b,
        }
    }

    fn append(&mut self, state: &S) -> io::Result<()> {
        let bytes = state.to_bytes()?;
        self.writer.write_all(&bytes)?;
        self.writer.sync_data()?;
        self.entries_in_active += 1;
        Ok(())
    }

    fn switch_file(&mut self) -> io::Result<()> {
        self.active = self.active.other();
        self.writer = truncate_for_append(self.active_path())?;
        self.entries_in_active = 0;
        debug!(path = %self.active_path().display(), "rotated durable state file");
        Ok(())
    }
}

fn truncate_for_append(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

fn read_last_record<S: DurableState>(path: &Path) -> io::Result<Option<S>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };

    let mut reader = &bytes[..];
    let mut last = None;
    while !reader.is_empty() {
        match S::unmarshal(&mut reader) {
            Ok(state) => last = Some(state),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(path = %path.display(), "ignoring torn trailing record");
                break;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "stopping at unreadable record");
                break;
            }
        }
    }
    Ok(last)
}
