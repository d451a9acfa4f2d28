use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::marshal::Marshal;

/// Durable home of a single value.
pub trait SimpleStorage<T>: Send + Sync {
    fn exists(&self) -> bool;

    fn read_state(&self) -> io::Result<T>;

    fn write_state(&self, state: &T) -> io::Result<()>;
}

/// Stores a value in its own file.
///
/// Writes go to a sibling temp file which is synced and then renamed over the
/// target, so a crash leaves either the old or the new value.
pub struct SimpleFileStorage<T> {
    path: PathBuf,
    _value: PhantomData<fn() -> T>,
}

impl<T> SimpleFileStorage<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<T: Marshal> SimpleStorage<T> for SimpleFileStorage<T> {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn read_state(&self) -> io::Result<T> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        T::unmarshal(&mut reader)
    }

    fn write_state(&self, state: &T) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(&state.to_bytes()?)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)
    }
}

/// Keeps the value in memory, for embedded and test setups.
pub struct InMemorySimpleStorage<T> {
    value: Mutex<Option<T>>,
}

impl<T> InMemorySimpleStorage<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    pub fn with_value(value: T) -> Self {
        Self {
            value: Mutex::new(Some(value)),
        }
    }
}

impl<T> Default for InMemorySimpleStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send> SimpleStorage<T> for InMemorySimpleStorage<T> {
    fn exists(&self) -> bool {
        self.value.lock().is_some()
    }

    fn read_state(&self) -> io::Result<T> {
        self.value
            .lock()
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no state stored"))
    }

    fn write_state(&self, state: &T) -> io::Result<()> {
        *self.value.lock() = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{ClusterId, DatabaseName};

    #[test]
    fn file_storage_round_trips_and_overwrites() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage =
            SimpleFileStorage::<ClusterId>::new(dir.path().join("cluster-state/cluster-id"));
        assert!(!storage.exists());

        let first = ClusterId::random();
        storage.write_state(&first)?;
        assert!(storage.exists());
        assert_eq!(storage.read_state()?, first);

        let second = ClusterId::random();
        storage.write_state(&second)?;
        assert_eq!(storage.read_state()?, second);
        assert!(!storage.temp_path().exists());
        Ok(())
    }

    #[test]
    fn reading_missing_file_fails() {
        let storage = SimpleFileStorage::<DatabaseName>::new("/definitely/not/here/db-name");
        assert!(storage.read_state().is_err());
    }

    #[test]
    fn in_memory_storage() -> io::Result<()> {
        let storage = InMemorySimpleStorage::new();
        assert!(!storage.exists());
        assert_eq!(storage.read_state().unwrap_err().kind(), io::ErrorKind::NotFound);
        storage.write_state(&7u8)?;
        assert_eq!(storage.read_state()?, 7);
        Ok(())
    }
}
