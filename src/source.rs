//! Byte regions the decoder reads from.
//!
//! A [`TelemetrySource`] is anything that can hand out copies of byte ranges
//! and say when the writer has published fresh data. On Windows the
//! simulator's shared memory mapping is one (see `windows::MappedRegion`);
//! [`MemoryRegion`] is an in-process one used for dumped regions and for
//! fabricated regions driven by a writer thread.

use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::{Result, TelemetryError};

/// Read access to a telemetry region written by someone else.
pub trait TelemetrySource {
    /// Length of the region in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Must fail with [`TelemetryError::Memory`] rather than read outside
    /// the region.
    fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()>;

    /// Copy `len` bytes starting at `offset` into a new vector.
    fn read_vec(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Block for at most `timeout` until the writer signals fresh data.
    /// Returns `true` when signaled.
    fn wait_for_data(&self, timeout: Duration) -> bool;

    /// Whether a fresh-data signal exists at all.
    fn has_data_signal(&self) -> bool {
        true
    }

    /// Liveness hint for the writing process; not authoritative.
    fn is_sim_running(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Shared {
    bytes: RwLock<Vec<u8>>,
    signaled: Mutex<bool>,
    fresh: Condvar,
    has_signal: bool,
}

/// Heap-backed region shared between a writer and any number of readers.
///
/// Cloning yields another handle to the same bytes. Each `write_at` is
/// applied atomically with respect to `read_at`, but nothing orders separate
/// writes, so a reader can still observe a buffer half way through a
/// multi-write update, exactly like a shared memory mapping.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    shared: Arc<Shared>,
}

impl MemoryRegion {
    /// Region with a fresh-data signal.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self::build(bytes, true)
    }

    /// Region whose writer never signals; `wait_for_data` always times out.
    pub fn without_data_signal(bytes: Vec<u8>) -> Self {
        Self::build(bytes, false)
    }

    /// Load a region previously written with `LiveTelemetry::dump_region`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut bytes = Vec::new();
        std::fs::File::open(path)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;

        debug!(path = %path.display(), len = bytes.len(), "Loaded region dump");
        Ok(Self::new(bytes))
    }

    fn build(bytes: Vec<u8>, has_signal: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                bytes: RwLock::new(bytes),
                signaled: Mutex::new(false),
                fresh: Condvar::new(),
                has_signal,
            }),
        }
    }

    /// Overwrite bytes starting at `offset`.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut bytes = self.shared.bytes.write().unwrap_or_else(PoisonError::into_inner);
        let available = bytes.len();
        let target = offset
            .checked_add(data.len())
            .and_then(|end| bytes.get_mut(offset..end))
            .ok_or_else(|| TelemetryError::memory_access_error(offset, data.len(), available))?;
        target.copy_from_slice(data);
        Ok(())
    }

    /// Wake one pending `wait_for_data`, or the next one to start.
    pub fn signal_fresh_data(&self) {
        if !self.shared.has_signal {
            return;
        }
        let mut signaled = self.shared.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        *signaled = true;
        self.shared.fresh.notify_one();
    }

    /// Copy of the whole region.
    pub fn to_vec(&self) -> Vec<u8> {
        self.shared.bytes.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl TelemetrySource for MemoryRegion {
    fn len(&self) -> usize {
        self.shared.bytes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let bytes = self.shared.bytes.read().unwrap_or_else(PoisonError::into_inner);
        let src = crate::codec::read_bytes(&bytes, offset, dst.len())?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn wait_for_data(&self, timeout: Duration) -> bool {
        if !self.shared.has_signal {
            return false;
        }

        let signaled = self.shared.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut signaled, _) = self
            .shared
            .fresh
            .wait_timeout_while(signaled, timeout, |signaled| !*signaled)
            .unwrap_or_else(PoisonError::into_inner);

        // Auto-reset, like the simulator's event
        std::mem::replace(&mut *signaled, false)
    }

    fn has_data_signal(&self) -> bool {
        self.shared.has_signal
    }
}
