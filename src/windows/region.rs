//! Read-only mapping of the simulator's telemetry region

use std::ptr::NonNull;
use std::time::Duration;

use tracing::{debug, trace};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Memory::{
    FILE_MAP_READ, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile,
};
use windows::Win32::System::Threading::{
    OpenEventW, SYNCHRONIZATION_ACCESS_RIGHTS, WaitForSingleObject,
};
use windows::core::PCWSTR;

use super::wide_string;
use crate::source::TelemetrySource;
use crate::{Result, TelemetryError};

/// Name of the file mapping the simulator publishes telemetry in.
pub const MEMORY_MAP_NAME: &str = "Local\\IRSDKMemMapFileName";

/// Name of the auto-reset event set after each tick is written.
pub const DATA_VALID_EVENT_NAME: &str = "Local\\IRSDKDataValidEvent";

/// Bytes mapped from the region.
pub const MEMORY_MAP_SIZE: usize = 780 * 1024;

/// `SYNCHRONIZE` access right, enough to wait on the event.
const SYNCHRONIZE: SYNCHRONIZATION_ACCESS_RIGHTS = SYNCHRONIZATION_ACCESS_RIGHTS(0x0010_0000);

/// The simulator's telemetry mapping plus its data-valid event.
pub struct MappedRegion {
    mapping: HANDLE,
    base: NonNull<u8>,
    event: HANDLE,
}

// The view is mapped read-only and only ever copied out of; both handles
// may be used from any thread.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map the region. Fails when the simulator has never been started
    /// since boot.
    pub fn open() -> Result<Self> {
        trace!("Opening simulator telemetry mapping");

        let map_name = wide_string(MEMORY_MAP_NAME);
        let mapping =
            unsafe { OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR::from_raw(map_name.as_ptr())) }
                .map_err(|e| TelemetryError::windows_api_error("OpenFileMappingW", e))?;

        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, MEMORY_MAP_SIZE) };
        let Some(base) = NonNull::new(view.Value.cast::<u8>()) else {
            let error = windows::core::Error::from_thread();
            unsafe {
                let _ = CloseHandle(mapping);
            }
            return Err(TelemetryError::windows_api_error("MapViewOfFile", error));
        };

        let event_name = wide_string(DATA_VALID_EVENT_NAME);
        let event =
            match unsafe { OpenEventW(SYNCHRONIZE, false, PCWSTR::from_raw(event_name.as_ptr())) } {
                Ok(event) => event,
                Err(e) => {
                    unsafe {
                        let _ = UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                            Value: base.as_ptr().cast(),
                        });
                        let _ = CloseHandle(mapping);
                    }
                    return Err(TelemetryError::windows_api_error("OpenEventW", e));
                }
            };

        debug!(size = MEMORY_MAP_SIZE, "Mapped simulator telemetry region");
        Ok(Self { mapping, base, event })
    }
}

impl TelemetrySource for MappedRegion {
    fn len(&self) -> usize {
        MEMORY_MAP_SIZE
    }

    fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let in_bounds = offset.checked_add(dst.len()).is_some_and(|end| end <= MEMORY_MAP_SIZE);
        if !in_bounds {
            return Err(TelemetryError::memory_access_error(offset, dst.len(), MEMORY_MAP_SIZE));
        }

        // The writer may be changing these bytes; the copy is taken as is
        // and callers re-check tick counters.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.as_ptr().add(offset),
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }

    fn wait_for_data(&self, timeout: Duration) -> bool {
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        match unsafe { WaitForSingleObject(self.event, ms) } {
            WAIT_OBJECT_0 => true,
            WAIT_TIMEOUT => false,
            other => {
                debug!(result = other.0, "WaitForSingleObject failed");
                false
            }
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        debug!("Unmapping simulator telemetry region");
        unsafe {
            let view = MEMORY_MAPPED_VIEW_ADDRESS { Value: self.base.as_ptr().cast() };
            let _ = UnmapViewOfFile(view);
            let _ = CloseHandle(self.mapping);
            let _ = CloseHandle(self.event);
        }
    }
}
