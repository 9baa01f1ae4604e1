//! Binary layout shared by live regions and replay files.
//!
//! A region starts with a fixed 112-byte [`LayoutHeader`]. It points at a
//! table of 144-byte variable descriptors, at the session text block, and
//! at up to four rotating tick buffers. Replay files keep the same header,
//! add a [`DiskSubHeader`] at offset 112, and store their records back to
//! back from the first buffer's offset.

mod header;
mod variables;

pub use header::{
    DISK_HEADER_OFFSET, DISK_HEADER_SIZE, DiskSubHeader, HEADER_SIZE, LayoutHeader, MAX_BUFS,
    STATUS_CONNECTED, TickBuffer, VAR_BUF_OFFSET, VAR_BUF_SIZE, VarBuf,
};
pub use variables::{RawDescriptor, VAR_HEADER_SIZE, parse_variable_table};
