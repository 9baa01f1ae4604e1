//! Section lookup inside the session text block.
//!
//! Sections are top-level keys laid out as `\nName:\n<content>\n\n`. A
//! lookup is a literal byte search for the section header; nothing else in
//! the block is parsed.

use std::ops::Range;

use tracing::trace;

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Byte range of the content of section `name` within `block`.
///
/// The range starts right after the `\n{name}:\n` header and ends after the
/// last newline before the next blank line, or at the end of the block.
pub fn find_section(block: &[u8], name: &str) -> Option<Range<usize>> {
    if name.is_empty() {
        return None;
    }

    let header = format!("\n{name}:\n");
    let start = find(block, header.as_bytes(), 0)? + header.len();

    // The header's own newline can open the blank line of an empty section
    let end = match find(block, b"\n\n", start - 1) {
        Some(pos) => pos + 1,
        None => block.len(),
    };

    trace!(section = name, start, end, "Located session section");
    Some(start..end.max(start))
}

/// Content bytes of section `name` within `block`.
pub fn extract_section<'a>(block: &'a [u8], name: &str) -> Option<&'a [u8]> {
    find_section(block, name).and_then(|range| block.get(range))
}

/// Content bytes of section `name` in the block at
/// `[block_offset, block_offset + block_len)` of `region`.
///
/// A block that does not fit in the region yields nothing.
pub fn extract_section_at<'a>(
    region: &'a [u8],
    block_offset: usize,
    block_len: usize,
    name: &str,
) -> Option<&'a [u8]> {
    let end = block_offset.checked_add(block_len)?;
    extract_section(region.get(block_offset..end)?, name)
}
