//! Rotating tick buffer selection.
//!
//! The writer bumps a buffer's tick counter around the time it finishes
//! filling it, so the buffer with the highest tick may still be half
//! written. Unfrozen reads therefore take the runner-up; only freezes, which
//! copy the whole buffer and can re-check its tick afterwards, take the
//! newest one.

use crate::layout::{LayoutHeader, TickBuffer};

/// Buffers ordered by descending tick count. Equal ticks keep header order.
pub fn rank_buffers(header: &LayoutHeader) -> Vec<TickBuffer> {
    let mut buffers = header.tick_buffers();
    // sort_by is stable
    buffers.sort_by(|a, b| b.tick_count.cmp(&a.tick_count));
    buffers
}

/// Buffer to serve an unfrozen read from: second-highest tick, or the only
/// buffer when there is just one.
pub fn select_read_buffer(header: &LayoutHeader) -> Option<TickBuffer> {
    let ranked = rank_buffers(header);
    ranked.get(1).or_else(|| ranked.first()).copied()
}

/// Buffer holding the newest tick.
pub fn select_latest_buffer(header: &LayoutHeader) -> Option<TickBuffer> {
    rank_buffers(header).first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{MAX_BUFS, VarBuf};
    use proptest::prelude::*;

    fn header(ticks: &[i32]) -> LayoutHeader {
        let mut var_buf = [VarBuf::default(); MAX_BUFS];
        for (i, tick) in ticks.iter().enumerate() {
            var_buf[i] = VarBuf { tick_count: *tick, buf_offset: 1024 * (i as i32 + 1) };
        }
        LayoutHeader {
            version: 2,
            status: 1,
            tick_rate: 60,
            session_info_update: 0,
            session_info_len: 0,
            session_info_offset: 0,
            num_vars: 1,
            var_header_offset: 144,
            num_buf: ticks.len() as i32,
            buf_len: 64,
            var_buf,
        }
    }

    #[test]
    fn second_highest_tick_is_read() {
        let header = header(&[5, 6]);
        assert_eq!(select_read_buffer(&header).unwrap().index, 0);
        assert_eq!(select_latest_buffer(&header).unwrap().index, 1);
    }

    #[test]
    fn single_buffer_is_used_directly() {
        let header = header(&[42]);
        assert_eq!(select_read_buffer(&header).unwrap().index, 0);
        assert_eq!(select_latest_buffer(&header).unwrap().index, 0);
    }

    #[test]
    fn rotation_position_does_not_matter() {
        let header = header(&[9, 12, 10, 11]);
        let read = select_read_buffer(&header).unwrap();
        assert_eq!((read.index, read.tick_count, read.offset), (3, 11, 4096));
    }

    #[test]
    fn equal_ticks_keep_header_order() {
        let header = header(&[7, 7, 3]);
        assert_eq!(select_latest_buffer(&header).unwrap().index, 0);
        assert_eq!(select_read_buffer(&header).unwrap().index, 1);
    }

    proptest! {
        #[test]
        fn read_buffer_is_never_the_unique_newest(
            ticks in prop::collection::vec(any::<i32>(), 2..=4),
        ) {
            let header = header(&ticks);
            let max = *ticks.iter().max().unwrap();
            let read = select_read_buffer(&header).unwrap();

            let unique_max = ticks.iter().filter(|t| **t == max).count() == 1;
            if unique_max {
                prop_assert!(read.tick_count < max);
            }

            let mut sorted = ticks.clone();
            sorted.sort_unstable_by(|a, b| b.cmp(a));
            prop_assert_eq!(read.tick_count, sorted[1]);
        }
    }
}
