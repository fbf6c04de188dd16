//! Reassembles a logical byte stream out of arbitrarily ordered, possibly
//! overlapping, possibly truncated fragments.
//!
//! Capacity is shared between bytes that have been assembled but not yet
//! read by the application (sitting in the downstream [`ByteStream`]) and
//! bytes that have arrived out of order and are waiting on a gap to close
//! (`unassembled_bytes`). A fragment that would push the total past
//! capacity is trimmed, never rejected outright, so that a stalled reader
//! still lets the sender make some progress.

use std::collections::BTreeMap;

use crate::tcp::byte_stream::ByteStream;

#[derive(Debug)]
pub struct Reassembler {
    /// Fragments keyed by their starting stream index; no two entries
    /// overlap or touch, and every key is `>= head_index`.
    blocks: BTreeMap<u64, Vec<u8>>,
    unassembled_bytes: u64,
    head_index: u64,
    eof_flag: bool,
    output: ByteStream,
    capacity: usize,
}

impl Reassembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: BTreeMap::new(),
            unassembled_bytes: 0,
            head_index: 0,
            eof_flag: false,
            output: ByteStream::new(capacity),
            capacity,
        }
    }

    /// Integrates the stream bytes `data` representing `[index, index +
    /// data.len())`, and `eof` if this fragment is claimed to end the
    /// stream. See the module documentation for the capacity-trimming
    /// policy.
    pub fn push_substring(&mut self, data: &[u8], index: u64, eof: bool) {
        let head = self.head_index;
        let end = index + data.len() as u64;

        // Entirely already-assembled: no-op other than eof bookkeeping.
        if end <= head {
            self.finish_call(eof, true);
            return;
        }

        // Trim the leading portion that duplicates already-assembled bytes.
        let (start, mut bytes) = if index < head {
            (head, &data[(head - index) as usize..])
        } else {
            (index, data)
        };

        // Trim the trailing portion that would overflow the shared capacity
        // window. Only a fragment accepted in full may signal eof.
        let window_cap = self.capacity.saturating_sub(self.output.buffer_size());
        let window_end = head + window_cap as u64;
        let mut fully_accepted = true;
        if !bytes.is_empty() {
            if start >= window_end {
                bytes = &[];
                fully_accepted = false;
            } else {
                let max_len = (window_end - start) as usize;
                if bytes.len() > max_len {
                    bytes = &bytes[..max_len];
                    fully_accepted = false;
                }
            }
        }

        if !bytes.is_empty() {
            self.insert_and_merge(start, bytes);
        }

        self.flush_ready();
        self.finish_call(eof, fully_accepted);
    }

    fn insert_and_merge(&mut self, begin: u64, bytes: &[u8]) {
        let mut new_begin = begin;
        let mut new_data = bytes.to_vec();
        self.unassembled_bytes += new_data.len() as u64;

        loop {
            let mut merged_any = false;
            let new_end = new_begin + new_data.len() as u64;

            // Merge with the first stored fragment at or after `new_begin`.
            if let Some((&sbegin, _)) = self.blocks.range(new_begin..).next() {
                if sbegin <= new_end {
                    let sdata = self.blocks.remove(&sbegin).unwrap();
                    let send = sbegin + sdata.len() as u64;
                    if send > new_end {
                        let overlap = new_end - sbegin;
                        self.unassembled_bytes -= overlap;
                        new_data.extend_from_slice(&sdata[overlap as usize..]);
                    } else {
                        self.unassembled_bytes -= sdata.len() as u64;
                    }
                    merged_any = true;
                }
            }

            // Merge with the last stored fragment strictly before `new_begin`.
            let new_end = new_begin + new_data.len() as u64;
            if let Some((&pbegin, pdata)) = self.blocks.range(..new_begin).next_back() {
                let plen = pdata.len() as u64;
                if pbegin + plen >= new_begin {
                    let pdata = self.blocks.remove(&pbegin).unwrap();
                    let pend = pbegin + pdata.len() as u64;
                    if pend >= new_end {
                        self.unassembled_bytes -= new_data.len() as u64;
                        new_data = pdata;
                    } else {
                        let overlap = pend - new_begin;
                        self.unassembled_bytes -= overlap;
                        let mut combined = pdata;
                        combined.extend_from_slice(&new_data[overlap as usize..]);
                        new_data = combined;
                    }
                    new_begin = pbegin;
                    merged_any = true;
                }
            }

            if !merged_any {
                break;
            }
        }

        self.blocks.insert(new_begin, new_data);
    }

    fn flush_ready(&mut self) {
        if let Some((&begin, _)) = self.blocks.iter().next() {
            if begin == self.head_index {
                let data = self.blocks.remove(&begin).unwrap();
                let written = self.output.write(&data);
                self.head_index += written as u64;
                self.unassembled_bytes -= data.len() as u64;
            }
        }
    }

    fn finish_call(&mut self, eof: bool, fully_accepted: bool) {
        if eof && fully_accepted {
            self.eof_flag = true;
        }
        if self.eof_flag && self.empty() {
            self.output.end_input();
        }
    }

    pub fn stream_out(&self) -> &ByteStream {
        &self.output
    }

    pub fn stream_out_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }

    /// Bytes stored but not yet part of the contiguous assembled prefix.
    pub fn unassembled_bytes(&self) -> u64 {
        self.unassembled_bytes
    }

    /// True when there are no fragments awaiting a gap to close.
    pub fn empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn head_index(&self) -> u64 {
        self.head_index
    }

    pub fn input_ended(&self) -> bool {
        self.output.input_ended()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn out_of_order_reassembly() {
        let mut r = Reassembler::new(8);
        r.push_substring(b"ef", 4, false);
        r.push_substring(b"ab", 0, false);
        r.push_substring(b"cd", 2, true);

        assert_eq!(r.unassembled_bytes(), 0);
        assert!(r.input_ended());
        assert_eq!(r.stream_out_mut().read(6).as_ref(), b"abcdef");
    }

    #[test]
    fn overlap_merges_without_duplication() {
        let mut r = Reassembler::new(8);
        r.push_substring(b"abc", 0, false);
        r.push_substring(b"bcdef", 1, true);

        assert_eq!(r.unassembled_bytes(), 0);
        assert!(r.input_ended());
        assert_eq!(r.stream_out_mut().read(6).as_ref(), b"abcdef");
    }

    #[test]
    fn capacity_trim_suppresses_eof() {
        let mut r = Reassembler::new(4);
        r.push_substring(b"abcdef", 0, true);

        assert!(!r.input_ended());
        assert_eq!(r.stream_out().buffer_size(), 4);
        assert_eq!(r.stream_out_mut().peek_output(4).as_ref(), b"abcd");
    }

    #[test]
    fn redundant_fragment_still_marks_eof() {
        let mut r = Reassembler::new(8);
        r.push_substring(b"ab", 0, false);
        r.stream_out_mut().read(0); // no-op; head stays at 0 until flush happens below
        assert_eq!(r.head_index(), 2);
        // now resend bytes that are entirely already assembled, with eof set
        r.push_substring(b"ab", 0, true);
        assert!(r.input_ended());
    }

    #[test]
    fn empty_fragment_at_head_with_eof_closes_immediately() {
        let mut r = Reassembler::new(8);
        r.push_substring(b"", 0, true);
        assert!(r.input_ended());
        assert_eq!(r.stream_out().buffer_size(), 0);
    }

    #[test]
    fn fragment_entirely_beyond_window_is_discarded() {
        let mut r = Reassembler::new(4);
        r.push_substring(b"z", 100, true);
        assert_eq!(r.unassembled_bytes(), 0);
        assert!(!r.input_ended());
    }

    proptest! {
        #[test]
        fn any_tiling_of_overlapping_fragments_reassembles_the_original(
            message in prop::collection::vec(any::<u8>(), 1..64),
            shuffle_seed in any::<u64>(),
        ) {
            use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

            let n = message.len();
            let mut fragments: Vec<(u64, Vec<u8>)> = Vec::new();
            let mut i = 0usize;
            while i < n {
                let len = ((i % 4) + 1).min(n - i);
                fragments.push((i as u64, message[i..i + len].to_vec()));
                i += len;
            }
            // Duplicate every other fragment so merges have real overlap to resolve.
            let extra: Vec<_> = fragments.iter().step_by(2).cloned().collect();
            fragments.extend(extra);

            let mut rng = StdRng::seed_from_u64(shuffle_seed);
            fragments.shuffle(&mut rng);

            let mut r = Reassembler::new(n + 8);
            for (begin, data) in &fragments {
                r.push_substring(data, *begin, false);
            }
            // A final empty eof fragment at the tail closes the stream
            // regardless of which fragment happened to land last.
            r.push_substring(&[], n as u64, true);

            let out = r.stream_out_mut().read(n);
            prop_assert_eq!(out.as_ref(), message.as_slice());
            prop_assert!(r.input_ended());
        }
    }
}
