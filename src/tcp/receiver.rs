//! Turns inbound segments into an assembled byte stream plus the ackno/window
//! pair the sender side needs to advertise back.

use tracing::trace;

use crate::tcp::reassembler::Reassembler;
use crate::tcp::segment::TcpSegment;
use crate::tcp::wrap::{unwrap, wrap, WrappingInt32};

#[derive(Debug)]
pub struct TcpReceiver {
    isn: Option<WrappingInt32>,
    syn_received: bool,
    fin_received: bool,
    /// Next absolute wire seqno we expect; doubles as the unwrap checkpoint.
    /// Always this instance's own field, never shared across receivers.
    base: u64,
    reassembler: Reassembler,
}

impl TcpReceiver {
    pub fn new(capacity: usize) -> Self {
        Self {
            isn: None,
            syn_received: false,
            fin_received: false,
            base: 0,
            reassembler: Reassembler::new(capacity),
        }
    }

    pub fn stream_out(&self) -> &crate::tcp::byte_stream::ByteStream {
        self.reassembler.stream_out()
    }

    pub fn stream_out_mut(&mut self) -> &mut crate::tcp::byte_stream::ByteStream {
        self.reassembler.stream_out_mut()
    }

    pub fn unassembled_bytes(&self) -> u64 {
        self.reassembler.unassembled_bytes()
    }

    pub fn syn_received(&self) -> bool {
        self.syn_received
    }

    pub fn fin_received(&self) -> bool {
        self.fin_received
    }

    pub fn input_ended(&self) -> bool {
        self.reassembler.input_ended()
    }

    /// Integrates a segment. Returns whether it was acceptable in the
    /// RFC-793 sense; the orchestrator uses a `false` return to decide
    /// whether to prod the peer with an empty ACK.
    pub fn segment_received(&mut self, seg: &TcpSegment) -> bool {
        if seg.header.syn {
            if self.syn_received {
                return false;
            }
            self.syn_received = true;
            self.isn = Some(seg.header.seqno);
            self.base = 1;
        } else if !self.syn_received {
            return false;
        }

        if seg.header.fin && self.fin_received {
            return false;
        }

        let isn = self.isn.unwrap();
        let checkpoint = self.base;
        let abs = unwrap(seg.header.seqno, isn, checkpoint);
        let first_index = if seg.header.syn { 0 } else { abs - 1 };

        if seg.header.fin {
            self.fin_received = true;
        }

        let len = seg.payload.len() as u64;
        let window = self.window_size() as u64;
        let acceptable = seg.header.syn
            || seg.header.fin
            || (abs < checkpoint + window && abs + len > checkpoint)
            || (len == 0 && abs == checkpoint);

        trace!(first_index, len, fin = seg.header.fin, acceptable, "segment received");
        self.reassembler
            .push_substring(&seg.payload, first_index, seg.header.fin);

        self.base = 1 + self.reassembler.head_index() + self.reassembler.input_ended() as u64;

        acceptable
    }

    /// `None` until the SYN has been processed.
    pub fn ackno(&self) -> Option<WrappingInt32> {
        self.isn.map(|isn| wrap(self.base, isn))
    }

    /// Capped at `u16::MAX`, as the wire field can carry no more.
    pub fn window_size(&self) -> u16 {
        self.reassembler
            .stream_out()
            .remaining_capacity()
            .min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcp::segment::TcpHeader;
    use bytes::Bytes;

    fn seg(header: TcpHeader, payload: &[u8]) -> TcpSegment {
        TcpSegment::new(header, Bytes::copy_from_slice(payload))
    }

    #[test]
    fn ackno_is_none_before_syn() {
        let r = TcpReceiver::new(4096);
        assert!(r.ackno().is_none());
    }

    #[test]
    fn syn_establishes_isn_and_ackno() {
        let mut r = TcpReceiver::new(4096);
        let mut h = TcpHeader::default();
        h.syn = true;
        h.seqno = WrappingInt32::new(100);
        assert!(r.segment_received(&seg(h, b"")));
        assert_eq!(r.ackno().unwrap().raw_value(), 101);
    }

    #[test]
    fn duplicate_syn_is_rejected() {
        let mut r = TcpReceiver::new(4096);
        let mut h = TcpHeader::default();
        h.syn = true;
        assert!(r.segment_received(&seg(h, b"")));
        assert!(!r.segment_received(&seg(h, b"")));
    }

    #[test]
    fn data_after_syn_advances_ackno_and_window() {
        let mut r = TcpReceiver::new(10);
        let mut h = TcpHeader::default();
        h.syn = true;
        h.seqno = WrappingInt32::new(0);
        r.segment_received(&seg(h, b""));

        let mut h2 = TcpHeader::default();
        h2.seqno = WrappingInt32::new(1);
        assert!(r.segment_received(&seg(h2, b"hello")));

        assert_eq!(r.ackno().unwrap().raw_value(), 6);
        assert_eq!(r.window_size(), 5);
    }

    #[test]
    fn out_of_order_segment_does_not_advance_ackno_but_is_accepted() {
        let mut r = TcpReceiver::new(10);
        let mut h = TcpHeader::default();
        h.syn = true;
        h.seqno = WrappingInt32::new(0);
        r.segment_received(&seg(h, b""));

        let mut h2 = TcpHeader::default();
        h2.seqno = WrappingInt32::new(3);
        assert!(r.segment_received(&seg(h2, b"cd")));

        assert_eq!(r.ackno().unwrap().raw_value(), 1);
        assert_eq!(r.unassembled_bytes(), 2);
    }

    #[test]
    fn segment_entirely_outside_window_is_rejected() {
        let mut r = TcpReceiver::new(4);
        let mut h = TcpHeader::default();
        h.syn = true;
        h.seqno = WrappingInt32::new(0);
        r.segment_received(&seg(h, b""));

        let mut h2 = TcpHeader::default();
        h2.seqno = WrappingInt32::new(100);
        assert!(!r.segment_received(&seg(h2, b"z")));
    }

    #[test]
    fn fin_is_reflected_in_ackno_once_stream_closes() {
        let mut r = TcpReceiver::new(10);
        let mut h = TcpHeader::default();
        h.syn = true;
        h.seqno = WrappingInt32::new(0);
        r.segment_received(&seg(h, b""));

        let mut h2 = TcpHeader::default();
        h2.seqno = WrappingInt32::new(1);
        h2.fin = true;
        assert!(r.segment_received(&seg(h2, b"hi")));

        assert_eq!(r.ackno().unwrap().raw_value(), 4);
        assert!(r.fin_received());
    }

    #[test]
    fn segment_before_syn_is_ignored() {
        let mut r = TcpReceiver::new(10);
        let mut h = TcpHeader::default();
        h.seqno = WrappingInt32::new(5);
        assert!(!r.segment_received(&seg(h, b"nope")));
        assert!(r.ackno().is_none());
        assert_eq!(r.unassembled_bytes(), 0);
    }
}
