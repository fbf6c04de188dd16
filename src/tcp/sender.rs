//! Turns an outbound byte stream into a sequence of segments honoring the
//! peer's advertised window, with a single retransmission timer covering
//! whatever is outstanding.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::tcp::byte_stream::ByteStream;
use crate::tcp::config::MAX_PAYLOAD_SIZE;
use crate::tcp::segment::{TcpHeader, TcpSegment};
use crate::tcp::wrap::{unwrap, wrap, WrappingInt32};

#[derive(Debug)]
pub struct TcpSender {
    isn: WrappingInt32,
    stream_in: ByteStream,
    segments_out: VecDeque<TcpSegment>,

    next_seqno: u64,
    recv_ackno: u64,
    bytes_in_flight: u64,
    window_size: u16,
    syn_sent: bool,
    fin_sent: bool,

    /// Sent but not yet fully acknowledged, oldest first, tagged with each
    /// segment's own absolute starting sequence number.
    outstanding: VecDeque<(u64, TcpSegment)>,

    timer_running: bool,
    elapsed: u32,
    rto: u32,
    initial_rto: u32,
    consecutive_retx: u32,
}

impl TcpSender {
    pub fn new(capacity: usize, rt_timeout: u32, isn: WrappingInt32) -> Self {
        Self {
            isn,
            stream_in: ByteStream::new(capacity),
            segments_out: VecDeque::new(),
            next_seqno: 0,
            recv_ackno: 0,
            bytes_in_flight: 0,
            window_size: 0,
            syn_sent: false,
            fin_sent: false,
            outstanding: VecDeque::new(),
            timer_running: false,
            elapsed: 0,
            rto: rt_timeout,
            initial_rto: rt_timeout,
            consecutive_retx: 0,
        }
    }

    pub fn stream_in(&self) -> &ByteStream {
        &self.stream_in
    }

    pub fn stream_in_mut(&mut self) -> &mut ByteStream {
        &mut self.stream_in
    }

    pub fn segments_out(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    pub fn consecutive_retransmissions(&self) -> u32 {
        self.consecutive_retx
    }

    pub fn next_seqno_absolute(&self) -> u64 {
        self.next_seqno
    }

    pub fn next_seqno(&self) -> WrappingInt32 {
        wrap(self.next_seqno, self.isn)
    }

    pub fn fin_sent(&self) -> bool {
        self.fin_sent
    }

    /// True once the peer has ACKed anything at all, which necessarily
    /// includes our SYN (the first sequence number we ever send).
    pub fn syn_acked(&self) -> bool {
        self.recv_ackno > 0
    }

    /// Emits segments until the window is full, the outbound stream is
    /// drained, or a FIN has already gone out.
    pub fn fill_window(&mut self, send_syn: bool) {
        if !self.syn_sent {
            if send_syn {
                let header = TcpHeader {
                    syn: true,
                    ..TcpHeader::default()
                };
                self.send_segment(TcpSegment::new(header, Bytes::new()));
                self.syn_sent = true;
            }
            return;
        }

        let win: u64 = if self.window_size > 0 {
            self.window_size as u64
        } else {
            1
        };

        loop {
            let in_flight = self.next_seqno - self.recv_ackno;
            if in_flight >= win || self.fin_sent {
                break;
            }
            let remain = (win - in_flight) as usize;
            let size = remain.min(MAX_PAYLOAD_SIZE);
            let data = self.stream_in.read(size);

            let mut header = TcpHeader::default();
            let mut seg_len = data.len();
            if self.stream_in.eof() && seg_len < win as usize {
                header.fin = true;
                self.fin_sent = true;
                seg_len += 1;
            }
            if seg_len == 0 {
                break;
            }
            self.send_segment(TcpSegment::new(header, data));
        }
    }

    fn send_segment(&mut self, mut seg: TcpSegment) {
        let abs_seqno = self.next_seqno;
        seg.header.seqno = wrap(abs_seqno, self.isn);
        let len = seg.length_in_sequence_space() as u64;
        self.next_seqno += len;
        self.bytes_in_flight += len;
        trace!(abs_seqno, len, syn = seg.header.syn, fin = seg.header.fin, "sending segment");
        self.outstanding.push_back((abs_seqno, seg.clone()));
        self.segments_out.push_back(seg);
        if !self.timer_running {
            self.timer_running = true;
            self.elapsed = 0;
        }
    }

    /// Processes an ACK. Returns `false` if it acknowledges data we never
    /// sent.
    pub fn ack_received(&mut self, ackno: WrappingInt32, window_size: u16) -> bool {
        let abs = unwrap(ackno, self.isn, self.recv_ackno);
        if abs > self.next_seqno {
            return false;
        }

        self.window_size = window_size;

        if abs <= self.recv_ackno {
            return true;
        }
        self.recv_ackno = abs;

        loop {
            let should_pop = match self.outstanding.front() {
                Some((seg_seq, seg)) => seg_seq + seg.length_in_sequence_space() as u64 <= abs,
                None => false,
            };
            if !should_pop {
                break;
            }
            let (_, seg) = self.outstanding.pop_front().unwrap();
            self.bytes_in_flight -= seg.length_in_sequence_space() as u64;
        }

        self.rto = self.initial_rto;
        self.consecutive_retx = 0;
        if self.outstanding.is_empty() {
            self.timer_running = false;
        } else {
            self.timer_running = true;
            self.elapsed = 0;
        }

        self.fill_window(false);
        true
    }

    /// Advances the retransmission timer; resends the oldest outstanding
    /// segment on expiry.
    pub fn tick(&mut self, ms_since_last_tick: u32) {
        self.elapsed += ms_since_last_tick;

        if self.elapsed >= self.rto {
            if let Some((_, seg)) = self.outstanding.front() {
                self.segments_out.push_back(seg.clone());
                // A genuine zero-window probe (the peer has ACKed at least
                // once but advertised window 0) keeps its cadence instead
                // of backing off, so the probe doesn't grind to a halt. Any
                // other retransmission -- including an unanswered SYN, where
                // we've never heard from the peer at all -- backs off
                // normally.
                if !(self.recv_ackno > 0 && self.window_size == 0) {
                    self.consecutive_retx += 1;
                    self.rto = self.rto.saturating_mul(2);
                }
                debug!(consecutive_retx = self.consecutive_retx, rto = self.rto, "retransmitting");
                self.elapsed = 0;
            }
        }

        if self.outstanding.is_empty() {
            self.timer_running = false;
        }
    }

    /// Emits a zero-sequence-space segment at `next_seqno`, bypassing the
    /// retransmission queue.
    pub fn send_empty_segment(&mut self) {
        let seqno = wrap(self.next_seqno, self.isn);
        self.send_empty_segment_at(seqno);
    }

    pub fn send_empty_segment_at(&mut self, seqno: WrappingInt32) {
        let header = TcpHeader {
            seqno,
            ..TcpHeader::default()
        };
        self.segments_out.push_back(TcpSegment::new(header, Bytes::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isn() -> WrappingInt32 {
        WrappingInt32::new(0)
    }

    #[test]
    fn syn_is_sent_once_on_connect() {
        let mut s = TcpSender::new(4096, 1000, isn());
        s.fill_window(true);
        assert_eq!(s.segments_out().len(), 1);
        let seg = s.segments_out().pop_front().unwrap();
        assert!(seg.header.syn);
        assert_eq!(s.next_seqno_absolute(), 1);
        assert_eq!(s.bytes_in_flight(), 1);

        s.fill_window(true);
        assert!(s.segments_out().is_empty(), "SYN must not be resent by fill_window");
    }

    #[test]
    fn data_segment_respects_window() {
        let mut s = TcpSender::new(4096, 1000, isn());
        s.fill_window(true);
        s.segments_out().clear();
        s.ack_received(wrap(1, isn()), 5);

        s.stream_in_mut().write(b"hello world");
        s.fill_window(false);

        assert_eq!(s.segments_out().len(), 1);
        let seg = s.segments_out().pop_front().unwrap();
        assert_eq!(seg.payload.as_ref(), b"hello");
        assert_eq!(s.bytes_in_flight(), 5);
    }

    #[test]
    fn ack_is_idempotent_but_updates_window() {
        let mut s = TcpSender::new(4096, 1000, isn());
        s.fill_window(true);
        assert!(s.ack_received(wrap(1, isn()), 10));
        let next_before = s.next_seqno_absolute();
        let bif_before = s.bytes_in_flight();

        assert!(s.ack_received(wrap(1, isn()), 20));
        assert_eq!(s.next_seqno_absolute(), next_before);
        assert_eq!(s.bytes_in_flight(), bif_before);
    }

    #[test]
    fn ack_for_unsent_data_is_rejected() {
        let mut s = TcpSender::new(4096, 1000, isn());
        s.fill_window(true);
        assert!(!s.ack_received(wrap(100, isn()), 10));
    }

    #[test]
    fn retransmission_backs_off_exponentially() {
        let mut s = TcpSender::new(4096, 1000, isn());
        s.fill_window(true);
        s.ack_received(wrap(1, isn()), 5);
        s.segments_out().clear();
        s.stream_in_mut().write(b"x");
        s.fill_window(false);
        s.segments_out().clear();

        s.tick(999);
        assert!(s.segments_out().is_empty());
        s.tick(1);
        assert_eq!(s.consecutive_retransmissions(), 1);
        assert_eq!(s.segments_out().len(), 1);

        s.segments_out().clear();
        s.tick(1999);
        assert!(s.segments_out().is_empty());
        s.tick(1);
        assert_eq!(s.consecutive_retransmissions(), 2);
    }

    #[test]
    fn zero_window_probe_does_not_back_off() {
        let mut s = TcpSender::new(4096, 1000, isn());
        s.fill_window(true);
        s.ack_received(wrap(1, isn()), 0);
        s.stream_in_mut().write(b"x");
        s.fill_window(false);
        s.segments_out().clear();

        s.tick(1000);
        assert_eq!(s.consecutive_retransmissions(), 0);
        assert_eq!(s.segments_out().len(), 1);
    }
}
