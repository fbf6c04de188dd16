//! Composes a [`TcpSender`] and [`TcpReceiver`] into the connection state
//! machine: decorates outbound segments with ackno/window, handles RST,
//! and governs the linger period before a clean close goes quiet.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::tcp::config::{TcpConfig, LINGER_MULTIPLIER, MAX_RETX_ATTEMPTS};
use crate::tcp::receiver::TcpReceiver;
use crate::tcp::sender::TcpSender;
use crate::tcp::segment::TcpSegment;
use crate::tcp::state::{Available, ConnectionState};

#[derive(Debug)]
pub struct TcpConnection {
    config: TcpConfig,
    sender: TcpSender,
    receiver: TcpReceiver,
    segments_out: VecDeque<TcpSegment>,
    time_since_last_segment_received: u64,
    active: bool,
    linger_after_streams_finish: bool,
    need_send_rst: bool,
    reset: bool,
}

impl TcpConnection {
    pub fn new(config: TcpConfig) -> Self {
        let isn = config.isn();
        Self {
            sender: TcpSender::new(config.send_capacity, config.rt_timeout, isn),
            receiver: TcpReceiver::new(config.recv_capacity),
            segments_out: VecDeque::new(),
            time_since_last_segment_received: 0,
            active: true,
            linger_after_streams_finish: true,
            need_send_rst: false,
            reset: false,
            config,
        }
    }

    pub fn segments_out(&mut self) -> &mut VecDeque<TcpSegment> {
        &mut self.segments_out
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.sender.bytes_in_flight()
    }

    pub fn unassembled_bytes(&self) -> u64 {
        self.receiver.unassembled_bytes()
    }

    pub fn time_since_last_segment_received(&self) -> u64 {
        self.time_since_last_segment_received
    }

    pub fn inbound_stream(&self) -> &crate::tcp::byte_stream::ByteStream {
        self.receiver.stream_out()
    }

    pub fn inbound_stream_mut(&mut self) -> &mut crate::tcp::byte_stream::ByteStream {
        self.receiver.stream_out_mut()
    }

    pub fn outbound_remaining_capacity(&self) -> usize {
        self.sender.stream_in().remaining_capacity()
    }

    /// Which directions currently have work for the owner: bytes to read,
    /// or room to write.
    pub fn availability(&self) -> Available {
        let mut flags = Available::empty();
        let inbound = self.receiver.stream_out();
        if inbound.buffer_size() > 0 || inbound.eof() {
            flags |= Available::READ;
        }
        if self.sender.stream_in().remaining_capacity() > 0 {
            flags |= Available::WRITE;
        }
        flags
    }

    /// The RFC-793 state name, derived on demand from sender/receiver flags.
    pub fn state(&self) -> ConnectionState {
        if !self.active {
            return if self.reset {
                ConnectionState::Reset
            } else {
                ConnectionState::Closed
            };
        }

        let receiver_syn = self.receiver.syn_received();
        let sender_syn_sent = self.sender.next_seqno_absolute() > 0;
        let sender_syn_acked = self.sender.syn_acked();

        if !receiver_syn && !sender_syn_sent {
            return ConnectionState::Listen;
        }
        if sender_syn_sent && !sender_syn_acked && !receiver_syn {
            return ConnectionState::SynSent;
        }
        if receiver_syn && !sender_syn_acked {
            return ConnectionState::SynRcvd;
        }

        let receiver_fin_done = self.receiver.input_ended();
        let sender_fin_sent = self.sender.fin_sent();
        let sender_fin_acked = sender_fin_sent && self.sender.bytes_in_flight() == 0;

        // Once the peer has closed before we have, clean_shutdown clears the
        // linger flag; that's the signal we're on the passive-close path
        // (CLOSE_WAIT/LAST_ACK) rather than the active-close one.
        if !self.linger_after_streams_finish {
            return if sender_fin_sent {
                ConnectionState::LastAck
            } else {
                ConnectionState::CloseWait
            };
        }

        match (sender_fin_sent, sender_fin_acked, receiver_fin_done) {
            (false, _, _) => ConnectionState::Established,
            (true, false, false) => ConnectionState::FinWait1,
            (true, true, false) => ConnectionState::FinWait2,
            (true, false, true) => ConnectionState::Closing,
            (true, true, true) => ConnectionState::TimeWait,
        }
    }

    /// Initiates an active open. Idempotent: once our SYN is out,
    /// `fill_window` is a no-op on repeat calls.
    pub fn connect(&mut self) {
        debug!("connect: sending SYN");
        self.push_segments_out(true);
    }

    /// Forwards to the outbound stream, then flushes whatever that newly
    /// unblocks.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let accepted = self.sender.stream_in_mut().write(data);
        self.push_segments_out(false);
        accepted
    }

    pub fn end_input_stream(&mut self) {
        self.sender.stream_in_mut().end_input();
        self.push_segments_out(false);
    }

    /// Feeds one inbound segment through the state machine.
    pub fn segment_received(&mut self, seg: &TcpSegment) {
        if !self.active {
            return;
        }
        self.time_since_last_segment_received = 0;

        let was_syn_sent = self.state() == ConnectionState::SynSent;
        if was_syn_sent && seg.header.ack && !seg.payload.is_empty() {
            trace!("dropping data-bearing ACK during SYN_SENT");
            return;
        }

        let mut need_empty_out = false;

        if self.sender.next_seqno_absolute() > 0 && seg.header.ack {
            if !self.sender.ack_received(seg.header.ackno, seg.header.win) {
                warn!("rejected ack for unsent data");
                need_empty_out = true;
            }
        }

        if !self.receiver.segment_received(seg) {
            warn!("rejected segment outside receive window");
            need_empty_out = true;
        }

        if seg.header.syn && self.sender.next_seqno_absolute() == 0 {
            self.connect();
            return;
        }

        if seg.header.rst {
            if was_syn_sent && !seg.header.ack {
                return;
            }
            debug!("peer reset the connection");
            self.unclean_shutdown(false);
            return;
        }

        if seg.length_in_sequence_space() > 0 {
            need_empty_out = true;
        }

        if need_empty_out && self.receiver.ackno().is_some() && self.sender.segments_out().is_empty() {
            self.sender.send_empty_segment();
        }

        self.push_segments_out(false);
    }

    fn push_segments_out(&mut self, send_syn: bool) {
        let in_syn_rcvd = self.state() == ConnectionState::SynRcvd;
        self.sender.fill_window(send_syn || in_syn_rcvd);

        while let Some(mut seg) = self.sender.segments_out().pop_front() {
            if let Some(ackno) = self.receiver.ackno() {
                seg.header.ack = true;
                seg.header.ackno = ackno;
                seg.header.win = self.receiver.window_size();
            }
            if self.need_send_rst {
                seg.header.rst = true;
                self.need_send_rst = false;
            }
            self.segments_out.push_back(seg);
        }

        self.clean_shutdown();
    }

    fn clean_shutdown(&mut self) {
        if self.receiver.input_ended() && !self.sender.stream_in().eof() {
            self.linger_after_streams_finish = false;
        }

        if self.sender.stream_in().eof()
            && self.sender.bytes_in_flight() == 0
            && self.receiver.input_ended()
        {
            let lingered_long_enough = self.time_since_last_segment_received
                >= (LINGER_MULTIPLIER as u64) * (self.config.rt_timeout as u64);
            if !self.linger_after_streams_finish || lingered_long_enough {
                if self.active {
                    debug!("clean shutdown: both streams finished");
                }
                self.active = false;
            }
        }
    }

    fn unclean_shutdown(&mut self, send_rst: bool) {
        self.sender.stream_in_mut().set_error();
        self.receiver.stream_out_mut().set_error();
        self.active = false;
        self.reset = true;
        if send_rst {
            self.need_send_rst = true;
            if self.sender.segments_out().is_empty() {
                self.sender.send_empty_segment();
            }
            self.push_segments_out(false);
        }
    }

    /// Advances the retransmission timer and the linger clock.
    pub fn tick(&mut self, ms_since_last_tick: u32) {
        if !self.active {
            return;
        }
        self.time_since_last_segment_received += ms_since_last_tick as u64;
        self.sender.tick(ms_since_last_tick);

        if self.sender.consecutive_retransmissions() > MAX_RETX_ATTEMPTS {
            warn!(
                attempts = self.sender.consecutive_retransmissions(),
                "retransmission limit exceeded, resetting connection"
            );
            self.unclean_shutdown(true);
        }

        self.push_segments_out(false);
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        if self.active {
            warn!("dropping still-active connection, sending RST");
            self.unclean_shutdown(true);
        }
    }
}
