//! Pairs two [`TcpConnection`]s over an in-process duplex channel of
//! segments and drives a full connect / write / close lifecycle, playing
//! the role the original lab's `webget` harness plays — minus the raw
//! socket, which stays out of scope for this crate.

use std::collections::VecDeque;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use utcp::{TcpConfig, TcpConnection, TcpSegment};

#[derive(Parser, Debug)]
#[command(about = "Drive a loopback TCP connection entirely in-process")]
struct Args {
    /// Line of text the client sends once the connection is established.
    #[arg(default_value = "hello from the loopback demo\n")]
    message: String,

    /// Simulated per-tick time step, in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_ms: u32,

    /// Maximum number of ticks before giving up.
    #[arg(long, default_value_t = 200)]
    max_ticks: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut client = TcpConnection::new(TcpConfig::default());
    let mut server = TcpConnection::new(TcpConfig::default());

    let mut client_to_server: VecDeque<TcpSegment> = VecDeque::new();
    let mut server_to_client: VecDeque<TcpSegment> = VecDeque::new();

    client.connect();
    client.write(args.message.as_bytes());
    client.end_input_stream();
    drain_into(&mut client, &mut client_to_server);

    let mut echoed = Vec::new();

    for _ in 0..args.max_ticks {
        while let Some(seg) = client_to_server.pop_front() {
            server.segment_received(&seg);
        }
        while server.inbound_stream_mut().buffer_size() > 0 {
            let chunk = server.inbound_stream_mut().read(4096);
            server.write(&chunk);
        }
        if server.inbound_stream().eof() {
            server.end_input_stream();
        }
        drain_into(&mut server, &mut server_to_client);

        while let Some(seg) = server_to_client.pop_front() {
            client.segment_received(&seg);
        }
        while client.inbound_stream_mut().buffer_size() > 0 {
            let chunk = client.inbound_stream_mut().read(4096);
            echoed.extend_from_slice(&chunk);
        }
        drain_into(&mut client, &mut client_to_server);

        if !client.active() && !server.active() {
            break;
        }

        client.tick(args.tick_ms);
        server.tick(args.tick_ms);
    }

    println!("echoed {} bytes: {:?}", echoed.len(), String::from_utf8_lossy(&echoed));
}

fn drain_into(conn: &mut TcpConnection, channel: &mut VecDeque<TcpSegment>) {
    channel.extend(conn.segments_out().drain(..));
}
