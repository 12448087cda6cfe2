use super::*;

use core::net::Ipv4Addr;
use std::collections::{HashMap, VecDeque};

use cc3000_spi::protocol::opcode;
use embedded_io::{Read, Write};

use crate::{
    events::AsyncEvents,
    host::{Host, HostResult, NetTimeouts, SocketFd, SocketKind, Sockets},
};

/// Socket layer fake with scripted receive results per descriptor.
#[derive(Default)]
struct FakeSockets {
    events: AsyncEvents,
    next_sd: SocketFd,
    fail_connect: Option<HostStatus>,
    opened: Vec<SocketKind>,
    connects: Vec<(SocketFd, SockAddr)>,
    binds: Vec<(SocketFd, SockAddr)>,
    listens: Vec<SocketFd>,
    nonblocking: Vec<SocketFd>,
    timeouts: Vec<NetTimeouts>,
    pending_accepts: VecDeque<SocketFd>,
    recv_script: HashMap<SocketFd, VecDeque<HostResult<Vec<u8>>>>,
    sent: Vec<(SocketFd, Vec<u8>)>,
    closed: Vec<SocketFd>,
    polls: u32,
}

impl FakeSockets {
    fn script_recv(&mut self, sd: SocketFd, result: HostResult<&[u8]>) {
        self.recv_script
            .entry(sd)
            .or_default()
            .push_back(result.map(<[u8]>::to_vec));
    }

    fn sent_to(&self, sd: SocketFd) -> Vec<u8> {
        self.sent
            .iter()
            .filter(|(target, _)| *target == sd)
            .flat_map(|(_, data)| data.iter().copied())
            .collect()
    }
}

impl Host for FakeSockets {
    fn poll(&mut self) {
        self.polls += 1;
    }

    fn delay_ms(&mut self, _ms: u32) {}

    fn events(&self) -> &AsyncEvents {
        &self.events
    }
}

impl Sockets for FakeSockets {
    fn set_timeouts(&mut self, timeouts: &NetTimeouts) -> HostResult {
        self.timeouts.push(*timeouts);
        Ok(())
    }

    fn open_socket(&mut self, kind: SocketKind) -> HostResult<SocketFd> {
        self.opened.push(kind);
        let sd = self.next_sd;
        self.next_sd += 1;
        Ok(sd)
    }

    fn connect(&mut self, sd: SocketFd, addr: &SockAddr) -> HostResult {
        self.connects.push((sd, *addr));
        self.fail_connect.map_or(Ok(()), Err)
    }

    fn bind(&mut self, sd: SocketFd, addr: &SockAddr) -> HostResult {
        self.binds.push((sd, *addr));
        Ok(())
    }

    fn listen(&mut self, sd: SocketFd) -> HostResult {
        self.listens.push(sd);
        Ok(())
    }

    fn set_accept_nonblocking(&mut self, sd: SocketFd) -> HostResult {
        self.nonblocking.push(sd);
        Ok(())
    }

    fn accept(&mut self, _sd: SocketFd) -> HostResult<Option<SocketFd>> {
        Ok(self.pending_accepts.pop_front())
    }

    fn send(&mut self, sd: SocketFd, data: &[u8]) -> HostResult<usize> {
        self.sent.push((sd, data.to_vec()));
        Ok(data.len())
    }

    fn recv(&mut self, sd: SocketFd, buf: &mut [u8]) -> HostResult<usize> {
        let next = self
            .recv_script
            .get_mut(&sd)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("unscripted recv on socket {sd}"));
        let data = next?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    fn select_readable(&mut self, sd: SocketFd, _timeout_us: u32) -> HostResult<bool> {
        Ok(self.recv_script.get(&sd).is_some_and(|queue| !queue.is_empty()))
    }

    fn close(&mut self, sd: SocketFd) -> HostResult {
        self.closed.push(sd);
        Ok(())
    }
}

fn peer_closes(host: &FakeSockets, sd: SocketFd) {
    host.events
        .on_event(opcode::BSD_TCP_CLOSE_WAIT, &[sd as u8, 0, 0, 0]);
}

fn connected_client(host: &mut FakeSockets) -> Client {
    Client::connect(host, SocketKind::Tcp, Ipv4Addr::new(10, 0, 0, 5), 80)
        .expect("connect should succeed")
}

#[test]
fn connect_uses_chip_sockaddr_and_clears_stale_close() {
    let mut host = FakeSockets::default();
    peer_closes(&host, 0);

    let client = connected_client(&mut host);

    assert_eq!(client.socket(), Some(0));
    assert_eq!(host.opened, [SocketKind::Tcp]);
    assert_eq!(
        host.connects,
        [(0, SockAddr::inet(Ipv4Addr::new(10, 0, 0, 5), 80))]
    );
    assert!(!host.events.is_socket_closed(0));
}

#[test]
fn udp_connect_opens_datagram_socket() {
    let mut host = FakeSockets::default();
    let client = Client::connect(&mut host, SocketKind::Udp, Ipv4Addr::new(8, 8, 8, 8), 53)
        .expect("connect should succeed");
    assert!(client.is_open());
    assert_eq!(host.opened, [SocketKind::Udp]);
}

#[test]
fn failed_connect_releases_descriptor() {
    let mut host = FakeSockets {
        fail_connect: Some(HostStatus::FAILED),
        ..FakeSockets::default()
    };

    let result = Client::connect(&mut host, SocketKind::Tcp, Ipv4Addr::LOCALHOST, 1);

    assert_eq!(result.err(), Some(SocketError::Command(HostStatus::FAILED)));
    assert_eq!(host.closed, [0]);
}

#[test]
fn descriptor_beyond_table_is_rejected() {
    let mut host = FakeSockets {
        next_sd: crate::events::MAX_SOCKETS as SocketFd,
        ..FakeSockets::default()
    };

    let result = Client::connect(&mut host, SocketKind::Tcp, Ipv4Addr::LOCALHOST, 1);

    assert_eq!(result.err(), Some(SocketError::Exhausted));
    assert_eq!(host.closed, [4]);
    assert!(host.connects.is_empty());
}

#[test]
fn forced_reset_disconnects_and_frees_socket() {
    let mut host = FakeSockets::default();
    let mut client = connected_client(&mut host);
    host.script_recv(0, Err(HostStatus::SOCKET_INACTIVE));

    assert_eq!(client.read_byte(&mut host), Err(SocketError::Closed));

    assert!(!client.connected(&mut host));
    assert_eq!(client.socket(), None);
    assert_eq!(host.closed, [0]);
    assert!(!host.events.is_socket_closed(0));
}

#[test]
fn peer_close_is_deferred_until_buffer_drains() {
    let mut host = FakeSockets::default();
    let mut client = connected_client(&mut host);
    host.script_recv(0, Ok(b"hi"));

    assert_eq!(client.read_byte(&mut host), Ok(b'h'));
    peer_closes(&host, 0);

    assert!(client.connected(&mut host));
    assert_eq!(client.available(&mut host), 1);
    assert_eq!(client.read_byte(&mut host), Ok(b'i'));

    assert!(!client.connected(&mut host));
    assert_eq!(host.closed, [0]);
    assert!(!host.events.is_socket_closed(0));
}

#[test]
fn read_byte_polls_until_data_arrives() {
    let mut host = FakeSockets::default();
    let mut client = connected_client(&mut host);
    host.script_recv(0, Ok(b""));
    host.script_recv(0, Err(HostStatus::FAILED));
    host.script_recv(0, Ok(b"x"));

    assert_eq!(client.read_byte(&mut host), Ok(b'x'));
    assert_eq!(host.polls, 3);
}

#[test]
fn available_probes_only_when_buffer_is_empty() {
    let mut host = FakeSockets::default();
    let mut client = connected_client(&mut host);
    assert_eq!(client.available(&mut host), 0);

    host.script_recv(0, Ok(b"abcd"));
    assert_eq!(client.available(&mut host), 1);

    let mut buf = [0u8; 2];
    assert_eq!(client.read(&mut host, &mut buf), Ok(2));
    assert_eq!(&buf, b"ab");
    assert_eq!(client.available(&mut host), 2);
}

#[test]
fn unopened_client_reports_not_open() {
    let mut host = FakeSockets::default();
    let mut client = Client::disconnected();

    assert!(!client.connected(&mut host));
    assert_eq!(client.available(&mut host), 0);
    assert_eq!(client.write(&mut host, b"x"), Err(SocketError::NotOpen));
    assert_eq!(client.close(&mut host), Err(SocketError::NotOpen));
}

#[test]
fn write_line_appends_crlf() {
    let mut host = FakeSockets::default();
    let mut client = connected_client(&mut host);

    assert_eq!(client.write_line(&mut host, "GET /"), Ok(7));
    assert_eq!(client.write_str(&mut host, ""), Ok(0));
    assert_eq!(client.write_byte(&mut host, b'!'), Ok(1));
    assert_eq!(host.sent_to(0), b"GET /\r\n!");
}

#[test]
fn raw_recv_bypasses_buffer() {
    let mut host = FakeSockets::default();
    let mut client = connected_client(&mut host);
    host.script_recv(0, Ok(b"raw"));

    let mut buf = [0u8; 8];
    assert_eq!(client.recv(&mut host, &mut buf), Ok(3));
    assert_eq!(&buf[..3], b"raw");
    assert_eq!(client.buffered(), 0);
}

#[test]
fn server_begin_configures_listener() {
    let mut host = FakeSockets::default();
    let mut server = Server::new(8080);

    server.begin(&mut host).expect("begin should succeed");

    assert!(server.is_listening());
    assert_eq!(host.timeouts, [NetTimeouts::SERVER]);
    assert_eq!(host.nonblocking, [0]);
    assert_eq!(host.binds, [(0, SockAddr::any(8080))]);
    assert_eq!(host.listens, [0]);
}

#[test]
fn server_without_clients_returns_not_connected() {
    let mut host = FakeSockets::default();
    let mut server = Server::new(23);
    server.begin(&mut host).expect("begin should succeed");

    let client = server.available(&mut host);

    assert_eq!(client, ClientRef::NotConnected);
    assert!(server.client_mut(client).is_none());
}

#[test]
fn server_returns_the_client_with_data() {
    let mut host = FakeSockets::default();
    let mut server = Server::new(23);
    server.begin(&mut host).expect("begin should succeed");
    host.pending_accepts.extend([1, 2]);
    host.script_recv(2, Ok(b"ping"));

    let client = server.available(&mut host);

    assert_eq!(client, ClientRef::Slot(1));
    let client = server.client_mut(client).expect("slot should exist");
    assert_eq!(client.socket(), Some(2));
    assert_eq!(client.read_byte(&mut host), Ok(b'p'));
}

#[test]
fn server_closes_accepted_descriptor_beyond_table() {
    let mut host = FakeSockets::default();
    let mut server = Server::new(23);
    server.begin(&mut host).expect("begin should succeed");
    host.pending_accepts.extend([crate::events::MAX_SOCKETS as SocketFd, 1]);

    assert_eq!(server.available(&mut host), ClientRef::NotConnected);

    assert_eq!(host.closed, [crate::events::MAX_SOCKETS as SocketFd]);
    assert_eq!(server.write(&mut host, b"hi"), 2);
    assert_eq!(host.sent_to(1), b"hi");
}

#[test]
fn server_broadcast_sums_accepted_bytes() {
    let mut host = FakeSockets::default();
    let mut server = Server::new(23);
    server.begin(&mut host).expect("begin should succeed");
    host.pending_accepts.extend([1, 2]);
    assert_eq!(server.available(&mut host), ClientRef::NotConnected);

    assert_eq!(server.write(&mut host, b"hey"), 6);
    assert_eq!(server.write_byte(&mut host, b'\n'), 2);
    assert_eq!(host.sent_to(1), b"hey\n");
    assert_eq!(host.sent_to(2), b"hey\n");
}

#[test]
fn stream_adapter_reads_and_writes() {
    let mut host = FakeSockets::default();
    let mut client = connected_client(&mut host);
    host.script_recv(0, Ok(b"hello"));
    host.script_recv(0, Err(HostStatus::SOCKET_INACTIVE));

    let mut buf = [0u8; 8];
    {
        let mut stream = Stream::new(&mut host, &mut client);
        stream.write_all(b"req").expect("write should succeed");
        assert_eq!(stream.read(&mut buf), Ok(5));
        assert_eq!(stream.read(&mut buf), Ok(0));
        assert!(!stream.client().is_open());
    }

    assert_eq!(&buf[..5], b"hello");
    assert_eq!(host.sent_to(0), b"req");
}
