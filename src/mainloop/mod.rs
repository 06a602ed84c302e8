//! Single-threaded `mio` poll loop driving every live connection plus the
//! shared [`TimerWheel`], grounded in the accept/read/write/timeout poll
//! idiom of a `popol`-based reactor but adapted to `mio::Poll`/`mio::Token`.

pub mod timer_wheel;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::error::ConfigError;
use crate::reactor::ReactorHandle;
use crate::timer::SharedClock;
use crate::tracer::LogTracer;
use crate::transport::nxtcp::NxtcpConnection;
use crate::transport::telnet::TelnetConnection;
use crate::transport::Connection;

use timer_wheel::TimerWheel;

const READ_BUFFER_SIZE: usize = 64 * 1024;
const KEEPALIVE_RESOLUTION: Duration = Duration::from_secs(1);

/// How a listening socket should decode the connections it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Nxtcp,
    Telnet,
}

struct Listener {
    socket: TcpListener,
    protocol: Protocol,
}

struct Socket {
    stream: TcpStream,
    connection: Box<dyn Connection>,
    read_buf: [u8; READ_BUFFER_SIZE],
    write_buf: Vec<u8>,
}

/// Owns every OS resource (listeners, client sockets, the poll handle) and
/// the shared timer wheel driving the reactor's timeouts.
pub struct MioMainloop {
    poll: Poll,
    events: Events,
    reactor: ReactorHandle,
    clock: Rc<RefCell<TimerWheel>>,
    listeners: HashMap<Token, Listener>,
    sockets: HashMap<Token, Socket>,
    next_token: usize,
    last_keepalive_tick: Instant,
}

impl MioMainloop {
    pub fn new(watch_timeout_default: Duration, watch_timeout_max: Duration) -> io::Result<Self> {
        let clock = Rc::new(RefCell::new(TimerWheel::new()));
        let reactor = ReactorHandle::with_timeouts(
            Box::new(LogTracer),
            Box::new(SharedClock(Rc::clone(&clock))),
            watch_timeout_default,
            watch_timeout_max,
        );

        Ok(MioMainloop {
            poll: Poll::new()?,
            events: Events::with_capacity(1024),
            reactor,
            clock,
            listeners: HashMap::new(),
            sockets: HashMap::new(),
            next_token: 0,
            last_keepalive_tick: Instant::now(),
        })
    }

    pub fn reactor(&self) -> &ReactorHandle {
        &self.reactor
    }

    pub fn listen_nxtcp(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.listen(addr, Protocol::Nxtcp)
    }

    pub fn listen_telnet(&mut self, addr: SocketAddr) -> io::Result<()> {
        self.listen(addr, Protocol::Telnet)
    }

    fn listen(&mut self, addr: SocketAddr, protocol: Protocol) -> io::Result<()> {
        let mut socket = TcpListener::bind(addr)?;
        let token = self.alloc_token();
        self.poll.registry().register(&mut socket, token, Interest::READABLE)?;
        log::info!("listening for {protocol:?} on {addr}");
        self.listeners.insert(token, Listener { socket, protocol });
        Ok(())
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Runs until an I/O error on `Poll::poll` itself; per-connection errors
    /// are handled by tearing down that connection only.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            self.tick_keepalive_if_due();

            let timeout = self
                .clock
                .borrow()
                .next_deadline(Instant::now())
                .map(|d| d.min(KEEPALIVE_RESOLUTION))
                .unwrap_or(KEEPALIVE_RESOLUTION);

            match self.poll.poll(&mut self.events, Some(timeout)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            self.clock.borrow_mut().fire_due(Instant::now());

            let tokens: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
            for token in tokens {
                if self.listeners.contains_key(&token) {
                    self.accept_all(token);
                } else if self.sockets.contains_key(&token) {
                    self.service_socket(token);
                }
            }

            self.sockets.retain(|_, socket| {
                let keep = !socket.connection.should_close();
                if !keep {
                    socket.connection.close();
                }
                keep
            });
        }
    }

    fn tick_keepalive_if_due(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_keepalive_tick) < KEEPALIVE_RESOLUTION {
            return;
        }
        self.last_keepalive_tick = now;
        for socket in self.sockets.values_mut() {
            socket.connection.keepalive_tick();
        }
    }

    fn accept_all(&mut self, listener_token: Token) {
        let protocol = self.listeners[&listener_token].protocol;
        loop {
            let accepted = self.listeners.get_mut(&listener_token).unwrap().socket.accept();
            let (mut stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    break;
                }
            };

            let token = self.alloc_token();
            if let Err(e) = self.poll.registry().register(
                &mut stream,
                token,
                Interest::READABLE | Interest::WRITABLE,
            ) {
                log::warn!("failed to register accepted socket: {e}");
                continue;
            }

            let channel = self.reactor.channel(None);
            let connection: Box<dyn Connection> = match protocol {
                Protocol::Nxtcp => Box::new(NxtcpConnection::new(channel, peer)),
                Protocol::Telnet => Box::new(TelnetConnection::new(channel, peer)),
            };

            self.sockets.insert(
                token,
                Socket {
                    stream,
                    connection,
                    read_buf: [0u8; READ_BUFFER_SIZE],
                    write_buf: Vec::new(),
                },
            );
        }
    }

    fn service_socket(&mut self, token: Token) {
        self.read_socket(token);
        if self.sockets.contains_key(&token) {
            self.write_socket(token);
        }
    }

    fn read_socket(&mut self, token: Token) {
        loop {
            let socket = self.sockets.get_mut(&token).unwrap();
            match socket.stream.read(&mut socket.read_buf) {
                Ok(0) => {
                    socket.connection.on_readable(&[]);
                    self.remove_socket(token);
                    return;
                }
                Ok(n) => {
                    if !socket.connection.on_readable(&socket.read_buf[..n]) {
                        self.remove_socket(token);
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.remove_socket(token);
                    return;
                }
            }
        }
    }

    /// Drains newly queued bytes into `write_buf`, then writes as much of it
    /// as the socket accepts; a partial write leaves the remainder buffered
    /// for the next writable event instead of being dropped.
    fn write_socket(&mut self, token: Token) {
        let socket = self.sockets.get_mut(&token).unwrap();
        if socket.connection.wants_write() {
            socket.connection.fill_write_buffer(&mut socket.write_buf);
        }
        if socket.write_buf.is_empty() {
            return;
        }

        loop {
            match socket.stream.write(&socket.write_buf) {
                Ok(0) => break,
                Ok(n) => {
                    socket.write_buf.drain(..n);
                    if socket.write_buf.is_empty() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.remove_socket(token);
                    return;
                }
            }
        }
    }

    /// Tears down the reactor channel before dropping the socket, mirroring
    /// what the end-of-loop `retain` sweep does for connections that close
    /// themselves voluntarily.
    fn remove_socket(&mut self, token: Token) {
        if let Some(socket) = self.sockets.remove(&token) {
            socket.connection.close();
        }
    }
}

/// Parses a CLI-supplied `host:port` listen address.
pub fn parse_listen_addr(raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.parse()
        .map_err(|e| ConfigError::InvalidAddress(raw.to_string(), e))
}
