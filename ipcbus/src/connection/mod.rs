//! The connection runtime (§4.7, §5): wires the SASL handshake, the
//! framer, the handler pipeline, serial allocation, pending-reply
//! correlation, health probing and lifecycle state tracking together into
//! one usable client connection.
//!
//! Concrete socket I/O and event-loop/executor selection stay out of
//! scope (§1 Non-goals): [`Connection`] is generic over [`crate::socket::Socket`]
//! and exposes a `drive_once` the embedding application calls from
//! whatever loop it already runs (a thread, a `tokio::spawn`, an
//! `async-io` reactor task — the choice is the caller's).

pub mod health;
pub mod pending;
pub mod serial;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_lock::Mutex as AsyncMutex;
use ipcbus_names::OwnedUniqueName;
use ipcbus_types::{BigEndian, LittleEndian};
use tracing::{debug, info, warn};

use crate::fdo::{self, peer::MachineId};
use crate::framer::Framer;
use crate::message::{Flags, Message, Type as MsgType};
use crate::pipeline::{Direction, Event as PipelineEvent, Pipeline};
use crate::registry::ObjectRegistry;
use crate::sasl::{Handshake, Step};
use crate::socket::{ReadHalf, Socket, WriteHalf};
use crate::{Error, Result};

pub use health::{HealthEvent, HealthProbe};
pub use pending::PendingReplies;
pub use serial::SerialAllocator;
pub use state::{ConnectionState, ReconnectBackoff, StateEvent, StateMachine};

/// The wire byte order this connection encodes outbound messages with.
/// D-Bus permits either; matching host endianness avoids a conversion on
/// every encode, which is what every real implementation does.
#[cfg(target_endian = "little")]
pub type NativeOrder = LittleEndian;
#[cfg(target_endian = "big")]
pub type NativeOrder = BigEndian;

/// Configuration accepted by [`ConnectionBuilder`] (§9's ambient config
/// layer): every knob the runtime needs that isn't negotiated on the wire.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub uid: String,
    pub username: String,
    pub negotiate_unix_fd: bool,
    pub call_timeout: Duration,
    pub health_check_interval: Option<Duration>,
    pub machine_id: MachineId,
    pub strict_decoding: bool,
    /// Automatic-reconnection policy (§4.7, §9). `None` disables the hook:
    /// the connection stays FAILED and the embedding application decides
    /// whether and when to dial a fresh [`crate::socket::Socket`].
    pub reconnect_backoff: Option<ReconnectBackoff>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            uid: "0".to_owned(),
            username: String::new(),
            negotiate_unix_fd: false,
            call_timeout: Duration::from_secs(25),
            health_check_interval: None,
            machine_id: MachineId::default(),
            strict_decoding: true,
            reconnect_backoff: None,
        }
    }
}

/// Builds a [`Connection`] over an already-established [`Socket`],
/// mirroring the teacher's builder-pattern configuration surface.
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        ConnectionBuilder::default()
    }

    pub fn uid(mut self, uid: impl Into<String>) -> Self {
        self.config.uid = uid.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn negotiate_unix_fd(mut self, negotiate: bool) -> Self {
        self.config.negotiate_unix_fd = negotiate;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn health_check_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    pub fn machine_id(mut self, machine_id: MachineId) -> Self {
        self.config.machine_id = machine_id;
        self
    }

    pub fn reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.config.reconnect_backoff = Some(backoff);
        self
    }

    /// Perform the SASL handshake, the mandatory `Hello()` exchange, and
    /// return a live connection (§4.7).
    pub async fn build<S: Socket>(self, socket: S) -> Result<Connection<S>> {
        Connection::connect(socket, self.config).await
    }
}

struct ReadSide<R> {
    half: R,
    framer: Framer,
    // Bytes received but not yet consumed by the line-based SASL reader;
    // handed off to the framer once BEGIN is sent (§4.5 -> §4.4).
    leftover: Vec<u8>,
}

/// A live, authenticated D-Bus connection (§4.7, §5).
pub struct Connection<S: Socket> {
    write_half: AsyncMutex<S::WriteHalf>,
    read_side: AsyncMutex<ReadSide<S::ReadHalf>>,
    /// Messages that arrived before the bootstrap `Hello()` reply during
    /// [`Connection::connect`], drained by the first [`Connection::drive_once`].
    backlog: AsyncMutex<Vec<Message>>,
    pipeline: Pipeline,
    pending: PendingReplies,
    serial: SerialAllocator,
    state: StateMachine,
    health: HealthProbe,
    registry: Arc<ObjectRegistry>,
    unique_name: AsyncMutex<Option<OwnedUniqueName>>,
    config: ConnectionConfig,
    closed: AtomicBool,
}

impl<S: Socket> Connection<S> {
    async fn connect(socket: S, config: ConnectionConfig) -> Result<Self> {
        let (mut read_half, mut write_half) = socket.split();

        let mut leftover = Vec::new();
        write_half.send(&[Handshake::initial_byte()], &[]).await?;

        let mut handshake = Handshake::new(&config.uid, &config.username, config.negotiate_unix_fd);
        let mut step = handshake.start();
        loop {
            match step {
                Step::Send(bytes) => {
                    write_all(&mut write_half, &bytes).await?;
                    step = read_sasl_line(&mut read_half, &mut leftover).await.map(|line| handshake.receive_line(&line))?;
                }
                Step::Done { final_send, .. } => {
                    write_all(&mut write_half, &final_send).await?;
                    break;
                }
                Step::Failed(e) => return Err(e),
            }
        }

        let interval = config.health_check_interval.unwrap_or(Duration::from_secs(30));
        let conn = Connection {
            write_half: AsyncMutex::new(write_half),
            read_side: AsyncMutex::new(ReadSide { half: read_half, framer: Framer::new(config.strict_decoding), leftover }),
            backlog: AsyncMutex::new(Vec::new()),
            pipeline: Pipeline::new(),
            pending: PendingReplies::new(),
            serial: SerialAllocator::new(),
            state: StateMachine::new(),
            health: HealthProbe::new(interval),
            registry: Arc::new(ObjectRegistry::new()),
            unique_name: AsyncMutex::new(None),
            config,
            closed: AtomicBool::new(false),
        };
        conn.state.begin_connecting();
        conn.state.begin_authenticating();

        let serial = conn.serial.next();
        let hello = fdo::names::build_hello_call::<NativeOrder>(serial)?;
        conn.send_unrouted(hello).await?;
        let reply = conn.read_until_reply(serial).await?;
        let unique = fdo::acquire_unique_name(&reply)?;
        info!(unique_name = %unique, "acquired bus name");
        *conn.unique_name.lock().await = Some(unique);
        conn.state.on_active();
        conn.pipeline.notify(PipelineEvent::ConnectionActive).await;

        Ok(conn)
    }

    /// Read frames directly off the wire, bypassing the pipeline and
    /// pending-reply table, until one with `reply_serial == serial`
    /// arrives. Used only to bootstrap the `Hello()` reply in
    /// [`Connection::connect`], before any application-driven
    /// [`Connection::drive_once`] loop exists to do that routing. Anything
    /// else that arrives in the meantime is stashed in `backlog` for that
    /// loop to pick up later.
    async fn read_until_reply(&self, serial: u32) -> Result<Message> {
        loop {
            let messages = {
                let mut read_side = self.read_side.lock().await;
                let mut buf = [0u8; 4096];
                let (n, _fds) = read_side.half.recv(&mut buf).await.map_err(|e| Error::Disconnected(e.to_string()))?;
                if n == 0 {
                    return Err(Error::Disconnected("peer closed the connection during Hello()".into()));
                }
                read_side.framer.feed(&buf[..n])?
            };
            for message in messages {
                if message.fields().reply_serial == Some(serial) {
                    return Ok(message);
                }
                self.backlog.lock().await.push(message);
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    /// Mark this connection as reconnecting (§4.7: `FAILED -> RECONNECTING
    /// -> CONNECTING`). The embedding application calls this before dialing
    /// a fresh [`crate::socket::Socket`] and building a new [`Connection`];
    /// [`ConnectionConfig::reconnect_backoff`] gives the delay to wait
    /// beforehand.
    pub fn begin_reconnecting(&self) -> Option<StateEvent> {
        self.state.begin_reconnecting()
    }

    /// The delay to wait before reconnection attempt `attempt` (0-indexed),
    /// or `None` if automatic reconnection is disabled for this connection.
    pub fn reconnect_delay(&self, attempt: u32) -> Option<Duration> {
        self.config.reconnect_backoff.map(|b| b.delay_for(attempt))
    }

    pub async fn unique_name(&self) -> Option<OwnedUniqueName> {
        self.unique_name.lock().await.clone()
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Send `message` without expecting or awaiting a reply (§4.6 outbound
    /// path: tail-to-head through the pipeline, then the encoder).
    pub async fn send(&self, message: Message) -> Result<()> {
        let Some(message) = self.pipeline.dispatch(Direction::Outbound, message).await? else {
            return Ok(());
        };
        let bytes = message.to_frame_bytes::<NativeOrder>()?;
        let mut write_half = self.write_half.lock().await;
        write_all(&mut *write_half, &bytes).await
    }

    /// Send a method call and await its reply, honoring the configured
    /// call timeout (§4.7, §5, §8).
    pub async fn call(&self, message: Message) -> Result<Message> {
        self.pending.register(message.serial(), self.config.call_timeout);
        if let Err(e) = self.send_unrouted(message.clone()).await {
            self.pending.cancel(message.serial());
            return Err(e);
        }
        self.pending.wait(message.serial()).await
    }

    async fn send_unrouted(&self, message: Message) -> Result<()> {
        let bytes = message.to_frame_bytes::<NativeOrder>()?;
        let mut write_half = self.write_half.lock().await;
        write_all(&mut *write_half, &bytes).await
    }

    /// Allocate the next outbound serial (exposed so callers can build
    /// their own [`Message`]s before calling [`Connection::call`] or
    /// [`Connection::send`]).
    pub fn next_serial(&self) -> u32 {
        self.serial.next()
    }

    /// Pump one round of inbound I/O: read whatever bytes are available,
    /// feed the framer, and route every complete message that falls out
    /// (reply correlation, Peer replies, registry dispatch, pipeline
    /// delivery of anything left over). Intended to be called in a loop by
    /// the embedding application's chosen I/O task (§5 "one I/O task per
    /// connection").
    pub async fn drive_once(&self) -> Result<()> {
        let backlogged: Vec<Message> = {
            let mut backlog = self.backlog.lock().await;
            std::mem::take(&mut *backlog)
        };
        for message in backlogged {
            self.route_inbound(message).await?;
        }

        let messages = {
            let mut read_side = self.read_side.lock().await;
            let mut buf = [0u8; 4096];
            let (n, _fds) = read_side.half.recv(&mut buf).await.map_err(|e| Error::Disconnected(e.to_string()))?;
            if n == 0 {
                return Err(Error::Disconnected("peer closed the connection".into()));
            }
            read_side.framer.feed(&buf[..n])?
        };

        for message in messages {
            self.route_inbound(message).await?;
        }
        Ok(())
    }

    async fn route_inbound(&self, message: Message) -> Result<()> {
        let Some(message) = self.pipeline.dispatch(Direction::Inbound, message).await? else {
            return Ok(());
        };

        match message.msg_type() {
            MsgType::MethodReturn | MsgType::Error => {
                let reply_serial = message.fields().reply_serial.expect("validated by Message::from_parts");
                let result = if message.msg_type() == MsgType::Error {
                    let name = message.fields().error_name.clone().expect("validated");
                    Err(Error::MethodError { name, message: extract_error_detail(&message) })
                } else {
                    Ok(message)
                };
                self.pending.complete(reply_serial, result);
            }
            MsgType::MethodCall => self.answer_method_call(message).await?,
            MsgType::Signal => debug!(%message, "signal delivered with no subscriber routing configured"),
            MsgType::Invalid => return Err(Error::InconsistentMessage("invalid message type reached routing".into())),
        }
        Ok(())
    }

    async fn answer_method_call(&self, call: Message) -> Result<()> {
        let reply_serial = self.serial.next();
        if let Some(result) = fdo::handle_peer_call::<NativeOrder>(&call, reply_serial, &self.config.machine_id) {
            return self.send(result?).await;
        }
        if let Some(result) = self.registry.try_handle::<NativeOrder>(&call, reply_serial).await {
            return self.send(result?).await;
        }
        if !call.primary_header().flags().contains(Flags::NO_REPLY_EXPECTED) {
            let name = ipcbus_names::OwnedErrorName::try_from(crate::error::error_name::UNKNOWN_METHOD.to_owned())
                .expect("well-formed constant");
            let err = Message::error::<NativeOrder>(reply_serial, &call, name, &[])?;
            self.send(err).await?;
        }
        Ok(())
    }

    /// Send a health probe if one is due and the connection isn't already
    /// saturated with outstanding probes (§4.7, §5, §8).
    pub async fn probe_health(&self) -> Result<()> {
        if self.state.current() != ConnectionState::Connected && self.state.current() != ConnectionState::Unhealthy {
            return Ok(());
        }
        if !self.health.can_send_probe() {
            return Ok(());
        }
        self.health.probe_sent();
        let serial = self.serial.next();
        let ping = Message::method_call::<NativeOrder>(
            serial,
            ipcbus_types::ObjectPath::try_from(fdo::BUS_PATH)?,
            Some(ipcbus_names::InterfaceName::try_from(fdo::PEER_INTERFACE)?),
            ipcbus_names::MemberName::try_from("Ping")?,
            Some(ipcbus_names::BusName::try_from(fdo::BUS_DESTINATION)?),
            Flags::empty(),
            &[],
        )?;
        let outcome = self.call(ping).await;
        let (event, should_fail) = self.health.record_outcome(outcome.is_ok());
        match event {
            HealthEvent::Success => {
                self.state.on_probe_success();
            }
            HealthEvent::Failure => {
                self.state.on_probe_failure();
                if should_fail {
                    warn!("consecutive health probe failures exceeded bound, failing connection");
                    self.fail(Error::Disconnected("health probe bound exceeded".into())).await;
                }
            }
        }
        Ok(())
    }

    /// Sweep pending calls for expired deadlines (§4.7, §8). Call
    /// periodically alongside `probe_health`.
    pub fn sweep_timeouts(&self) {
        self.pending.sweep_timeouts();
    }

    /// Tear the connection down: fail every pending call, transition to
    /// FAILED, and let the pipeline's handlers know no further events are
    /// coming (§4.6, §5, §7).
    pub async fn fail(&self, error: Error) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pending.fail_all(|| error.clone());
        self.state.on_fatal_failure();
        self.pipeline.notify(PipelineEvent::ConnectionInactive).await;
    }
}

fn extract_error_detail(message: &Message) -> Option<String> {
    match message.body().first() {
        Some(ipcbus_types::OwnedValue::Str(s)) => Some(s.as_str().to_owned()),
        _ => None,
    }
}

async fn write_all<W: WriteHalf + ?Sized>(write_half: &mut W, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
        let n = write_half.send(bytes, &[]).await.map_err(|e| Error::Disconnected(e.to_string()))?;
        if n == 0 {
            return Err(Error::Disconnected("write returned zero bytes".into()));
        }
        bytes = &bytes[n..];
    }
    Ok(())
}

/// Read and return one CRLF-terminated SASL line (without the terminator),
/// buffering any bytes read past it in `leftover` for the framer.
async fn read_sasl_line<R: ReadHalf + ?Sized>(read_half: &mut R, leftover: &mut Vec<u8>) -> Result<String> {
    loop {
        if let Some(pos) = find_crlf(leftover) {
            let line = String::from_utf8(leftover[..pos].to_vec())
                .map_err(|_| Error::AuthFailed("SASL line was not valid UTF-8".into()))?;
            leftover.drain(..pos + 2);
            return Ok(line);
        }
        let mut buf = [0u8; 1024];
        let (n, _fds) = read_half.recv(&mut buf).await.map_err(|e| Error::Disconnected(e.to_string()))?;
        if n == 0 {
            return Err(Error::Disconnected("peer closed the connection during SASL".into()));
        }
        leftover.extend_from_slice(&buf[..n]);
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::mem::MemSocket;

    async fn run_fake_bus_hello(mut server: impl ReadHalf, mut server_write: impl WriteHalf) {
        let mut leftover = Vec::new();
        let initial = {
            let mut buf = [0u8; 1];
            server.recv(&mut buf).await.unwrap();
            buf[0]
        };
        assert_eq!(initial, 0);
        let line = read_sasl_line(&mut server, &mut leftover).await.unwrap();
        assert!(line.starts_with("AUTH EXTERNAL"));
        write_all(&mut server_write, b"OK 1234deadbeef1234deadbeef1234de\r\n").await.unwrap();
        let begin = read_sasl_line(&mut server, &mut leftover).await.unwrap();
        assert_eq!(begin, "BEGIN");

        // Past this point traffic is framed; read the Hello call and
        // answer it so `Connection::connect` completes.
        let mut framer = Framer::new(true);
        let call = loop {
            let mut buf = [0u8; 4096];
            let (n, _) = server.recv(&mut buf).await.unwrap();
            let mut msgs = framer.feed(&buf[..n]).unwrap();
            if !msgs.is_empty() {
                break msgs.remove(0);
            }
        };
        let reply = Message::method_return::<NativeOrder>(
            9000,
            &call,
            &[ipcbus_types::Value::Str(ipcbus_types::Str::new(":1.42").unwrap())],
        )
        .unwrap();
        write_all(&mut server_write, &reply.to_frame_bytes::<NativeOrder>().unwrap()).await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn connect_performs_sasl_then_hello() {
        let (client, server) = MemSocket::pair();
        let (server_read, server_write) = server.split();
        let server_task = tokio::spawn(run_fake_bus_hello(server_read, server_write));

        let conn = ConnectionBuilder::new().uid("1000").build(client).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.unique_name().await.unwrap().as_str(), ":1.42");
        server_task.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn reconnect_backoff_disabled_by_default() {
        let (client, server) = MemSocket::pair();
        let (server_read, server_write) = server.split();
        let server_task = tokio::spawn(run_fake_bus_hello(server_read, server_write));
        let conn = ConnectionBuilder::new().uid("1000").build(client).await.unwrap();
        assert!(conn.reconnect_delay(0).is_none());
        server_task.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn reconnect_backoff_configured_grows_per_attempt() {
        let (client, server) = MemSocket::pair();
        let (server_read, server_write) = server.split();
        let server_task = tokio::spawn(run_fake_bus_hello(server_read, server_write));
        let conn = ConnectionBuilder::new()
            .uid("1000")
            .reconnect_backoff(ReconnectBackoff::default())
            .build(client)
            .await
            .unwrap();
        let d0 = conn.reconnect_delay(0).unwrap();
        let d1 = conn.reconnect_delay(1).unwrap();
        assert!(d1 > d0);
        server_task.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn fail_then_begin_reconnecting_transitions_state() {
        let (client, server) = MemSocket::pair();
        let (server_read, server_write) = server.split();
        let server_task = tokio::spawn(run_fake_bus_hello(server_read, server_write));
        let conn = ConnectionBuilder::new().uid("1000").build(client).await.unwrap();
        conn.fail(Error::Disconnected("simulated".into())).await;
        assert_eq!(conn.state(), ConnectionState::Failed);
        conn.begin_reconnecting();
        assert_eq!(conn.state(), ConnectionState::Reconnecting);
        server_task.await.unwrap();
    }
}
