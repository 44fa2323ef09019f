//! The transport boundary (§1, §6): this crate treats concrete socket I/O
//! and event-loop selection as an external collaborator. What's specified
//! here is the trait seam a transport must implement — a Unix stream, an
//! abstract socket, or TCP — not a specific reactor integration.

use std::io;

use async_trait::async_trait;

/// Credentials the transport may be able to report about its peer (used
/// by the `EXTERNAL` SASL mechanism and by `GetConnectionCredentials`).
#[derive(Debug, Clone, Default)]
pub struct PeerCredentials {
    pub unix_user_id: Option<u32>,
    pub process_id: Option<u32>,
}

/// A bidirectional byte-stream transport, split into independently
/// owned read/write halves so the connection runtime can drive both
/// directions concurrently (§5).
pub trait Socket: Send + Sync + 'static {
    type ReadHalf: ReadHalf;
    type WriteHalf: WriteHalf;

    fn split(self) -> (Self::ReadHalf, Self::WriteHalf);
}

/// The read half of a [`Socket`].
#[async_trait]
pub trait ReadHalf: std::fmt::Debug + Send + Sync + 'static {
    /// Read whatever bytes are currently available into `buf`, returning
    /// the number of bytes read (0 on EOF) and, on platforms that support
    /// it, any file descriptors received alongside them.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<(usize, Vec<crate::OwnedFd>)>;

    /// Whether this transport can carry `UNIX_FDS` out of band.
    fn can_pass_unix_fd(&self) -> bool {
        false
    }

    async fn peer_credentials(&mut self) -> io::Result<PeerCredentials> {
        Ok(PeerCredentials::default())
    }
}

/// The write half of a [`Socket`].
#[async_trait]
pub trait WriteHalf: std::fmt::Debug + Send + Sync + 'static {
    /// Write as much of `buf` as the transport accepts in one call,
    /// returning the number of bytes actually written. Callers must loop
    /// until the whole buffer has been written.
    async fn send(&mut self, buf: &[u8], fds: &[crate::BorrowedFd<'_>]) -> io::Result<usize>;

    fn can_pass_unix_fd(&self) -> bool {
        false
    }

    async fn close(&mut self) -> io::Result<()>;
}

/// A paired in-memory socket, useful for tests and for peer-to-peer
/// connections within one process. Not a production transport — real
/// Unix/TCP sockets are provided by the embedding application per §1.
pub mod mem {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use event_listener::Event;

    use super::{PeerCredentials, ReadHalf, Socket, WriteHalf};

    #[derive(Debug, Default)]
    struct Pipe {
        data: Mutex<VecDeque<u8>>,
        closed: AtomicBool,
        readable: Event,
    }

    #[derive(Debug, Clone)]
    pub struct MemSocket {
        inbound: Arc<Pipe>,
        outbound: Arc<Pipe>,
    }

    impl MemSocket {
        /// A connected pair: what's written to one side can be read from
        /// the other.
        pub fn pair() -> (MemSocket, MemSocket) {
            let a = Arc::new(Pipe::default());
            let b = Arc::new(Pipe::default());
            (
                MemSocket { inbound: a.clone(), outbound: b.clone() },
                MemSocket { inbound: b, outbound: a },
            )
        }
    }

    impl Socket for MemSocket {
        type ReadHalf = MemReadHalf;
        type WriteHalf = MemWriteHalf;

        fn split(self) -> (MemReadHalf, MemWriteHalf) {
            (MemReadHalf { pipe: self.inbound }, MemWriteHalf { pipe: self.outbound })
        }
    }

    #[derive(Debug)]
    pub struct MemReadHalf {
        pipe: Arc<Pipe>,
    }

    #[derive(Debug)]
    pub struct MemWriteHalf {
        pipe: Arc<Pipe>,
    }

    #[async_trait]
    impl ReadHalf for MemReadHalf {
        /// Waits for at least one byte to be available (or the write half
        /// to close) rather than returning `0` on a merely-empty buffer —
        /// `0` is reserved for genuine EOF, matching a real stream socket.
        async fn recv(&mut self, buf: &mut [u8]) -> std::io::Result<(usize, Vec<crate::OwnedFd>)> {
            loop {
                let listener = {
                    let mut data = self.pipe.data.lock().expect("lock poisoned");
                    if !data.is_empty() {
                        let n = std::cmp::min(buf.len(), data.len());
                        for slot in buf.iter_mut().take(n) {
                            *slot = data.pop_front().expect("checked length");
                        }
                        return Ok((n, Vec::new()));
                    }
                    if self.pipe.closed.load(Ordering::Acquire) {
                        return Ok((0, Vec::new()));
                    }
                    self.pipe.readable.listen()
                };
                listener.await;
            }
        }

        async fn peer_credentials(&mut self) -> std::io::Result<PeerCredentials> {
            Ok(PeerCredentials::default())
        }
    }

    #[async_trait]
    impl WriteHalf for MemWriteHalf {
        async fn send(&mut self, buf: &[u8], _fds: &[crate::BorrowedFd<'_>]) -> std::io::Result<usize> {
            self.pipe.data.lock().expect("lock poisoned").extend(buf.iter().copied());
            self.pipe.readable.notify(usize::MAX);
            Ok(buf.len())
        }

        async fn close(&mut self) -> std::io::Result<()> {
            self.pipe.closed.store(true, Ordering::Release);
            self.pipe.readable.notify(usize::MAX);
            Ok(())
        }
    }
}
