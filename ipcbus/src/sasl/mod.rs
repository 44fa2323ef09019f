//! The line-based SASL handshake that authenticates a connection before
//! binary framing begins (§4.5, §6).

mod cookie;

use tracing::trace;

use crate::{Error, Result};

/// Mechanisms tried, in order of preference (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    External,
    CookieSha1,
    Anonymous,
}

impl Mechanism {
    fn name(&self) -> &'static str {
        match self {
            Mechanism::External => "EXTERNAL",
            Mechanism::CookieSha1 => "DBUS_COOKIE_SHA1",
            Mechanism::Anonymous => "ANONYMOUS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    SentAuth(Mechanism),
    WaitingForData(Mechanism),
    WaitingForOk,
    WaitingForReject,
    Done,
    Failed,
}

/// Whether the client has more to send, should wait for a line, or has
/// reached a terminal outcome.
pub enum Step {
    /// Send these bytes (already `\r\n`-terminated) and keep driving.
    Send(Vec<u8>),
    /// Handshake complete: send `final_send` (the `BEGIN` line), then the
    /// caller switches to binary framing at the very next byte. Carries
    /// whether unix-fd passing was negotiated.
    Done { final_send: Vec<u8>, negotiated_unix_fd: bool },
    /// Handshake failed terminally.
    Failed(Error),
}

/// Client-side SASL state machine (§4.5). One instance per connection
/// attempt; discarded once [`Step::Done`] is produced.
pub struct Handshake {
    state: State,
    uid: String,
    username: String,
    mechanisms: Vec<Mechanism>,
    next_mechanism_idx: usize,
    negotiate_unix_fd: bool,
    unix_fd_agreed: bool,
    sent_negotiate: bool,
}

impl Handshake {
    pub fn new(uid: &str, username: &str, negotiate_unix_fd: bool) -> Self {
        Handshake {
            state: State::Init,
            uid: uid.to_owned(),
            username: username.to_owned(),
            mechanisms: vec![Mechanism::External, Mechanism::CookieSha1, Mechanism::Anonymous],
            next_mechanism_idx: 0,
            negotiate_unix_fd,
            unix_fd_agreed: false,
            sent_negotiate: false,
        }
    }

    /// The leading NUL byte that must precede any SASL line (§4.5, §6).
    pub fn initial_byte() -> u8 {
        0
    }

    /// The first line(s) to send, starting the handshake.
    pub fn start(&mut self) -> Step {
        self.try_next_mechanism()
    }

    fn try_next_mechanism(&mut self) -> Step {
        let Some(&mechanism) = self.mechanisms.get(self.next_mechanism_idx) else {
            self.state = State::Failed;
            return Step::Failed(Error::AuthFailed("no more mechanisms to try".into()));
        };
        self.next_mechanism_idx += 1;
        self.state = State::SentAuth(mechanism);
        trace!(mechanism = mechanism.name(), "SASL trying mechanism");
        let line = match mechanism {
            Mechanism::External => format!("AUTH EXTERNAL {}", hex::encode(self.uid.as_bytes())),
            Mechanism::CookieSha1 => format!("AUTH DBUS_COOKIE_SHA1 {}", hex::encode(self.username.as_bytes())),
            Mechanism::Anonymous => "AUTH ANONYMOUS".to_owned(),
        };
        Step::Send(line_bytes(&line))
    }

    /// Feed one received, already line-split (no `\r\n`) SASL line.
    pub fn receive_line(&mut self, line: &str) -> Step {
        trace!(%line, "SASL <-");
        match self.state {
            State::Failed | State::Done => Step::Failed(Error::AuthFailed("handshake already terminated".into())),
            State::SentAuth(mech) | State::WaitingForData(mech) => self.handle_auth_reply(mech, line),
            State::WaitingForOk => self.handle_ok_wait(line),
            State::WaitingForReject => self.handle_reject_wait(line),
            State::Init => Step::Failed(Error::AuthFailed("received line before AUTH was sent".into())),
        }
    }

    fn handle_auth_reply(&mut self, mech: Mechanism, line: &str) -> Step {
        if let Some(rest) = line.strip_prefix("OK ") {
            return self.on_ok(rest);
        }
        if let Some(rest) = line.strip_prefix("DATA ") {
            return self.on_data(mech, rest);
        }
        if line.starts_with("REJECTED") {
            return self.on_rejected(line);
        }
        // ERROR or anything unexpected: CANCEL and wait for REJECTED.
        self.cancel()
    }

    fn on_data(&mut self, mech: Mechanism, hex_payload: &str) -> Step {
        match mech {
            Mechanism::CookieSha1 => match cookie::respond(hex_payload) {
                Ok(reply_hex) => {
                    self.state = State::WaitingForOk;
                    Step::Send(line_bytes(&format!("DATA {reply_hex}")))
                }
                Err(e) => {
                    trace!(error = %e, "DBUS_COOKIE_SHA1 challenge rejected locally");
                    self.cancel()
                }
            },
            _ => self.cancel(),
        }
    }

    fn on_ok(&mut self, _guid: &str) -> Step {
        if self.negotiate_unix_fd && !self.sent_negotiate {
            self.sent_negotiate = true;
            self.state = State::WaitingForOk;
            return Step::Send(line_bytes("NEGOTIATE_UNIX_FD"));
        }
        self.finish_with_begin()
    }

    fn finish_with_begin(&mut self) -> Step {
        self.state = State::Done;
        Step::Done { final_send: line_bytes("BEGIN"), negotiated_unix_fd: self.unix_fd_agreed }
    }

    fn handle_ok_wait(&mut self, line: &str) -> Step {
        if line == "AGREE_UNIX_FD" {
            self.unix_fd_agreed = true;
            return self.finish_with_begin();
        }
        if line == "ERROR" {
            // Server refused fd negotiation; proceed without it.
            self.unix_fd_agreed = false;
            return self.finish_with_begin();
        }
        if let Some(rest) = line.strip_prefix("OK ") {
            return self.on_ok(rest);
        }
        self.cancel()
    }

    fn cancel(&mut self) -> Step {
        self.state = State::WaitingForReject;
        Step::Send(line_bytes("CANCEL"))
    }

    fn handle_reject_wait(&mut self, line: &str) -> Step {
        if line.starts_with("REJECTED") {
            return self.on_rejected(line);
        }
        self.state = State::Failed;
        Step::Failed(Error::AuthFailed(format!("unexpected line while waiting for REJECTED: {line}")))
    }

    fn on_rejected(&mut self, _line: &str) -> Step {
        if self.next_mechanism_idx < self.mechanisms.len() {
            self.try_next_mechanism()
        } else {
            self.state = State::Failed;
            Step::Failed(Error::AuthFailed("server rejected every mechanism".into()))
        }
    }
}

fn line_bytes(line: &str) -> Vec<u8> {
    let mut v = line.as_bytes().to_vec();
    v.extend_from_slice(b"\r\n");
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_happy_path() {
        let mut hs = Handshake::new("1000", "user", false);
        match hs.start() {
            Step::Send(line) => assert_eq!(line, b"AUTH EXTERNAL 31303030\r\n"),
            _ => panic!("expected AUTH EXTERNAL"),
        }
        match hs.receive_line("OK 1234deadbeef") {
            Step::Done { negotiated_unix_fd, .. } => assert!(!negotiated_unix_fd),
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn rejected_with_only_unsupported_mechs_fails() {
        let mut hs = Handshake::new("1000", "user", false);
        let _ = hs.start();
        match hs.receive_line("REJECTED GSSAPI") {
            Step::Failed(Error::AuthFailed(_)) => {}
            other_step => {
                // Falls through to trying the next mechanism, which is
                // expected; only the final rejection is terminal.
                assert!(matches!(other_step, Step::Send(_)));
            }
        }
    }

    #[test]
    fn unix_fd_negotiation_then_begin() {
        let mut hs = Handshake::new("1000", "user", true);
        let _ = hs.start();
        match hs.receive_line("OK 1234") {
            Step::Send(line) => assert_eq!(line, b"NEGOTIATE_UNIX_FD\r\n"),
            _ => panic!("expected NEGOTIATE_UNIX_FD"),
        }
        match hs.receive_line("AGREE_UNIX_FD") {
            Step::Done { negotiated_unix_fd, .. } => assert!(negotiated_unix_fd),
            _ => panic!("expected Done"),
        }
    }

    #[test]
    fn unix_fd_negotiation_refused_still_begins() {
        let mut hs = Handshake::new("1000", "user", true);
        let _ = hs.start();
        let _ = hs.receive_line("OK 1234");
        match hs.receive_line("ERROR") {
            Step::Done { negotiated_unix_fd, .. } => assert!(!negotiated_unix_fd),
            _ => panic!("expected Done"),
        }
    }
}
