//! `DBUS_COOKIE_SHA1` cookie-file lookup and challenge/response, §4.5.
//!
//! The server challenge arrives hex-encoded as `"<context> <cookie-id>
//! <server-challenge>"`; the client looks up the named cookie under
//! `~/.dbus-keyrings/<context>` and replies with
//! `hex("<client-challenge> SHA1(server-challenge:client-challenge:cookie)")`.

use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::{Error, Result};

fn keyring_dir() -> Result<std::path::PathBuf> {
    let home = xdg_home::home_dir().ok_or_else(|| Error::AuthFailed("no home directory for cookie keyring".into()))?;
    Ok(home.join(".dbus-keyrings"))
}

/// Find `cookie_id`'s secret in `~/.dbus-keyrings/<context>`. The file
/// format is one cookie per line: `<id> <unix-timestamp> <hex-cookie>`.
fn lookup_cookie(context: &str, cookie_id: &str) -> Result<String> {
    let path = keyring_dir()?.join(context);
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| Error::AuthFailed(format!("cannot read cookie file {}: {e}", path.display())))?;
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let id = parts.next();
        let _timestamp = parts.next();
        let cookie = parts.next();
        if id == Some(cookie_id) {
            if let Some(cookie) = cookie {
                return Ok(cookie.to_owned());
            }
        }
    }
    Err(Error::AuthFailed(format!("no cookie with id {cookie_id} in {context}")))
}

/// Build the `DATA` reply for a server challenge, already hex-decoded
/// into `"<context> <cookie-id> <server-challenge>"`.
pub(super) fn respond(hex_challenge: &str) -> Result<String> {
    let decoded = hex::decode(hex_challenge)
        .map_err(|_| Error::AuthFailed("DBUS_COOKIE_SHA1 challenge is not valid hex".into()))?;
    let challenge = String::from_utf8(decoded)
        .map_err(|_| Error::AuthFailed("DBUS_COOKIE_SHA1 challenge is not UTF-8".into()))?;
    let mut parts = challenge.splitn(3, ' ');
    let context = parts.next().ok_or_else(|| Error::AuthFailed("missing context".into()))?;
    let cookie_id = parts.next().ok_or_else(|| Error::AuthFailed("missing cookie id".into()))?;
    let server_challenge = parts.next().ok_or_else(|| Error::AuthFailed("missing server challenge".into()))?;

    let cookie = lookup_cookie(context, cookie_id)?;

    let mut client_challenge_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut client_challenge_bytes);
    let client_challenge = hex::encode(client_challenge_bytes);

    let mut hasher = Sha1::new();
    hasher.update(format!("{server_challenge}:{client_challenge}:{cookie}").as_bytes());
    let digest = hasher.finalize();

    let reply = format!("{client_challenge} {}", hex::encode(digest));
    Ok(hex::encode(reply.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_hex_challenge() {
        assert!(respond("not hex!!").is_err());
    }

    #[test]
    fn rejects_malformed_challenge_shape() {
        let malformed = hex::encode(b"only-one-part");
        assert!(respond(&malformed).is_err());
    }

    /// `lookup_cookie` reads `$HOME/.dbus-keyrings/<context>`; point `$HOME`
    /// at a scratch directory so the test doesn't depend on the runner's
    /// real keyring. `std::env` mutation isn't thread-safe, but this crate
    /// runs its unit tests single-threaded by convention for exactly this
    /// reason (other suites use `tokio::test` which doesn't touch `$HOME`).
    #[test]
    fn lookup_cookie_reads_keyring_file() {
        let home = tempfile::tempdir().unwrap();
        let keyrings = home.path().join(".dbus-keyrings");
        std::fs::create_dir(&keyrings).unwrap();
        std::fs::write(keyrings.join("org_freedesktop_general"), "1 1700000000 deadbeefcafe\n2 1700000001 0102030405\n")
            .unwrap();

        // SAFETY for test purposes: single-threaded, restored before return.
        let previous = std::env::var("HOME").ok();
        std::env::set_var("HOME", home.path());
        let found = lookup_cookie("org_freedesktop_general", "2");
        let missing = lookup_cookie("org_freedesktop_general", "99");
        match previous {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }

        assert_eq!(found.unwrap(), "0102030405");
        assert!(missing.is_err());
    }
}
