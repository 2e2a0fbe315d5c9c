use std::collections::HashMap;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use super::{run_blocking, DeviceEndpoint, TransportError};

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// SSH command client with an optional per-device session cache
pub struct SshClient {
    timeout: Duration,
    sessions: Mutex<HashMap<String, ssh2::Session>>,
}

impl SshClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &str) -> Option<ssh2::Session> {
        self.sessions.lock().ok()?.get(key).cloned()
    }

    fn forget(&self, key: &str) -> bool {
        match self.sessions.lock() {
            Ok(mut sessions) => sessions.remove(key).is_some(),
            Err(_) => false,
        }
    }

    /// Open a session and keep it for subsequent exec calls
    pub async fn open(&self, endpoint: &DeviceEndpoint) -> Result<(), TransportError> {
        let ep = endpoint.clone();
        let timeout = self.timeout;
        let session = run_blocking(self.timeout, move || ssh_connect(&ep, timeout)).await?;
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(endpoint.key(), session);
        }
        Ok(())
    }

    pub fn close(&self, endpoint: &DeviceEndpoint) -> bool {
        let Some(session) = self.cached(&endpoint.key()) else {
            return false;
        };
        let _ = session.disconnect(None, "closing", None);
        self.forget(&endpoint.key())
    }

    /// Run a command, reusing a cached session when one is open.
    /// A cached session that fails is replaced by a fresh one and the command
    /// is retried once.
    pub async fn exec(&self, endpoint: &DeviceEndpoint, command: &str) -> Result<String, TransportError> {
        let key = endpoint.key();
        let cached = self.cached(&key);
        let reused = cached.is_some();
        let ep = endpoint.clone();
        let command = command.to_string();
        let timeout = self.timeout;

        let attempt = run_blocking(self.timeout, move || {
            Ok(run_with_reconnect(
                cached,
                || ssh_connect(&ep, timeout),
                |session| ssh_exec_on_session(session, &command),
            ))
        })
        .await;

        match attempt {
            Ok((output, fresh)) => {
                if reused {
                    match (&output, fresh) {
                        (Ok(_), Some(session)) => {
                            if let Ok(mut sessions) = self.sessions.lock() {
                                sessions.insert(key, session);
                            }
                        }
                        (Err(_), _) => {
                            self.forget(&key);
                        }
                        _ => {}
                    }
                }
                output
            }
            Err(e) => {
                if reused {
                    self.forget(&key);
                }
                Err(e)
            }
        }
    }
}

/// Run `command` on the cached session if there is one, reconnecting once when
/// it fails. Without a cached session a one-shot session is used. Returns the
/// output and the replacement session, if one was opened for a failed cache.
fn run_with_reconnect<S>(
    cached: Option<S>,
    connect: impl Fn() -> Result<S, TransportError>,
    run: impl Fn(&S) -> Result<String, TransportError>,
) -> (Result<String, TransportError>, Option<S>) {
    let Some(session) = cached else {
        return (connect().and_then(|session| run(&session)), None);
    };

    match run(&session) {
        Ok(output) => (Ok(output), None),
        Err(e) => {
            tracing::debug!("Cached SSH session failed ({}), reconnecting", e);
            match connect() {
                Ok(fresh) => {
                    let output = run(&fresh);
                    (output, Some(fresh))
                }
                Err(e) => (Err(e), None),
            }
        }
    }
}

/// Create an SSH session and authenticate with password + keyboard-interactive.
/// This is blocking, so call from a spawn_blocking context.
fn ssh_connect(endpoint: &DeviceEndpoint, timeout: Duration) -> Result<ssh2::Session, TransportError> {
    let addr = (endpoint.host.as_str(), endpoint.ssh_port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Connect(format!("Invalid address {}: {}", endpoint.host, e)))?
        .next()
        .ok_or_else(|| TransportError::Connect(format!("No address for {}", endpoint.host)))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| TransportError::Connect(format!("TCP connection to {} failed: {}", addr, e)))?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session = ssh2::Session::new()
        .map_err(|e| TransportError::Connect(format!("Failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    session
        .handshake()
        .map_err(|e| TransportError::Connect(format!("SSH handshake failed: {}", e)))?;

    // Try password auth first
    match session.userauth_password(&endpoint.username, &endpoint.password) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // Many OLT CLIs only offer keyboard-interactive
    let mut prompter = PasswordPrompt {
        password: endpoint.password.clone(),
    };
    let _ = session.userauth_keyboard_interactive(&endpoint.username, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        Err(TransportError::Auth(format!(
            "all methods exhausted for {}@{}",
            endpoint.username, endpoint.host
        )))
    }
}

/// Execute a command on an existing session and collect its output
fn ssh_exec_on_session(session: &ssh2::Session, command: &str) -> Result<String, TransportError> {
    let mut channel = session
        .channel_session()
        .map_err(|e| TransportError::Command(format!("Failed to open channel: {}", e)))?;

    channel
        .exec(command)
        .map_err(|e| TransportError::Command(format!("Failed to execute command: {}", e)))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| TransportError::Command(format!("Failed to read output: {}", e)))?;

    let _ = channel.wait_close();
    if let Ok(status) = channel.exit_status() {
        if status != 0 && output.trim().is_empty() {
            return Err(TransportError::Command(format!("'{}' exited with status {}", command, status)));
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SnmpVersion;

    fn endpoint(host: &str, port: u16) -> DeviceEndpoint {
        DeviceEndpoint {
            host: host.to_string(),
            ssh_port: port,
            username: "admin".to_string(),
            password: "secret".to_string(),
            snmp_port: 161,
            snmp_community: "public".to_string(),
            snmp_version: SnmpVersion::V2c,
        }
    }

    #[tokio::test]
    async fn test_exec_connection_refused_is_connect_error() {
        // Bind then drop to obtain a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = SshClient::new(Duration::from_secs(2));
        let err = client.exec(&endpoint("127.0.0.1", port), "show version").await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "got {:?}", err);
    }

    /// Stand-in for a libssh2 session: `alive` decides whether commands succeed
    struct FakeSession {
        alive: bool,
    }

    fn run_on(session: &FakeSession) -> Result<String, TransportError> {
        if session.alive {
            Ok("ok".to_string())
        } else {
            Err(TransportError::Command("Failed to open channel: socket closed".to_string()))
        }
    }

    #[test]
    fn test_dropped_cached_session_is_replaced_and_retried_once() {
        let connects = std::cell::Cell::new(0);
        let (output, fresh) = run_with_reconnect(
            Some(FakeSession { alive: false }),
            || {
                connects.set(connects.get() + 1);
                Ok(FakeSession { alive: true })
            },
            run_on,
        );
        assert_eq!(output.unwrap(), "ok");
        assert_eq!(connects.get(), 1);
        assert!(fresh.unwrap().alive);
    }

    #[test]
    fn test_reconnect_failure_is_reported() {
        let connects = std::cell::Cell::new(0);
        let (output, fresh) = run_with_reconnect(
            Some(FakeSession { alive: false }),
            || {
                connects.set(connects.get() + 1);
                Err::<FakeSession, _>(TransportError::Connect("refused".to_string()))
            },
            run_on,
        );
        assert!(matches!(output, Err(TransportError::Connect(_))));
        assert_eq!(connects.get(), 1);
        assert!(fresh.is_none());
    }

    #[test]
    fn test_live_cached_session_is_not_reconnected() {
        let (output, fresh) = run_with_reconnect(
            Some(FakeSession { alive: true }),
            || panic!("must not reconnect"),
            run_on,
        );
        assert_eq!(output.unwrap(), "ok");
        assert!(fresh.is_none());
    }

    #[test]
    fn test_one_shot_session_without_cache() {
        let (output, fresh) = run_with_reconnect(None, || Ok(FakeSession { alive: false }), run_on);
        assert!(matches!(output, Err(TransportError::Command(_))));
        assert!(fresh.is_none());
    }

    #[test]
    fn test_close_without_session() {
        let client = SshClient::new(Duration::from_secs(1));
        assert!(!client.close(&endpoint("10.0.0.1", 22)));
    }
}
