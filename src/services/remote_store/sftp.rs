use super::{RemoteSession, RemoteStore, RemoteStoreError};
use crate::config::RemoteTarget;
use async_trait::async_trait;
use russh::Disconnect;
use russh::client::{self, Handle};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// SFTP remote store using password authentication.
///
/// Each call to [`RemoteStore::connect`] opens a fresh SSH connection; sessions
/// are never pooled.
pub struct SftpStore {
    target: RemoteTarget,
    inactivity_timeout: Duration,
}

impl SftpStore {
    pub fn new(target: RemoteTarget, inactivity_timeout: Duration) -> Self {
        Self {
            target,
            inactivity_timeout,
        }
    }

    fn connection_error(&self, reason: impl ToString) -> RemoteStoreError {
        RemoteStoreError::Connection {
            endpoint: self.target.endpoint(),
            reason: reason.to_string(),
        }
    }
}

/// Compares a pinned fingerprint with the server's SHA-256 key fingerprint.
/// Accepts the pinned value with or without the `SHA256:` prefix and base64
/// padding, as printed by `ssh-keygen -lf`.
fn fingerprint_matches(pinned: &str, actual: &str) -> bool {
    fn normalize(fingerprint: &str) -> &str {
        let fingerprint = fingerprint.trim();
        fingerprint
            .strip_prefix("SHA256:")
            .unwrap_or(fingerprint)
            .trim_end_matches('=')
    }
    !normalize(pinned).is_empty() && normalize(pinned) == normalize(actual)
}

struct HostKeyCheck {
    expected_fingerprint: Option<String>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.expected_fingerprint {
            Some(expected) => {
                let actual = server_public_key.fingerprint();
                let matches = fingerprint_matches(expected, &actual);
                if !matches {
                    tracing::error!("Host key mismatch: expected {}, got {}", expected, actual);
                }
                Ok(matches)
            }
            None => Ok(true),
        }
    }
}

#[async_trait]
impl RemoteStore for SftpStore {
    fn target(&self) -> &RemoteTarget {
        &self.target
    }

    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteStoreError> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.inactivity_timeout),
            ..Default::default()
        });
        let handler = HostKeyCheck {
            expected_fingerprint: self.target.host_key_fingerprint.clone(),
        };

        let mut handle = client::connect(
            config,
            (self.target.host.as_str(), self.target.port),
            handler,
        )
        .await
        .map_err(|e| self.connection_error(e))?;

        let authenticated = handle
            .authenticate_password(&self.target.username, &self.target.password)
            .await
            .map_err(|e| self.connection_error(e))?;
        if !authenticated {
            return Err(self.connection_error(format!(
                "authentication rejected for user {}",
                self.target.username
            )));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| self.connection_error(e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| self.connection_error(e))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| self.connection_error(e))?;

        tracing::debug!("Opened SFTP session to {}", self.target.endpoint());

        Ok(Box::new(SftpConnection {
            handle,
            sftp,
            endpoint: self.target.endpoint(),
        }))
    }
}

struct SftpConnection {
    handle: Handle<HostKeyCheck>,
    sftp: SftpSession,
    endpoint: String,
}

fn transfer_error(remote_path: &str, reason: impl ToString) -> RemoteStoreError {
    RemoteStoreError::Transfer {
        remote_path: remote_path.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl RemoteSession for SftpConnection {
    async fn transfer(&mut self, local: &Path, remote_path: &str) -> Result<u64, RemoteStoreError> {
        let mut local_file = tokio::fs::File::open(local)
            .await
            .map_err(|e| transfer_error(remote_path, format!("local read: {}", e)))?;

        let mut remote_file = self
            .sftp
            .create(remote_path)
            .await
            .map_err(|e| transfer_error(remote_path, e))?;

        let bytes = tokio::io::copy(&mut local_file, &mut remote_file)
            .await
            .map_err(|e| transfer_error(remote_path, e))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| transfer_error(remote_path, e))?;

        Ok(bytes)
    }

    async fn remove(&mut self, remote_path: &str) -> Result<(), RemoteStoreError> {
        self.sftp
            .remove_file(remote_path)
            .await
            .map_err(|e| transfer_error(remote_path, e))
    }

    async fn close(self: Box<Self>) -> Result<(), RemoteStoreError> {
        let SftpConnection {
            handle,
            sftp,
            endpoint,
        } = *self;
        drop(sftp);

        handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| RemoteStoreError::Connection {
                endpoint,
                reason: format!("disconnect: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINGERPRINT: &str = "uNiVztksCsDhcc0u9e8BujQXVUpKZIDTMczCvj3tD2s";

    fn target(port: u16) -> RemoteTarget {
        RemoteTarget {
            name: "primary".to_string(),
            host: "127.0.0.1".to_string(),
            port,
            username: "foo".to_string(),
            password: "pass".to_string(),
            base_path: "/upload".to_string(),
            host_key_fingerprint: None,
        }
    }

    #[test]
    fn test_fingerprint_prefix_and_padding_are_optional() {
        assert!(fingerprint_matches(FINGERPRINT, FINGERPRINT));
        assert!(fingerprint_matches(&format!("SHA256:{}", FINGERPRINT), FINGERPRINT));
        assert!(fingerprint_matches(&format!(" SHA256:{}=\n", FINGERPRINT), FINGERPRINT));
    }

    #[test]
    fn test_fingerprint_mismatch_is_rejected() {
        assert!(!fingerprint_matches(
            "SHA256:47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU",
            FINGERPRINT
        ));
        assert!(!fingerprint_matches(&FINGERPRINT[1..], FINGERPRINT));
        assert!(!fingerprint_matches("", FINGERPRINT));
        assert!(!fingerprint_matches("SHA256:", ""));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_connection_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let store = SftpStore::new(target(port), Duration::from_secs(5));

        match store.connect().await {
            Err(RemoteStoreError::Connection { endpoint, .. }) => {
                assert_eq!(endpoint, format!("127.0.0.1:{}", port));
            }
            Err(other) => panic!("expected connection error, got {}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }

    #[tokio::test]
    async fn test_connect_to_non_ssh_peer_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });
        let store = SftpStore::new(target(port), Duration::from_secs(5));

        let result = tokio::time::timeout(Duration::from_secs(10), store.connect())
            .await
            .unwrap();
        assert!(matches!(result, Err(RemoteStoreError::Connection { .. })));
    }
}
