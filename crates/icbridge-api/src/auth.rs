// ── Login handshake ──
//
// Some controller firmware fronts the protocol port with a telnet-style
// login. Others start talking JSON immediately. The handshake answers
// prompts when they show up and otherwise gets out of the way, handing
// any bytes it consumed back to the frame assembler.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::Error;

const READ_CHUNK: usize = 4096;

const USERNAME_PROMPTS: &[&str] = &["login:", "username:"];
const PASSWORD_PROMPT: &str = "password:";
const FAILURE_MARKERS: &[&str] = &["incorrect", "failed", "denied"];

/// Opaque login credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitingPrompt,
    SentUsername,
    SentPassword,
}

/// Run the optional login exchange on a freshly connected stream.
///
/// Returns whatever protocol bytes were read past the handshake. Without
/// credentials this is a no-op. A silent peer is not an error: when
/// `timeout` passes without a prompt the session proceeds unauthenticated.
pub async fn login<S>(
    stream: &mut S,
    credentials: Option<&Credentials>,
    timeout: Duration,
) -> Result<Vec<u8>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(credentials) = credentials else {
        return Ok(Vec::new());
    };

    let deadline = Instant::now() + timeout;
    let mut stage = Stage::AwaitingPrompt;
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = match tokio::time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(result) => result?,
            Err(_) => {
                if stage == Stage::SentUsername {
                    return Err(Error::Timeout {
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        during: "waiting for password prompt",
                    });
                }
                tracing::debug!(?stage, "no further login prompt, continuing");
                return Ok(pending);
            }
        };
        if read == 0 {
            return Err(Error::Closed);
        }
        pending.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&pending).to_ascii_lowercase();

        if stage == Stage::AwaitingPrompt && text.trim_start().starts_with('{') {
            // Protocol traffic without any prompt.
            return Ok(pending);
        }

        if stage != Stage::AwaitingPrompt && FAILURE_MARKERS.iter().any(|m| text.contains(m)) {
            return Err(Error::Authentication {
                message: String::from_utf8_lossy(&pending).trim().to_owned(),
            });
        }

        match stage {
            Stage::AwaitingPrompt if USERNAME_PROMPTS.iter().any(|p| text.contains(p)) => {
                tracing::debug!("answering login prompt");
                write_line(stream, &credentials.username).await?;
                pending.clear();
                stage = Stage::SentUsername;
            }
            Stage::AwaitingPrompt | Stage::SentUsername if text.contains(PASSWORD_PROMPT) => {
                tracing::debug!("answering password prompt");
                write_line(stream, credentials.password.expose_secret()).await?;
                pending.clear();
                stage = Stage::SentPassword;
            }
            Stage::SentPassword if text.contains('\n') => {
                // First full line after the password: either a rejection
                // (handled above) or the start of protocol traffic.
                if text.trim_start().starts_with('{') {
                    return Ok(pending);
                }
                tracing::debug!("login accepted");
                return Ok(Vec::new());
            }
            _ => {}
        }
    }
}

async fn write_line<S>(stream: &mut S, value: &str) -> Result<(), Error>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(value.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    Ok(())
}
