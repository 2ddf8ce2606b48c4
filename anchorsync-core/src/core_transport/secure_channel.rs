/*
  SecureChannel

  Upgrades a raw byte stream into an authenticated, encrypted message
  channel using Noise XX, then exchanges a hello carrying the service name
  and the sender's PeerInfo.

  Workflow:
  1. Run the XX handshake (-> e, <- e ee s es, -> s se), one frame per message.
  2. Switch to stateless transport mode so the read and write halves can
     each keep their own nonce counter and live in separate tasks.
  3. Both sides send a Hello and read the remote one. A different service
     name or protocol version closes the connection.

  Message layout on the wire (after the handshake):

      [frame: enc(u64 BE total length)]
      [frame: enc(chunk 1)] ... [frame: enc(chunk n)]

  Chunks hold at most MAX_CHUNK_PLAINTEXT bytes. The receiver returns a
  message only after every chunk arrived, so a connection dropped
  mid-transfer never yields a partial message.
*/

use std::sync::Arc;

use bincode::Options;
use serde::{Deserialize, Serialize};
use snow::params::NoiseParams;
use snow::{Builder, StatelessTransportState};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use super::errors::TransportError;
use super::framing::{read_frame, write_frame, MAX_FRAME_SIZE};
use super::peer::PeerInfo;
use crate::core_codec::wire_options;

/// Noise protocol pattern used for every connection
pub const NOISE_PARAMS: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

/// Protocol version carried in the hello
pub const PROTOCOL_VERSION: u8 = 1;

const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 8;
const MAX_HELLO_SIZE: usize = 4096;
const MAX_PREALLOCATION: usize = 1024 * 1024;

/// Largest plaintext carried by one transport frame
pub const MAX_CHUNK_PLAINTEXT: usize = MAX_FRAME_SIZE - TAG_LEN;

fn noise_params() -> Result<NoiseParams, TransportError> {
    Ok(NOISE_PARAMS.parse()?)
}

/// Long-lived static Noise key of the local node
pub struct StaticKeypair {
    private: Vec<u8>,
    public: Vec<u8>,
}

impl StaticKeypair {
    pub fn generate() -> Result<Self, TransportError> {
        let keypair = Builder::new(noise_params()?).generate_keypair()?;
        Ok(StaticKeypair {
            private: keypair.private,
            public: keypair.public,
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }
}

impl std::fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeypair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Which side of the handshake we play
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Run the Noise XX handshake on `stream`
pub async fn handshake<S>(
    stream: &mut S,
    role: Role,
    keys: &StaticKeypair,
) -> Result<StatelessTransportState, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let builder = Builder::new(noise_params()?).local_private_key(&keys.private);
    let mut state = match role {
        Role::Initiator => builder.build_initiator()?,
        Role::Responder => builder.build_responder()?,
    };

    let mut frame = Vec::with_capacity(MAX_FRAME_SIZE);
    let mut out = vec![0u8; MAX_FRAME_SIZE];
    let mut scratch = vec![0u8; MAX_FRAME_SIZE];

    while !state.is_handshake_finished() {
        if state.is_my_turn() {
            let len = state.write_message(&[], &mut out)?;
            write_frame(stream, &out[..len]).await?;
            stream.flush().await?;
        } else {
            if !read_frame(stream, &mut frame).await? {
                return Err(TransportError::ConnectionClosed);
            }
            state
                .read_message(&frame, &mut scratch)
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
        }
    }

    Ok(state.into_stateless_transport_mode()?)
}

/// Write half of an established channel
pub struct SecureWriter<W> {
    inner: W,
    cipher: Arc<StatelessTransportState>,
    nonce: u64,
    scratch: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    pub fn new(inner: W, cipher: Arc<StatelessTransportState>) -> Self {
        SecureWriter {
            inner,
            cipher,
            nonce: 0,
            scratch: vec![0u8; MAX_FRAME_SIZE],
        }
    }

    /// Encrypt and send one application message of any size
    pub async fn send(&mut self, message: &[u8]) -> Result<(), TransportError> {
        self.send_chunk(&(message.len() as u64).to_be_bytes()).await?;
        for chunk in message.chunks(MAX_CHUNK_PLAINTEXT) {
            self.send_chunk(chunk).await?;
        }
        self.inner.flush().await?;
        Ok(())
    }

    async fn send_chunk(&mut self, plaintext: &[u8]) -> Result<(), TransportError> {
        let len = self.cipher.write_message(self.nonce, plaintext, &mut self.scratch)?;
        self.nonce += 1;
        write_frame(&mut self.inner, &self.scratch[..len]).await
    }

    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Read half of an established channel
pub struct SecureReader<R> {
    inner: R,
    cipher: Arc<StatelessTransportState>,
    nonce: u64,
    max_message_size: usize,
    frame: Vec<u8>,
    plain: Vec<u8>,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    pub fn new(inner: R, cipher: Arc<StatelessTransportState>, max_message_size: usize) -> Self {
        SecureReader {
            inner,
            cipher,
            nonce: 0,
            max_message_size,
            frame: Vec::with_capacity(MAX_FRAME_SIZE),
            plain: vec![0u8; MAX_FRAME_SIZE],
        }
    }

    /// Receive one complete application message. `None` on a clean close.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let header_len = match self.recv_chunk().await? {
            Some(len) => len,
            None => return Ok(None),
        };
        if header_len != HEADER_LEN {
            return Err(TransportError::Protocol(format!(
                "message header of {} bytes",
                header_len
            )));
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&self.plain[..HEADER_LEN]);
        let total = u64::from_be_bytes(header);
        if total > self.max_message_size as u64 {
            return Err(TransportError::MessageTooLarge {
                size: usize::try_from(total).unwrap_or(usize::MAX),
                max_size: self.max_message_size,
            });
        }

        let total = total as usize;
        let mut message = Vec::with_capacity(total.min(MAX_PREALLOCATION));
        while message.len() < total {
            let len = self.recv_chunk().await?.ok_or(TransportError::ConnectionClosed)?;
            if len == 0 || message.len() + len > total {
                return Err(TransportError::Protocol(format!(
                    "chunk of {} bytes at offset {} of {}",
                    len,
                    message.len(),
                    total
                )));
            }
            message.extend_from_slice(&self.plain[..len]);
        }

        Ok(Some(message))
    }

    async fn recv_chunk(&mut self) -> Result<Option<usize>, TransportError> {
        if !read_frame(&mut self.inner, &mut self.frame).await? {
            return Ok(None);
        }
        let len = self.cipher.read_message(self.nonce, &self.frame, &mut self.plain)?;
        self.nonce += 1;
        Ok(Some(len))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    service: String,
    protocol_version: u8,
    peer: PeerInfo,
}

/// Channel after handshake and hello, ready to be split across tasks
pub struct EstablishedChannel<S> {
    pub remote: PeerInfo,
    pub reader: SecureReader<ReadHalf<S>>,
    pub writer: SecureWriter<WriteHalf<S>>,
}

/// Handshake, then exchange hellos and check the remote service name
pub async fn establish<S>(
    mut stream: S,
    role: Role,
    keys: &StaticKeypair,
    local: &PeerInfo,
    service: &str,
    max_message_size: usize,
) -> Result<EstablishedChannel<S>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cipher = Arc::new(handshake(&mut stream, role, keys).await?);
    let (read_half, write_half) = tokio::io::split(stream);
    let mut writer = SecureWriter::new(write_half, cipher.clone());
    let mut reader = SecureReader::new(read_half, cipher, max_message_size);

    let hello = Hello {
        service: service.to_string(),
        protocol_version: PROTOCOL_VERSION,
        peer: local.clone(),
    };
    let bytes = wire_options(MAX_HELLO_SIZE)
        .serialize(&hello)
        .map_err(|e| TransportError::Handshake(e.to_string()))?;
    writer.send(&bytes).await?;

    let reply = reader.recv().await?.ok_or(TransportError::ConnectionClosed)?;
    let remote: Hello = wire_options(MAX_HELLO_SIZE)
        .deserialize(&reply)
        .map_err(|e| TransportError::Handshake(format!("invalid hello: {}", e)))?;

    if remote.service != service {
        return Err(TransportError::ServiceMismatch {
            expected: service.to_string(),
            actual: remote.service,
        });
    }
    if remote.protocol_version != PROTOCOL_VERSION {
        return Err(TransportError::Handshake(format!(
            "unsupported protocol version {}",
            remote.protocol_version
        )));
    }
    if remote.peer.id == local.id {
        return Err(TransportError::Handshake("connected to self".to_string()));
    }

    Ok(EstablishedChannel {
        remote: remote.peer,
        reader,
        writer,
    })
}
