/*
  Framing - length-prefixed frames on a byte stream

  Each frame is a 2-byte big-endian length followed by that many bytes.
  Noise messages are capped at 65535 bytes, so one frame always carries
  exactly one Noise message (handshake or transport ciphertext).

  A clean EOF at a frame boundary means the peer closed the connection.
  EOF in the middle of a frame is an I/O error.
*/

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::errors::TransportError;

/// Largest frame a single Noise message can occupy
pub const MAX_FRAME_SIZE: usize = 65535;

/// Write one frame
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if frame.len() > MAX_FRAME_SIZE {
        return Err(TransportError::MessageTooLarge {
            size: frame.len(),
            max_size: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(frame.len() as u16).to_be_bytes()).await?;
    writer.write_all(frame).await?;
    Ok(())
}

/// Read one frame into `buf`. Returns `false` on a clean close.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e.into()),
    }

    let len = u16::from_be_bytes(len_buf) as usize;
    buf.resize(len, 0);
    reader.read_exact(buf).await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);

        write_frame(&mut a, b"hello").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();

        let mut buf = Vec::new();
        assert!(read_frame(&mut b, &mut buf).await.unwrap());
        assert_eq!(buf, b"hello");
        assert!(read_frame(&mut b, &mut buf).await.unwrap());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_clean_close_detected() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);

        let mut buf = Vec::new();
        assert!(!read_frame(&mut b, &mut buf).await.unwrap());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&[0, 10, 1, 2, 3]).await.unwrap();
        drop(a);

        let mut buf = Vec::new();
        assert!(read_frame(&mut b, &mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, _b) = tokio::io::duplex(64);
        let frame = vec![0u8; MAX_FRAME_SIZE + 1];

        let result = write_frame(&mut a, &frame).await;
        assert!(matches!(result, Err(TransportError::MessageTooLarge { .. })));
    }
}
