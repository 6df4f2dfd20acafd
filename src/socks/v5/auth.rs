//! SOCKS5 method negotiation
//!
//! This server supports only the no-authentication method. A greeting that
//! does not offer it is answered with `0xFF` and the connection closes, per
//! protocol, without a request phase.

use crate::error::SocksError;
use crate::socks::consts::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Negotiate the authentication method.
///
/// The greeting's version byte has already been consumed by the dispatcher;
/// what remains is the method count and the method bytes.
pub async fn negotiate<S>(stream: &mut S) -> Result<(), SocksError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let num_methods = stream.read_u8().await?;

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SocksError::MalformedRequest("truncated method list".to_string())
        } else {
            SocksError::Io(e)
        }
    })?;

    if methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
            .await?;
        stream.flush().await?;
        Ok(())
    } else {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        Err(SocksError::NoAcceptableMethod)
    }
}
