//! Length-prefixed JSON framing between the Runner and a bot-host child
//! process. Every frame is a 4-byte big-endian length followed by that many
//! bytes of JSON. The bot's own stdout/stderr text output is a separate
//! stream (relayed, not parsed); this protocol is carried over stdin/stdout
//! of a side channel the bot host opens for the purpose.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::board::State;
use crate::side::Side;
use crate::wire::Code;

/// Frames larger than this are refused; a well-behaved bot host never needs
/// more than a handful of kilobytes to describe a move or an error.
const MAX_FRAME_BYTES: u32 = 1 << 20;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error talking to bot host: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    TooLarge(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Init { side: Side, code: Code },
    Move { state: State },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotMessage {
    Ready,
    /// `col` is kept as a raw JSON value so a malformed response (wrong
    /// type, out-of-range integer) can still be reported as the offending
    /// move rather than discarded.
    Move { col: serde_json::Value },
    Error { msg: String },
}

pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> Result<(), ProtocolError> {
    let bytes = serde_json::to_vec(message)?;
    let len: u32 = bytes.len().try_into().map_err(|_| ProtocolError::TooLarge(u32::MAX))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R: AsyncRead + Unpin, T: for<'de> Deserialize<'de>>(
    reader: &mut R,
) -> Result<T, ProtocolError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(serde_json::from_slice(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_over_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let sent = HostMessage::Init {
            side: Side::Blue,
            code: Code { source: "fn main() {}".into(), cls_name: "Bot".into() },
        };
        write_frame(&mut client, &sent).await.unwrap();

        let received: HostMessage = read_frame(&mut server).await.unwrap();
        match received {
            HostMessage::Init { side, code } => {
                assert_eq!(side, Side::Blue);
                assert_eq!(code.cls_name, "Bot");
            }
            HostMessage::Move { .. } => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(8);
        let len: u32 = MAX_FRAME_BYTES + 1;
        client.write_all(&len.to_be_bytes()).await.unwrap();
        drop(client);

        let err = read_frame::<_, HostMessage>(&mut server).await.unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge(_)));
    }
}
