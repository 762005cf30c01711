//! Async framing glue over the protocol codec.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sigma_proto::{
    Codec, DispatchEvent, ExecutionResult, FrameHeader, MessageType, ProtocolError,
    FRAME_HEADER_SIZE,
};

/// Reads one frame from the stream, returning its type and raw payload.
pub async fn read_message<R>(reader: &mut R) -> Result<(MessageType, Vec<u8>), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut header_bytes).await?;

    let header = FrameHeader::decode(&header_bytes)?;
    if !header.is_version_supported() {
        return Err(ProtocolError::UnsupportedVersion(header.version));
    }
    header.validate_payload_len()?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;

    Ok((header.message_type, payload))
}

/// Writes a dispatch event frame to the stream.
pub async fn write_dispatch<W>(writer: &mut W, event: &DispatchEvent) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut codec = Codec::new();
    let frame = codec.encode(event, MessageType::Dispatch)?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes an execution result frame to the stream.
pub async fn write_result<W>(writer: &mut W, result: &ExecutionResult) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let mut codec = Codec::new();
    let frame = codec.encode(result, MessageType::Result)?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Decodes a dispatch event payload.
pub fn decode_dispatch(payload: &[u8]) -> Result<DispatchEvent, ProtocolError> {
    Codec::decode(payload)
}

/// Decodes an execution result payload.
pub fn decode_result(payload: &[u8]) -> Result<ExecutionResult, ProtocolError> {
    Codec::decode(payload)
}
