//! Worker-side protocol client.
//!
//! Helpers for the process that runs *inside* a worker: building the auth
//! metadata from the launch configuration and serving the subscribe stream
//! by handing every dispatch event to a handler function.

use std::future::Future;
use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use sigma_launcher::LaunchConfig;
use sigma_proto::{
    metadata, DispatchEvent, ExecutionOutcome, ExecutionResult, MessageType, ProtocolError,
};

use crate::error::Result;
use crate::wire;

/// Builds the `node-urn`/`node-secret` metadata pair for handler calls.
#[must_use]
pub fn auth_metadata(config: &LaunchConfig) -> Vec<(String, String)> {
    vec![
        (metadata::NODE_URN.to_owned(), config.urn.to_string()),
        (metadata::NODE_SECRET.to_owned(), config.secret.clone()),
    ]
}

/// Serves a worker's side of the subscribe stream.
///
/// Reads dispatch events off the stream, runs `handler` for each and writes
/// the outcome back under the event's correlation id. Events are handled
/// one at a time. Returns cleanly when the handler side ends the stream.
pub async fn serve<S, F, Fut>(stream: S, mut handler: F) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(DispatchEvent) -> Fut,
    Fut: Future<Output = ExecutionOutcome>,
{
    let (mut read_half, mut write_half) = tokio::io::split(stream);

    loop {
        let (message_type, payload) = match wire::read_message(&mut read_half).await {
            Ok(frame) => frame,
            Err(ProtocolError::Io(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!("subscribe stream ended");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if message_type != MessageType::Dispatch {
            warn!(?message_type, "ignoring unexpected frame");
            continue;
        }

        let event = wire::decode_dispatch(&payload)?;
        let id = event.id;

        let outcome = handler(event).await;
        let result = ExecutionResult { id, outcome };

        wire::write_result(&mut write_half, &result).await?;
    }
}
