use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::types::ProgressEvent;

/// Writes events as NDJSON until the terminal event or until every sender is gone.
///
/// Returns the terminal event, if one arrived.
pub async fn write_ndjson<W>(
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    writer: &mut W,
) -> std::io::Result<Option<ProgressEvent>>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        let line = event.to_ndjson_line().map_err(std::io::Error::other)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        if event.is_terminal() {
            return Ok(Some(event));
        }
    }
    Ok(None)
}
