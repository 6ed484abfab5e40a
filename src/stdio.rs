use crate::protocol::RpcResponse;
use crate::service::{McpService, SessionState};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Reads envelopes one line at a time and answers them in order. Returns
/// after `shutdown` has been answered or when input ends.
pub async fn serve<R, W>(mut reader: R, mut writer: W, service: &mut McpService) -> std::io::Result<SessionState>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            tracing::info!("Input closed");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(response) = service.handle_line(trimmed) {
            write_response(&mut writer, &response).await?;
        }

        if service.state() == SessionState::Terminated {
            break;
        }
    }

    Ok(service.state())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &RpcResponse) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await
}
