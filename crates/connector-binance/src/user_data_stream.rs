//! One user data stream session over WebSocket.

use crate::user_data_parser::{parse_user_data_message, UserDataMessage};
use binance_rest::BinanceEnvironment;
use connector_core::{ConnectorError, EventSender};
use futures_util::{SinkExt, StreamExt};
use metrics::SharedMetrics;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Forward execution reports for `listen_key` until the socket ends or
/// shutdown is signalled.
///
/// Returns `Ok` only on shutdown. Any end of the socket, including the
/// venue expiring the key, is an error so the caller opens a new session.
pub(crate) async fn run_session(
    environment: BinanceEnvironment,
    listen_key: &str,
    sender: EventSender,
    mut shutdown: watch::Receiver<bool>,
    metrics: &SharedMetrics,
) -> Result<(), ConnectorError> {
    let url = format!("{}/ws/{}", environment.ws_base_url(), listen_key);

    let ws_stream = match tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(&url)).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => return Err(ConnectorError::WebSocket(e.to_string())),
        Err(_) => return Err(ConnectorError::WebSocket("connection timeout".into())),
    };
    info!(environment = %environment, "user data stream connected");

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write.close().await;
                    return Ok(());
                }
            }

            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match parse_user_data_message(&text) {
                    Ok(UserDataMessage::Execution(event)) => {
                        debug!(
                            client_order_id = %event.client_order_id,
                            status = %event.status,
                            "execution report"
                        );
                        sender
                            .send(event)
                            .await
                            .map_err(|_| ConnectorError::ChannelClosed)?;
                    }
                    Ok(UserDataMessage::ListenKeyExpired) => {
                        warn!("listen key expired");
                        return Err(ConnectorError::ConnectionClosed);
                    }
                    Ok(UserDataMessage::Other) => {}
                    Err(e) => {
                        metrics.inc_parse_errors();
                        warn!(error = %e, "unparseable user data message");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    write
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| ConnectorError::WebSocket(e.to_string()))?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "user data stream closed by server");
                    return Err(ConnectorError::ConnectionClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ConnectorError::WebSocket(e.to_string())),
                None => return Err(ConnectorError::ConnectionClosed),
            },
        }
    }
}
