//! WebSocket transport. Each connection runs on its own thread with a
//! single-threaded tokio runtime and talks to the event loop only through
//! the engine's transport seam.

use std::thread;

use engine::{Connector, InboundSink, OutboundLink, TransportError, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

const EVENT_LOOP_GONE: &str = "event loop closed";
const SERVER_CLOSED: &str = "server closed the connection";
const CLIENT_CLOSED: &str = "closed by client";

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

pub(crate) struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub(crate) fn new(url: String) -> Self {
        Self { url }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&mut self, inbound: InboundSink) -> Result<Box<dyn OutboundLink>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = self.url.clone();
        let generation = inbound.generation();
        thread::Builder::new()
            .name(format!("ws-{generation}"))
            .spawn(move || run_connection(url, inbound, rx))
            .map_err(|err| TransportError::Start(err.to_string()))?;
        Ok(Box::new(ChannelLink { tx: Some(tx) }))
    }
}

struct ChannelLink {
    tx: Option<UnboundedSender<Outbound>>,
}

impl OutboundLink for ChannelLink {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Outbound::Close);
        }
    }
}

fn run_connection(url: String, inbound: InboundSink, outbound: UnboundedReceiver<Outbound>) {
    let generation = inbound.generation();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            inbound.deliver(TransportEvent::Closed {
                reason: format!("failed to start network runtime: {err}"),
            });
            return;
        }
    };

    let reason = runtime.block_on(pump(&url, outbound, |event| inbound.deliver(event)));
    info!(generation, reason = %reason, "websocket_closed");
    inbound.deliver(TransportEvent::Closed { reason });
}

/// Relays traffic until either side ends the connection. `deliver`
/// returning false means nobody is listening any more. Returns the reason
/// the connection ended.
async fn pump<F>(url: &str, mut outbound: UnboundedReceiver<Outbound>, mut deliver: F) -> String
where
    F: FnMut(TransportEvent) -> bool,
{
    let (stream, _response) = match connect_async(url).await {
        Ok(connected) => connected,
        Err(err) => {
            warn!(url, error = %err, "websocket_connect_failed");
            return format!("connect failed: {err}");
        }
    };
    info!(url, "websocket_connected");
    if !deliver(TransportEvent::Opened) {
        return EVENT_LOOP_GONE.to_string();
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !deliver(TransportEvent::Text(text)) {
                        return EVENT_LOOP_GONE.to_string();
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return frame
                        .map(|frame| frame.reason.to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| SERVER_CLOSED.to_string());
                }
                Some(Ok(other)) => debug!(kind = ?other, "websocket_frame_ignored"),
                Some(Err(err)) => return format!("websocket error: {err}"),
                None => return SERVER_CLOSED.to_string(),
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = write.send(Message::Text(text)).await {
                        return format!("send failed: {err}");
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return CLIENT_CLOSED.to_string();
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = accept_async(stream).await.expect("handshake");
            let (mut write, mut read) = ws.split();
            while let Some(Ok(msg)) = read.next().await {
                if msg.is_text() {
                    let _ = write.send(msg).await;
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn relays_outbound_text_and_delivers_replies() {
        let url = echo_server().await;
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Outbound::Text(r#"{"type":"upgrade","amount":1}"#.to_string()))
            .expect("queue");

        let mut events = Vec::new();
        let reason = pump(&url, rx, |event| {
            let keep_going = !matches!(event, TransportEvent::Text(_));
            events.push(event);
            keep_going
        })
        .await;

        assert_eq!(reason, EVENT_LOOP_GONE);
        assert_eq!(
            events,
            vec![
                TransportEvent::Opened,
                TransportEvent::Text(r#"{"type":"upgrade","amount":1}"#.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn close_request_ends_the_connection() {
        let url = echo_server().await;
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Outbound::Close).expect("queue");

        let reason = pump(&url, rx, |_| true).await;
        assert_eq!(reason, CLIENT_CLOSED);
    }

    #[tokio::test]
    async fn unreachable_server_reports_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let (_tx, rx) = mpsc::unbounded_channel();
        let mut opened = false;
        let reason = pump(&format!("ws://{addr}"), rx, |_| {
            opened = true;
            true
        })
        .await;
        assert!(reason.starts_with("connect failed"), "{reason}");
        assert!(!opened);
    }

    #[test]
    fn link_refuses_sends_after_close() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut link = ChannelLink { tx: Some(tx) };
        link.send("a".to_string()).expect("open link");
        link.close();

        assert!(matches!(link.send("b".to_string()), Err(TransportError::Closed)));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Text(text)) if text == "a"));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }
}
