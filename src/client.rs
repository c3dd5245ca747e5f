//! Relay WebSocket client and terminal chat loop.
//!
//! [`RelayClient`] speaks the relay protocol over `tokio-tungstenite`.
//! [`run_chat`] drives it from standard input: every line is pushed through a
//! [`TranscriptSegmenter`] as one spoken utterance, replies are printed, and a
//! dropped connection is re-established under a [`RestartPolicy`]. A new
//! connection starts a new conversation; history is not resumed.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::transcript::{
    RecognitionBatch, RestartDecision, RestartPolicy, RestartTracker, TranscriptEvent,
    TranscriptSegmenter,
};
use crate::handlers::relay::messages::{RelayIncomingMessage, RelayOutgoingMessage};

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat input that clears the conversation.
pub const RESET_COMMAND: &str = "/reset";

/// Chat input that ends the session.
pub const QUIT_COMMAND: &str = "/quit";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected relay client.
pub struct RelayClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

impl RelayClient {
    /// Connect to a relay endpoint such as `ws://localhost:3000/ws`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> ClientResult<Self> {
        let parsed = Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ClientError::InvalidUrl(format!(
                "{url}: scheme must be ws or wss"
            )));
        }

        let (ws_stream, response) = match timeout(connect_timeout, connect_async(url)).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => return Err(ClientError::ConnectionFailed(e.to_string())),
            Err(_) => return Err(ClientError::Timeout(connect_timeout)),
        };
        debug!("Connected to relay (status: {})", response.status());

        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Send one protocol event.
    pub async fn send(&mut self, message: &RelayIncomingMessage) -> ClientResult<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| ClientError::Protocol(format!("Failed to encode message: {e}")))?;
        self.write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }

    /// Send a transcript segment as `speech-text`.
    pub async fn send_transcript(&mut self, event: TranscriptEvent) -> ClientResult<()> {
        self.send(&event.into()).await
    }

    /// Ask the relay to clear the conversation.
    pub async fn reset(&mut self) -> ClientResult<()> {
        self.send(&RelayIncomingMessage::ResetConversation).await
    }

    /// Wait for the next server event. `Ok(None)` means the server closed.
    pub async fn next_event(&mut self) -> ClientResult<Option<RelayOutgoingMessage>> {
        while let Some(frame) = self.read.next().await {
            match frame.map_err(|e| ClientError::WebSocket(e.to_string()))? {
                Message::Text(text) => {
                    let event = serde_json::from_str(text.as_str()).map_err(|e| {
                        ClientError::Protocol(format!("Unrecognized server event: {e}"))
                    })?;
                    return Ok(Some(event));
                }
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Close the connection politely.
    pub async fn close(mut self) -> ClientResult<()> {
        self.write
            .send(Message::Close(None))
            .await
            .map_err(|e| ClientError::WebSocket(e.to_string()))
    }
}

/// Why a chat connection ended.
enum ChatExit {
    Quit,
    Disconnected,
}

/// Run the interactive terminal client until stdin ends or `/quit`.
pub async fn run_chat(
    url: &str,
    connect_timeout: Duration,
    policy: RestartPolicy,
) -> ClientResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tracker = RestartTracker::new(policy);

    loop {
        let mut client = match RelayClient::connect(url, connect_timeout).await {
            Ok(client) => client,
            Err(e @ ClientError::InvalidUrl(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Relay connection failed");
                match tracker.on_end() {
                    RestartDecision::Restart(delay) => {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    RestartDecision::GiveUp(reason) => {
                        return Err(ClientError::ConnectionFailed(reason));
                    }
                }
            }
        };

        info!(url = %url, "Connected to relay");
        println!("Connected to {url}. Type to talk, {RESET_COMMAND} to reset, {QUIT_COMMAND} to exit.");

        match chat_session(&mut client, &mut lines, &mut tracker).await? {
            ChatExit::Quit => {
                let _ = client.close().await;
                return Ok(());
            }
            ChatExit::Disconnected => match tracker.on_end() {
                RestartDecision::Restart(delay) => {
                    println!("Connection lost, reconnecting in {} ms", delay.as_millis());
                    tokio::time::sleep(delay).await;
                }
                RestartDecision::GiveUp(reason) => {
                    return Err(ClientError::ConnectionFailed(reason));
                }
            },
        }
    }
}

async fn chat_session<R>(
    client: &mut RelayClient,
    lines: &mut tokio::io::Lines<R>,
    tracker: &mut RestartTracker,
) -> ClientResult<ChatExit>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut segmenter = TranscriptSegmenter::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => return Ok(ChatExit::Quit),
                    Err(e) => return Err(ClientError::Protocol(format!("stdin: {e}"))),
                };

                let input = line.trim();
                if input == QUIT_COMMAND {
                    return Ok(ChatExit::Quit);
                }
                if input == RESET_COMMAND {
                    if client.reset().await.is_err() {
                        return Ok(ChatExit::Disconnected);
                    }
                    continue;
                }

                for event in utterance_events(&mut segmenter, input) {
                    if client.send_transcript(event).await.is_err() {
                        return Ok(ChatExit::Disconnected);
                    }
                }
            }
            event = client.next_event() => {
                match event {
                    Ok(Some(event)) => {
                        if matches!(event, RelayOutgoingMessage::AiResponse { .. }) {
                            tracker.on_success();
                        }
                        print_event(&event);
                    }
                    Ok(None) => return Ok(ChatExit::Disconnected),
                    Err(e) => {
                        warn!(error = %e, "Relay connection error");
                        return Ok(ChatExit::Disconnected);
                    }
                }
            }
        }
    }
}

/// Feed one typed line through the segmenter as a growing hypothesis followed
/// by its final result.
pub fn utterance_events(segmenter: &mut TranscriptSegmenter, line: &str) -> Vec<TranscriptEvent> {
    let mut events = Vec::new();
    let mut hypothesis = String::new();

    for word in line.split_whitespace() {
        if !hypothesis.is_empty() {
            hypothesis.push(' ');
        }
        hypothesis.push_str(word);
        events.extend(segmenter.ingest(&RecognitionBatch::interim(hypothesis.clone())));
    }
    events.extend(segmenter.ingest(&RecognitionBatch::finalized(line.trim())));

    events
}

fn print_event(event: &RelayOutgoingMessage) {
    match event {
        RelayOutgoingMessage::AiResponse { text, .. } => println!("assistant: {text}"),
        RelayOutgoingMessage::PartialTranscript { text } => debug!(caption = %text, "Partial echo"),
        RelayOutgoingMessage::ConversationReset => println!("(conversation cleared)"),
        RelayOutgoingMessage::Error { message } => eprintln!("error: {message}"),
    }
}
