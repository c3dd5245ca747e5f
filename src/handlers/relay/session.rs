//! Per-connection relay session.
//!
//! A [`Session`] is created when a client connects and dropped when it
//! disconnects. It owns nothing shared with other sessions: the conversation
//! history lives inside the session's worker task, which processes final
//! transcripts and resets strictly in arrival order. While one completion is
//! outstanding, later turns wait in a bounded queue; once it is full, further
//! events are refused with [`RelayError::Busy`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channel::SessionChannel;
use super::dispatcher::ResponseDispatcher;
use super::messages::{RelayIncomingMessage, RelayOutgoingMessage};
use crate::core::completion::CompletionGateway;
use crate::core::conversation::ConversationHistory;
use crate::errors::{RelayError, RelayResult};

/// Commands a session may have waiting behind the one being processed
pub const MAX_QUEUED_COMMANDS: usize = 16;

/// Work item for the session worker
#[derive(Debug)]
enum SessionCommand {
    UserTurn { text: String, turn: u64 },
    Reset,
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One client's conversation with the relay.
pub struct Session {
    channel: SessionChannel,
    commands: mpsc::Sender<SessionCommand>,
    in_flight: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    turns_accepted: u64,
    worker: JoinHandle<()>,
}

impl Session {
    /// Create the session and spawn its worker.
    pub fn start(gateway: CompletionGateway, channel: SessionChannel) -> Self {
        let (commands, command_rx) = mpsc::channel(MAX_QUEUED_COMMANDS);
        let in_flight = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = SessionWorker {
            history: ConversationHistory::new(),
            dispatcher: ResponseDispatcher::new(channel.clone()),
            channel: channel.clone(),
            gateway,
            in_flight: in_flight.clone(),
            pending: pending.clone(),
        };
        let worker = tokio::spawn(worker.run(command_rx));

        Self {
            channel,
            commands,
            in_flight,
            pending,
            turns_accepted: 0,
            worker,
        }
    }

    pub fn id(&self) -> &str {
        self.channel.session_id()
    }

    /// True while a completion call for this session is outstanding.
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Handle one inbound client event.
    ///
    /// # Errors
    /// - [`RelayError::InvalidInput`] for a blank final transcript
    /// - [`RelayError::Transport`] when a partial echo cannot be queued
    /// - [`RelayError::Busy`] when too many commands are already waiting
    /// - [`RelayError::Unexpected`] when the worker is no longer running
    pub async fn handle(&mut self, message: RelayIncomingMessage) -> RelayResult<()> {
        match message {
            RelayIncomingMessage::SpeechText {
                text,
                is_final: false,
            } => {
                if text.trim().is_empty() {
                    return Ok(());
                }
                self.channel
                    .send(RelayOutgoingMessage::PartialTranscript { text })
                    .await
            }
            RelayIncomingMessage::SpeechText {
                text,
                is_final: true,
            } => {
                if text.trim().is_empty() {
                    return Err(RelayError::InvalidInput(
                        "final transcript is empty".to_string(),
                    ));
                }

                let turn = self.turns_accepted + 1;
                let queued = self.pending.fetch_add(1, Ordering::AcqRel);
                debug!(session_id = %self.id(), turn, text = %text, "Final transcript");

                if let Err(e) = self.enqueue(SessionCommand::UserTurn { text, turn }) {
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                    return Err(e);
                }
                self.turns_accepted = turn;

                if self.is_processing() || queued > 0 {
                    info!(
                        session_id = %self.id(),
                        turn,
                        queued = queued + 1,
                        "Completion in flight, queueing turn"
                    );
                }
                Ok(())
            }
            RelayIncomingMessage::ResetConversation => {
                info!(session_id = %self.id(), "Reset requested");
                self.enqueue(SessionCommand::Reset)
            }
        }
    }

    fn enqueue(&self, command: SessionCommand) -> RelayResult<()> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => RelayError::Busy(format!(
                "session {} already has {MAX_QUEUED_COMMANDS} commands waiting",
                self.id()
            )),
            TrySendError::Closed(_) => {
                RelayError::Unexpected(format!("session {} worker is not running", self.id()))
            }
        })
    }

    /// Stop accepting events and wait for the worker to drain its queue.
    ///
    /// Queued turns are skipped once the channel is closed; a call already in
    /// flight runs to completion.
    pub async fn finish(self) {
        let Session {
            channel,
            commands,
            worker,
            ..
        } = self;
        drop(commands);
        if let Err(e) = worker.await {
            warn!(session_id = %channel.session_id(), error = %e, "Session worker ended abnormally");
        }
    }
}

/// Owns the conversation history; runs until the session is dropped and the
/// queue is drained.
struct SessionWorker {
    history: ConversationHistory,
    dispatcher: ResponseDispatcher,
    channel: SessionChannel,
    gateway: CompletionGateway,
    in_flight: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
}

impl SessionWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                SessionCommand::UserTurn { text, turn } => {
                    self.pending.fetch_sub(1, Ordering::AcqRel);

                    if self.channel.is_closed() {
                        debug!(
                            session_id = %self.channel.session_id(),
                            turn,
                            "Client gone, skipping queued turn"
                        );
                        continue;
                    }

                    if let Err(e) = self.process_turn(&text, turn).await {
                        warn!(
                            session_id = %self.channel.session_id(),
                            turn,
                            error = %e,
                            "Turn not delivered"
                        );
                    }
                }
                SessionCommand::Reset => {
                    self.history.reset();
                    if let Err(e) = self
                        .channel
                        .send(RelayOutgoingMessage::ConversationReset)
                        .await
                    {
                        warn!(
                            session_id = %self.channel.session_id(),
                            error = %e,
                            "Reset acknowledgement not delivered"
                        );
                    }
                }
            }
        }

        debug!(session_id = %self.channel.session_id(), "Session worker stopped");
    }

    async fn process_turn(&mut self, text: &str, turn: u64) -> RelayResult<()> {
        let _in_flight = InFlightGuard::engage(&self.in_flight);

        self.history.append_user(text)?;
        let prompt = self.history.build_prompt();

        let reply = self
            .gateway
            .invoke(&prompt, self.gateway.system_prompt())
            .await;

        self.history.append_assistant(&reply);
        info!(
            session_id = %self.channel.session_id(),
            turn,
            history_len = self.history.len(),
            "Turn completed"
        );

        self.dispatcher.dispatch(&reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::completion::{
        CompletionError, CompletionModel, CompletionRequest, CompletionResult, FALLBACK_RESPONSE,
    };
    use crate::handlers::relay::messages::RelayMessageRoute;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Replies with scripted results, then with "reply N".
    struct ScriptedModel {
        prompts: Mutex<Vec<String>>,
        script: Mutex<VecDeque<CompletionResult<String>>>,
        delay: Duration,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedModel {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                script: Mutex::new(VecDeque::new()),
                delay: Duration::ZERO,
                gate: None,
            }
        }

        fn with_script(script: Vec<CompletionResult<String>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::new()
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(&self, request: CompletionRequest) -> CompletionResult<String> {
            let call = {
                let mut prompts = self.prompts.lock();
                prompts.push(request.prompt.clone());
                prompts.len()
            };
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(format!("reply {call}")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn start(model: Arc<ScriptedModel>) -> (Session, mpsc::Receiver<RelayMessageRoute>) {
        let (tx, rx) = mpsc::channel(32);
        let gateway = CompletionGateway::new(model, "Be brief.", Duration::from_secs(5));
        let session = Session::start(gateway, SessionChannel::new("test-session", tx));
        (session, rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<RelayMessageRoute>) -> RelayOutgoingMessage {
        match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(RelayMessageRoute::Outgoing(message))) => message,
            other => panic!("expected outgoing event, got {other:?}"),
        }
    }

    fn final_text(text: &str) -> RelayIncomingMessage {
        RelayIncomingMessage::SpeechText {
            text: text.to_string(),
            is_final: true,
        }
    }

    fn reply_text(message: RelayOutgoingMessage) -> String {
        match message {
            RelayOutgoingMessage::AiResponse { text, .. } => text,
            other => panic!("expected ai-response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_final_transcript_produces_reply() {
        let model = Arc::new(ScriptedModel::new());
        let (mut session, mut rx) = start(model.clone());

        session.handle(final_text("hello")).await.unwrap();

        assert_eq!(reply_text(next_event(&mut rx).await), "reply 1");
        assert_eq!(model.prompts(), vec!["Human: hello".to_string()]);
    }

    #[tokio::test]
    async fn test_failure_dispatches_and_records_fallback() {
        let model = Arc::new(ScriptedModel::with_script(vec![Err(
            CompletionError::Network("connection reset".to_string()),
        )]));
        let (mut session, mut rx) = start(model.clone());

        session.handle(final_text("hello")).await.unwrap();
        assert_eq!(reply_text(next_event(&mut rx).await), FALLBACK_RESPONSE);

        session.handle(final_text("are you there")).await.unwrap();
        assert_eq!(reply_text(next_event(&mut rx).await), "reply 2");

        let prompts = model.prompts();
        assert_eq!(
            prompts[1],
            format!("Human: hello\n\nAssistant: {FALLBACK_RESPONSE}\n\nHuman: are you there")
        );
    }

    #[tokio::test]
    async fn test_rapid_finals_are_processed_in_order() {
        let model = Arc::new(ScriptedModel {
            delay: Duration::from_millis(50),
            ..ScriptedModel::new()
        });
        let (mut session, mut rx) = start(model.clone());

        session.handle(final_text("first")).await.unwrap();
        session.handle(final_text("second")).await.unwrap();

        assert_eq!(reply_text(next_event(&mut rx).await), "reply 1");
        assert_eq!(reply_text(next_event(&mut rx).await), "reply 2");

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], "Human: first");
        assert_eq!(
            prompts[1],
            "Human: first\n\nAssistant: reply 1\n\nHuman: second"
        );
    }

    #[tokio::test]
    async fn test_reset_waits_for_earlier_turns() {
        let model = Arc::new(ScriptedModel {
            delay: Duration::from_millis(30),
            ..ScriptedModel::new()
        });
        let (mut session, mut rx) = start(model.clone());

        session.handle(final_text("remember this")).await.unwrap();
        session
            .handle(RelayIncomingMessage::ResetConversation)
            .await
            .unwrap();
        session.handle(final_text("fresh start")).await.unwrap();

        assert_eq!(reply_text(next_event(&mut rx).await), "reply 1");
        assert_eq!(
            next_event(&mut rx).await,
            RelayOutgoingMessage::ConversationReset
        );
        assert_eq!(reply_text(next_event(&mut rx).await), "reply 2");

        assert_eq!(model.prompts()[1], "Human: fresh start");
    }

    #[tokio::test]
    async fn test_reset_on_empty_conversation_is_acknowledged() {
        let model = Arc::new(ScriptedModel::new());
        let (mut session, mut rx) = start(model.clone());

        session
            .handle(RelayIncomingMessage::ResetConversation)
            .await
            .unwrap();
        session
            .handle(RelayIncomingMessage::ResetConversation)
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            RelayOutgoingMessage::ConversationReset
        );
        assert_eq!(
            next_event(&mut rx).await,
            RelayOutgoingMessage::ConversationReset
        );
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_blank_final_is_rejected_without_side_effects() {
        let model = Arc::new(ScriptedModel::new());
        let (mut session, mut rx) = start(model.clone());

        let err = session.handle(final_text("   \t")).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
        assert!(err.client_message().is_none());

        session
            .handle(RelayIncomingMessage::ResetConversation)
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            RelayOutgoingMessage::ConversationReset
        );
        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_partial_is_echoed_not_recorded() {
        let model = Arc::new(ScriptedModel::new());
        let (mut session, mut rx) = start(model.clone());

        session
            .handle(RelayIncomingMessage::SpeechText {
                text: "hel".to_string(),
                is_final: false,
            })
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            RelayOutgoingMessage::PartialTranscript {
                text: "hel".to_string()
            }
        );

        session.handle(final_text("hello")).await.unwrap();
        next_event(&mut rx).await;
        assert_eq!(model.prompts(), vec!["Human: hello".to_string()]);
    }

    #[tokio::test]
    async fn test_in_flight_flag_tracks_completion() {
        let gate = Arc::new(Notify::new());
        let model = Arc::new(ScriptedModel {
            gate: Some(gate.clone()),
            ..ScriptedModel::new()
        });
        let (mut session, mut rx) = start(model.clone());
        assert!(!session.is_processing());

        session.handle(final_text("hello")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !session.is_processing() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        gate.notify_one();
        next_event(&mut rx).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            while session.is_processing() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_rejects_as_busy() {
        let gate = Arc::new(Notify::new());
        let model = Arc::new(ScriptedModel {
            gate: Some(gate.clone()),
            ..ScriptedModel::new()
        });
        let (mut session, mut rx) = start(model.clone());

        session.handle(final_text("first")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !session.is_processing() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        for i in 0..MAX_QUEUED_COMMANDS {
            session.handle(final_text(&format!("waiting {i}"))).await.unwrap();
        }

        let err = session.handle(final_text("one too many")).await.unwrap_err();
        assert!(matches!(err, RelayError::Busy(_)));
        assert!(err.client_message().is_some());
        let err = session
            .handle(RelayIncomingMessage::ResetConversation)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Busy(_)));

        // The rejected turn never reaches the model; the queued ones do.
        gate.notify_one();
        assert_eq!(reply_text(next_event(&mut rx).await), "reply 1");
        gate.notify_one();
        assert_eq!(reply_text(next_event(&mut rx).await), "reply 2");
        assert_eq!(
            model.prompts()[1],
            "Human: first\n\nAssistant: reply 1\n\nHuman: waiting 0"
        );
        assert!(!model.prompts().iter().any(|p| p.contains("one too many")));
    }

    #[tokio::test]
    async fn test_queued_turns_skipped_after_disconnect() {
        let model = Arc::new(ScriptedModel::new());
        let (mut session, rx) = start(model.clone());
        drop(rx);

        session.handle(final_text("anyone?")).await.unwrap();
        session.finish().await;

        assert!(model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_call_completes_after_disconnect() {
        let gate = Arc::new(Notify::new());
        let model = Arc::new(ScriptedModel {
            gate: Some(gate.clone()),
            ..ScriptedModel::new()
        });
        let (mut session, rx) = start(model.clone());

        session.handle(final_text("hello")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !session.is_processing() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // Client disconnects while the call is outstanding.
        drop(rx);
        gate.notify_one();
        session.finish().await;

        assert_eq!(model.prompts().len(), 1);
    }
}
