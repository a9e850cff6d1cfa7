//! Call controller actor.
//!
//! A single task owns the call machine, the form and the transcript. UI
//! commands, server events, playback notifications and the completion of the
//! handshake and termination tasks are all processed here, one at a time, in
//! delivery order. Observers read [`CallSnapshot`]s from a watch channel and
//! error notifications from a broadcast channel.

use std::sync::Arc;

use formcall_core::bridge::apply_tool_call;
use formcall_core::conversation::{ConversationEntry, ConversationLog};
use formcall_core::error::ErrorCode;
use formcall_core::fields::{FieldChanges, FormBuilder, FormField, FormSchema, SchemaEditError};
use formcall_core::protocol::{ClientCommand, ServerEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{ClientError, ErrorNotification};
use crate::machine::{Activity, CallMachine};
use crate::session::open_call;
use crate::speaker::{PlaybackEvent, Speaker};
use crate::termination::{TerminationPolicy, TerminationReason, await_quiescence};
use crate::transport::{Connection, Connector, Frame};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub url: String,
    pub initial_form: FormSchema,
    pub termination: TerminationPolicy,
}

impl ControllerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_form: FormSchema::default_form(),
            termination: TerminationPolicy::default(),
        }
    }
}

/// Everything a view needs to render the call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSnapshot {
    pub machine: CallMachine,
    pub form: FormSchema,
    pub form_locked: bool,
    pub conversation: ConversationLog,
}

impl CallSnapshot {
    pub fn status_message(&self) -> String {
        self.machine.status_message()
    }
}

type Reply<T> = oneshot::Sender<Result<T, SchemaEditError>>;

enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    Mute,
    Unmute,
    SendText(String),
    SpeechStart,
    SpeechEnd,
    Audio(Vec<u8>),
    AddField(Reply<FormField>),
    UpdateField(String, FieldChanges, Reply<bool>),
    SetFieldValue(String, String, Reply<bool>),
    DeleteField(String, Reply<bool>),
    Reorder(String, String, Reply<bool>),
    ResetForm(Reply<()>),
}

/// Completion of work the actor spawned. `generation` identifies the call
/// it belongs to; results for an older call are discarded.
enum Internal {
    Opened {
        generation: u64,
        result: Result<Connection, ClientError>,
    },
    Terminated {
        generation: u64,
        reason: TerminationReason,
    },
}

enum SessionInput {
    Frame(Option<Frame>),
    Playback(PlaybackEvent),
}

struct ActiveSession {
    connection: Connection,
    playback: Option<broadcast::Receiver<PlaybackEvent>>,
    termination: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn send_command(&self, command: &ClientCommand) {
        if !self.connection.send_text(command.to_json()) {
            tracing::debug!(?command, "transport gone; command not sent");
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if let Some(termination) = self.termination.take() {
            termination.abort();
        }
    }
}

/// Cheap, cloneable front end of a running [`CallController`].
#[derive(Clone)]
pub struct CallHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<CallSnapshot>,
    notifications: broadcast::Sender<ErrorNotification>,
}

impl CallHandle {
    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::ControllerGone)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        let result = rx.await.map_err(|_| ClientError::ControllerGone)?;
        Ok(result?)
    }

    /// Start a call. Ignored while one is starting or connected.
    pub fn start(&self) -> Result<(), ClientError> {
        self.send(Command::Start)
    }

    pub fn stop(&self) -> Result<(), ClientError> {
        self.send(Command::Stop)
    }

    pub fn pause(&self) -> Result<(), ClientError> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<(), ClientError> {
        self.send(Command::Resume)
    }

    pub fn mute(&self) -> Result<(), ClientError> {
        self.send(Command::Mute)
    }

    pub fn unmute(&self) -> Result<(), ClientError> {
        self.send(Command::Unmute)
    }

    /// Send a typed utterance in place of speech.
    pub fn send_text(&self, content: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::SendText(content.into()))
    }

    /// Voice activity began on the microphone.
    pub fn speech_start(&self) -> Result<(), ClientError> {
        self.send(Command::SpeechStart)
    }

    pub fn speech_end(&self) -> Result<(), ClientError> {
        self.send(Command::SpeechEnd)
    }

    /// Forward a captured microphone chunk. Dropped while paused or muted.
    pub fn send_audio(&self, chunk: Vec<u8>) -> Result<(), ClientError> {
        self.send(Command::Audio(chunk))
    }

    pub async fn add_field(&self) -> Result<FormField, ClientError> {
        self.request(Command::AddField).await
    }

    pub async fn update_field(
        &self,
        id: impl Into<String>,
        changes: FieldChanges,
    ) -> Result<bool, ClientError> {
        let id = id.into();
        self.request(|reply| Command::UpdateField(id, changes, reply))
            .await
    }

    pub async fn set_field_value(
        &self,
        id: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<bool, ClientError> {
        let (id, value) = (id.into(), value.into());
        self.request(|reply| Command::SetFieldValue(id, value, reply))
            .await
    }

    pub async fn delete_field(&self, id: impl Into<String>) -> Result<bool, ClientError> {
        let id = id.into();
        self.request(|reply| Command::DeleteField(id, reply)).await
    }

    pub async fn reorder(
        &self,
        dragged_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Result<bool, ClientError> {
        let (dragged, target) = (dragged_id.into(), target_id.into());
        self.request(|reply| Command::Reorder(dragged, target, reply))
            .await
    }

    pub async fn reset_form(&self) -> Result<(), ClientError> {
        self.request(Command::ResetForm).await
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshots.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<ErrorNotification> {
        self.notifications.subscribe()
    }
}

pub struct CallController {
    config: ControllerConfig,
    connector: Arc<dyn Connector>,
    speaker: Arc<dyn Speaker>,
    machine: CallMachine,
    form: FormBuilder,
    conversation: ConversationLog,
    session: Option<ActiveSession>,
    opening: Option<JoinHandle<()>>,
    generation: u64,
    internal: mpsc::UnboundedSender<Internal>,
    snapshots: watch::Sender<CallSnapshot>,
    published: SnapshotKey,
    notifications: broadcast::Sender<ErrorNotification>,
}

/// Cheap identity of a snapshot. The transcript only grows within a call
/// and is replaced when `generation` changes.
#[derive(Debug, Clone, PartialEq)]
struct SnapshotKey {
    machine: CallMachine,
    form_revision: u64,
    generation: u64,
    conversation_len: usize,
}

impl CallController {
    /// Spawn the controller task. It runs until every handle is dropped,
    /// ending any live call on the way out.
    pub fn spawn(
        config: ControllerConfig,
        connector: Arc<dyn Connector>,
        speaker: Arc<dyn Speaker>,
    ) -> CallHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(16);

        let form = FormBuilder::new(config.initial_form.clone());
        let machine = CallMachine::new();
        let conversation = ConversationLog::new();
        let (snapshots, snapshots_rx) = watch::channel(CallSnapshot {
            machine: machine.clone(),
            form: form.schema().clone(),
            form_locked: form.is_locked(),
            conversation: conversation.clone(),
        });

        let controller = Self {
            config,
            connector,
            speaker,
            machine,
            form,
            conversation,
            session: None,
            opening: None,
            generation: 0,
            internal: internal_tx,
            snapshots,
            published: SnapshotKey {
                machine: CallMachine::new(),
                form_revision: 0,
                generation: 0,
                conversation_len: 0,
            },
            notifications: notifications.clone(),
        };
        tokio::spawn(controller.run(commands, internal));

        CallHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
            notifications,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = internal.recv() => self.handle_internal(event),
                input = next_input(self.session.as_mut()) => self.handle_input(input),
            }
            self.publish();
        }

        self.stop();
        tracing::debug!("call controller finished");
    }

    fn snapshot_key(&self) -> SnapshotKey {
        SnapshotKey {
            machine: self.machine.clone(),
            form_revision: self.form.revision(),
            generation: self.generation,
            conversation_len: self.conversation.len(),
        }
    }

    fn publish(&mut self) {
        let key = self.snapshot_key();
        if key == self.published {
            return;
        }
        self.published = key;
        self.snapshots.send_replace(CallSnapshot {
            machine: self.machine.clone(),
            form: self.form.schema().clone(),
            form_locked: self.form.is_locked(),
            conversation: self.conversation.clone(),
        });
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Pause => {
                if self.machine.pause() {
                    self.send_to_server(&ClientCommand::Pause);
                }
            }
            Command::Resume => {
                if self.machine.resume() {
                    self.send_to_server(&ClientCommand::Resume);
                }
            }
            Command::Mute => {
                if self.machine.mute() {
                    self.send_to_server(&ClientCommand::Mute);
                }
            }
            Command::Unmute => {
                if self.machine.unmute() {
                    self.send_to_server(&ClientCommand::Unmute);
                }
            }
            Command::SendText(content) => {
                if self.machine.is_connected() {
                    self.send_to_server(&ClientCommand::Text { content });
                } else {
                    tracing::warn!("no connected call; dropping typed message");
                }
            }
            Command::SpeechStart => {
                if self.capturing() {
                    self.send_to_server(&ClientCommand::SpeechStart);
                }
            }
            Command::SpeechEnd => {
                if self.capturing() {
                    self.send_to_server(&ClientCommand::SpeechEnd);
                }
            }
            Command::Audio(chunk) => {
                if !self.capturing() {
                    return;
                }
                let sent = self
                    .session
                    .as_ref()
                    .is_some_and(|session| session.connection.send(Frame::Binary(chunk)));
                if !sent {
                    tracing::debug!("transport gone; audio not sent");
                }
            }
            Command::AddField(reply) => {
                let _ = reply.send(self.form.add_field());
            }
            Command::UpdateField(id, changes, reply) => {
                let _ = reply.send(self.form.update_field(&id, changes));
            }
            Command::SetFieldValue(id, value, reply) => {
                let _ = reply.send(self.form.set_field_value(&id, value));
            }
            Command::DeleteField(id, reply) => {
                let _ = reply.send(self.form.delete_field(&id));
            }
            Command::Reorder(dragged, target, reply) => {
                let _ = reply.send(self.form.reorder(&dragged, &target));
            }
            Command::ResetForm(reply) => {
                let _ = reply.send(self.form.reset_to_default());
            }
        }
    }

    fn start(&mut self) {
        if !self.machine.start() {
            tracing::debug!(phase = ?self.machine.phase(), "start ignored; call already live");
            return;
        }

        self.generation += 1;
        self.conversation = ConversationLog::new();

        let generation = self.generation;
        let connector = self.connector.clone();
        let url = self.config.url.clone();
        let schema = self.form.schema().clone();
        let internal = self.internal.clone();
        tracing::info!(fields = schema.len(), "starting call");

        self.opening = Some(tokio::spawn(async move {
            let result = open_call(connector.as_ref(), &url, &schema).await;
            let _ = internal.send(Internal::Opened { generation, result });
        }));
    }

    /// Tear down whatever the call holds. Safe to call in any state.
    fn release(&mut self) {
        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        if let Some(session) = self.session.take() {
            let _ = session.connection.send(Frame::Close(None));
            self.speaker.stop();
        }
        self.form.set_locked(false);
    }

    fn stop(&mut self) {
        let was_live = self.machine.stop();
        self.release();
        if was_live {
            tracing::info!("call stopped");
        }
    }

    fn fail(&mut self, err: ClientError) {
        let code = err.code();
        if !self.machine.fail(code) {
            tracing::debug!(error = %err, "error after call ended; ignoring");
            return;
        }
        tracing::warn!(error = %err, code = %code, "call failed");
        self.release();
        let _ = self.notifications.send(ErrorNotification::new(code));
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Opened { generation, result } => {
                if generation != self.generation || !self.machine.is_starting() {
                    tracing::debug!(generation, "discarding stale handshake result");
                    return;
                }
                self.opening = None;
                match result {
                    Ok(connection) => {
                        self.machine.ready();
                        self.form.set_locked(true);
                        self.session = Some(ActiveSession {
                            connection,
                            playback: Some(self.speaker.subscribe()),
                            termination: None,
                        });
                        tracing::info!("call connected");
                    }
                    Err(err) => self.fail(err),
                }
            }
            Internal::Terminated { generation, reason } => {
                if generation != self.generation || !self.machine.is_connected() {
                    return;
                }
                tracing::info!(?reason, "ending call after agent request");
                self.stop();
            }
        }
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Frame(Some(Frame::Text(text))) => {
                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => self.handle_event(event),
                    Err(err) => tracing::warn!(error = %err, "unreadable server event"),
                }
            }
            SessionInput::Frame(Some(Frame::Binary(chunk))) => self.speaker.enqueue(chunk),
            SessionInput::Frame(Some(Frame::Close(code))) => {
                match code.and_then(ErrorCode::from_close_code) {
                    None if code.is_some() => {
                        tracing::info!("server closed the call");
                        self.stop();
                    }
                    _ => self.fail(ClientError::Closed(code)),
                }
            }
            SessionInput::Frame(None) => {
                self.fail(ClientError::Transport("connection lost".into()));
            }
            SessionInput::Playback(PlaybackEvent::Started) => {
                self.machine.set_activity(Activity::AssistantSpeaking);
            }
            SessionInput::Playback(PlaybackEvent::Finished) => {
                self.machine.set_activity(Activity::Listening);
            }
        }
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Ready => tracing::debug!("duplicate ready event"),
            ServerEvent::Listening => {
                self.machine.set_activity(Activity::Listening);
            }
            ServerEvent::UserSpeaking => {
                self.machine.set_activity(Activity::UserSpeaking);
            }
            ServerEvent::Processing => {
                self.machine.set_activity(Activity::Processing);
            }
            ServerEvent::Message { role, content } => {
                self.conversation
                    .push(ConversationEntry::message(role, content));
            }
            ServerEvent::ToolCall {
                tool_name,
                parameters,
                output,
            } => {
                apply_tool_call(
                    &mut self.form,
                    &mut self.conversation,
                    &tool_name,
                    &parameters,
                    &output,
                );
            }
            ServerEvent::EndCall => self.schedule_termination(),
            ServerEvent::Error { code, message } => {
                self.fail(ClientError::Server { code, message });
            }
        }
    }

    fn schedule_termination(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.termination.is_some() {
            tracing::debug!("end of call already pending");
            return;
        }

        let generation = self.generation;
        let speaker = self.speaker.clone();
        let policy = self.config.termination;
        let internal = self.internal.clone();
        tracing::info!("agent ended the call; waiting for playback to finish");
        session.termination = Some(tokio::spawn(async move {
            let reason = await_quiescence(speaker.as_ref(), policy).await;
            let _ = internal.send(Internal::Terminated { generation, reason });
        }));
    }

    fn capturing(&self) -> bool {
        self.machine.is_connected() && !self.machine.is_paused() && !self.machine.is_mic_muted()
    }

    fn send_to_server(&self, command: &ClientCommand) {
        match &self.session {
            Some(session) => session.send_command(command),
            None => tracing::debug!(?command, "no session; command not sent"),
        }
    }
}

async fn next_input(session: Option<&mut ActiveSession>) -> SessionInput {
    let Some(session) = session else {
        return std::future::pending().await;
    };
    tokio::select! {
        frame = session.connection.incoming.recv() => SessionInput::Frame(frame),
        event = next_playback(&mut session.playback) => SessionInput::Playback(event),
    }
}

async fn next_playback(playback: &mut Option<broadcast::Receiver<PlaybackEvent>>) -> PlaybackEvent {
    loop {
        let Some(receiver) = playback.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(event) => return event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "missed playback notifications");
            }
            Err(RecvError::Closed) => *playback = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use formcall_core::conversation::Role;
    use formcall_core::error::ErrorCode;
    use serde_json::json;

    use super::*;
    use crate::machine::ConnectionPhase;
    use crate::speaker::NullSpeaker;
    use crate::test_support::{ChannelConnector, ManualSpeaker, ServerEnd};

    const URL: &str = "ws://localhost:8081/call";

    async fn wait_until(
        handle: &CallHandle,
        predicate: impl FnMut(&CallSnapshot) -> bool,
    ) -> CallSnapshot {
        let mut snapshots = handle.snapshots();
        let snapshot = tokio::time::timeout(Duration::from_secs(60), snapshots.wait_for(predicate))
            .await
            .expect("snapshot condition in time")
            .expect("controller alive")
            .clone();
        snapshot
    }

    fn spawn_with(speaker: Arc<dyn Speaker>) -> (CallHandle, mpsc::UnboundedReceiver<ServerEnd>) {
        let (connector, accepted) = ChannelConnector::new();
        let handle = CallController::spawn(ControllerConfig::new(URL), Arc::new(connector), speaker);
        (handle, accepted)
    }

    async fn connect(
        handle: &CallHandle,
        accepted: &mut mpsc::UnboundedReceiver<ServerEnd>,
    ) -> ServerEnd {
        handle.start().expect("start");
        let mut end = accepted.recv().await.expect("connection");
        end.expect_params().await;
        end.send_event(ServerEvent::Ready);
        wait_until(handle, |s| s.machine.is_connected()).await;
        end
    }

    #[tokio::test]
    async fn connected_call_locks_form_and_stop_unlocks() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        let mut end = connect(&handle, &mut accepted).await;

        let snapshot = handle.snapshot();
        assert!(snapshot.form_locked);
        assert!(matches!(
            handle.add_field().await,
            Err(ClientError::Form(SchemaEditError::Locked))
        ));

        handle.stop().expect("stop");
        let snapshot = wait_until(&handle, |s| s.machine.phase() == ConnectionPhase::Stopped).await;
        assert!(!snapshot.form_locked);
        assert_eq!(end.recv().await, Some(Frame::Close(None)));
        assert!(handle.add_field().await.is_ok());
    }

    #[tokio::test]
    async fn stop_silences_queued_assistant_audio() {
        let speaker = Arc::new(ManualSpeaker::new());
        let (handle, mut accepted) = spawn_with(speaker.clone());
        let end = connect(&handle, &mut accepted).await;

        assert!(end.connection.send(Frame::Binary(vec![1, 2, 3])));
        end.send_event(ServerEvent::Processing);
        wait_until(&handle, |s| s.machine.activity() == Activity::Processing).await;
        assert_eq!(speaker.queued(), 1);
        speaker.start_playing();
        wait_until(&handle, |s| s.machine.activity() == Activity::AssistantSpeaking).await;

        handle.stop().expect("stop");
        wait_until(&handle, |s| s.machine.phase() == ConnectionPhase::Stopped).await;
        assert_eq!(speaker.stop_count(), 1);
        assert!(!speaker.is_playing());
        assert_eq!(speaker.queued(), 0);
    }

    #[tokio::test]
    async fn lost_transport_silences_the_speaker_once() {
        let speaker = Arc::new(ManualSpeaker::new());
        let (handle, mut accepted) = spawn_with(speaker.clone());
        let end = connect(&handle, &mut accepted).await;
        speaker.start_playing();
        drop(end);

        wait_until(&handle, |s| s.machine.error().is_some()).await;
        assert_eq!(speaker.stop_count(), 1);
        assert!(!speaker.is_playing());

        handle.stop().expect("stop");
        wait_until(&handle, |s| s.machine.phase() == ConnectionPhase::Stopped).await;
        assert_eq!(speaker.stop_count(), 1);
    }

    #[tokio::test]
    async fn microphone_input_is_forwarded_while_connected() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        let mut end = connect(&handle, &mut accepted).await;

        handle.speech_start().expect("speech start");
        handle.send_audio(vec![7; 4]).expect("audio");
        handle.speech_end().expect("speech end");
        assert_eq!(
            end.recv().await,
            Some(Frame::Text(ClientCommand::SpeechStart.to_json()))
        );
        assert_eq!(end.recv().await, Some(Frame::Binary(vec![7; 4])));
        assert_eq!(
            end.recv().await,
            Some(Frame::Text(ClientCommand::SpeechEnd.to_json()))
        );

        end.send_event(ServerEvent::UserSpeaking);
        wait_until(&handle, |s| s.machine.activity() == Activity::UserSpeaking).await;
    }

    #[tokio::test]
    async fn muted_microphone_sends_nothing() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        let mut end = connect(&handle, &mut accepted).await;

        handle.mute().expect("mute");
        handle.speech_start().expect("speech start");
        handle.send_audio(vec![1]).expect("audio");
        handle.speech_end().expect("speech end");
        handle.unmute().expect("unmute");

        assert_eq!(
            end.recv().await,
            Some(Frame::Text(ClientCommand::Mute.to_json()))
        );
        assert_eq!(
            end.recv().await,
            Some(Frame::Text(ClientCommand::Unmute.to_json()))
        );
    }

    #[tokio::test]
    async fn repeated_start_opens_a_single_connection() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        handle.start().expect("start");
        handle.start().expect("start");

        let mut end = accepted.recv().await.expect("connection");
        end.expect_params().await;
        end.send_event(ServerEvent::Ready);
        wait_until(&handle, |s| s.machine.is_connected()).await;
        handle.start().expect("start");
        handle.pause().expect("pause");

        assert_eq!(
            end.recv().await,
            Some(Frame::Text(ClientCommand::Pause.to_json()))
        );
        assert!(accepted.try_recv().is_err());
    }

    #[tokio::test]
    async fn tool_calls_update_form_and_transcript() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        let end = connect(&handle, &mut accepted).await;

        end.send_event(ServerEvent::Message {
            role: Role::User,
            content: "I'm Ada".into(),
        });
        end.send_event(ServerEvent::ToolCall {
            tool_name: "updateFormField".into(),
            parameters: json!({"fieldName": "firstName", "value": "Ada"}),
            output: json!({}),
        });
        end.send_event(ServerEvent::ToolCall {
            tool_name: "updateFormField".into(),
            parameters: json!({"fieldName": "nickname", "value": "A"}),
            output: json!({}),
        });

        let snapshot = wait_until(&handle, |s| s.conversation.len() == 5).await;
        assert_eq!(
            snapshot.form.field_by_name("firstName").and_then(|f| f.value.as_deref()),
            Some("Ada")
        );
        assert!(snapshot.form.field_by_name("nickname").is_none());
        assert_eq!(snapshot.conversation.message_count(), 1);
    }

    #[tokio::test]
    async fn server_error_notifies_and_leaves_call_errored() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        let mut notifications = handle.notifications();
        let end = connect(&handle, &mut accepted).await;

        end.send_event(ServerEvent::Error {
            code: ErrorCode::InternalServer,
            message: "An internal error occurred".into(),
        });

        let snapshot = wait_until(&handle, |s| s.machine.error().is_some()).await;
        assert_eq!(snapshot.machine.error(), Some(ErrorCode::InternalServer));
        assert!(!snapshot.form_locked);

        let notification = notifications.recv().await.expect("notification");
        assert_eq!(notification.code, ErrorCode::InternalServer);
        assert_eq!(notification.display_for, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn lost_transport_errors_the_call() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        let end = connect(&handle, &mut accepted).await;
        drop(end);

        let snapshot = wait_until(&handle, |s| s.machine.error().is_some()).await;
        assert_eq!(snapshot.machine.error(), Some(ErrorCode::Connection));
    }

    #[tokio::test]
    async fn invalid_url_is_a_configuration_error() {
        let (connector, _accepted) = ChannelConnector::new();
        let handle = CallController::spawn(
            ControllerConfig::new("http://localhost/call"),
            Arc::new(connector),
            Arc::new(NullSpeaker::new()),
        );
        let mut notifications = handle.notifications();
        handle.start().expect("start");

        let notification = notifications.recv().await.expect("notification");
        assert_eq!(notification.code, ErrorCode::MissingUrl);
        assert!(notification.is_configuration());
    }

    #[tokio::test(start_paused = true)]
    async fn end_call_waits_for_playback_before_stopping() {
        let speaker = Arc::new(ManualSpeaker::new());
        let (handle, mut accepted) = spawn_with(speaker.clone());
        let end = connect(&handle, &mut accepted).await;

        speaker.start_playing();
        wait_until(&handle, |s| s.machine.activity() == Activity::AssistantSpeaking).await;
        end.send_event(ServerEvent::EndCall);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(handle.snapshot().machine.is_connected());

        speaker.finish_playing();
        wait_until(&handle, |s| s.machine.phase() == ConnectionPhase::Stopped).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_termination() {
        let (handle, mut accepted) = spawn_with(Arc::new(NullSpeaker::new()));
        let first = connect(&handle, &mut accepted).await;
        first.send_event(ServerEvent::EndCall);
        tokio::task::yield_now().await;

        handle.stop().expect("stop");
        wait_until(&handle, |s| s.machine.phase() == ConnectionPhase::Stopped).await;

        let _second = connect(&handle, &mut accepted).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(handle.snapshot().machine.is_connected());
    }
}
