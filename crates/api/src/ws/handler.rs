use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use meetflow_aligner::ScriptAligner;
use meetflow_transcription::vad::{self, VadBuffer};
use meetflow_transcription::{PolishRequest, VadConfig};

use crate::error::SessionError;
use crate::state::AppState;
use crate::ws::messages::{ClientMessage, ConfigUpdate, ServerEvent, SessionMode};
use crate::ws::recorder::WavRecorder;

/// Sender half of the socket, shared with detached polish tasks.
pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Interval between server keepalive pings. Defeats intermediary
/// idle-close timeouts, which are commonly 30-60 s.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
/// Wall-clock throttle between partial transcriptions.
const PARTIAL_INTERVAL: Duration = Duration::from_secs(2);
/// Minimum buffered audio before a partial is attempted.
const PARTIAL_MIN_SECS: f64 = 1.0;
/// Deadline for a partial ASR call.
const PARTIAL_ASR_DEADLINE: Duration = Duration::from_secs(10);
/// Deadline for a final ASR call.
const FINAL_ASR_DEADLINE: Duration = Duration::from_secs(20);
/// Confident-match threshold handed to the aligner.
const ALIGN_THRESHOLD: f64 = 0.4;

const SAMPLE_RATE: usize = 16000;

/// Guard that aborts a spawned task when dropped.
///
/// Dropping a `JoinHandle` detaches the task; the heartbeat must die with
/// the session, so abort explicitly.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!(%connection_id, "Transcription client connected");

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    let _heartbeat = AbortOnDrop(spawn_heartbeat(sender.clone(), connection_id.clone()));

    let mut session = Session::new(state, sender, connection_id.clone());

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => session.on_text(&text).await,
            Ok(Message::Binary(bytes)) => session.on_audio(&bytes).await,
            Ok(Message::Ping(data)) => {
                let mut guard = session.sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                debug!(%connection_id, reason = %SessionError::ClientDisconnect, "Closing session");
                break;
            }
            Err(e) => {
                debug!(%connection_id, error = %e, "WebSocket receive failed, closing session");
                break;
            }
            _ => {}
        }
    }

    session.finalize().await;
    info!(%connection_id, "Transcription client disconnected");
}

/// Per-connection session state. Owned exclusively by the receive loop;
/// detached polish tasks get owned copies of what they need.
struct Session {
    state: AppState,
    sender: WsSender,
    connection_id: String,

    source_lang: String,
    target_lang: String,
    initial_prompt: String,
    mode: SessionMode,
    meeting_id: Option<String>,
    overlap_secs: f64,

    segment_id: String,
    previous_context: String,
    last_partial_at: Instant,
    first_audio_at: Option<Instant>,

    vad: VadBuffer,
    recorder: Option<WavRecorder>,
    /// Previous flushed window, kept for the optional overlap prepend.
    last_window: Vec<f32>,
    aligner: Option<ScriptAligner>,
}

impl Session {
    fn new(state: AppState, sender: WsSender, connection_id: String) -> Self {
        let vad = build_vad(&state);
        Self {
            state,
            sender,
            connection_id,
            source_lang: "zh".to_string(),
            target_lang: "en".to_string(),
            initial_prompt: String::new(),
            mode: SessionMode::Transcription,
            meeting_id: None,
            overlap_secs: 0.0,
            segment_id: Uuid::new_v4().to_string(),
            previous_context: String::new(),
            last_partial_at: Instant::now(),
            first_audio_at: None,
            vad,
            recorder: None,
            last_window: Vec::new(),
            aligner: None,
        }
    }

    async fn on_text(&mut self, text: &str) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %SessionError::BadConfig(e.to_string()),
                    "Ignoring unparseable text frame"
                );
                return;
            }
        };

        match message {
            ClientMessage::Config(update) => self.apply_config(update),
            ClientMessage::Ping => {
                self.send(ServerEvent::Pong).await;
            }
            ClientMessage::Pong => {}
            ClientMessage::AdvanceSpeaker => {
                if let Some(aligner) = self.aligner.as_mut() {
                    aligner.advance_speaker();
                }
            }
            ClientMessage::PreviousSpeaker => {
                if let Some(aligner) = self.aligner.as_mut() {
                    aligner.previous_speaker();
                }
            }
        }
    }

    fn apply_config(&mut self, update: ConfigUpdate) {
        if let Some(v) = update.source_lang {
            self.source_lang = v;
        }
        if let Some(v) = update.target_lang {
            self.target_lang = v;
        }
        if let Some(v) = update.initial_prompt {
            self.initial_prompt = v;
        }
        if let Some(v) = update.meeting_id {
            self.meeting_id = Some(v);
        }
        if let Some(v) = update.overlap_duration {
            self.overlap_secs = v.max(0.0);
        }
        if let Some(mode) = update.mode {
            self.mode = mode;
            if mode == SessionMode::Alignment {
                self.load_script();
            }
        }

        info!(
            connection_id = %self.connection_id,
            source = %self.source_lang,
            target = %self.target_lang,
            mode = ?self.mode,
            meeting_id = ?self.meeting_id,
            overlap_secs = self.overlap_secs,
            prompt_len = self.initial_prompt.len(),
            "Session config updated"
        );
    }

    /// Alignment mode reads the script out of the initial prompt. An empty
    /// parse degrades alignment to a no-op instead of failing the session.
    fn load_script(&mut self) {
        let aligner = ScriptAligner::from_text(&self.initial_prompt);
        if aligner.is_empty() {
            warn!(
                connection_id = %self.connection_id,
                error = %SessionError::ScriptParseEmpty,
                "Alignment mode will emit raw transcripts only"
            );
        }
        self.aligner = Some(aligner);
    }

    async fn on_audio(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if bytes.len() % 2 != 0 {
            warn!(
                connection_id = %self.connection_id,
                len = bytes.len(),
                "Dropping audio frame with odd byte length (PCM16 protocol violation)"
            );
            self.send(ServerEvent::Error {
                id: self.segment_id.clone(),
                content: "Malformed audio frame: odd byte length.".to_string(),
            })
            .await;
            return;
        }

        if self.first_audio_at.is_none() {
            self.first_audio_at = Some(Instant::now());
            self.open_recorder();
        }

        if let Some(recorder) = self.recorder.as_mut()
            && let Err(e) = recorder.write_bytes(bytes)
        {
            warn!(connection_id = %self.connection_id, error = %e, "Recording write failed; disabling sink");
            self.recorder = None;
        }

        // Force early chunks to speech so the utterance head is not clipped
        // while the client's audio path warms up.
        let clip_guard = self.state.settings.vad.clip_guard_secs;
        let force_speech = self
            .first_audio_at
            .is_some_and(|t| t.elapsed().as_secs_f64() < clip_guard);

        match self.vad.process_chunk(bytes, force_speech) {
            Some(window) => self.on_window_closed(window).await,
            None => self.maybe_partial().await,
        }
    }

    fn open_recorder(&mut self) {
        let filename = format!(
            "{}-{}.wav",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            self.connection_id
        );
        let path = std::path::Path::new(&self.state.settings.audio.save_dir).join(filename);
        match WavRecorder::create(&path) {
            Ok(recorder) => {
                info!(connection_id = %self.connection_id, path = %path.display(), "Recording opened");
                self.recorder = Some(recorder);
            }
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "Recording unavailable for this session");
            }
        }
    }

    /// Best-effort transcript of the in-flight buffer, throttled to one
    /// ASR call every two seconds and at least one second of audio.
    async fn maybe_partial(&mut self) {
        if self.last_partial_at.elapsed() < PARTIAL_INTERVAL {
            return;
        }
        let Some(snapshot) = self.vad.snapshot() else {
            return;
        };
        if (snapshot.len() as f64) <= 2.0 * SAMPLE_RATE as f64 * PARTIAL_MIN_SECS {
            return;
        }

        let samples = vad::pcm16le_to_f32(&snapshot);
        let prompt = self.combined_prompt();
        let text = match tokio::time::timeout(
            PARTIAL_ASR_DEADLINE,
            self.state
                .asr
                .transcribe(samples, &self.source_lang, &prompt, false),
        )
        .await
        {
            Ok(text) => text,
            Err(_) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %SessionError::AsrTimeout,
                    "Partial transcription dropped"
                );
                String::new()
            }
        };

        if text.trim().chars().count() > 1 {
            self.send(ServerEvent::Partial {
                id: self.segment_id.clone(),
                content: text,
            })
            .await;
        }
        self.last_partial_at = Instant::now();
    }

    /// Finalises one VAD window: overlap prepend, deadline-bounded ASR,
    /// raw event, then the alignment or polish branch.
    async fn on_window_closed(&mut self, window: Vec<u8>) {
        let current = vad::pcm16le_to_f32(&window);

        let mut audio = Vec::with_capacity(current.len());
        if self.overlap_secs > 0.0 && !self.last_window.is_empty() {
            let overlap_samples =
                ((self.overlap_secs * SAMPLE_RATE as f64) as usize).min(self.last_window.len());
            audio.extend_from_slice(&self.last_window[self.last_window.len() - overlap_samples..]);
        }
        audio.extend_from_slice(&current);
        self.last_window = current;

        debug!(
            connection_id = %self.connection_id,
            secs = audio.len() as f64 / SAMPLE_RATE as f64,
            "Transcribing closed window"
        );

        let prompt = self.combined_prompt();
        let skip_filter = self.mode == SessionMode::Alignment;
        let text = match tokio::time::timeout(
            FINAL_ASR_DEADLINE,
            self.state
                .asr
                .transcribe(audio, &self.source_lang, &prompt, skip_filter),
        )
        .await
        {
            Ok(text) => text,
            Err(_) => {
                warn!(
                    connection_id = %self.connection_id,
                    segment_id = %self.segment_id,
                    error = %SessionError::AsrTimeout,
                    "Final transcription dropped"
                );
                String::new()
            }
        };

        if text.is_empty() {
            // Clear any partial the client is still showing for this id.
            self.send(ServerEvent::Raw {
                id: self.segment_id.clone(),
                content: String::new(),
            })
            .await;
            self.rotate_segment();
            return;
        }

        info!(
            connection_id = %self.connection_id,
            segment_id = %self.segment_id,
            text = %text,
            "Segment finalised"
        );
        self.send(ServerEvent::Raw {
            id: self.segment_id.clone(),
            content: text.clone(),
        })
        .await;

        match self.mode {
            SessionMode::Alignment => self.emit_aligned(&text).await,
            SessionMode::Transcription => self.spawn_polish(text.clone()),
        }

        self.previous_context = text;
        self.rotate_segment();
    }

    /// Matched script lines for one finalised transcript. Nothing is sent
    /// when the aligner has no (usable) script or finds no new line.
    async fn emit_aligned(&mut self, text: &str) {
        let Some(aligner) = self.aligner.as_mut() else {
            debug!(connection_id = %self.connection_id, "Alignment mode without a loaded script");
            return;
        };
        let Some(lines) = aligner.match_transcript(text, ALIGN_THRESHOLD, true) else {
            debug!(
                connection_id = %self.connection_id,
                segment_id = %self.segment_id,
                "No script line matched"
            );
            return;
        };

        for (k, line) in lines.iter().enumerate() {
            let id = if k == 0 {
                self.segment_id.clone()
            } else {
                format!("{}-{}", self.segment_id, k)
            };
            self.send(ServerEvent::Polished {
                id,
                content: line.source.clone(),
                translated: line.target.clone(),
                low_confidence: Some(line.low_confidence),
                speaker: line.speaker.clone(),
            })
            .await;
        }
    }

    /// Detaches the polish call so ingest continues immediately. The task
    /// owns copies of everything it needs; a task outliving the socket
    /// logs and discards its result.
    fn spawn_polish(&self, text: String) {
        let request = PolishRequest {
            text,
            previous_context: self.previous_context.clone(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        };
        let polish = Arc::clone(&self.state.polish);
        let sender = Arc::clone(&self.sender);
        let segment_id = self.segment_id.clone();
        let connection_id = self.connection_id.clone();

        tokio::spawn(async move {
            match polish.polish(request).await {
                Ok(result) => {
                    let delivered = send_event(
                        &sender,
                        &ServerEvent::Polished {
                            id: segment_id.clone(),
                            content: result.refined,
                            translated: result.translated,
                            low_confidence: None,
                            speaker: None,
                        },
                    )
                    .await;
                    if !delivered {
                        debug!(%connection_id, %segment_id, "Polished result discarded; socket closed");
                    }
                }
                Err(e) => {
                    warn!(
                        %connection_id,
                        %segment_id,
                        error = %SessionError::PolishFailed(e.to_string()),
                        "Polish task failed"
                    );
                    let _ = send_event(
                        &sender,
                        &ServerEvent::Error {
                            id: segment_id,
                            content: "Polishing failed.".to_string(),
                        },
                    )
                    .await;
                }
            }
        });
    }

    fn combined_prompt(&self) -> String {
        format!("{} {}", self.initial_prompt, self.previous_context)
            .trim()
            .to_string()
    }

    fn rotate_segment(&mut self) {
        self.segment_id = Uuid::new_v4().to_string();
        self.last_partial_at = Instant::now();
    }

    async fn send(&self, event: ServerEvent) {
        if !send_event(&self.sender, &event).await {
            debug!(connection_id = %self.connection_id, "Event send failed");
        }
    }

    /// Drains the session at close: finalises the WAV sink and hands the
    /// recording to the audio store when a meeting is attached. Storage
    /// failures fall back to the local path and never fail the session.
    async fn finalize(&mut self) {
        let Some(recorder) = self.recorder.take() else {
            return;
        };
        let path = match recorder.finalize() {
            Ok(path) => path,
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "Failed to close recording");
                return;
            }
        };
        info!(connection_id = %self.connection_id, path = %path.display(), "Recording closed");

        if let Some(meeting_id) = &self.meeting_id {
            match self.state.audio_store.store(&path, meeting_id).await {
                Ok(uri) => {
                    info!(
                        connection_id = %self.connection_id,
                        %meeting_id,
                        %uri,
                        store = self.state.audio_store.name(),
                        "Meeting audio stored"
                    );
                }
                Err(e) => {
                    warn!(
                        connection_id = %self.connection_id,
                        %meeting_id,
                        error = %SessionError::StorageUnavailable(e.to_string()),
                        fallback = %path.display(),
                        "Meeting keeps the local recording path"
                    );
                }
            }
        }
    }
}

fn build_vad(state: &AppState) -> VadBuffer {
    let settings = &state.settings.vad;
    let config = VadConfig {
        sample_rate: SAMPLE_RATE as u32,
        silence_threshold: settings.silence_threshold,
        min_silence_secs: settings.min_silence_secs,
        min_speech_secs: settings.min_speech_secs,
        max_window_secs: settings.max_window_secs,
    };

    #[cfg(feature = "silero-vad")]
    if let Some(model_path) = &settings.model_path {
        match meetflow_transcription::vad::SileroScorer::new(model_path) {
            Ok(scorer) => return VadBuffer::with_scorer(config, Some(Box::new(scorer))),
            Err(e) => {
                warn!(error = %e, "Neural VAD unavailable, using energy fallback");
            }
        }
    }

    VadBuffer::new(config)
}

async fn send_event(sender: &WsSender, event: &ServerEvent) -> bool {
    let text = serde_json::to_string(event).unwrap_or_default();
    let mut guard = sender.lock().await;
    guard.send(Message::text(text)).await.is_ok()
}

fn spawn_heartbeat(sender: WsSender, connection_id: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        // The first tick completes immediately; the client just connected.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !send_event(&sender, &ServerEvent::Ping).await {
                debug!(%connection_id, "Heartbeat send failed, stopping");
                break;
            }
        }
    })
}
