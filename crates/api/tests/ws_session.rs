//! End-to-end WebSocket session tests against a real server on an
//! ephemeral port, with stub ASR and polish backends.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use meetflow_api::state::AppState;
use meetflow_api::storage::LocalAudioStore;
use meetflow_api::build_router;
use meetflow_config::Settings;
use meetflow_transcription::asr::stub::StubAsrBackend;
use meetflow_transcription::polish::PolishBackend;
use meetflow_transcription::polish::stub::StubPolishBackend;
use meetflow_transcription::{AsrClient, CorrectionMap, HallucinationFilter};

const RATE: usize = 16000;
const EVENT_DEADLINE: Duration = Duration::from_secs(10);

struct TestServer {
    url: String,
    /// Keeps the recordings dir alive for the duration of the test.
    _recordings: tempfile::TempDir,
}

async fn spawn_server(asr: StubAsrBackend, polish: impl PolishBackend) -> TestServer {
    let recordings = tempfile::tempdir().expect("tempdir");

    let mut settings = Settings::default();
    settings.audio.save_dir = recordings.path().to_string_lossy().into_owned();
    // Tests feed audio far faster than real time; the wall-clock clip guard
    // would otherwise force every chunk to speech.
    settings.vad.clip_guard_secs = 0.0;

    let asr_client = AsrClient::new(
        Arc::new(asr),
        Arc::new(CorrectionMap::empty()),
        Arc::new(HallucinationFilter::default()),
    );
    let state = AppState::new(settings, asr_client, Arc::new(polish), Arc::new(LocalAudioStore));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.expect("serve");
    });

    TestServer {
        url: format!("ws://{}/ws/transcribe", addr),
        _recordings: recordings,
    }
}

/// 250 ms of PCM16: a sine burst for speech, zeros for silence.
fn chunk(amplitude: f32) -> Vec<u8> {
    let samples = RATE / 4;
    let mut bytes = Vec::with_capacity(samples * 2);
    for n in 0..samples {
        let v = if amplitude == 0.0 {
            0.0
        } else {
            amplitude * std::f32::consts::SQRT_2
                * (2.0 * std::f32::consts::PI * 440.0 * n as f32 / RATE as f32).sin()
        };
        bytes.extend_from_slice(&((v * 32767.0) as i16).to_le_bytes());
    }
    bytes
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn send_utterance(socket: &mut WsStream) {
    for _ in 0..12 {
        socket
            .send(Message::binary(chunk(0.1)))
            .await
            .expect("send speech chunk");
    }
    for _ in 0..4 {
        socket
            .send(Message::binary(chunk(0.0)))
            .await
            .expect("send silence chunk");
    }
}

/// Next JSON event, skipping server keepalive pings.
async fn next_event(socket: &mut WsStream) -> Value {
    loop {
        let frame = tokio::time::timeout(EVENT_DEADLINE, socket.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("websocket error");
        let Message::Text(text) = frame else { continue };
        let event: Value = serde_json::from_str(&text).expect("event is JSON");
        if event["type"] == "ping" {
            continue;
        }
        return event;
    }
}

#[tokio::test]
async fn final_pipeline_orders_raw_before_polished_with_one_id() {
    let server = spawn_server(
        StubAsrBackend::fixed("你好"),
        StubPolishBackend::fixed("你好", "Hello"),
    )
    .await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.expect("connect");

    socket
        .send(Message::text(
            json!({
                "type": "config",
                "source_lang": "zh",
                "target_lang": "en",
                "mode": "transcription",
            })
            .to_string(),
        ))
        .await
        .expect("send config");

    send_utterance(&mut socket).await;

    let mut partial_ids: Vec<String> = Vec::new();
    let mut raw: Option<Value> = None;
    let polished = loop {
        let event = next_event(&mut socket).await;
        match event["type"].as_str().expect("typed event") {
            "partial" => {
                assert!(raw.is_none(), "partial arrived after raw for the same window");
                partial_ids.push(event["id"].as_str().expect("partial id").to_string());
            }
            "raw" => {
                assert!(raw.is_none(), "expected a single raw event");
                raw = Some(event);
            }
            "polished" => break event,
            other => panic!("unexpected event type {other}"),
        }
    };

    let raw = raw.expect("raw must precede polished");
    assert_eq!(raw["content"], "你好");

    let raw_id = raw["id"].as_str().expect("raw id");
    assert_eq!(polished["id"].as_str().expect("polished id"), raw_id);
    assert_eq!(polished["content"], "你好");
    assert_eq!(polished["translated"], "Hello");

    for partial_id in &partial_ids {
        assert_eq!(partial_id, raw_id, "partials must share the raw's segment id");
    }
}

#[tokio::test]
async fn alignment_mode_surfaces_the_matching_script_line() {
    let script = "[1] 今天天氣很好 ||| The weather is nice today\n\
                  [2] 我們開始會議 ||| Let's start the meeting";
    let server = spawn_server(
        StubAsrBackend::fixed("今天天氣很好"),
        // Polish must not be consulted in alignment mode.
        StubPolishBackend::failing(),
    )
    .await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.expect("connect");

    socket
        .send(Message::text(
            json!({
                "type": "config",
                "source_lang": "zh",
                "target_lang": "en",
                "mode": "alignment",
                "initial_prompt": script,
            })
            .to_string(),
        ))
        .await
        .expect("send config");

    send_utterance(&mut socket).await;

    let mut saw_raw = false;
    let polished = loop {
        let event = next_event(&mut socket).await;
        match event["type"].as_str().expect("typed event") {
            "partial" => {}
            "raw" => {
                assert_eq!(event["content"], "今天天氣很好");
                saw_raw = true;
            }
            "polished" => break event,
            "error" => panic!("alignment branch must not emit errors here"),
            other => panic!("unexpected event type {other}"),
        }
    };

    assert!(saw_raw, "raw must precede the matched line");
    assert_eq!(polished["content"], "今天天氣很好");
    assert_eq!(polished["translated"], "The weather is nice today");
    assert_eq!(polished["low_confidence"], false);
}

#[tokio::test]
async fn empty_transcripts_clear_partials_and_rotate_segment_ids() {
    let server = spawn_server(StubAsrBackend::failing(), StubPolishBackend::echo()).await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.expect("connect");

    send_utterance(&mut socket).await;
    send_utterance(&mut socket).await;

    let first = next_event(&mut socket).await;
    assert_eq!(first["type"], "raw");
    assert_eq!(first["content"], "");

    let second = next_event(&mut socket).await;
    assert_eq!(second["type"], "raw");
    assert_eq!(second["content"], "");

    assert_ne!(
        first["id"], second["id"],
        "segment id must rotate after every closure, empty ones included"
    );
}

#[tokio::test]
async fn client_ping_is_answered_with_pong() {
    let server = spawn_server(StubAsrBackend::fixed("嗯哼"), StubPolishBackend::echo()).await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.expect("connect");

    socket
        .send(Message::text(json!({"type": "ping"}).to_string()))
        .await
        .expect("send ping");

    let event = next_event(&mut socket).await;
    assert_eq!(event["type"], "pong");
}

#[tokio::test]
async fn odd_length_audio_frame_is_rejected_with_an_error_event() {
    let server = spawn_server(StubAsrBackend::fixed("你好"), StubPolishBackend::echo()).await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.expect("connect");

    socket
        .send(Message::binary(vec![0u8; 101]))
        .await
        .expect("send malformed frame");

    let event = next_event(&mut socket).await;
    assert_eq!(event["type"], "error");
    assert!(
        event["content"].as_str().expect("error content").contains("Malformed"),
        "error should name the protocol violation"
    );
}

#[tokio::test]
async fn unparseable_text_frames_are_ignored() {
    let server = spawn_server(StubAsrBackend::fixed("你好"), StubPolishBackend::echo()).await;
    let (mut socket, _) = connect_async(server.url.as_str()).await.expect("connect");

    socket
        .send(Message::text("this is not json"))
        .await
        .expect("send garbage");
    socket
        .send(Message::text(json!({"type": "ping"}).to_string()))
        .await
        .expect("send ping");

    // The garbage frame is dropped; the session keeps serving.
    let event = next_event(&mut socket).await;
    assert_eq!(event["type"], "pong");
}
