//! Turn coordinator: top-level state machine for a voice session.
//!
//! Owns the phase, the VAD, the recording session, and the sampling
//! loop; relays remote agent commands into them; submits finished clips
//! for verification and publishes the outcome back over the data
//! channel. UI code never reaches in; it observes `TurnEvent`s.

use crate::audio::recorder::AudioSource;
use crate::audio::sampler::{Clock, EnergySampler, SystemClock};
use crate::audio::session::RecordingSession;
use crate::audio::vad::{TurnVad, VadConfig, VadState, VadTransition};
use crate::auth::AccessTokenProvider;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::room::{RoomEvent, RoomTransport};
use crate::turn::command::{AgentCommand, VerificationReport};
use crate::turn::phase::TurnPhase;
use crate::verify::{Decision, JoinTokenIssuer, VerificationOutcome, VoiceVerifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Opens a fresh capture stream for each listening turn.
///
/// The factory is the only place a device handle is created; the sampler
/// and the recorder both consume the frames of the one stream it opens.
pub type SourceFactory = Box<dyn Fn() -> Result<Box<dyn AudioSource>> + Send + Sync>;

/// Events projected to the UI layer.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// The phase changed.
    Phase(TurnPhase),
    /// Short human-readable status line.
    Status(String),
    /// A verification round-trip completed.
    Outcome(VerificationOutcome),
    /// The remote agent published an audio track.
    AgentSpeaking(bool),
    /// A non-voice agent message (product cards, chat text, …), passed
    /// through verbatim for the UI to render.
    AgentData { kind: String, payload: String },
}

/// Configuration for the coordinator.
#[derive(Clone)]
pub struct CoordinatorConfig {
    /// VAD calibration.
    pub vad: VadConfig,
    /// Capture sample rate.
    pub sample_rate: u32,
    /// Cadence of the sampling loop.
    pub frame_interval: Duration,
    /// Room URL passed to the transport on connect.
    pub room_url: String,
    /// Data-channel topic for published verification results.
    pub result_topic: String,
    /// Suppress status output.
    pub quiet: bool,
    /// Verbosity level (0=status only, 1=phases and turn diagnostics)
    pub verbosity: u8,
    /// Optional event sender for UI projection (crossbeam, non-blocking)
    pub event_tx: Option<crossbeam_channel::Sender<TurnEvent>>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            sample_rate: defaults::SAMPLE_RATE,
            frame_interval: Duration::from_millis(defaults::FRAME_INTERVAL_MS),
            room_url: "ws://localhost:7880".to_string(),
            result_topic: defaults::VOICE_RESULT_TOPIC.to_string(),
            quiet: false,
            verbosity: 0,
            event_tx: None,
        }
    }
}

impl CoordinatorConfig {
    /// Derive a coordinator configuration from the loaded config file.
    pub fn from_config(config: &Config) -> Self {
        Self {
            vad: VadConfig::from(config.vad),
            sample_rate: config.audio.sample_rate,
            frame_interval: Duration::from_millis(config.audio.frame_interval_ms),
            room_url: config.server.room_url.clone(),
            ..Self::default()
        }
    }
}

/// Top-level state machine for one voice session.
pub struct TurnCoordinator {
    config: CoordinatorConfig,
    transport: Box<dyn RoomTransport>,
    verifier: Arc<dyn VoiceVerifier>,
    issuer: Arc<dyn JoinTokenIssuer>,
    auth: Arc<dyn AccessTokenProvider>,
    sources: SourceFactory,
    clock: Arc<dyn Clock>,

    phase: TurnPhase,
    vad: TurnVad,
    session: RecordingSession,
    sampler: Option<EnergySampler>,
    events: Option<mpsc::Receiver<RoomEvent>>,
    /// Join-in-progress flag: one connect attempt at a time.
    joining: bool,
    /// Open while the agent allows the user to speak; closed by a remote
    /// stop until the next READY_FOR_USER or START_RECORD.
    gate: bool,
}

impl TurnCoordinator {
    pub fn new(
        transport: Box<dyn RoomTransport>,
        verifier: Arc<dyn VoiceVerifier>,
        issuer: Arc<dyn JoinTokenIssuer>,
        auth: Arc<dyn AccessTokenProvider>,
        sources: SourceFactory,
        config: CoordinatorConfig,
    ) -> Self {
        let vad = TurnVad::new(config.vad);
        let session = RecordingSession::new(config.sample_rate);
        Self {
            config,
            transport,
            verifier,
            issuer,
            auth,
            sources,
            clock: Arc::new(SystemClock),
            phase: TurnPhase::Idle,
            vad,
            session,
            sampler: None,
            events: None,
            joining: false,
            gate: false,
        }
    }

    /// Sets a custom clock (for deterministic testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Current VAD state.
    pub fn vad_state(&self) -> VadState {
        self.vad.state()
    }

    /// Join the room.
    ///
    /// Requests a join token with the current access token and opens the
    /// transport. No-op if a join is already in flight or the session is
    /// not `Idle`, so rapid repeated toggles never produce duplicate
    /// joins. The phase stays `Connecting` until the transport reports
    /// `Connected`.
    pub async fn connect(&mut self) -> Result<()> {
        if self.joining || self.phase != TurnPhase::Idle {
            return Ok(());
        }
        self.joining = true;
        self.set_phase(TurnPhase::Connecting);
        self.status("connecting…");

        let Some(token) = self.auth.access_token() else {
            self.joining = false;
            self.set_phase(TurnPhase::Idle);
            self.status("not signed in");
            return Err(VoxgateError::NotAuthenticated);
        };

        let credential = match self.issuer.join_token(&token).await {
            Ok(credential) => credential,
            Err(e) => {
                self.joining = false;
                self.set_phase(TurnPhase::Idle);
                self.status(&e.status_line());
                return Err(e);
            }
        };

        match self.transport.connect(&self.config.room_url, &credential).await {
            Ok(events) => {
                self.events = Some(events);
                Ok(())
            }
            Err(e) => {
                self.joining = false;
                self.set_phase(TurnPhase::Idle);
                self.status(&e.status_line());
                Err(e)
            }
        }
    }

    /// Leave the room: stop any in-flight recording, cancel the sampling
    /// loop, release the media device, and reset to `Idle`.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            eprintln!("voxgate: error leaving room: {}", e);
        }
        self.status("disconnected");
        self.teardown_to_idle();
    }

    /// User toggle: connect when idle, disconnect otherwise.
    pub async fn toggle(&mut self) -> Result<()> {
        if self.phase == TurnPhase::Idle {
            self.connect().await
        } else {
            self.disconnect().await;
            Ok(())
        }
    }

    /// Drive the session until the room disconnects.
    ///
    /// Interleaves room events with sampling-loop ticks; both run on the
    /// same task, so command handling and frame analysis never overlap.
    pub async fn run(&mut self) -> Result<()> {
        let Some(mut events) = self.events.take() else {
            return Ok(());
        };
        let mut frames = tokio::time::interval(self.config.frame_interval);
        frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let event = event.unwrap_or(RoomEvent::Disconnected);
                    self.handle_room_event(event).await;
                }
                _ = frames.tick() => {
                    self.tick().await;
                }
            }
            if self.phase == TurnPhase::Idle {
                break;
            }
        }
        Ok(())
    }

    /// Process one room event.
    pub async fn handle_room_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Connected => {
                if self.phase == TurnPhase::Connecting {
                    self.set_phase(TurnPhase::Chatting);
                    self.status("connected");
                }
            }
            RoomEvent::Disconnected => {
                self.status("disconnected");
                self.teardown_to_idle();
            }
            RoomEvent::DataReceived { payload, .. } => {
                // Anything unparseable is another consumer's payload
                if let Some(command) = AgentCommand::parse(&payload) {
                    self.handle_command(command).await;
                }
            }
            RoomEvent::TrackSubscribed => {
                self.emit(TurnEvent::AgentSpeaking(true));
            }
        }
    }

    /// Process one agent command.
    pub async fn handle_command(&mut self, command: AgentCommand) {
        match command {
            AgentCommand::StartRecord => self.start_listening().await,
            AgentCommand::StopRecord => self.remote_stop().await,
            AgentCommand::ReadyForUser => {
                self.gate = true;
            }
            AgentCommand::Other { kind, payload } => {
                self.emit(TurnEvent::AgentData { kind, payload });
            }
        }
    }

    /// One sampling-loop tick: pull a frame, feed the VAD, act on the
    /// transition.
    pub async fn tick(&mut self) {
        let Some(sampler) = self.sampler.as_mut() else {
            return;
        };
        let frame = match sampler.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.fail_turn(e);
                return;
            }
        };
        if !self.gate {
            // Frame drained but not analyzed while the agent holds the turn
            return;
        }

        match self.vad.observe(frame.sample) {
            Some(VadTransition::BeginRecording) => {
                self.session.begin();
                self.session.push_chunk(&frame.chunk);
                self.set_phase(TurnPhase::Recording);
                self.status("recording…");
            }
            Some(VadTransition::EndRecording(_)) => {
                // The closing chunk still belongs to the turn
                self.session.push_chunk(&frame.chunk);
                self.finish_and_verify().await;
            }
            None => {
                if self.vad.state() == VadState::Recording {
                    self.session.push_chunk(&frame.chunk);
                }
            }
        }
    }

    /// Arm listening for the next turn on a fresh capture stream.
    async fn start_listening(&mut self) {
        if !self.phase.is_connected() {
            if self.config.verbosity >= 1 {
                eprintln!("voxgate: START_RECORD ignored, not connected");
            }
            return;
        }
        if self.sampler.is_some() {
            // Re-entrant arm: one mic, one stream, never a second capture
            if self.config.verbosity >= 1 {
                eprintln!("voxgate: START_RECORD ignored, turn already active");
            }
            self.gate = true;
            return;
        }
        if self.auth.access_token().is_none() {
            self.status("not signed in");
            return;
        }

        let source = match (self.sources)() {
            Ok(source) => source,
            Err(e) => {
                self.fail_turn(e);
                return;
            }
        };
        match EnergySampler::start_with_clock(source, self.clock.clone()) {
            Ok(sampler) => {
                self.sampler = Some(sampler);
                self.gate = true;
                self.vad.arm();
                self.set_phase(TurnPhase::Listening);
                self.status("listening…");
            }
            Err(e) => self.fail_turn(e),
        }
    }

    /// Remote stop: overrides local silence detection and closes the
    /// gate until the agent re-opens it.
    async fn remote_stop(&mut self) {
        self.gate = false;
        if self.vad.force_stop().is_some() {
            self.finish_and_verify().await;
        } else if self.phase == TurnPhase::Listening {
            // Stopped before loudness ever crossed the start threshold:
            // that is "no audio captured", not silent success
            self.fail_turn(VoxgateError::EmptyRecording);
        }
    }

    /// Finalize the recording and run the verification round-trip.
    async fn finish_and_verify(&mut self) {
        self.stop_sampler();
        self.gate = false;
        self.vad.reset();

        let clip = match self.session.finish() {
            Ok(clip) => clip,
            Err(e) => {
                self.fail_turn(e);
                return;
            }
        };

        let Some(token) = self.auth.access_token() else {
            self.fail_turn(VoxgateError::NotAuthenticated);
            return;
        };

        self.set_phase(TurnPhase::Verifying);
        self.status("verifying voice…");
        if self.config.verbosity >= 1 {
            eprintln!(
                "voxgate: submitting {}ms clip ({} bytes)",
                clip.duration_ms,
                clip.wav.len()
            );
        }

        match self.verifier.verify(&clip.wav, &token).await {
            Ok(outcome) => {
                self.publish_outcome(&outcome).await;
                self.status(match outcome.decision {
                    Decision::Verified => "voice verified",
                    Decision::Repeat => "please repeat that",
                    Decision::Denied => "voice not recognized",
                });
                self.emit(TurnEvent::Outcome(outcome));
                self.set_phase(TurnPhase::Chatting);
            }
            Err(e) => self.fail_turn(e),
        }
    }

    /// Publish the outcome to the remote peer, reliably.
    async fn publish_outcome(&mut self, outcome: &VerificationOutcome) {
        let report = VerificationReport::from_outcome(outcome);
        match report.to_json() {
            Ok(json) => {
                let publish = self
                    .transport
                    .publish_data(json.as_bytes(), true, Some(&self.config.result_topic))
                    .await;
                if let Err(e) = publish {
                    eprintln!("voxgate: failed to publish verification result: {}", e);
                }
            }
            Err(e) => {
                eprintln!("voxgate: failed to encode verification result: {}", e);
            }
        }
    }

    /// Abandon the current turn.
    ///
    /// Recoverable failures return to `Chatting`: the room connection
    /// is still valid and the user can retry without reconnecting. Only
    /// a lost room forces `Idle`.
    fn fail_turn(&mut self, error: VoxgateError) {
        if self.config.verbosity >= 1 {
            eprintln!("voxgate: turn failed: {}", error);
        }
        self.stop_sampler();
        self.session.abort();
        self.vad.reset();
        self.gate = false;
        self.status(&error.status_line());
        if error.is_turn_recoverable() && self.phase.is_connected() {
            self.set_phase(TurnPhase::Chatting);
        } else {
            self.teardown_to_idle();
        }
    }

    /// Release everything unconditionally and return to `Idle`.
    fn teardown_to_idle(&mut self) {
        self.stop_sampler();
        self.session.abort();
        self.vad.reset();
        self.gate = false;
        self.joining = false;
        self.events = None;
        self.set_phase(TurnPhase::Idle);
    }

    fn stop_sampler(&mut self) {
        if let Some(mut sampler) = self.sampler.take()
            && let Err(e) = sampler.stop()
        {
            // Keep tearing down; the handle is dropped regardless
            eprintln!("voxgate: failed to release audio device: {}", e);
        }
    }

    fn set_phase(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            if self.config.verbosity >= 1 {
                eprintln!("voxgate: phase {} → {}", self.phase, phase);
            }
            self.phase = phase;
            self.emit(TurnEvent::Phase(phase));
        }
    }

    fn status(&self, text: &str) {
        if !self.config.quiet {
            eprintln!("voxgate: {}", text);
        }
        self.emit(TurnEvent::Status(text.to_string()));
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(tx) = &self.config.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::recorder::MockAudioSource;
    use crate::auth::StaticTokenProvider;
    use crate::room::{MockRoom, MockRoomHandle};
    use crate::verify::{MockIssuer, MockVerifier};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    /// Mock clock shared between the test and the sampler.
    #[derive(Clone)]
    struct MockClock {
        current: Arc<Mutex<Instant>>,
    }

    impl MockClock {
        fn new() -> Self {
            Self {
                current: Arc::new(Mutex::new(Instant::now())),
            }
        }

        fn advance(&self, duration: Duration) {
            let mut current = self.current.lock().unwrap();
            *current += duration;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current.lock().unwrap()
        }
    }

    /// Audio source that reports start/stop to a shared flag, so tests
    /// can assert the device was released.
    struct TrackedSource {
        inner: MockAudioSource,
        open: Arc<AtomicBool>,
    }

    impl crate::audio::recorder::AudioSource for TrackedSource {
        fn start(&mut self) -> crate::error::Result<()> {
            self.inner.start()?;
            self.open.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> crate::error::Result<()> {
            self.inner.stop()?;
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn read_samples(&mut self) -> crate::error::Result<Vec<i16>> {
            self.inner.read_samples()
        }
    }

    /// Loud and quiet frames: RMS of a constant 3000 is ~0.0916, well
    /// above the 0.015 start threshold; zeros are silence.
    fn loud_frame() -> Vec<i16> {
        vec![3000i16; 160]
    }

    fn quiet_frame() -> Vec<i16> {
        vec![0i16; 160]
    }

    struct Fixture {
        coordinator: TurnCoordinator,
        room: MockRoomHandle,
        verifier: MockVerifier,
        clock: MockClock,
        device_open: Arc<AtomicBool>,
        events: crossbeam_channel::Receiver<TurnEvent>,
    }

    fn fixture_with(frames: Vec<Vec<i16>>, verifier: MockVerifier) -> Fixture {
        let room = MockRoom::new();
        let room_handle = room.handle();
        let clock = MockClock::new();
        let device_open = Arc::new(AtomicBool::new(false));
        let (event_tx, events) = crossbeam_channel::unbounded();

        let factory_open = Arc::clone(&device_open);
        let factory_frames = Mutex::new(Some(frames));
        let sources: SourceFactory = Box::new(move || {
            let frames = factory_frames
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| vec![quiet_frame()]);
            Ok(Box::new(TrackedSource {
                inner: MockAudioSource::new().with_frames(frames),
                open: Arc::clone(&factory_open),
            }) as Box<dyn AudioSource>)
        });

        let config = CoordinatorConfig {
            quiet: true,
            event_tx: Some(event_tx),
            ..CoordinatorConfig::default()
        };

        let coordinator = TurnCoordinator::new(
            Box::new(room),
            Arc::new(verifier.clone()),
            Arc::new(MockIssuer::new("room-token")),
            Arc::new(StaticTokenProvider::new("jwt")),
            sources,
            config,
        )
        .with_clock(Arc::new(clock.clone()));

        Fixture {
            coordinator,
            room: room_handle,
            verifier,
            clock,
            device_open,
            events,
        }
    }

    fn fixture(frames: Vec<Vec<i16>>) -> Fixture {
        fixture_with(frames, MockVerifier::verified(0.9))
    }

    async fn connect(fixture: &mut Fixture) {
        fixture.coordinator.connect().await.unwrap();
        fixture
            .coordinator
            .handle_room_event(RoomEvent::Connected)
            .await;
        assert_eq!(fixture.coordinator.phase(), TurnPhase::Chatting);
    }

    async fn start_record(fixture: &mut Fixture) {
        fixture
            .coordinator
            .handle_room_event(RoomEvent::DataReceived {
                payload: br#"{"type":"VOICE_CMD","action":"START_RECORD"}"#.to_vec(),
                topic: None,
            })
            .await;
    }

    fn phases(fixture: &Fixture) -> Vec<TurnPhase> {
        fixture
            .events
            .try_iter()
            .filter_map(|event| match event {
                TurnEvent::Phase(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_connect_reaches_chatting() {
        let mut f = fixture(vec![]);

        f.coordinator.connect().await.unwrap();
        assert_eq!(f.coordinator.phase(), TurnPhase::Connecting);

        f.coordinator.handle_room_event(RoomEvent::Connected).await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);
        assert!(f.room.is_connected());
    }

    #[tokio::test]
    async fn test_duplicate_connect_is_noop() {
        let mut f = fixture(vec![]);

        f.coordinator.connect().await.unwrap();
        // Second call while the join is still in flight
        f.coordinator.connect().await.unwrap();
        f.coordinator.handle_room_event(RoomEvent::Connected).await;
        f.coordinator.connect().await.unwrap();

        let connecting = phases(&f)
            .iter()
            .filter(|p| **p == TurnPhase::Connecting)
            .count();
        assert_eq!(connecting, 1, "only one join attempt may be in flight");
    }

    #[tokio::test]
    async fn test_connect_without_token_refuses() {
        let room = MockRoom::new();
        let sources: SourceFactory =
            Box::new(|| Ok(Box::new(MockAudioSource::new()) as Box<dyn AudioSource>));
        let mut coordinator = TurnCoordinator::new(
            Box::new(room),
            Arc::new(MockVerifier::verified(0.9)),
            Arc::new(MockIssuer::new("room-token")),
            Arc::new(StaticTokenProvider::anonymous()),
            sources,
            CoordinatorConfig {
                quiet: true,
                ..CoordinatorConfig::default()
            },
        );

        let result = coordinator.connect().await;
        assert!(matches!(result, Err(VoxgateError::NotAuthenticated)));
        assert_eq!(coordinator.phase(), TurnPhase::Idle);
    }

    #[tokio::test]
    async fn test_join_token_failure_returns_to_idle() {
        let room = MockRoom::new();
        let sources: SourceFactory =
            Box::new(|| Ok(Box::new(MockAudioSource::new()) as Box<dyn AudioSource>));
        let mut coordinator = TurnCoordinator::new(
            Box::new(room),
            Arc::new(MockVerifier::verified(0.9)),
            Arc::new(MockIssuer::failing()),
            Arc::new(StaticTokenProvider::new("jwt")),
            sources,
            CoordinatorConfig {
                quiet: true,
                ..CoordinatorConfig::default()
            },
        );

        assert!(coordinator.connect().await.is_err());
        assert_eq!(coordinator.phase(), TurnPhase::Idle);

        // The failed attempt must not leave the joining flag stuck
        assert!(coordinator.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_start_record_arms_listening() {
        let mut f = fixture(vec![quiet_frame()]);
        connect(&mut f).await;

        start_record(&mut f).await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Listening);
        assert_eq!(f.coordinator.vad_state(), VadState::ArmedListening);
        assert!(f.device_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_full_turn_happy_path() {
        // quiet, loud, loud, then quiet until the silence hold ends it
        let mut frames = vec![quiet_frame(), loud_frame(), loud_frame()];
        frames.extend(std::iter::repeat_with(quiet_frame).take(60));
        let mut f = fixture(frames);
        connect(&mut f).await;
        start_record(&mut f).await;

        for _ in 0..63 {
            f.coordinator.tick().await;
            f.clock.advance(Duration::from_millis(16));
            if f.coordinator.phase() == TurnPhase::Chatting {
                break;
            }
        }

        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);

        // Exactly one verification call with the bearer token
        let calls = f.verifier.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].access_token, "jwt");
        assert!(calls[0].wav_len > 44, "clip should be a non-empty WAV");

        // Outcome published reliably on the result topic
        let published = f.room.published();
        assert_eq!(published.len(), 1);
        assert!(published[0].reliable);
        assert_eq!(published[0].topic.as_deref(), Some("VOICE_RESULT"));
        let text = String::from_utf8(published[0].payload.clone()).unwrap();
        assert!(text.contains("\"decision\":\"VERIFIED\""));
        assert!(text.contains("\"score\":0.9"));

        // Device released after the turn
        assert!(!f.device_open.load(Ordering::SeqCst));

        // Phase trace: chatting → listening → recording → verifying → chatting
        let trace = phases(&f);
        assert_eq!(
            trace,
            vec![
                TurnPhase::Connecting,
                TurnPhase::Chatting,
                TurnPhase::Listening,
                TurnPhase::Recording,
                TurnPhase::Verifying,
                TurnPhase::Chatting,
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_stop_overrides_loudness() {
        // Loudness stays high: local VAD would never stop on its own
        let frames = std::iter::repeat_with(loud_frame).take(20).collect();
        let mut f = fixture(frames);
        connect(&mut f).await;
        start_record(&mut f).await;

        f.coordinator.tick().await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Recording);

        f.coordinator
            .handle_room_event(RoomEvent::DataReceived {
                payload: br#"{"type":"VOICE_CMD","action":"STOP_RECORD"}"#.to_vec(),
                topic: None,
            })
            .await;

        // Straight through Verifying to Chatting despite high RMS
        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);
        assert_eq!(f.verifier.calls().len(), 1);
        assert!(!f.device_open.load(Ordering::SeqCst));
        assert!(phases(&f).contains(&TurnPhase::Verifying));
    }

    #[tokio::test]
    async fn test_remote_stop_before_speech_is_no_audio() {
        let frames = std::iter::repeat_with(quiet_frame).take(10).collect();
        let mut f = fixture(frames);
        connect(&mut f).await;
        start_record(&mut f).await;

        f.coordinator.tick().await;
        f.coordinator
            .handle_command(AgentCommand::StopRecord)
            .await;

        // No verification on a turn with no audio
        assert_eq!(f.verifier.calls().len(), 0);
        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);
        assert!(!f.device_open.load(Ordering::SeqCst));

        let statuses: Vec<String> = f
            .events
            .try_iter()
            .filter_map(|event| match event {
                TurnEvent::Status(text) => Some(text),
                _ => None,
            })
            .collect();
        assert!(statuses.iter().any(|s| s.contains("no audio")));
    }

    #[tokio::test]
    async fn test_malformed_payload_changes_nothing() {
        let mut f = fixture(vec![]);
        connect(&mut f).await;
        let _ = phases(&f);

        for payload in [
            b"not json".to_vec(),
            b"".to_vec(),
            vec![0xff, 0x00, 0x7b],
            b"[\"VOICE_CMD\"]".to_vec(),
        ] {
            f.coordinator
                .handle_room_event(RoomEvent::DataReceived {
                    payload,
                    topic: None,
                })
                .await;
        }

        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);
        assert!(phases(&f).is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_during_recording_releases_everything() {
        let frames = std::iter::repeat_with(loud_frame).take(20).collect();
        let mut f = fixture(frames);
        connect(&mut f).await;
        start_record(&mut f).await;
        f.coordinator.tick().await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Recording);

        f.coordinator
            .handle_room_event(RoomEvent::Disconnected)
            .await;

        assert_eq!(f.coordinator.phase(), TurnPhase::Idle);
        assert_eq!(f.coordinator.vad_state(), VadState::Idle);
        assert!(!f.device_open.load(Ordering::SeqCst), "mic still open");
        // The aborted turn never reaches verification
        assert_eq!(f.verifier.calls().len(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_stays_in_room() {
        let room = MockRoom::new();
        let (event_tx, events) = crossbeam_channel::unbounded();
        let sources: SourceFactory = Box::new(|| {
            Ok(Box::new(MockAudioSource::new().with_permission_denied()) as Box<dyn AudioSource>)
        });
        let mut coordinator = TurnCoordinator::new(
            Box::new(room),
            Arc::new(MockVerifier::verified(0.9)),
            Arc::new(MockIssuer::new("room-token")),
            Arc::new(StaticTokenProvider::new("jwt")),
            sources,
            CoordinatorConfig {
                quiet: true,
                event_tx: Some(event_tx),
                ..CoordinatorConfig::default()
            },
        );

        coordinator.connect().await.unwrap();
        coordinator.handle_room_event(RoomEvent::Connected).await;
        coordinator.handle_command(AgentCommand::StartRecord).await;

        // Recoverable: room stays connected, user can retry
        assert_eq!(coordinator.phase(), TurnPhase::Chatting);
        let statuses: Vec<String> = events
            .try_iter()
            .filter_map(|event| match event {
                TurnEvent::Status(text) => Some(text),
                _ => None,
            })
            .collect();
        assert!(statuses.iter().any(|s| s.contains("mic access denied")));
    }

    #[tokio::test]
    async fn test_verification_failure_returns_to_chatting() {
        let frames = std::iter::repeat_with(loud_frame).take(5).collect();
        let mut f = fixture_with(frames, MockVerifier::failing("HTTP 503"));
        connect(&mut f).await;
        start_record(&mut f).await;
        f.coordinator.tick().await;

        f.coordinator
            .handle_command(AgentCommand::StopRecord)
            .await;

        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);
        assert_eq!(f.verifier.calls().len(), 1);
        // Nothing published for a failed round-trip
        assert!(f.room.published().is_empty());
    }

    #[tokio::test]
    async fn test_start_record_while_turn_active_is_noop() {
        let frames = std::iter::repeat_with(loud_frame).take(10).collect();
        let mut f = fixture(frames);
        connect(&mut f).await;
        start_record(&mut f).await;
        f.coordinator.tick().await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Recording);

        // A duplicate START_RECORD must not open a second stream or
        // reset the in-flight recording
        start_record(&mut f).await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Recording);

        f.coordinator
            .handle_command(AgentCommand::StopRecord)
            .await;
        assert_eq!(f.verifier.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_agent_data_surfaces_for_ui() {
        let mut f = fixture(vec![]);
        connect(&mut f).await;

        f.coordinator
            .handle_room_event(RoomEvent::DataReceived {
                payload: br#"{"type":"PRODUCT_CARDS","products":[]}"#.to_vec(),
                topic: None,
            })
            .await;

        let data: Vec<(String, String)> = f
            .events
            .try_iter()
            .filter_map(|event| match event {
                TurnEvent::AgentData { kind, payload } => Some((kind, payload)),
                _ => None,
            })
            .collect();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].0, "PRODUCT_CARDS");
    }

    #[tokio::test]
    async fn test_start_record_ignored_before_connect() {
        let mut f = fixture(vec![]);
        f.coordinator.handle_command(AgentCommand::StartRecord).await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Idle);
        assert!(!f.device_open.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_toggle_connects_then_disconnects() {
        let mut f = fixture(vec![]);

        f.coordinator.toggle().await.unwrap();
        f.coordinator.handle_room_event(RoomEvent::Connected).await;
        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);

        f.coordinator.toggle().await.unwrap();
        assert_eq!(f.coordinator.phase(), TurnPhase::Idle);
        assert!(!f.room.is_connected());
    }

    #[tokio::test]
    async fn test_silence_stop_measures_full_hold() {
        // One loud frame then silence: the turn must not end before the
        // silence hold elapses
        let mut frames = vec![loud_frame()];
        frames.extend(std::iter::repeat_with(quiet_frame).take(100));
        let mut f = fixture(frames);
        connect(&mut f).await;
        start_record(&mut f).await;

        f.coordinator.tick().await; // begins recording
        assert_eq!(f.coordinator.phase(), TurnPhase::Recording);

        // 600ms of silence: still recording (hold is 800ms)
        for _ in 0..6 {
            f.clock.advance(Duration::from_millis(100));
            f.coordinator.tick().await;
        }
        assert_eq!(f.coordinator.phase(), TurnPhase::Recording);

        // Past the hold: turn completes
        for _ in 0..4 {
            f.clock.advance(Duration::from_millis(100));
            f.coordinator.tick().await;
        }
        assert_eq!(f.coordinator.phase(), TurnPhase::Chatting);
        assert_eq!(f.verifier.calls().len(), 1);
    }
}
