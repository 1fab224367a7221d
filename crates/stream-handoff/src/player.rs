//! Streaming session driver.
//!
//! [`Player`] is the single writer for one streaming session at a time:
//! - ingests bytes from a [`ChunkSource`], decoding, scheduling and accumulating in order
//! - on end of stream, encodes the accumulated audio and loads it into the buffered engine
//! - runs the handoff once the buffered engine is ready
//! - samples the authoritative clock while playing
//!
//! Everything runs on the caller's thread. Engine notifications arrive on a
//! channel and are consumed between reads during ingestion, and by
//! [`Player::poll_events`] afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender, select};

use crate::accumulator::{AccumulatedBuffer, BufferAccumulator};
use crate::config::HandoffConfig;
use crate::decode::ByteStreamDecoder;
use crate::encoder::{ContainerEncoder, ResourceLocator, WavEncoder};
use crate::engine::{BufferedOutput, EngineEvent, StreamingOutput};
use crate::listener::PlayerListener;
use crate::scheduler::PlaybackScheduler;
use crate::source::ChunkSource;
use crate::status::PlayerSnapshot;
use crate::tracker::TimeTracker;
use crate::transition::{TransitionController, TransitionFault, TransitionState};

/// Cancels whichever session is active when [`cancel`](Self::cancel) is called.
///
/// Clonable and `Send`, so it can be handed to a signal handler or another thread.
/// The ingestion loop notices the cancellation before processing the next chunk;
/// chunks already scheduled keep playing until [`Player::stop`].
#[derive(Clone, Debug)]
pub struct CancelHandle {
    generation: Arc<AtomicU64>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// State of one `start_streaming` invocation.
struct PlaybackSession {
    id: u64,
    generation: u64,
    decoder: ByteStreamDecoder,
    accumulator: BufferAccumulator,
    transition: TransitionController,
    buffer: Option<AccumulatedBuffer>,
    stream_complete: bool,
    /// No more chunks will arrive: end of stream, read failure or cancellation.
    ingestion_done: bool,
    ended: bool,
}

impl PlaybackSession {
    fn new(id: u64, generation: u64, config: &HandoffConfig) -> Self {
        Self {
            id,
            generation,
            decoder: ByteStreamDecoder::new(config.sample_rate),
            accumulator: BufferAccumulator::new(config.sample_rate),
            transition: TransitionController::new(config.enable_transition),
            buffer: None,
            stream_complete: false,
            ingestion_done: false,
            ended: false,
        }
    }
}

/// Low-latency streaming playback with a one-time handoff to a buffered engine.
pub struct Player<O, B, E = WavEncoder>
where
    O: StreamingOutput,
    B: BufferedOutput,
    E: ContainerEncoder,
{
    config: HandoffConfig,
    scheduler: PlaybackScheduler<O>,
    buffered: B,
    encoder: E,
    listener: Box<dyn PlayerListener>,
    tracker: TimeTracker,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    generation: Arc<AtomicU64>,
    session: Option<PlaybackSession>,
    sessions_started: u64,
    playing: bool,
    attached: bool,
}

impl<O, B, E> Player<O, B, E>
where
    O: StreamingOutput,
    B: BufferedOutput,
    E: ContainerEncoder,
{
    pub fn new(
        config: HandoffConfig,
        output: O,
        buffered: B,
        encoder: E,
        listener: Box<dyn PlayerListener>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let tracker = TimeTracker::new(config.poll_interval);
        Self {
            config,
            scheduler: PlaybackScheduler::new(output),
            buffered,
            encoder,
            listener,
            tracker,
            events_tx,
            events_rx,
            generation: Arc::new(AtomicU64::new(0)),
            session: None,
            sessions_started: 0,
            playing: false,
            attached: false,
        }
    }

    /// Register the event channel with both engines. Idempotent.
    pub fn init(&mut self) {
        if self.attached {
            return;
        }
        self.scheduler.output_mut().attach(self.events_tx.clone());
        self.buffered.attach(self.events_tx.clone());
        self.attached = true;
        tracing::debug!("player initialized");
    }

    /// Tear down the active session and deregister from the engines.
    ///
    /// Idempotent and safe after a partial or missing [`init`](Self::init).
    pub fn shutdown(&mut self) {
        self.teardown_session();
        if self.attached {
            self.scheduler.output_mut().detach();
            self.buffered.detach();
            self.attached = false;
            tracing::debug!("player shut down");
        }
        while self.events_rx.try_recv().is_ok() {}
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            generation: self.generation.clone(),
        }
    }

    /// Ingest `source` until it ends, fails, or the session is cancelled.
    ///
    /// Any previous session is torn down first. A read failure aborts ingestion
    /// and is returned; audio already scheduled keeps playing.
    pub fn start_streaming<S: ChunkSource>(&mut self, mut source: S) -> Result<()> {
        if !self.attached {
            bail!("player not initialized");
        }
        self.teardown_session();
        self.scheduler.begin().context("start streaming timeline")?;

        self.sessions_started += 1;
        let id = self.sessions_started;
        let generation = self.generation.load(Ordering::SeqCst);
        self.session = Some(PlaybackSession::new(id, generation, &self.config));
        tracing::info!(
            session = id,
            sample_rate = self.config.sample_rate,
            transition = self.config.enable_transition,
            "streaming session started"
        );
        self.set_playing(true);

        loop {
            self.drain_events();
            let next = source.next_chunk();
            if !self.session_live(generation) {
                tracing::info!(session = id, "session cancelled; ingestion stopped");
                self.abandon_ingestion(generation);
                return Ok(());
            }
            match next {
                Ok(Some(bytes)) => self.ingest(&bytes),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(session = id, "stream read failed: {e}");
                    self.abandon_ingestion(generation);
                    return Err(e).context("read audio stream");
                }
            }
        }

        self.finish_stream()
    }

    /// Wait up to `timeout` for one engine event or tracker tick and handle it.
    ///
    /// Returns `false` when nothing arrived.
    pub fn poll_events(&mut self, timeout: Duration) -> bool {
        let events = self.events_rx.clone();
        let ticks = self.tracker.ticks();
        select! {
            recv(events) -> event => {
                if let Ok(event) = event {
                    self.handle_event(event);
                }
                true
            }
            recv(ticks) -> _ => {
                self.sample_time();
                true
            }
            default(timeout) => false,
        }
    }

    pub fn play(&mut self) -> Result<()> {
        if self.playing {
            return Ok(());
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if session.transition.is_transitioned() {
            if session.ended {
                self.buffered.seek(0.0).context("restart buffered playback")?;
            }
            self.buffered.play().context("start buffered playback")?;
        } else {
            if session.ended {
                return Ok(());
            }
            self.scheduler.resume().context("resume streaming playback")?;
        }
        session.ended = false;
        self.set_playing(true);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if !self.playing {
            return Ok(());
        }
        if self.is_transitioned() {
            self.buffered.pause().context("pause buffered playback")?;
        } else {
            self.scheduler.pause().context("pause streaming playback")?;
        }
        self.sample_time();
        self.set_playing(false);
        Ok(())
    }

    /// Halt both engines and tear the session down. Never fails; idempotent.
    pub fn stop(&mut self) {
        self.teardown_session();
    }

    /// Seek the buffered engine back by `seconds`, clamped at zero.
    ///
    /// No-op until the session has transitioned.
    pub fn rewind(&mut self, seconds: f64) -> Result<()> {
        if !self.is_transitioned() {
            return Ok(());
        }
        let now = self.buffered.current_time().context("read buffered position")?;
        let target = (now - seconds).max(0.0);
        self.buffered.seek(target).context("rewind buffered playback")?;
        if let Some(session) = self.session.as_mut() {
            session.ended = false;
        }
        tracing::debug!(from_s = now, to_s = target, "rewound");
        self.tracker.publish(target);
        self.listener.time_update(target);
        Ok(())
    }

    /// Relay a user interaction; resumes a platform-suspended device.
    pub fn notify_user_interaction(&mut self) -> Result<()> {
        if self.scheduler.resume_after_interaction()? {
            tracing::info!("output device resumed after user interaction");
            self.listener.device_suspended_changed(false);
        }
        Ok(())
    }

    /// Last published position in seconds.
    pub fn current_time(&self) -> f64 {
        self.tracker.current_time()
    }

    /// Known duration: the accumulated total once the stream ended, else what is scheduled so far.
    pub fn duration(&self) -> f64 {
        match &self.session {
            Some(session) => session
                .buffer
                .as_ref()
                .map(|b| b.duration)
                .unwrap_or_else(|| self.scheduler.scheduled_duration()),
            None => 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_transitioned(&self) -> bool {
        self.transition_state() == TransitionState::Transitioned
    }

    pub fn is_device_suspended(&self) -> bool {
        self.scheduler.is_device_suspended()
    }

    pub fn transition_state(&self) -> TransitionState {
        self.session
            .as_ref()
            .map(|s| s.transition.state())
            .unwrap_or_default()
    }

    pub fn transition_fault(&self) -> Option<&TransitionFault> {
        self.session.as_ref().and_then(|s| s.transition.fault())
    }

    /// The concatenated session audio, once the stream has ended.
    pub fn accumulated(&self) -> Option<&AccumulatedBuffer> {
        self.session.as_ref().and_then(|s| s.buffer.as_ref())
    }

    /// Bytes the decoder is holding back for the next read.
    pub fn leftover_bytes(&self) -> usize {
        self.session
            .as_ref()
            .map(|s| s.decoder.leftover_len())
            .unwrap_or(0)
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<O> {
        &self.scheduler
    }

    pub fn buffered(&self) -> &B {
        &self.buffered
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            session: self.session.as_ref().map(|s| s.id).unwrap_or(0),
            state: self.transition_state(),
            playing: self.playing,
            current_time: self.current_time(),
            duration: self.duration(),
            stream_complete: self.session.as_ref().is_some_and(|s| s.stream_complete),
            device_suspended: self.is_device_suspended(),
            transition_fault: self.transition_fault().map(|f| f.to_string()),
        }
    }

    fn session_live(&self, generation: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.generation == generation)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    fn ingest(&mut self, bytes: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let chunk = session.decoder.decode(bytes);
        if chunk.is_empty() {
            return;
        }

        let index = self.scheduler.start_times().len();
        if let Err(e) = self.scheduler.schedule(&chunk) {
            let reason = format!("{e:#}");
            tracing::warn!(session = session.id, index, "chunk rejected by output device: {reason}");
            self.listener.chunk_rejected(index, &reason);
        }
        session.accumulator.push(chunk);
    }

    fn finish_stream(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let buffer = session.accumulator.finalize()?;
        session.stream_complete = true;
        session.ingestion_done = true;
        session.transition.mark_stream_complete();
        tracing::info!(
            session = session.id,
            samples = buffer.len(),
            bytes = session.decoder.bytes_in(),
            leftover_bytes = session.decoder.leftover_len(),
            duration_s = buffer.duration,
            "stream complete"
        );

        let encoded = self.encoder.encode(&buffer.samples, buffer.sample_rate);
        let duration = buffer.duration;
        session.buffer = Some(buffer);

        // Everything may already have played out before the end signal arrived.
        self.check_stream_drained();

        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("encoding accumulated audio failed; staying on streaming engine: {e:#}");
                return Ok(());
            }
        };
        let resource = ResourceLocator::new(bytes, self.encoder.container());
        self.listener.audio_ready(&resource, duration);

        if self.config.enable_transition {
            if let Err(e) = self.buffered.load(&resource) {
                tracing::warn!("buffered engine rejected resource; staying on streaming engine: {e:#}");
                return Ok(());
            }
            tracing::debug!(bytes = resource.len(), container = resource.container(), "buffered resource loading");
        }

        self.drain_events();
        Ok(())
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        if self.tracker.tick_due() {
            self.sample_time();
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::ChunkFinished(handle) => {
                if self.scheduler.chunk_finished(handle) {
                    self.check_stream_drained();
                }
            }
            EngineEvent::DeviceSuspended => self.device_suspension(true),
            EngineEvent::DeviceRunning => self.device_suspension(false),
            EngineEvent::BufferedReady => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                session.transition.mark_resource_ready();
                self.try_transition();
            }
            EngineEvent::BufferedEnded => {
                if self.is_transitioned() {
                    self.finish_playback();
                }
            }
        }
    }

    fn try_transition(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let fallback = self.tracker.current_time();
        let Some(outcome) =
            session
                .transition
                .run(&mut self.scheduler, &mut self.buffered, self.playing, fallback)
        else {
            return;
        };

        self.tracker.publish(outcome.position);
        self.listener.transitioned(outcome.position);
        if let Some(fault) = &outcome.fault {
            self.listener.transition_fault(fault);
        }
        if self.playing && !outcome.started {
            self.set_playing(false);
        }
    }

    /// Ingestion stopped early; what is already scheduled plays out and then ends
    /// the session. No handoff happens since the audio is incomplete.
    fn abandon_ingestion(&mut self, generation: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.generation != generation {
            return;
        }
        session.ingestion_done = true;
        self.check_stream_drained();
    }

    /// End of playback on the streaming engine: ingestion over and every chunk played.
    fn check_stream_drained(&mut self) {
        let pending = self.session.as_ref().is_some_and(|s| {
            s.ingestion_done && !s.ended && !s.transition.is_transitioned()
        });
        if pending && self.scheduler.is_drained() {
            self.finish_playback();
        }
    }

    fn finish_playback(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.ended {
            return;
        }
        session.ended = true;
        tracing::info!(session = session.id, "playback ended");
        self.sample_time();
        self.set_playing(false);
        self.listener.ended();
    }

    fn device_suspension(&mut self, suspended: bool) {
        if self.scheduler.set_device_suspended(suspended) {
            let now = self.scheduler.is_device_suspended();
            tracing::info!(suspended = now, "output device state changed");
            self.listener.device_suspended_changed(now);
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if playing {
            self.tracker.start();
        } else {
            self.tracker.stop();
        }
        if self.playing != playing {
            self.playing = playing;
            self.listener.play_state_changed(playing);
        }
    }

    /// Re-read the clock that governs the current transition state.
    fn sample_time(&mut self) {
        let read = match self.transition_state() {
            TransitionState::Transitioned => self.buffered.current_time(),
            TransitionState::Streaming | TransitionState::Ready => self.scheduler.current_time(),
        };
        match read {
            Ok(time) => {
                self.tracker.publish(time);
                self.listener.time_update(time);
            }
            Err(e) => tracing::debug!("position read failed: {e:#}"),
        }
    }

    fn teardown_session(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.scheduler.stop();
        if let Some(session) = self.session.take() {
            if let Err(e) = self.buffered.stop() {
                tracing::debug!(session = session.id, "buffered stop failed (ignored): {e:#}");
            }
            tracing::info!(session = session.id, "session torn down");
        }
        while self.events_rx.try_recv().is_ok() {}
        self.tracker.reset();
        self.set_playing(false);
    }
}

impl<O, B, E> Drop for Player<O, B, E>
where
    O: StreamingOutput,
    B: BufferedOutput,
    E: ContainerEncoder,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    use anyhow::anyhow;

    use super::*;
    use crate::engine::fake::{CallLog, FakeBuffered, FakeStreaming, engines};
    use crate::source::ScriptedSource;

    const RATE: u32 = 24_000;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl Recorder {
        fn saw(&self, name: &str) -> bool {
            self.events.borrow().iter().any(|e| e == name)
        }

        fn count(&self, name: &str) -> usize {
            self.events.borrow().iter().filter(|e| *e == name).count()
        }
    }

    impl PlayerListener for Recorder {
        fn play_state_changed(&mut self, playing: bool) {
            self.events.borrow_mut().push(format!("playing={playing}"));
        }

        fn audio_ready(&mut self, _resource: &ResourceLocator, _duration: f64) {
            self.events.borrow_mut().push("audio_ready".to_string());
        }

        fn ended(&mut self) {
            self.events.borrow_mut().push("ended".to_string());
        }

        fn transitioned(&mut self, _position: f64) {
            self.events.borrow_mut().push("transitioned".to_string());
        }

        fn transition_fault(&mut self, _fault: &TransitionFault) {
            self.events.borrow_mut().push("fault".to_string());
        }

        fn device_suspended_changed(&mut self, suspended: bool) {
            self.events.borrow_mut().push(format!("suspended={suspended}"));
        }

        fn chunk_rejected(&mut self, index: usize, _reason: &str) {
            self.events.borrow_mut().push(format!("rejected={index}"));
        }
    }

    struct BrokenEncoder;

    impl ContainerEncoder for BrokenEncoder {
        fn encode(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<u8>> {
            Err(anyhow!("disk full"))
        }

        fn container(&self) -> &'static str {
            "wav"
        }
    }

    struct Harness {
        player: Player<FakeStreaming, FakeBuffered>,
        stream: FakeStreaming,
        buffered: FakeBuffered,
        log: CallLog,
        rec: Recorder,
    }

    fn harness(config: HandoffConfig) -> Harness {
        let (stream, buffered, log) = engines();
        let rec = Recorder::default();
        let mut player = Player::new(
            config,
            stream.clone(),
            buffered.clone(),
            WavEncoder,
            Box::new(rec.clone()),
        );
        player.init();
        Harness {
            player,
            stream,
            buffered,
            log,
            rec,
        }
    }

    /// Advances the fake device clock by `step` seconds per read, like audio
    /// playing out while the network delivers the next chunk.
    struct ClockedSource {
        inner: ScriptedSource,
        stream: FakeStreaming,
        step: f64,
    }

    impl ChunkSource for ClockedSource {
        fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
            let now = self.stream.state.borrow().clock;
            self.stream.set_clock(now + self.step);
            self.inner.next_chunk()
        }
    }

    fn pump(player: &mut Player<FakeStreaming, FakeBuffered>) {
        while player.poll_events(Duration::from_millis(5)) {}
    }

    fn pcm(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn tone(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i as f32 * 0.01).sin()).collect()
    }

    #[test]
    fn scenario_a_single_chunk_scheduled_at_zero() {
        let mut h = harness(HandoffConfig::default().with_transition(false));
        h.player
            .start_streaming(ScriptedSource::new([pcm(&[0.5, -0.5])]))
            .unwrap();

        let sched = h.player.scheduler();
        assert_eq!(sched.start_times(), &[0.0]);
        let st = h.stream.state.borrow();
        assert_eq!(st.scheduled.len(), 1);
        assert_eq!(st.scheduled[0].1, 0.0);
        assert!((st.scheduled[0].2 - 2.0 / RATE as f64).abs() < 1e-12);
        assert_eq!(h.player.accumulated().unwrap().len(), 2);
    }

    #[test]
    fn scenario_b_partial_sample_carried_across_chunks() {
        let mut h = harness(HandoffConfig::default().with_transition(false));
        let bytes = pcm(&[0.25, 0.75]);
        h.player
            .start_streaming(ScriptedSource::new([bytes[..3].to_vec(), bytes[3..].to_vec()]))
            .unwrap();

        assert_eq!(h.player.scheduler().start_times().len(), 1);
        assert_eq!(h.player.leftover_bytes(), 0);
        assert_eq!(&*h.player.accumulated().unwrap().samples, &[0.25, 0.75]);
    }

    #[test]
    fn scenario_c_playing_handoff_moves_audio_to_buffered_engine() {
        let mut h = harness(HandoffConfig::default());
        let samples = tone(RATE as usize * 2);
        let bytes = pcm(&samples);
        let source = ClockedSource {
            inner: ScriptedSource::new(bytes.chunks(4099).map(<[u8]>::to_vec)),
            stream: h.stream.clone(),
            step: 0.02,
        };
        h.player.start_streaming(source).unwrap();
        let handoff_clock = h.stream.state.borrow().clock;
        assert!(handoff_clock > 0.5);

        assert_eq!(h.player.transition_state(), TransitionState::Transitioned);
        assert!(h.player.is_transitioned());
        assert!(h.player.is_playing());
        assert!(h.player.transition_fault().is_none());

        let buffered = h.buffered.state.borrow();
        assert!(buffered.playing);
        assert!((buffered.position - handoff_clock).abs() < 0.1);
        assert!(!h.stream.is_audible());

        let calls = h.log.borrow();
        let last_stop = calls.iter().rposition(|c| c == "stream.stop").unwrap();
        let play = calls.iter().position(|c| c == "buffered.play").unwrap();
        assert!(last_stop < play);
        assert_eq!(h.rec.count("transitioned"), 1);
        assert!(h.rec.saw("audio_ready"));
    }

    #[test]
    fn handoff_resource_reproduces_streamed_samples() {
        let mut h = harness(HandoffConfig::default());
        let samples = tone(1000);
        h.player
            .start_streaming(ScriptedSource::new(pcm(&samples).chunks(7).map(<[u8]>::to_vec)))
            .unwrap();

        let loaded = h.buffered.state.borrow().loaded.clone().unwrap();
        let mut reader = hound::WavReader::new(std::io::Cursor::new(loaded.bytes().to_vec())).unwrap();
        let decoded: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn scenario_d_rewind_only_after_transition() {
        let mut h = harness(HandoffConfig::default());
        h.buffered.state.borrow_mut().ready_on_load = false;
        h.player
            .start_streaming(ScriptedSource::new([pcm(&tone(RATE as usize * 30))]))
            .unwrap();
        assert_eq!(h.player.transition_state(), TransitionState::Streaming);

        h.player.rewind(10.0).unwrap();
        assert!(!h.log.borrow().iter().any(|c| c.starts_with("buffered.seek")));

        h.stream.set_clock(15.0);
        h.buffered.emit(EngineEvent::BufferedReady);
        pump(&mut h.player);
        assert!(h.player.is_transitioned());
        assert_eq!(h.buffered.state.borrow().position, 15.0);

        h.player.rewind(10.0).unwrap();
        assert_eq!(h.buffered.state.borrow().position, 5.0);
        h.player.rewind(10.0).unwrap();
        assert_eq!(h.buffered.state.borrow().position, 0.0);
        assert_eq!(h.player.current_time(), 0.0);
    }

    #[test]
    fn scheduled_durations_sum_to_accumulated_duration() {
        let mut h = harness(HandoffConfig::default().with_transition(false));
        let bytes = pcm(&tone(12_345));
        let sizes = [1usize, 3, 4, 5, 1000, 17, 4096];
        let mut chunks = Vec::new();
        let mut rest = &bytes[..];
        let mut i = 0;
        while !rest.is_empty() {
            let n = sizes[i % sizes.len()].min(rest.len());
            chunks.push(rest[..n].to_vec());
            rest = &rest[n..];
            i += 1;
        }
        h.player.start_streaming(ScriptedSource::new(chunks)).unwrap();

        let st = h.stream.state.borrow();
        for pair in st.scheduled.windows(2) {
            let (_, start, dur) = pair[0];
            assert!((pair[1].1 - (start + dur)).abs() < 1e-9);
        }
        let total: f64 = st.scheduled.iter().map(|(_, _, d)| d).sum();
        let acc = h.player.accumulated().unwrap();
        assert_eq!(acc.len(), 12_345);
        assert!((total - acc.duration).abs() < 1e-9);
        assert!((h.player.duration() - acc.duration).abs() < 1e-12);
    }

    #[test]
    fn stop_is_idempotent_and_clears_play_state() {
        let mut h = harness(HandoffConfig::default());
        h.buffered.state.borrow_mut().ready_on_load = false;
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(100))])).unwrap();
        assert!(h.player.is_playing());

        h.player.stop();
        h.player.stop();
        h.player.stop();
        assert!(!h.player.is_playing());
        assert!(!h.stream.is_audible());
        assert_eq!(h.player.transition_state(), TransitionState::Streaming);
    }

    #[test]
    fn read_error_aborts_but_keeps_scheduled_audio() {
        let mut h = harness(HandoffConfig::default());
        let source = ScriptedSource::new([pcm(&tone(10))]).failing_with(io::ErrorKind::ConnectionReset);
        let err = h.player.start_streaming(source).unwrap_err();
        assert!(format!("{err:#}").contains("read audio stream"));

        assert!(h.stream.is_audible());
        assert!(h.player.accumulated().is_none());
        assert_eq!(h.player.transition_state(), TransitionState::Streaming);
    }

    #[test]
    fn read_error_session_ends_once_scheduled_audio_drains() {
        let mut h = harness(HandoffConfig::default());
        let source = ScriptedSource::new([pcm(&tone(240))]).failing_with(io::ErrorKind::ConnectionReset);
        assert!(h.player.start_streaming(source).is_err());
        assert!(h.player.is_playing());
        assert!(!h.rec.saw("ended"));

        h.stream.set_clock(1.0);
        h.stream.finish_elapsed();
        pump(&mut h.player);

        assert!(!h.player.is_playing());
        assert_eq!(h.rec.count("ended"), 1);
        assert!(!h.player.is_transitioned());
        assert!(!h.rec.saw("audio_ready"));
        assert!(h.log.borrow().iter().all(|c| c != "buffered.load"));
    }

    #[test]
    fn read_error_before_any_audio_ends_immediately() {
        let mut h = harness(HandoffConfig::default());
        let source = ScriptedSource::new(Vec::<Vec<u8>>::new()).failing_with(io::ErrorKind::UnexpectedEof);
        assert!(h.player.start_streaming(source).is_err());
        assert!(!h.player.is_playing());
        assert_eq!(h.rec.count("ended"), 1);
    }

    #[test]
    fn cancel_handle_stops_ingestion_before_next_chunk() {
        struct CancelAfterFirst {
            inner: ScriptedSource,
            cancel: CancelHandle,
            reads: usize,
        }

        impl ChunkSource for CancelAfterFirst {
            fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
                self.reads += 1;
                if self.reads == 2 {
                    self.cancel.cancel();
                }
                self.inner.next_chunk()
            }
        }

        let mut h = harness(HandoffConfig::default());
        let source = CancelAfterFirst {
            inner: ScriptedSource::new([pcm(&[0.1]), pcm(&[0.2]), pcm(&[0.3])]),
            cancel: h.player.cancel_handle(),
            reads: 0,
        };
        h.player.start_streaming(source).unwrap();

        assert_eq!(h.player.scheduler().start_times().len(), 1);
        assert!(h.stream.is_audible());
        assert!(h.player.accumulated().is_none());
        assert!(h.player.is_playing());

        h.stream.set_clock(1.0);
        h.stream.finish_elapsed();
        pump(&mut h.player);
        assert!(!h.player.is_playing());
        assert_eq!(h.rec.count("ended"), 1);
    }

    #[test]
    fn new_session_tears_down_previous() {
        let mut h = harness(HandoffConfig::default());
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(2400))])).unwrap();
        assert!(h.player.is_transitioned());

        h.buffered.state.borrow_mut().ready_on_load = false;
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(480))])).unwrap();

        assert_eq!(h.player.transition_state(), TransitionState::Streaming);
        assert_eq!(h.player.snapshot().session, 2);
        assert_eq!(h.player.scheduler().start_times(), &[0.0]);
        assert_eq!(h.stream.state.borrow().live.len(), 1);
        assert_eq!(h.player.accumulated().unwrap().len(), 480);
        assert!(h.log.borrow().iter().any(|c| c == "buffered.stop"));
    }

    #[test]
    fn disabled_transition_ends_on_final_chunk() {
        let mut h = harness(HandoffConfig::default().with_transition(false));
        h.player
            .start_streaming(ScriptedSource::new([pcm(&tone(RATE as usize)), pcm(&tone(RATE as usize))]))
            .unwrap();
        assert!(!h.log.borrow().iter().any(|c| c == "buffered.load"));
        assert!(h.rec.saw("audio_ready"));

        h.stream.set_clock(1.0);
        h.stream.finish_elapsed();
        pump(&mut h.player);
        assert!(h.player.is_playing());
        assert!(!h.rec.saw("ended"));

        h.stream.set_clock(2.0);
        h.stream.finish_elapsed();
        pump(&mut h.player);
        assert!(!h.player.is_playing());
        assert_eq!(h.rec.count("ended"), 1);
        assert_eq!(h.player.transition_state(), TransitionState::Streaming);
        assert_eq!(h.player.current_time(), 2.0);
    }

    #[test]
    fn rejected_chunk_is_skipped_but_timeline_and_accumulation_hold() {
        let mut h = harness(HandoffConfig::default().with_transition(false));
        h.stream.state.borrow_mut().reject_next = 1;
        h.player
            .start_streaming(ScriptedSource::new([pcm(&tone(240)), pcm(&tone(240))]))
            .unwrap();

        assert!(h.rec.saw("rejected=0"));
        assert_eq!(h.player.scheduler().start_times(), &[0.0, 0.01]);
        assert_eq!(h.stream.state.borrow().scheduled.len(), 1);
        assert_eq!(h.player.accumulated().unwrap().len(), 480);
    }

    #[test]
    fn paused_handoff_keeps_buffered_paused_until_play() {
        let mut h = harness(HandoffConfig::default());
        h.buffered.state.borrow_mut().ready_on_load = false;
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(RATE as usize * 4))])).unwrap();

        h.stream.set_clock(1.5);
        h.player.pause().unwrap();
        assert!(!h.player.is_playing());
        assert_eq!(h.player.current_time(), 1.5);

        h.buffered.emit(EngineEvent::BufferedReady);
        pump(&mut h.player);
        assert!(h.player.is_transitioned());
        {
            let st = h.buffered.state.borrow();
            assert!(!st.playing);
            assert_eq!(st.position, 1.5);
        }

        h.player.play().unwrap();
        assert!(h.buffered.state.borrow().playing);
        assert!(h.player.is_playing());
        assert!(!h.stream.is_audible());
    }

    #[test]
    fn buffered_end_finishes_playback_and_play_restarts() {
        let mut h = harness(HandoffConfig::default());
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(2400))])).unwrap();
        assert!(h.player.is_transitioned());

        h.buffered.state.borrow_mut().position = 0.1;
        h.buffered.emit(EngineEvent::BufferedEnded);
        pump(&mut h.player);
        assert!(!h.player.is_playing());
        assert!(h.rec.saw("ended"));

        h.player.play().unwrap();
        assert!(h.log.borrow().iter().any(|c| c == "buffered.seek(0)"));
        assert!(h.player.is_playing());
    }

    #[test]
    fn seek_failure_during_handoff_is_reported() {
        let mut h = harness(HandoffConfig::default());
        h.buffered.state.borrow_mut().fail_seek = true;
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(2400))])).unwrap();

        assert!(h.player.is_transitioned());
        assert!(matches!(
            h.player.transition_fault(),
            Some(TransitionFault::SeekFailed { .. })
        ));
        assert!(h.rec.saw("fault"));
        assert!(h.player.snapshot().transition_fault.is_some());
        assert!(!h.stream.is_audible());
    }

    #[test]
    fn encode_failure_stays_on_streaming_engine() {
        let (stream, buffered, _log) = engines();
        let mut player = Player::new(
            HandoffConfig::default(),
            stream.clone(),
            buffered,
            BrokenEncoder,
            Box::new(crate::listener::NoopListener),
        );
        player.init();
        player.start_streaming(ScriptedSource::new([pcm(&tone(100))])).unwrap();
        assert_eq!(player.transition_state(), TransitionState::Streaming);
        assert!(player.is_playing());
        assert!(stream.is_audible());
        assert_eq!(player.accumulated().unwrap().len(), 100);
    }

    #[test]
    fn device_suspension_is_observable_and_resumed_by_interaction() {
        let mut h = harness(HandoffConfig::default().with_transition(false));
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(100))])).unwrap();

        h.stream.emit(EngineEvent::DeviceSuspended);
        pump(&mut h.player);
        assert!(h.player.is_device_suspended());
        assert!(h.rec.saw("suspended=true"));

        h.player.notify_user_interaction().unwrap();
        assert!(!h.player.is_device_suspended());
        assert!(h.rec.saw("suspended=false"));
        assert!(h.log.borrow().iter().any(|c| c == "stream.resume"));
    }

    #[test]
    fn tracker_publishes_streaming_clock_while_playing() {
        let config = HandoffConfig {
            poll_interval: Duration::from_millis(2),
            ..HandoffConfig::default().with_transition(false)
        };
        let mut h = harness(config);
        h.player.start_streaming(ScriptedSource::new([pcm(&tone(RATE as usize))])).unwrap();

        h.stream.set_clock(0.25);
        assert!(h.player.poll_events(Duration::from_millis(500)));
        assert_eq!(h.player.current_time(), 0.25);

        h.player.pause().unwrap();
        h.stream.set_clock(0.9);
        assert!(!h.player.poll_events(Duration::from_millis(20)));
        assert_eq!(h.player.current_time(), 0.25);
    }

    #[test]
    fn start_requires_init_and_shutdown_is_idempotent() {
        let (stream, buffered, _log) = engines();
        let mut player = Player::new(
            HandoffConfig::default(),
            stream.clone(),
            buffered,
            WavEncoder,
            Box::new(crate::listener::NoopListener),
        );
        assert!(player.start_streaming(ScriptedSource::new([pcm(&[0.0])])).is_err());

        player.shutdown();
        player.init();
        assert!(stream.state.borrow().events.is_some());
        player.shutdown();
        player.shutdown();
        assert!(stream.state.borrow().events.is_none());
    }

    #[test]
    fn empty_stream_ends_immediately() {
        let mut h = harness(HandoffConfig::default().with_transition(false));
        h.player.start_streaming(ScriptedSource::new(Vec::<Vec<u8>>::new())).unwrap();
        assert!(!h.player.is_playing());
        assert!(h.rec.saw("ended"));
        assert_eq!(h.player.duration(), 0.0);
    }
}
