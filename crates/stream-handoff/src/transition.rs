//! Streaming → buffered handoff state machine.
//!
//! ```text
//! Streaming ──(stream complete ∧ enabled ∧ buffered ready)──▶ Ready ──▶ Transitioned
//! ```
//!
//! `Ready` is entered and left within one call to [`TransitionController::run`];
//! `Transitioned` is terminal until the controller is reset for a new session.

use serde::Serialize;

use crate::engine::{BufferedOutput, StreamingOutput};
use crate::scheduler::PlaybackScheduler;

/// Which engine is (or is about to become) authoritative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionState {
    #[default]
    Streaming,
    Ready,
    Transitioned,
}

/// A handoff that completed with an inconsistency.
///
/// The handoff is never aborted; these are reported, not returned as errors.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransitionFault {
    #[error("could not capture streaming position: {0}")]
    CaptureFailed(String),
    #[error("could not seek buffered engine to {position:.3}s: {reason}")]
    SeekFailed { position: f64, reason: String },
    #[error("could not start buffered engine: {0}")]
    StartFailed(String),
}

/// Result of a completed handoff.
#[derive(Clone, Debug, PartialEq)]
pub struct TransitionOutcome {
    /// Position captured from the virtual clock (or the fallback).
    pub position: f64,
    /// Whether the buffered engine was started.
    pub started: bool,
    pub fault: Option<TransitionFault>,
}

#[derive(Debug)]
pub struct TransitionController {
    enabled: bool,
    state: TransitionState,
    stream_complete: bool,
    resource_ready: bool,
    fault: Option<TransitionFault>,
}

impl TransitionController {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: TransitionState::Streaming,
            stream_complete: false,
            resource_ready: false,
            fault: None,
        }
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn is_transitioned(&self) -> bool {
        self.state == TransitionState::Transitioned
    }

    /// Fault recorded by the handoff, if any.
    pub fn fault(&self) -> Option<&TransitionFault> {
        self.fault.as_ref()
    }

    /// The input stream signalled completion.
    pub fn mark_stream_complete(&mut self) {
        self.stream_complete = true;
    }

    /// The buffered engine reported its resource can play.
    pub fn mark_resource_ready(&mut self) {
        self.resource_ready = true;
    }

    /// All guards for `Streaming → Ready` hold.
    pub fn is_due(&self) -> bool {
        self.state == TransitionState::Streaming
            && self.enabled
            && self.stream_complete
            && self.resource_ready
    }

    /// Perform the handoff if it is due; `None` otherwise.
    ///
    /// `playing` is the session's play intent. `fallback_position` is used when
    /// the virtual clock cannot be read (the last published position).
    pub fn run<O, B>(
        &mut self,
        scheduler: &mut PlaybackScheduler<O>,
        buffered: &mut B,
        playing: bool,
        fallback_position: f64,
    ) -> Option<TransitionOutcome>
    where
        O: StreamingOutput,
        B: BufferedOutput,
    {
        if !self.is_due() {
            return None;
        }
        self.state = TransitionState::Ready;
        tracing::debug!("transition ready");

        let mut fault = None;
        let position = match scheduler.current_time() {
            Ok(t) => t,
            Err(e) => {
                fault = Some(TransitionFault::CaptureFailed(format!("{e:#}")));
                fallback_position
            }
        };

        if let Err(e) = buffered.seek(position) {
            fault.get_or_insert(TransitionFault::SeekFailed {
                position,
                reason: format!("{e:#}"),
            });
        }

        // Silence the streaming engine before the buffered one starts so the
        // two never sound together.
        scheduler.stop();
        let mut started = false;
        if playing {
            match buffered.play() {
                Ok(()) => started = true,
                Err(e) => {
                    fault.get_or_insert(TransitionFault::StartFailed(format!("{e:#}")));
                }
            }
        }

        self.state = TransitionState::Transitioned;
        match &fault {
            Some(f) => tracing::warn!(position_s = position, "transitioned with fault: {f}"),
            None => tracing::info!(position_s = position, playing, "transitioned to buffered playback"),
        }
        self.fault = fault.clone();
        Some(TransitionOutcome {
            position,
            started,
            fault,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::SampleChunk;
    use crate::engine::fake::{FakeBuffered, FakeStreaming, engines};

    fn setup() -> (PlaybackScheduler<FakeStreaming>, FakeStreaming, FakeBuffered, crate::engine::fake::CallLog) {
        let (stream, buffered, log) = engines();
        let mut sched = PlaybackScheduler::new(stream.clone());
        sched.begin().unwrap();
        sched.schedule(&SampleChunk::new(vec![0.0; 48_000], 24_000)).unwrap();
        (sched, stream, buffered, log)
    }

    #[test]
    fn waits_for_every_guard() {
        let (mut sched, _stream, mut buffered, _log) = setup();
        let mut ctl = TransitionController::new(true);
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_none());
        ctl.mark_resource_ready();
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_none());
        ctl.mark_stream_complete();
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_some());
        assert_eq!(ctl.state(), TransitionState::Transitioned);
    }

    #[test]
    fn disabled_controller_never_fires() {
        let (mut sched, _stream, mut buffered, _log) = setup();
        let mut ctl = TransitionController::new(false);
        ctl.mark_stream_complete();
        ctl.mark_resource_ready();
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_none());
        assert_eq!(ctl.state(), TransitionState::Streaming);
    }

    #[test]
    fn playing_handoff_stops_stream_before_starting_buffered() {
        let (mut sched, stream, mut buffered, log) = setup();
        stream.set_clock(1.25);
        let mut ctl = TransitionController::new(true);
        ctl.mark_stream_complete();
        ctl.mark_resource_ready();

        let out = ctl.run(&mut sched, &mut buffered, true, 0.0).unwrap();
        assert_eq!(out.position, 1.25);
        assert!(out.started);
        assert!(out.fault.is_none());

        let calls = log.borrow();
        let stop = calls.iter().position(|c| c == "stream.stop").unwrap();
        let play = calls.iter().position(|c| c == "buffered.play").unwrap();
        let seek = calls.iter().position(|c| c == "buffered.seek(1.25)").unwrap();
        assert!(seek < play);
        assert!(stop < play);
        assert!(buffered.state.borrow().playing);
        assert!(stream.state.borrow().live.is_empty());
    }

    #[test]
    fn paused_handoff_leaves_buffered_paused_at_position() {
        let (mut sched, stream, mut buffered, _log) = setup();
        stream.set_clock(0.5);
        let mut ctl = TransitionController::new(true);
        ctl.mark_stream_complete();
        ctl.mark_resource_ready();

        let out = ctl.run(&mut sched, &mut buffered, false, 0.0).unwrap();
        assert!(!out.started);
        let st = buffered.state.borrow();
        assert!(!st.playing);
        assert_eq!(st.position, 0.5);
    }

    #[test]
    fn transition_happens_exactly_once() {
        let (mut sched, _stream, mut buffered, _log) = setup();
        let mut ctl = TransitionController::new(true);
        ctl.mark_stream_complete();
        ctl.mark_resource_ready();
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_some());
        ctl.mark_resource_ready();
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_none());
        assert!(ctl.is_transitioned());
    }

    #[test]
    fn capture_failure_uses_fallback_and_still_transitions() {
        let (mut sched, stream, mut buffered, _log) = setup();
        stream.state.borrow_mut().fail_clock = true;
        let mut ctl = TransitionController::new(true);
        ctl.mark_stream_complete();
        ctl.mark_resource_ready();

        let out = ctl.run(&mut sched, &mut buffered, true, 0.7).unwrap();
        assert_eq!(out.position, 0.7);
        assert!(matches!(out.fault, Some(TransitionFault::CaptureFailed(_))));
        assert!(ctl.is_transitioned());
        assert!(ctl.fault().is_some());
        assert!(stream.state.borrow().live.is_empty());
    }

    #[test]
    fn seek_failure_is_reported_not_fatal() {
        let (mut sched, _stream, mut buffered, _log) = setup();
        buffered.state.borrow_mut().fail_seek = true;
        let mut ctl = TransitionController::new(true);
        ctl.mark_stream_complete();
        ctl.mark_resource_ready();

        let out = ctl.run(&mut sched, &mut buffered, true, 0.0).unwrap();
        assert!(matches!(out.fault, Some(TransitionFault::SeekFailed { .. })));
        assert!(out.started);
        assert_eq!(ctl.state(), TransitionState::Transitioned);
    }

    #[test]
    fn transitioned_is_terminal() {
        let (mut sched, _stream, mut buffered, _log) = setup();
        let mut ctl = TransitionController::new(true);
        ctl.mark_stream_complete();
        ctl.mark_resource_ready();
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_some());
        ctl.mark_resource_ready();
        assert!(!ctl.is_due());
        assert!(ctl.run(&mut sched, &mut buffered, true, 0.0).is_none());
        assert_eq!(ctl.state(), TransitionState::Transitioned);
    }
}
