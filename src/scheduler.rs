//! Frame pacing.

use instant::{Duration, Instant};

use crate::animation::tween::since;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Running { last: Option<Instant> },
    Stopped,
}

/// One frame handed out by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTick {
    pub index: u64,
    pub now: Instant,
    /// Time since the previous frame, zero for the first frame after a start.
    pub dt: Duration,
}

#[derive(Debug)]
pub struct FrameScheduler {
    state: State,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            frames: 0,
        }
    }

    /// Begin handing out frames. Starting a running scheduler changes nothing;
    /// starting a stopped one resumes it.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        log::info!("frame scheduler started");
        self.state = State::Running { last: None };
    }

    /// Stop handing out frames. Safe to call any number of times.
    pub fn stop(&mut self) {
        if self.state == State::Stopped {
            return;
        }
        log::info!("frame scheduler stopped after {} frames", self.frames);
        self.state = State::Stopped;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Turn a display refresh into a frame, `None` unless running.
    pub fn tick(&mut self, now: Instant) -> Option<FrameTick> {
        let State::Running { last } = &mut self.state else {
            return None;
        };
        let dt = last.map(|last| since(now, last)).unwrap_or(Duration::ZERO);
        *last = Some(now);
        let tick = FrameTick {
            index: self.frames,
            now,
            dt,
        };
        self.frames += 1;
        Some(tick)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}
