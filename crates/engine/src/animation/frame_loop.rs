/// Whether frames are currently being produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    Stopped,
    Running,
}

/// Self-stopping frame driver. The owner asks for frames through
/// [`FrameLoop::request`] and reports after each pass through
/// [`FrameLoop::settle`].
#[derive(Debug, Default)]
pub struct FrameLoop {
    state: LoopState,
    starts: u64,
}

impl FrameLoop {
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Number of Stopped to Running transitions so far.
    pub fn starts(&self) -> u64 {
        self.starts
    }

    /// Returns true only when this call started the loop; the caller must
    /// then schedule exactly one frame.
    pub fn request(&mut self) -> bool {
        match self.state {
            LoopState::Running => false,
            LoopState::Stopped => {
                self.state = LoopState::Running;
                self.starts = self.starts.saturating_add(1);
                true
            }
        }
    }

    /// Called after each frame pass. The loop keeps running only while work
    /// remains.
    pub fn settle(&mut self, has_work: bool) -> LoopState {
        if !has_work {
            self.state = LoopState::Stopped;
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_starts_once_until_settled_idle() {
        let mut frame_loop = FrameLoop::default();
        assert_eq!(frame_loop.state(), LoopState::Stopped);

        assert!(frame_loop.request());
        assert!(!frame_loop.request());
        assert!(!frame_loop.request());
        assert_eq!(frame_loop.settle(true), LoopState::Running);
        assert!(!frame_loop.request());

        assert_eq!(frame_loop.settle(false), LoopState::Stopped);
        assert!(frame_loop.request());
        assert_eq!(frame_loop.starts(), 2);
    }

    #[test]
    fn settle_without_request_stays_stopped() {
        let mut frame_loop = FrameLoop::default();
        assert_eq!(frame_loop.settle(true), LoopState::Stopped);
        assert!(!frame_loop.is_running());
    }
}
