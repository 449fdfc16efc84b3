use std::time::Duration;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Deepest chain of nested user-function calls before the call fails.
    pub max_call_depth: usize,
    /// Delay after each console write, for watching output appear.
    pub pacing: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            pacing: None,
        }
    }
}

impl RunConfig {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_pacing_ms(mut self, millis: u64) -> Self {
        self.pacing = (millis > 0).then(|| Duration::from_millis(millis));
        self
    }
}
