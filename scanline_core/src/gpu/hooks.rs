// scanline_core/src/gpu/hooks.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// What a render hook sees of the frame it runs in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub frame_number: u64,
    pub delta_seconds: f32,
}

pub type FrameHook = Box<dyn Fn(&FrameContext) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHookId(u64);

/// Per-frame callbacks invoked by the render domain.
///
/// `run_frame` holds the read lock for the whole frame, so `unregister` cannot
/// return while the hook being removed is still executing.
#[derive(Default)]
pub struct FrameHookRegistry {
    hooks: RwLock<Vec<(FrameHookId, FrameHook)>>,
    next_id: AtomicU64,
    frames_run: AtomicU64,
}

impl std::fmt::Debug for FrameHookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHookRegistry")
            .field("hooks", &self.len())
            .field("frames_run", &self.frames_run())
            .finish()
    }
}

impl FrameHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: FrameHook) -> FrameHookId {
        let id = FrameHookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, hook));
        id
    }

    /// Removes a hook. Returns `false` if it was not registered.
    pub fn unregister(&self, id: FrameHookId) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|(hook_id, _)| *hook_id != id);
        hooks.len() != before
    }

    pub fn len(&self) -> usize {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn frames_run(&self) -> u64 {
        self.frames_run.load(Ordering::Acquire)
    }

    /// Invokes every registered hook once, in registration order.
    pub fn run_frame(&self, delta_seconds: f32) {
        let frame_number = self.frames_run.fetch_add(1, Ordering::AcqRel);
        let context = FrameContext {
            frame_number,
            delta_seconds,
        };
        let hooks = self.hooks.read().unwrap_or_else(PoisonError::into_inner);
        for (_, hook) in hooks.iter() {
            hook(&context);
        }
    }
}
