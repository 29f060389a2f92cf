//! Host-stack guard for the recursive evaluation entry points.

/// Keep this much stack free before recursing.
const RED_ZONE: usize = 100 * 1024;

/// Size of each freshly allocated stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first moving to a new stack segment if the current one is
/// nearly exhausted. Script-level depth is bounded separately by
/// `MachineConfig::max_call_depth`.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
