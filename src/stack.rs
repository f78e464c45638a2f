// Stack growth for deep evaluation
//
// One reference level runs through the evaluator, the interpolation engine and the
// bridge before it reaches `evaluate_in` again, so the depth guard alone does not
// keep a long chain inside a 2 MB thread stack.

/// Run `f`, switching to a freshly allocated stack segment when little room is left.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Room that must remain before `f` runs on the current segment.
    const RED_ZONE: usize = 128 * 1024;

    /// Size of each new segment.
    const STACK_PER_RECURSION: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
