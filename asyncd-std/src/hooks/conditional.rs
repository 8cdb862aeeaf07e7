//! Conditional Hook - Execute hooks based on conditions.

use asyncd_core::{Connection, Event, Hook, HookResult};

/// A Hook that conditionally executes an inner Hook.
///
/// The inner hook only runs when the condition returns `true`; otherwise the
/// event escalates untouched.
///
/// # Example
///
/// ```rust,ignore
/// use asyncd::{EventMask, hooks::ConditionalHook};
///
/// // Only look at connections that already sent something
/// let hook = ConditionalHook::new(
///     |_event, conn: &dyn Connection| !conn.input().is_empty(),
///     Parser::default(),
/// );
/// server.register_hook(EventMask::READ, hook)?;
/// ```
pub struct ConditionalHook<C, H> {
    condition: C,
    inner: H,
}

impl<C, H> ConditionalHook<C, H> {
    /// Create a new `ConditionalHook`.
    pub fn new(condition: C, inner: H) -> Self {
        Self { condition, inner }
    }
}

impl<C, H> Hook for ConditionalHook<C, H>
where
    C: Fn(Event, &dyn Connection) -> bool + Send + Sync + 'static,
    H: Hook,
{
    fn on_event(&self, event: Event, conn: &mut dyn Connection) -> HookResult {
        if (self.condition)(event, &*conn) {
            self.inner.on_event(event, conn)
        } else {
            HookResult::Next
        }
    }
}

/// A Hook that executes one of two inner hooks based on a condition.
pub struct BranchHook<C, T, E> {
    condition: C,
    then_hook: T,
    else_hook: E,
}

impl<C, T, E> BranchHook<C, T, E> {
    /// Create a new `BranchHook`.
    pub fn new(condition: C, then_hook: T, else_hook: E) -> Self {
        Self {
            condition,
            then_hook,
            else_hook,
        }
    }
}

impl<C, T, E> Hook for BranchHook<C, T, E>
where
    C: Fn(Event, &dyn Connection) -> bool + Send + Sync + 'static,
    T: Hook,
    E: Hook,
{
    fn on_event(&self, event: Event, conn: &mut dyn Connection) -> HookResult {
        if (self.condition)(event, &*conn) {
            self.then_hook.on_event(event, conn)
        } else {
            self.else_hook.on_event(event, conn)
        }
    }
}
