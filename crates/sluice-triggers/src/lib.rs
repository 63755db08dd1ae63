//! Trigger state machines for stream processing in sluice.
//!
//! A trigger decides, per window, when accumulated results should be
//! emitted (fired) and when window state should be discarded (purged).
//! Triggers are driven by element arrivals and by event-time and
//! processing-time timer callbacks, and they are stateless values: any
//! per-(key, window) state lives behind the [`TriggerContext`] supplied by
//! the runtime, in named slots scoped to the window at hand.
//!
//! The runtime serializes all callbacks for a key, so trigger logic never
//! needs internal locking; it must only be re-enterable between callbacks.

use serde::{Deserialize, Serialize};
use sluice_error::{inconsistent_state, invalid_configuration, Result};
use sluice_window::Window;

/// Decision produced by a trigger callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerResult {
    /// Nothing observable happens
    Continue,
    /// Emit the window's current contents, keep its state
    Fire,
    /// Discard the window's state without emitting
    Purge,
    /// Emit, then discard
    FireAndPurge,
}

impl TriggerResult {
    pub fn is_fire(&self) -> bool {
        matches!(self, TriggerResult::Fire | TriggerResult::FireAndPurge)
    }

    pub fn is_purge(&self) -> bool {
        matches!(self, TriggerResult::Purge | TriggerResult::FireAndPurge)
    }
}

/// Runtime services available to a trigger during a callback.
///
/// The state accessors are scoped by the runtime to the (key, window) pair
/// the callback concerns; slot names only distinguish slots within that
/// scope.
pub trait TriggerContext {
    /// Current processing time in milliseconds.
    fn current_processing_time(&self) -> i64;

    /// Current event-time watermark in milliseconds.
    fn current_watermark(&self) -> i64;

    /// Register an event-time timer; registration is idempotent.
    fn register_event_time_timer(&mut self, time: i64);

    /// Register a processing-time timer; registration is idempotent.
    fn register_processing_time_timer(&mut self, time: i64);

    fn delete_event_time_timer(&mut self, time: i64);

    fn delete_processing_time_timer(&mut self, time: i64);

    /// Read a named state slot scoped to the current (key, window).
    fn state_value(&mut self, name: &'static str) -> Option<i64>;

    fn set_state_value(&mut self, name: &'static str, value: i64);

    fn clear_state_value(&mut self, name: &'static str);
}

/// A per-window policy deciding when to emit and discard results.
pub trait Trigger: Send + Sync {
    /// Called for every element assigned to the window.
    fn on_element(
        &self,
        window: Window,
        timestamp: i64,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult>;

    /// Called when an event-time timer registered by this trigger fires.
    fn on_event_time(
        &self,
        time: i64,
        window: Window,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult>;

    /// Called when a processing-time timer registered by this trigger fires.
    fn on_processing_time(
        &self,
        time: i64,
        window: Window,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult>;

    /// Whether this trigger tolerates its window being merged away.
    fn can_merge(&self) -> bool {
        false
    }

    /// Called when several windows merged into `window`. The default is an
    /// error: merging a non-mergeable trigger is a collaborator bug.
    fn on_merge(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        let _ = (window, ctx);
        Err(inconsistent_state(
            "trigger does not support merging but was merged",
        ))
    }

    /// Release everything this trigger holds for the window (timers, state).
    fn clear(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()>;
}

/// Fires once the watermark passes the end of the window.
///
/// Never purges on its own: the surrounding policy decides when state is
/// discarded, which keeps re-firing for allowed lateness possible.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventTimeTrigger;

impl EventTimeTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl Trigger for EventTimeTrigger {
    fn on_element(
        &self,
        window: Window,
        _timestamp: i64,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        if window.max_timestamp() <= ctx.current_watermark() {
            // The window is already closeable; a late-but-in-bounds element
            // fires it immediately.
            Ok(TriggerResult::Fire)
        } else {
            ctx.register_event_time_timer(window.max_timestamp());
            Ok(TriggerResult::Continue)
        }
    }

    fn on_event_time(
        &self,
        time: i64,
        window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        if time == window.max_timestamp() {
            Ok(TriggerResult::Fire)
        } else {
            Ok(TriggerResult::Continue)
        }
    }

    fn on_processing_time(
        &self,
        _time: i64,
        _window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn can_merge(&self) -> bool {
        true
    }

    fn on_merge(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        if window.max_timestamp() > ctx.current_watermark() {
            ctx.register_event_time_timer(window.max_timestamp());
        }
        Ok(())
    }

    fn clear(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        ctx.delete_event_time_timer(window.max_timestamp());
        Ok(())
    }
}

/// Fires once processing time passes the end of the window.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessingTimeTrigger;

impl ProcessingTimeTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl Trigger for ProcessingTimeTrigger {
    fn on_element(
        &self,
        window: Window,
        _timestamp: i64,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        ctx.register_processing_time_timer(window.max_timestamp());
        Ok(TriggerResult::Continue)
    }

    fn on_event_time(
        &self,
        _time: i64,
        _window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_processing_time(
        &self,
        time: i64,
        window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        if time == window.max_timestamp() {
            Ok(TriggerResult::Fire)
        } else {
            Ok(TriggerResult::Continue)
        }
    }

    fn can_merge(&self) -> bool {
        true
    }

    fn on_merge(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        if window.max_timestamp() > ctx.current_processing_time() {
            ctx.register_processing_time_timer(window.max_timestamp());
        }
        Ok(())
    }

    fn clear(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        ctx.delete_processing_time_timer(window.max_timestamp());
        Ok(())
    }
}

const COUNT_SLOT: &str = "count";

/// Fires and purges once a window has seen a configured number of elements.
#[derive(Debug, Clone, Copy)]
pub struct CountTrigger {
    threshold: i64,
}

impl CountTrigger {
    /// Create a trigger firing every `threshold` elements.
    pub fn of(threshold: i64) -> Result<Self> {
        if threshold <= 0 {
            return Err(invalid_configuration(
                "CountTrigger parameters must satisfy 0 < count",
            ));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

impl Trigger for CountTrigger {
    fn on_element(
        &self,
        _window: Window,
        _timestamp: i64,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        let count = ctx.state_value(COUNT_SLOT).unwrap_or(0) + 1;
        if count >= self.threshold {
            ctx.set_state_value(COUNT_SLOT, 0);
            Ok(TriggerResult::FireAndPurge)
        } else {
            ctx.set_state_value(COUNT_SLOT, count);
            Ok(TriggerResult::Continue)
        }
    }

    fn on_event_time(
        &self,
        _time: i64,
        _window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_processing_time(
        &self,
        _time: i64,
        _window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn can_merge(&self) -> bool {
        true
    }

    fn on_merge(&self, _window: Window, _ctx: &mut dyn TriggerContext) -> Result<()> {
        // Counts are migrated with the rest of the window state by the
        // runtime's merge callback.
        Ok(())
    }

    fn clear(&self, _window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        ctx.clear_state_value(COUNT_SLOT);
        Ok(())
    }
}

const NEXT_FIRE_SLOT: &str = "continuous.next_fire";

/// Periodic early firing on top of another trigger.
///
/// While the window is open a processing-time timer fires every `interval`,
/// emitting partial results without purging; the wrapped trigger keeps
/// deciding the window's final fate.
#[derive(Debug, Clone, Copy)]
pub struct ContinuousTrigger<T: Trigger> {
    inner: T,
    interval: i64,
}

impl<T: Trigger> ContinuousTrigger<T> {
    /// Wrap `inner`, additionally firing every `interval_ms` of processing time.
    pub fn of(inner: T, interval_ms: i64) -> Result<Self> {
        if interval_ms <= 0 {
            return Err(invalid_configuration(
                "ContinuousTrigger parameters must satisfy 0 < interval",
            ));
        }
        Ok(Self {
            inner,
            interval: interval_ms,
        })
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    fn schedule_next(&self, from: i64, ctx: &mut dyn TriggerContext) {
        let next = from + self.interval;
        ctx.register_processing_time_timer(next);
        ctx.set_state_value(NEXT_FIRE_SLOT, next);
    }
}

impl<T: Trigger> Trigger for ContinuousTrigger<T> {
    fn on_element(
        &self,
        window: Window,
        timestamp: i64,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        if ctx.state_value(NEXT_FIRE_SLOT).is_none() {
            self.schedule_next(ctx.current_processing_time(), ctx);
        }
        self.inner.on_element(window, timestamp, ctx)
    }

    fn on_event_time(
        &self,
        time: i64,
        window: Window,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        self.inner.on_event_time(time, window, ctx)
    }

    fn on_processing_time(
        &self,
        time: i64,
        window: Window,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        match ctx.state_value(NEXT_FIRE_SLOT) {
            Some(next) if next == time => {
                self.schedule_next(time, ctx);
                Ok(TriggerResult::Fire)
            }
            _ => self.inner.on_processing_time(time, window, ctx),
        }
    }

    fn can_merge(&self) -> bool {
        self.inner.can_merge()
    }

    fn on_merge(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        self.inner.on_merge(window, ctx)
    }

    fn clear(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        if let Some(next) = ctx.state_value(NEXT_FIRE_SLOT) {
            ctx.delete_processing_time_timer(next);
            ctx.clear_state_value(NEXT_FIRE_SLOT);
        }
        self.inner.clear(window, ctx)
    }
}

/// Converts every `Fire` of the wrapped trigger into `FireAndPurge`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PurgingTrigger<T: Trigger> {
    inner: T,
}

impl<T: Trigger> PurgingTrigger<T> {
    pub fn of(inner: T) -> Self {
        Self { inner }
    }

    fn purge_on_fire(result: TriggerResult) -> TriggerResult {
        match result {
            TriggerResult::Fire => TriggerResult::FireAndPurge,
            other => other,
        }
    }
}

impl<T: Trigger> Trigger for PurgingTrigger<T> {
    fn on_element(
        &self,
        window: Window,
        timestamp: i64,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(Self::purge_on_fire(self.inner.on_element(
            window, timestamp, ctx,
        )?))
    }

    fn on_event_time(
        &self,
        time: i64,
        window: Window,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(Self::purge_on_fire(self.inner.on_event_time(
            time, window, ctx,
        )?))
    }

    fn on_processing_time(
        &self,
        time: i64,
        window: Window,
        ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(Self::purge_on_fire(self.inner.on_processing_time(
            time, window, ctx,
        )?))
    }

    fn can_merge(&self) -> bool {
        self.inner.can_merge()
    }

    fn on_merge(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        self.inner.on_merge(window, ctx)
    }

    fn clear(&self, window: Window, ctx: &mut dyn TriggerContext) -> Result<()> {
        self.inner.clear(window, ctx)
    }
}

/// A trigger that never fires; the default for global windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverTrigger;

impl NeverTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl Trigger for NeverTrigger {
    fn on_element(
        &self,
        _window: Window,
        _timestamp: i64,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_event_time(
        &self,
        _time: i64,
        _window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn on_processing_time(
        &self,
        _time: i64,
        _window: Window,
        _ctx: &mut dyn TriggerContext,
    ) -> Result<TriggerResult> {
        Ok(TriggerResult::Continue)
    }

    fn can_merge(&self) -> bool {
        true
    }

    fn on_merge(&self, _window: Window, _ctx: &mut dyn TriggerContext) -> Result<()> {
        Ok(())
    }

    fn clear(&self, _window: Window, _ctx: &mut dyn TriggerContext) -> Result<()> {
        Ok(())
    }
}
