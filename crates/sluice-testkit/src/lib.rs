//! Test support for the sluice windowing core.
//!
//! Provides manually-clocked stand-ins for the runtime contexts and a
//! single-key [`WindowedEvaluator`] that wires an assigner and a trigger to
//! an in-memory per-window element store, so window lifecycles can be
//! exercised end to end without a stream runtime.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sluice_assigners::{AssignerContext, WindowAssigner};
use sluice_error::Result;
use sluice_triggers::{Trigger, TriggerContext, TriggerResult};
use sluice_window::Window;

/// Assigner context with a manually advanced processing clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestAssignerContext {
    processing_time: i64,
}

impl TestAssignerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(processing_time: i64) -> Self {
        Self { processing_time }
    }

    pub fn set_processing_time(&mut self, time: i64) {
        self.processing_time = time;
    }
}

impl AssignerContext for TestAssignerContext {
    fn current_processing_time(&self) -> i64 {
        self.processing_time
    }
}

/// Trigger context with manual clocks, recorded timers, and scoped state.
///
/// Models a single (key, window) scope: state slots written through it are
/// the slots of that one window.
#[derive(Debug, Default)]
pub struct TestTriggerContext {
    processing_time: i64,
    watermark: i64,
    event_timers: BTreeSet<i64>,
    processing_timers: BTreeSet<i64>,
    state: HashMap<&'static str, i64>,
}

impl TestTriggerContext {
    pub fn new() -> Self {
        Self {
            watermark: i64::MIN,
            ..Self::default()
        }
    }

    pub fn set_processing_time(&mut self, time: i64) {
        self.processing_time = time;
    }

    pub fn set_watermark(&mut self, watermark: i64) {
        self.watermark = watermark;
    }

    pub fn event_time_timers(&self) -> Vec<i64> {
        self.event_timers.iter().copied().collect()
    }

    pub fn processing_time_timers(&self) -> Vec<i64> {
        self.processing_timers.iter().copied().collect()
    }

    pub fn has_event_time_timer(&self, time: i64) -> bool {
        self.event_timers.contains(&time)
    }

    pub fn has_processing_time_timer(&self, time: i64) -> bool {
        self.processing_timers.contains(&time)
    }

    /// Advance the watermark and pop every event-time timer now due.
    pub fn advance_watermark(&mut self, watermark: i64) -> Vec<i64> {
        self.watermark = watermark;
        let due: Vec<i64> = self
            .event_timers
            .range(..=watermark)
            .copied()
            .collect();
        for t in &due {
            self.event_timers.remove(t);
        }
        due
    }

    /// Advance the processing clock and pop every processing-time timer now due.
    pub fn advance_processing_time(&mut self, time: i64) -> Vec<i64> {
        self.processing_time = time;
        let due: Vec<i64> = self.processing_timers.range(..=time).copied().collect();
        for t in &due {
            self.processing_timers.remove(t);
        }
        due
    }
}

impl TriggerContext for TestTriggerContext {
    fn current_processing_time(&self) -> i64 {
        self.processing_time
    }

    fn current_watermark(&self) -> i64 {
        self.watermark
    }

    fn register_event_time_timer(&mut self, time: i64) {
        self.event_timers.insert(time);
    }

    fn register_processing_time_timer(&mut self, time: i64) {
        self.processing_timers.insert(time);
    }

    fn delete_event_time_timer(&mut self, time: i64) {
        self.event_timers.remove(&time);
    }

    fn delete_processing_time_timer(&mut self, time: i64) {
        self.processing_timers.remove(&time);
    }

    fn state_value(&mut self, name: &'static str) -> Option<i64> {
        self.state.get(name).copied()
    }

    fn set_state_value(&mut self, name: &'static str, value: i64) {
        self.state.insert(name, value);
    }

    fn clear_state_value(&mut self, name: &'static str) {
        self.state.remove(name);
    }
}

/// One emitted window: its identity and the elements it held when fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pane<V> {
    pub window: Window,
    pub elements: Vec<V>,
}

/// Trigger context view scoped to one window of the evaluator.
struct WindowScope<'a> {
    window: Window,
    processing_time: i64,
    watermark: i64,
    state: &'a mut HashMap<&'static str, i64>,
    event_timers: &'a mut BTreeMap<i64, BTreeSet<Window>>,
    processing_timers: &'a mut BTreeMap<i64, BTreeSet<Window>>,
}

impl TriggerContext for WindowScope<'_> {
    fn current_processing_time(&self) -> i64 {
        self.processing_time
    }

    fn current_watermark(&self) -> i64 {
        self.watermark
    }

    fn register_event_time_timer(&mut self, time: i64) {
        self.event_timers.entry(time).or_default().insert(self.window);
    }

    fn register_processing_time_timer(&mut self, time: i64) {
        self.processing_timers
            .entry(time)
            .or_default()
            .insert(self.window);
    }

    fn delete_event_time_timer(&mut self, time: i64) {
        if let Some(windows) = self.event_timers.get_mut(&time) {
            windows.remove(&self.window);
            if windows.is_empty() {
                self.event_timers.remove(&time);
            }
        }
    }

    fn delete_processing_time_timer(&mut self, time: i64) {
        if let Some(windows) = self.processing_timers.get_mut(&time) {
            windows.remove(&self.window);
            if windows.is_empty() {
                self.processing_timers.remove(&time);
            }
        }
    }

    fn state_value(&mut self, name: &'static str) -> Option<i64> {
        self.state.get(name).copied()
    }

    fn set_state_value(&mut self, name: &'static str, value: i64) {
        self.state.insert(name, value);
    }

    fn clear_state_value(&mut self, name: &'static str) {
        self.state.remove(name);
    }
}

/// Single-key in-memory window evaluator for non-merging assigners.
///
/// Elements are appended to an explicit per-window store keyed by the
/// window value; the trigger's decisions drive emission and purging. Timer
/// callbacks for windows that were already purged are ignored, matching
/// the runtime contract that timers cannot be revoked proactively.
pub struct WindowedEvaluator<A, T, V> {
    assigner: A,
    trigger: T,
    contents: HashMap<Window, Vec<V>>,
    trigger_state: HashMap<Window, HashMap<&'static str, i64>>,
    event_timers: BTreeMap<i64, BTreeSet<Window>>,
    processing_timers: BTreeMap<i64, BTreeSet<Window>>,
    watermark: i64,
    processing_time: i64,
}

impl<A, T, V> WindowedEvaluator<A, T, V>
where
    A: WindowAssigner,
    T: Trigger,
    V: Clone,
{
    pub fn new(assigner: A, trigger: T) -> Self {
        Self {
            assigner,
            trigger,
            contents: HashMap::new(),
            trigger_state: HashMap::new(),
            event_timers: BTreeMap::new(),
            processing_timers: BTreeMap::new(),
            watermark: i64::MIN,
            processing_time: 0,
        }
    }

    /// Windows currently holding state, sorted.
    pub fn open_windows(&self) -> Vec<Window> {
        let mut windows: Vec<Window> = self.contents.keys().copied().collect();
        windows.sort();
        windows
    }

    pub fn window_contents(&self, window: &Window) -> Option<&[V]> {
        self.contents.get(window).map(Vec::as_slice)
    }

    pub fn current_watermark(&self) -> i64 {
        self.watermark
    }

    pub fn set_processing_time(&mut self, time: i64) {
        self.processing_time = time;
    }

    /// Feed one timestamped element through assignment and the trigger.
    pub fn insert(&mut self, timestamp: i64, value: V) -> Result<Vec<Pane<V>>> {
        let clock = TestAssignerContext::at(self.processing_time);
        let windows = self.assigner.assign_windows(timestamp, &clock);

        let mut emitted = Vec::new();
        for window in windows {
            self.contents.entry(window).or_default().push(value.clone());
            let state = self.trigger_state.entry(window).or_default();
            let mut scope = WindowScope {
                window,
                processing_time: self.processing_time,
                watermark: self.watermark,
                state,
                event_timers: &mut self.event_timers,
                processing_timers: &mut self.processing_timers,
            };
            let result = self.trigger.on_element(window, timestamp, &mut scope)?;
            self.apply(window, result, &mut emitted)?;
        }
        Ok(emitted)
    }

    /// Advance event time, delivering every due event-time timer.
    pub fn advance_watermark(&mut self, watermark: i64) -> Result<Vec<Pane<V>>> {
        self.watermark = watermark;
        let mut emitted = Vec::new();
        while let Some(time) = self.next_due(true, watermark) {
            let windows = self.event_timers.remove(&time).unwrap_or_default();
            for window in windows {
                // Timers may outlive their window; such callbacks are no-ops.
                if !self.contents.contains_key(&window) {
                    continue;
                }
                let state = self.trigger_state.entry(window).or_default();
                let mut scope = WindowScope {
                    window,
                    processing_time: self.processing_time,
                    watermark: self.watermark,
                    state,
                    event_timers: &mut self.event_timers,
                    processing_timers: &mut self.processing_timers,
                };
                let result = self.trigger.on_event_time(time, window, &mut scope)?;
                self.apply(window, result, &mut emitted)?;
            }
        }
        Ok(emitted)
    }

    /// Advance the processing clock, delivering every due processing-time timer.
    pub fn advance_processing_time(&mut self, time: i64) -> Result<Vec<Pane<V>>> {
        self.processing_time = time;
        let mut emitted = Vec::new();
        while let Some(due) = self.next_due(false, time) {
            let windows = self.processing_timers.remove(&due).unwrap_or_default();
            for window in windows {
                if !self.contents.contains_key(&window) {
                    continue;
                }
                let state = self.trigger_state.entry(window).or_default();
                let mut scope = WindowScope {
                    window,
                    processing_time: self.processing_time,
                    watermark: self.watermark,
                    state,
                    event_timers: &mut self.event_timers,
                    processing_timers: &mut self.processing_timers,
                };
                let result = self.trigger.on_processing_time(due, window, &mut scope)?;
                self.apply(window, result, &mut emitted)?;
            }
        }
        Ok(emitted)
    }

    fn next_due(&self, event_time: bool, up_to: i64) -> Option<i64> {
        let timers = if event_time {
            &self.event_timers
        } else {
            &self.processing_timers
        };
        timers.range(..=up_to).next().map(|(time, _)| *time)
    }

    fn apply(
        &mut self,
        window: Window,
        result: TriggerResult,
        emitted: &mut Vec<Pane<V>>,
    ) -> Result<()> {
        if result.is_fire() {
            let elements = self.contents.get(&window).cloned().unwrap_or_default();
            emitted.push(Pane { window, elements });
        }
        if result.is_purge() {
            self.purge(window)?;
        }
        Ok(())
    }

    fn purge(&mut self, window: Window) -> Result<()> {
        self.contents.remove(&window);
        let mut state = self.trigger_state.remove(&window).unwrap_or_default();
        let mut scope = WindowScope {
            window,
            processing_time: self.processing_time,
            watermark: self.watermark,
            state: &mut state,
            event_timers: &mut self.event_timers,
            processing_timers: &mut self.processing_timers,
        };
        self.trigger.clear(window, &mut scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigner_context_clock() {
        let mut ctx = TestAssignerContext::new();
        assert_eq!(ctx.current_processing_time(), 0);
        ctx.set_processing_time(5000);
        assert_eq!(ctx.current_processing_time(), 5000);
    }

    #[test]
    fn test_trigger_context_records_timers() {
        let mut ctx = TestTriggerContext::new();
        ctx.register_event_time_timer(100);
        ctx.register_event_time_timer(100);
        ctx.register_event_time_timer(200);

        assert_eq!(ctx.event_time_timers(), vec![100, 200]);
        assert!(ctx.has_event_time_timer(100));

        ctx.delete_event_time_timer(100);
        assert!(!ctx.has_event_time_timer(100));
    }

    #[test]
    fn test_trigger_context_advances_and_pops_due_timers() {
        let mut ctx = TestTriggerContext::new();
        ctx.register_event_time_timer(100);
        ctx.register_event_time_timer(200);
        ctx.register_event_time_timer(300);

        assert_eq!(ctx.advance_watermark(250), vec![100, 200]);
        assert_eq!(ctx.current_watermark(), 250);
        assert_eq!(ctx.event_time_timers(), vec![300]);
    }

    #[test]
    fn test_trigger_context_state_slots() {
        let mut ctx = TestTriggerContext::new();
        assert_eq!(ctx.state_value("count"), None);
        ctx.set_state_value("count", 3);
        assert_eq!(ctx.state_value("count"), Some(3));
        ctx.clear_state_value("count");
        assert_eq!(ctx.state_value("count"), None);
    }

    #[test]
    fn test_initial_watermark_is_minimum() {
        let ctx = TestTriggerContext::new();
        assert_eq!(ctx.current_watermark(), i64::MIN);
    }
}
