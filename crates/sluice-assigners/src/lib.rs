//! Window assigners for stream processing in sluice.
//!
//! An assigner maps an element timestamp to the set of windows the element
//! belongs to. Tumbling and sliding assigners compute windows on a fixed
//! lattice of start points; session assigners propose one gap-sized window
//! per element and rely on merging; global windowing maps everything to a
//! single all-time window.
//!
//! Assignment is pure: the same timestamp always yields the same window
//! set. All parameter validation happens at construction, so no partially
//! configured assigner is ever observable.

use std::collections::HashMap;

use chrono::Utc;
use sluice_error::{inconsistent_state, invalid_configuration, Result};
use sluice_window::{merge_windows, Window};

/// Read-only view of the runtime supplied to assigners.
pub trait AssignerContext {
    /// Current processing time in milliseconds.
    fn current_processing_time(&self) -> i64;
}

/// Assigner context backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeContext;

impl AssignerContext for SystemTimeContext {
    fn current_processing_time(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A window assigner maps an element timestamp to a set of windows.
pub trait WindowAssigner: Send + Sync {
    /// Assign the windows containing the element with the given timestamp.
    ///
    /// Processing-time assigners ignore `timestamp` in favor of
    /// `ctx.current_processing_time()`.
    fn assign_windows(&self, timestamp: i64, ctx: &dyn AssignerContext) -> Vec<Window>;

    /// Whether this assigner operates on event time.
    fn is_event_time(&self) -> bool;
}

/// Optional capability of assigners whose windows coalesce at runtime.
///
/// Only session-style assigners implement this; it is deliberately separate
/// from [`WindowAssigner`] so non-merging assigners carry no merge surface.
pub trait MergingWindowAssigner: WindowAssigner {
    /// Compute which of the given windows should merge, invoking the
    /// callback once per merge group with the members and the merged window.
    fn merge_windows(&self, windows: &[Window], callback: &mut dyn FnMut(&[Window], Window));
}

/// Last lattice start point at or before `timestamp`.
///
/// Uses floored (Euclidean) modulo so the lattice is uniform across zero:
/// negative timestamps and negative offsets land on the same grid as
/// positive ones. The residue is computed per operand, so extreme
/// timestamps near `i64::MIN`/`i64::MAX` do not overflow; the only
/// unrepresentable case is a timestamp within one slide of `i64::MIN`,
/// whose lattice start would fall below the domain.
pub fn window_start_for(timestamp: i64, offset: i64, slide: i64) -> i64 {
    let remainder = (timestamp.rem_euclid(slide) - offset.rem_euclid(slide)).rem_euclid(slide);
    timestamp - remainder
}

/// Tumbling event-time windows: one fixed-size window per element.
#[derive(Debug, Clone, Copy)]
pub struct TumblingEventTimeWindows {
    size: i64,
    offset: i64,
}

impl TumblingEventTimeWindows {
    /// Create an assigner with the given window size in milliseconds.
    pub fn of(size_ms: i64) -> Result<Self> {
        Self::with_offset(size_ms, 0)
    }

    /// Create an assigner whose window boundaries are shifted by `offset_ms`.
    pub fn with_offset(size_ms: i64, offset_ms: i64) -> Result<Self> {
        if size_ms <= 0 || offset_ms.abs() >= size_ms {
            return Err(invalid_configuration(
                "TumblingEventTimeWindows parameters must satisfy abs(offset) < size and size > 0",
            ));
        }
        Ok(Self {
            size: size_ms,
            offset: offset_ms,
        })
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}

impl WindowAssigner for TumblingEventTimeWindows {
    fn assign_windows(&self, timestamp: i64, _ctx: &dyn AssignerContext) -> Vec<Window> {
        let start = window_start_for(timestamp, self.offset, self.size);
        vec![Window::from_duration(start, self.size)]
    }

    fn is_event_time(&self) -> bool {
        true
    }
}

/// Tumbling processing-time windows: assignment by the runtime clock.
#[derive(Debug, Clone, Copy)]
pub struct TumblingProcessingTimeWindows {
    size: i64,
    offset: i64,
}

impl TumblingProcessingTimeWindows {
    pub fn of(size_ms: i64) -> Result<Self> {
        Self::with_offset(size_ms, 0)
    }

    pub fn with_offset(size_ms: i64, offset_ms: i64) -> Result<Self> {
        if size_ms <= 0 || offset_ms.abs() >= size_ms {
            return Err(invalid_configuration(
                "TumblingProcessingTimeWindows parameters must satisfy abs(offset) < size and size > 0",
            ));
        }
        Ok(Self {
            size: size_ms,
            offset: offset_ms,
        })
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}

impl WindowAssigner for TumblingProcessingTimeWindows {
    fn assign_windows(&self, _timestamp: i64, ctx: &dyn AssignerContext) -> Vec<Window> {
        let now = ctx.current_processing_time();
        let start = window_start_for(now, self.offset, self.size);
        vec![Window::from_duration(start, self.size)]
    }

    fn is_event_time(&self) -> bool {
        false
    }
}

/// Sliding event-time windows: overlapping fixed-size windows every `slide`.
#[derive(Debug, Clone, Copy)]
pub struct SlidingEventTimeWindows {
    size: i64,
    slide: i64,
    offset: i64,
}

impl SlidingEventTimeWindows {
    /// Create an assigner with the given window size and slide in milliseconds.
    pub fn of(size_ms: i64, slide_ms: i64) -> Result<Self> {
        Self::with_offset(size_ms, slide_ms, 0)
    }

    /// Create an assigner whose window boundaries are shifted by `offset_ms`.
    pub fn with_offset(size_ms: i64, slide_ms: i64, offset_ms: i64) -> Result<Self> {
        if size_ms <= 0 || offset_ms.abs() >= slide_ms {
            return Err(invalid_configuration(
                "SlidingEventTimeWindows parameters must satisfy abs(offset) < slide and size > 0",
            ));
        }
        Ok(Self {
            size: size_ms,
            slide: slide_ms,
            offset: offset_ms,
        })
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn slide(&self) -> i64 {
        self.slide
    }
}

/// Shared sliding assignment: starts walk down from the last lattice point
/// until the window no longer contains `timestamp`, yielding exactly
/// ceil(size / slide) windows.
fn assign_sliding(timestamp: i64, size: i64, slide: i64, offset: i64) -> Vec<Window> {
    let mut windows = Vec::with_capacity((size / slide) as usize + 1);
    let mut start = window_start_for(timestamp, offset, slide);
    while start > timestamp.saturating_sub(size) {
        windows.push(Window::from_duration(start, size));
        // Lattice points below the domain bottom are unrepresentable.
        match start.checked_sub(slide) {
            Some(next) => start = next,
            None => break,
        }
    }
    windows
}

impl WindowAssigner for SlidingEventTimeWindows {
    fn assign_windows(&self, timestamp: i64, _ctx: &dyn AssignerContext) -> Vec<Window> {
        assign_sliding(timestamp, self.size, self.slide, self.offset)
    }

    fn is_event_time(&self) -> bool {
        true
    }
}

/// Sliding processing-time windows: assignment by the runtime clock.
#[derive(Debug, Clone, Copy)]
pub struct SlidingProcessingTimeWindows {
    size: i64,
    slide: i64,
    offset: i64,
}

impl SlidingProcessingTimeWindows {
    pub fn of(size_ms: i64, slide_ms: i64) -> Result<Self> {
        Self::with_offset(size_ms, slide_ms, 0)
    }

    pub fn with_offset(size_ms: i64, slide_ms: i64, offset_ms: i64) -> Result<Self> {
        if size_ms <= 0 || offset_ms.abs() >= slide_ms {
            return Err(invalid_configuration(
                "SlidingProcessingTimeWindows parameters must satisfy abs(offset) < slide and size > 0",
            ));
        }
        Ok(Self {
            size: size_ms,
            slide: slide_ms,
            offset: offset_ms,
        })
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn slide(&self) -> i64 {
        self.slide
    }
}

impl WindowAssigner for SlidingProcessingTimeWindows {
    fn assign_windows(&self, _timestamp: i64, ctx: &dyn AssignerContext) -> Vec<Window> {
        let now = ctx.current_processing_time();
        assign_sliding(now, self.size, self.slide, self.offset)
    }

    fn is_event_time(&self) -> bool {
        false
    }
}

/// Event-time session windows: one gap-sized window per element, merged
/// whenever spans overlap or touch.
#[derive(Debug, Clone, Copy)]
pub struct EventTimeSessionWindows {
    gap: i64,
}

impl EventTimeSessionWindows {
    /// Create an assigner with the given session gap in milliseconds.
    pub fn with_gap(gap_ms: i64) -> Result<Self> {
        if gap_ms <= 0 {
            return Err(invalid_configuration(
                "EventTimeSessionWindows parameters must satisfy 0 < gap",
            ));
        }
        Ok(Self { gap: gap_ms })
    }

    pub fn gap(&self) -> i64 {
        self.gap
    }
}

impl WindowAssigner for EventTimeSessionWindows {
    fn assign_windows(&self, timestamp: i64, _ctx: &dyn AssignerContext) -> Vec<Window> {
        vec![Window::from_duration(timestamp, self.gap)]
    }

    fn is_event_time(&self) -> bool {
        true
    }
}

impl MergingWindowAssigner for EventTimeSessionWindows {
    fn merge_windows(&self, windows: &[Window], callback: &mut dyn FnMut(&[Window], Window)) {
        merge_windows(windows, callback);
    }
}

/// Processing-time session windows.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingTimeSessionWindows {
    gap: i64,
}

impl ProcessingTimeSessionWindows {
    pub fn with_gap(gap_ms: i64) -> Result<Self> {
        if gap_ms <= 0 {
            return Err(invalid_configuration(
                "ProcessingTimeSessionWindows parameters must satisfy 0 < gap",
            ));
        }
        Ok(Self { gap: gap_ms })
    }

    pub fn gap(&self) -> i64 {
        self.gap
    }
}

impl WindowAssigner for ProcessingTimeSessionWindows {
    fn assign_windows(&self, _timestamp: i64, ctx: &dyn AssignerContext) -> Vec<Window> {
        let now = ctx.current_processing_time();
        vec![Window::from_duration(now, self.gap)]
    }

    fn is_event_time(&self) -> bool {
        false
    }
}

impl MergingWindowAssigner for ProcessingTimeSessionWindows {
    fn merge_windows(&self, windows: &[Window], callback: &mut dyn FnMut(&[Window], Window)) {
        merge_windows(windows, callback);
    }
}

/// Global windowing: every element lands in the single all-time window.
///
/// Time never closes a global window; pair it with a count trigger or an
/// externally signaled one.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalWindows;

impl GlobalWindows {
    pub fn new() -> Self {
        Self
    }
}

impl WindowAssigner for GlobalWindows {
    fn assign_windows(&self, _timestamp: i64, _ctx: &dyn AssignerContext) -> Vec<Window> {
        vec![Window::global()]
    }

    fn is_event_time(&self) -> bool {
        false
    }
}

/// Tracks the in-flight windows of a merging assigner and the mapping from
/// each window to the window whose state backs it.
///
/// When windows merge, the state of one pre-existing member survives and the
/// others must be unioned into it; [`MergingWindowSet::add`] reports every
/// such migration through its callback so the runtime can move state before
/// the old windows cease to exist.
#[derive(Debug, Default)]
pub struct MergingWindowSet {
    mapping: HashMap<Window, Window>,
}

impl MergingWindowSet {
    pub fn new() -> Self {
        Self {
            mapping: HashMap::new(),
        }
    }

    /// Register the window a new element proposes, merging it with the
    /// windows already in flight.
    ///
    /// `on_merge(merged, members, state_window, merged_state_windows)` is
    /// invoked once per merge that changes bounds: `merged` is the surviving
    /// window, `members` the pre-existing windows absorbed into it,
    /// `state_window` the window whose state survives, and
    /// `merged_state_windows` the state windows to union into it. Returns
    /// the window the element actually belongs to after merging.
    pub fn add<A: MergingWindowAssigner + ?Sized>(
        &mut self,
        new_window: Window,
        assigner: &A,
        on_merge: &mut dyn FnMut(Window, &[Window], Window, &[Window]) -> Result<()>,
    ) -> Result<Window> {
        let mut all: Vec<Window> = self.mapping.keys().copied().collect();
        all.push(new_window);

        let mut merge_results: Vec<(Window, Vec<Window>)> = Vec::new();
        assigner.merge_windows(&all, &mut |members, merged| {
            merge_results.push((merged, members.to_vec()));
        });

        let mut result_window = new_window;
        let mut merged_new_window = false;

        for (merge_result, mut members) in merge_results {
            for member in &members {
                if !member.intersects(&merge_result) {
                    return Err(inconsistent_state(format!(
                        "window {} reported as merged into disjoint {}",
                        member, merge_result
                    )));
                }
            }

            if let Some(pos) = members.iter().position(|w| *w == new_window) {
                merged_new_window = true;
                result_window = merge_result;
                members.remove(pos);
            }

            let first = members.first().copied().ok_or_else(|| {
                inconsistent_state("merge group contained only the new window")
            })?;
            let state_window = *self.mapping.get(&first).ok_or_else(|| {
                inconsistent_state(format!("merged window {} is not tracked", first))
            })?;

            let mut merged_state_windows: Vec<Window> = Vec::new();
            for member in &members {
                if let Some(sw) = self.mapping.remove(member) {
                    merged_state_windows.push(sw);
                }
            }
            self.mapping.insert(merge_result, state_window);
            merged_state_windows.retain(|sw| *sw != state_window);

            // A new window swallowed whole by one existing window changes no
            // bounds and migrates no state.
            let absorbed_unchanged = members.len() == 1 && members[0] == merge_result;
            if !absorbed_unchanged {
                on_merge(merge_result, &members, state_window, &merged_state_windows)?;
            }
        }

        if !merged_new_window {
            self.mapping.entry(result_window).or_insert(result_window);
        }

        Ok(result_window)
    }

    /// The window backing the state of an in-flight window.
    pub fn state_window(&self, window: &Window) -> Option<Window> {
        self.mapping.get(window).copied()
    }

    /// Drop a window once it has fired and been purged.
    pub fn retire(&mut self, window: &Window) -> Result<()> {
        self.mapping
            .remove(window)
            .map(|_| ())
            .ok_or_else(|| inconsistent_state(format!("retiring untracked window {}", window)))
    }

    /// In-flight windows, sorted for deterministic iteration.
    pub fn windows(&self) -> Vec<Window> {
        let mut windows: Vec<Window> = self.mapping.keys().copied().collect();
        windows.sort();
        windows
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
