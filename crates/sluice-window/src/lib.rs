//! Window value type for stream processing in sluice.
//!
//! A [`Window`] is an immutable identity for a half-open time span
//! `[start, end)` measured in milliseconds. Windows compare by value, so
//! they can be used as map keys for per-window state; any mutable state
//! belongs to the surrounding runtime, never to the window itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time window defined by start (inclusive) and end (exclusive)
/// timestamps in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Window {
    start: i64,
    end: i64,
}

impl Window {
    /// Create a new window with the given start and end timestamps (in milliseconds)
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Create a window from a start timestamp and a duration.
    ///
    /// The end saturates at `i64::MAX`, so far-future starts cannot
    /// overflow the span.
    pub fn from_duration(start: i64, duration_ms: i64) -> Self {
        Self {
            start,
            end: start.saturating_add(duration_ms),
        }
    }

    /// Create a window from a pair of `DateTime` bounds
    pub fn from_datetimes(start: &DateTime<Utc>, end: &DateTime<Utc>) -> Self {
        Self {
            start: start.timestamp_millis(),
            end: end.timestamp_millis(),
        }
    }

    /// The window spanning all representable time, used by global windowing.
    pub fn global() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }

    /// Get the start timestamp (inclusive)
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Get the end timestamp (exclusive)
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Get the window size in milliseconds
    pub fn size(&self) -> i64 {
        self.end - self.start
    }

    /// The last timestamp that still belongs to this window (`end - 1`).
    pub fn max_timestamp(&self) -> i64 {
        self.end - 1
    }

    /// Check if a timestamp falls within this window
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if this window overlaps or touches another.
    ///
    /// Touching counts: session windows whose gap-derived spans meet
    /// end-to-start belong to one session.
    pub fn intersects(&self, other: &Window) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// The smallest window covering both this window and another
    pub fn cover(&self, other: &Window) -> Window {
        Window::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Get the start as a `DateTime`
    pub fn start_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.start).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Get the end as a `DateTime`
    pub fn end_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.end).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Merge overlapping or touching windows, reporting each merge group.
///
/// Candidates are sorted by start and scanned left to right; a window whose
/// start is `<=` the running merged window's end is absorbed into it, the
/// merged end growing to the maximum end seen. The callback is invoked once
/// per resulting group that actually combined two or more distinct windows,
/// with the group members and the covering window. Windows with identical
/// bounds are collapsed up front and never reported as a merge.
///
/// Pairwise non-overlapping input produces no callbacks.
pub fn merge_windows(windows: &[Window], mut callback: impl FnMut(&[Window], Window)) {
    let mut sorted: Vec<Window> = windows.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut group: Vec<Window> = Vec::new();
    let mut merged: Option<Window> = None;

    for window in sorted {
        match merged {
            Some(current) if window.start() <= current.end() => {
                merged = Some(current.cover(&window));
                group.push(window);
            }
            _ => {
                if let Some(current) = merged {
                    if group.len() > 1 {
                        callback(&group, current);
                    }
                }
                group.clear();
                group.push(window);
                merged = Some(window);
            }
        }
    }

    if let Some(current) = merged {
        if group.len() > 1 {
            callback(&group, current);
        }
    }
}

/// Collect the merge groups produced by [`merge_windows`].
pub fn merge_groups(windows: &[Window]) -> Vec<(Vec<Window>, Window)> {
    let mut groups = Vec::new();
    merge_windows(windows, |group, merged| {
        groups.push((group.to_vec(), merged));
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_creation() {
        let window = Window::new(0, 1000);
        assert_eq!(window.start(), 0);
        assert_eq!(window.end(), 1000);
        assert_eq!(window.size(), 1000);
        assert_eq!(window.max_timestamp(), 999);
    }

    #[test]
    fn test_window_from_duration() {
        let window = Window::from_duration(500, 1500);
        assert_eq!(window.start(), 500);
        assert_eq!(window.end(), 2000);
    }

    #[test]
    fn test_window_from_duration_saturates_at_domain_end() {
        let window = Window::from_duration(i64::MAX - 5, 100);
        assert_eq!(window.end(), i64::MAX);
        assert!(window.contains(i64::MAX - 5));
    }

    #[test]
    fn test_window_contains() {
        let window = Window::new(0, 1000);
        assert!(window.contains(0));
        assert!(window.contains(500));
        assert!(window.contains(999));
        assert!(!window.contains(1000));
        assert!(!window.contains(-1));
    }

    #[test]
    fn test_window_intersects() {
        let w1 = Window::new(0, 500);
        let w2 = Window::new(400, 900);
        let w3 = Window::new(500, 1000);
        let w4 = Window::new(501, 1000);

        assert!(w1.intersects(&w2));
        // Touching windows intersect for merge purposes.
        assert!(w1.intersects(&w3));
        assert!(!w1.intersects(&w4));
    }

    #[test]
    fn test_window_cover() {
        let w1 = Window::new(0, 500);
        let w2 = Window::new(300, 900);
        assert_eq!(w1.cover(&w2), Window::new(0, 900));
        assert_eq!(w2.cover(&w1), Window::new(0, 900));
    }

    #[test]
    fn test_window_ordering() {
        let mut windows = vec![
            Window::new(100, 200),
            Window::new(0, 300),
            Window::new(0, 100),
        ];
        windows.sort();
        assert_eq!(windows[0], Window::new(0, 100));
        assert_eq!(windows[1], Window::new(0, 300));
        assert_eq!(windows[2], Window::new(100, 200));
    }

    #[test]
    fn test_global_window() {
        let global = Window::global();
        assert!(global.contains(0));
        assert!(global.contains(i64::MIN));
        assert!(global.contains(i64::MAX - 1));
        assert_eq!(global.max_timestamp(), i64::MAX - 1);
    }

    #[test]
    fn test_negative_bounds() {
        let window = Window::new(-4000, 1000);
        assert_eq!(window.size(), 5000);
        assert!(window.contains(-4000));
        assert!(window.contains(0));
        assert!(!window.contains(1000));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Window::new(-100, 4900)), "[-100, 4900)");
    }

    #[test]
    fn test_serde_round_trip() {
        let window = Window::new(100, 5100);
        let json = serde_json::to_string(&window).unwrap();
        let back: Window = serde_json::from_str(&json).unwrap();
        assert_eq!(window, back);
    }

    #[test]
    fn test_merge_disjoint_reports_nothing() {
        let windows = vec![Window::new(0, 10), Window::new(20, 30), Window::new(40, 50)];
        assert!(merge_groups(&windows).is_empty());
    }

    #[test]
    fn test_merge_overlapping_pair() {
        let windows = vec![Window::new(0, 10), Window::new(5, 15)];
        let groups = merge_groups(&windows);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, Window::new(0, 15));
        assert_eq!(groups[0].0, vec![Window::new(0, 10), Window::new(5, 15)]);
    }

    #[test]
    fn test_merge_touching_pair() {
        let windows = vec![Window::new(0, 10), Window::new(10, 20)];
        let groups = merge_groups(&windows);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, Window::new(0, 20));
    }

    #[test]
    fn test_merge_chain() {
        let windows = vec![
            Window::new(0, 10),
            Window::new(8, 18),
            Window::new(17, 25),
            Window::new(40, 45),
        ];
        let groups = merge_groups(&windows);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, Window::new(0, 25));
        assert_eq!(groups[0].0.len(), 3);
    }

    #[test]
    fn test_merge_identical_bounds_is_noop() {
        let windows = vec![Window::new(0, 10), Window::new(0, 10)];
        assert!(merge_groups(&windows).is_empty());
    }

    #[test]
    fn test_merge_contained_window() {
        let windows = vec![Window::new(0, 100), Window::new(20, 30)];
        let groups = merge_groups(&windows);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1, Window::new(0, 100));
    }

    #[test]
    fn test_merge_two_separate_groups() {
        let windows = vec![
            Window::new(0, 10),
            Window::new(5, 12),
            Window::new(100, 110),
            Window::new(108, 120),
        ];
        let groups = merge_groups(&windows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1, Window::new(0, 12));
        assert_eq!(groups[1].1, Window::new(100, 120));
    }
}
