//! Visible-window planning for long step lists.
//!
//! Only the rows inside the scroll viewport (plus an overscan margin on each
//! side) are rendered. Overscan trades extra rows for fewer blank flashes
//! during fast scrolling; large scripts get less of it.

use serde::{Deserialize, Serialize};

use crate::script::Script;

/// Scripts with more steps than this are "large".
pub const LARGE_SCRIPT_STEP_THRESHOLD: usize = 100;
/// Scripts with more pooled actions than this are "large".
pub const LARGE_SCRIPT_ACTION_THRESHOLD: usize = 500;
/// Fixed row height for step lists.
pub const DEFAULT_ITEM_HEIGHT: f64 = 60.0;
pub const LARGE_SCRIPT_OVERSCAN: usize = 3;
pub const DEFAULT_OVERSCAN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualListConfig {
    pub item_height: f64,
    /// Extra rows rendered above and below the viewport.
    pub overscan: usize,
    pub container_height: f64,
}

/// Rows `start..end` should be rendered, translated down by `offset_y`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
    pub offset_y: f64,
}

impl VisibleRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

/// Window of rows to render for a scroll position.
///
/// `start` backs off `overscan` rows from the first visible row; `end` adds
/// the visible row count plus overscan on both sides (one overscan is
/// already spent moving `start` up). Negative scroll offsets clamp to zero
/// and a scroll past the end yields an empty range at `total_items`. An
/// infinite viewport or overscan saturates at `total_items`.
pub fn calculate_visible_range(
    scroll_top: f64,
    config: &VirtualListConfig,
    total_items: usize,
) -> VisibleRange {
    if config.item_height <= 0.0 || !config.item_height.is_finite() {
        return VisibleRange {
            start: 0,
            end: 0,
            offset_y: 0.0,
        };
    }

    let first_visible = (scroll_top.max(0.0) / config.item_height).floor() as usize;
    let start = first_visible.saturating_sub(config.overscan).min(total_items);
    // An unbounded viewport shows every row.
    let visible_rows = (config.container_height.max(0.0) / config.item_height).ceil();
    let visible_count = if visible_rows < total_items as f64 {
        visible_rows as usize
    } else {
        total_items
    };
    let end = total_items.min(
        start
            .saturating_add(visible_count)
            .saturating_add(config.overscan.saturating_mul(2)),
    );

    VisibleRange {
        start,
        end,
        offset_y: start as f64 * config.item_height,
    }
}

/// Thresholds and sizing used to plan a step list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListPolicy {
    pub large_step_threshold: usize,
    pub large_action_threshold: usize,
    pub item_height: f64,
    pub large_overscan: usize,
    pub default_overscan: usize,
}

impl Default for ListPolicy {
    fn default() -> Self {
        Self {
            large_step_threshold: LARGE_SCRIPT_STEP_THRESHOLD,
            large_action_threshold: LARGE_SCRIPT_ACTION_THRESHOLD,
            item_height: DEFAULT_ITEM_HEIGHT,
            large_overscan: LARGE_SCRIPT_OVERSCAN,
            default_overscan: DEFAULT_OVERSCAN,
        }
    }
}

impl ListPolicy {
    pub fn is_large(&self, script: &Script) -> bool {
        script.step_count() > self.large_step_threshold
            || script.action_count() > self.large_action_threshold
    }

    pub fn list_config(&self, script: &Script, container_height: f64) -> VirtualListConfig {
        VirtualListConfig {
            item_height: self.item_height,
            overscan: if self.is_large(script) {
                self.large_overscan
            } else {
                self.default_overscan
            },
            container_height,
        }
    }
}

/// Whether a script is big enough to need lighter rendering.
pub fn is_large_script(script: &Script) -> bool {
    ListPolicy::default().is_large(script)
}

/// Row sizing for a script's step list.
pub fn get_virtual_list_config(script: &Script, container_height: f64) -> VirtualListConfig {
    ListPolicy::default().list_config(script, container_height)
}
