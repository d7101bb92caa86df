//! Partitions the screen into named regions and derives the DEC scroll
//! region from them. Grounded on the fixed-strip-around-a-scroll-region
//! pattern in `other_examples`' `syncable-dev-syncable-cli` terminal
//! layout, generalized from a hardcoded reservation to priority-ordered
//! [`ComponentInfo`] registration.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::terminal::ScrollRegion;

/// Where a registered component sits relative to the scrolling content
/// area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Top,
    Bottom,
}

/// Layout registration for one named region.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub name: String,
    pub position: Position,
    pub height: u16,
    /// Higher priority sits closer to the content area.
    pub priority: u32,
    pub visible: bool,
    pub z_order: u32,
}

/// `{x, y, width, height, z_order, visible}`, 1-based, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub z_order: u32,
    pub visible: bool,
}

const CONTENT: &str = "content";

/// Owns the partition of the screen into named regions and the derived
/// scroll region. Not `Sync`; callers serialize access the same way every
/// other shared-terminal mutation is serialized, through the coordinator's
/// output lock.
pub struct LayoutManager {
    terminal_width: u16,
    terminal_height: u16,
    components: Vec<ComponentInfo>,
    regions: HashMap<String, Region>,
    scroll_region: ScrollRegion,
}

impl LayoutManager {
    pub fn new(terminal_width: u16, terminal_height: u16) -> Self {
        let mut mgr = Self {
            terminal_width,
            terminal_height,
            components: Vec::new(),
            regions: HashMap::new(),
            scroll_region: ScrollRegion {
                top: 1,
                bottom: terminal_height.max(1),
            },
        };
        mgr.recompute();
        mgr
    }

    pub fn register(&mut self, component: ComponentInfo) {
        self.components.retain(|c| c.name != component.name);
        self.components.push(component);
        self.recompute();
    }

    pub fn set_visible(&mut self, name: &str, visible: bool) {
        if let Some(c) = self.components.iter_mut().find(|c| c.name == name) {
            c.visible = visible;
        }
        self.recompute();
    }

    /// Update a component's reserved height (e.g. the input region grows or
    /// shrinks as the edit buffer wraps). Returns `true` if the layout
    /// actually changed.
    pub fn set_height(&mut self, name: &str, height: u16) -> bool {
        let changed = self
            .components
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| {
                let changed = c.height != height;
                c.height = height;
                changed
            })
            .unwrap_or(false);
        if changed {
            self.recompute();
        }
        changed
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.terminal_width = width;
        self.terminal_height = height;
        self.recompute();
    }

    pub fn get_region(&self, name: &str) -> Result<Region> {
        self.regions
            .get(name)
            .copied()
            .ok_or_else(|| Error::RegionUnknown(name.to_string()))
    }

    pub fn get_scroll_region(&self) -> ScrollRegion {
        self.scroll_region
    }

    pub fn terminal_size(&self) -> (u16, u16) {
        (self.terminal_width, self.terminal_height)
    }

    fn recompute(&mut self) {
        let mut bottom_components: Vec<&ComponentInfo> = self
            .components
            .iter()
            .filter(|c| c.position == Position::Bottom && c.visible)
            .collect();
        // Lowest priority sits farthest from content (the footer, at the
        // absolute bottom); highest priority (the input) sits just above
        // content.
        bottom_components.sort_by_key(|c| c.priority);

        let sum_bottom_heights: u32 = bottom_components.iter().map(|c| c.height as u32).sum();
        let mut content_bottom = self
            .terminal_height
            .saturating_sub(sum_bottom_heights.min(u32::from(self.terminal_height)) as u16);
        if content_bottom < 1 {
            tracing::warn!(
                terminal_height = self.terminal_height,
                reserved = sum_bottom_heights,
                "registered components request more height than the terminal has; content reduced to one row"
            );
            content_bottom = 1;
        }

        self.regions.clear();
        self.regions.insert(
            CONTENT.to_string(),
            Region {
                x: 1,
                y: 1,
                width: self.terminal_width,
                height: content_bottom,
                z_order: 0,
                visible: true,
            },
        );

        let mut y = content_bottom + 1;
        for component in bottom_components {
            let height = component.height.min(self.terminal_height.saturating_sub(content_bottom));
            self.regions.insert(
                component.name.clone(),
                Region {
                    x: 1,
                    y,
                    width: self.terminal_width,
                    height,
                    z_order: component.z_order,
                    visible: component.visible,
                },
            );
            y += height;
        }

        self.scroll_region = ScrollRegion {
            top: 1,
            bottom: content_bottom,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footer(height: u16) -> ComponentInfo {
        ComponentInfo {
            name: "footer".to_string(),
            position: Position::Bottom,
            height,
            priority: 10,
            visible: true,
            z_order: 1,
        }
    }

    fn input(height: u16) -> ComponentInfo {
        ComponentInfo {
            name: "input".to_string(),
            position: Position::Bottom,
            height,
            priority: 20,
            visible: true,
            z_order: 2,
        }
    }

    #[test]
    fn scroll_region_80x24_with_4_line_footer_and_1_line_input() {
        let mut mgr = LayoutManager::new(80, 24);
        mgr.register(footer(4));
        mgr.register(input(1));

        let content = mgr.get_region("content").expect("content region");
        assert_eq!(content.height, 19);
        let scroll = mgr.get_scroll_region();
        assert_eq!(scroll, ScrollRegion { top: 1, bottom: 19 });

        let footer_region = mgr.get_region("footer").expect("footer region");
        assert_eq!(footer_region.y, 21);
        assert_eq!(footer_region.height, 4);

        let input_region = mgr.get_region("input").expect("input region");
        assert_eq!(input_region.y, 20);
    }

    #[test]
    fn resize_recomputes_scroll_region_and_moves_footer() {
        let mut mgr = LayoutManager::new(80, 24);
        mgr.register(footer(4));
        mgr.register(input(3));
        assert_eq!(mgr.get_scroll_region().bottom, 17);

        mgr.resize(60, 20);
        mgr.set_height("input", 5);
        assert_eq!(mgr.get_scroll_region(), ScrollRegion { top: 1, bottom: 11 });
    }

    #[test]
    fn unknown_region_lookup_fails() {
        let mgr = LayoutManager::new(80, 24);
        assert!(matches!(mgr.get_region("nope"), Err(Error::RegionUnknown(_))));
    }

    #[test]
    fn oversized_reservation_reduces_content_to_one_row_without_panicking() {
        let mut mgr = LayoutManager::new(80, 5);
        mgr.register(footer(10));
        let content = mgr.get_region("content").expect("content region");
        assert_eq!(content.height, 1);
    }

    #[test]
    fn set_height_reports_whether_layout_changed() {
        let mut mgr = LayoutManager::new(80, 24);
        mgr.register(input(1));
        assert!(mgr.set_height("input", 3));
        assert!(!mgr.set_height("input", 3));
    }
}
