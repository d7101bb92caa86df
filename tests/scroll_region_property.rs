//! Property 1: for any terminal size and any set of registered bottom
//! components, the derived scroll region never claims more rows than the
//! terminal has, and its bottom edge always matches the content region's
//! height exactly.

use ledit_tui::layout::{ComponentInfo, LayoutManager, Position};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

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
fn scroll_region_stays_within_bounds_across_randomized_resizes() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut mgr = LayoutManager::new(80, 24);
    mgr.register(footer(4));
    mgr.register(input(1));

    for _ in 0..500 {
        let width = rng.random_range(1..=300);
        let height = rng.random_range(1..=200);
        mgr.resize(width, height);
        mgr.set_height("input", rng.random_range(1..=6));

        let scroll = mgr.get_scroll_region();
        let content = mgr.get_region("content").expect("content region always exists");

        assert_eq!(scroll.top, 1, "top margin is always row 1");
        assert!(scroll.bottom <= height, "scroll bottom never exceeds terminal height");
        assert_eq!(
            scroll.bottom, content.height,
            "scroll region bottom always matches the content region's height"
        );
        assert!(scroll.bottom >= 1, "content is never reduced below one row");
    }
}

#[test]
fn resize_never_panics_when_reserved_height_exceeds_terminal_height() {
    let mut mgr = LayoutManager::new(80, 24);
    mgr.register(footer(50));
    mgr.register(input(50));

    for height in 1..=5u16 {
        mgr.resize(80, height);
        let content = mgr.get_region("content").expect("content region always exists");
        assert_eq!(content.height, 1);
        assert_eq!(mgr.get_scroll_region().bottom, 1);
    }
}
