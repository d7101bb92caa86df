//! Property 10: raw-mode scoping survives panic-driven shutdown. A
//! [`RawModeGuard`] restores the terminal's prior mode on `Drop`, and
//! `Drop` still runs during an unwinding panic, so a crash mid-scope must
//! never leave the terminal stuck in raw mode.

use std::panic;
use std::sync::Mutex;

use ledit_tui::terminal::{RawModeGuard, RecordingSink, TerminalSink};

#[test]
fn raw_mode_is_restored_even_when_the_scope_panics() {
    let sink = Mutex::new(RecordingSink::new(80, 24));

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let _guard = RawModeGuard::acquire(&sink).expect("acquire");
        assert!(sink.lock().expect("lock").is_raw_mode());
        panic!("simulated crash while raw mode is active");
    }));

    assert!(result.is_err(), "the panic must have actually unwound");
    assert!(
        !sink.lock().expect("lock").is_raw_mode(),
        "raw mode must be restored by the guard's Drop during unwind"
    );
}

#[test]
fn explicit_restore_before_drop_is_still_safe_on_double_drop_path() {
    let sink = Mutex::new(RecordingSink::new(80, 24));
    let guard = RawModeGuard::acquire(&sink).expect("acquire");
    guard.restore();
    drop(guard);
    assert!(!sink.lock().expect("lock").is_raw_mode());
}
