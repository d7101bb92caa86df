//! The serialization point: a priority-aware scheduler that interleaves
//! content writes, throttled footer renders, and buffer redraws onto the
//! single terminal sink, and never lets one interrupt another mid-line.
//!
//! No teacher file owns an equivalent — `codex-tui` hands an entire frame
//! to `ratatui` and lets it diff the whole screen, so there is no separate
//! priority queue to reconcile streaming content against a footer. The
//! bounded-channel-plus-single-consumer shape is grounded on the ordinary
//! Tokio mpsc-consumer pattern `codex-tui`'s own `app_event.rs` uses to
//! funnel everything through one channel; this module layers priority
//! across three such channels instead of one.
//!
//! Lock-order discipline: [`crate::markdown::StreamingFormatter`] releases
//! its internal lock before invoking the emitter (which only pushes onto
//! `content_tx`, itself lock-free with respect to the sink). The sink's
//! `Mutex` is acquired only inside the single consumer task, for the
//! duration of one render. No code path ever holds both locks at once, so
//! the two components cannot deadlock against each other regardless of
//! scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use crate::footer::{render_footer, FooterSnapshot};
use crate::terminal::TerminalSink;

const CONTENT_CHANNEL_CAPACITY: usize = 256;
const REDRAW_CHANNEL_CAPACITY: usize = 1;
const DEFAULT_FOOTER_THROTTLE: Duration = Duration::from_millis(100);

type RedrawCallback = Box<dyn FnOnce() -> String + Send>;

struct RedrawRequest {
    buffer_height: u16,
    callback: RedrawCallback,
}

/// Shared handle producers use to enqueue work; cheap to clone.
#[derive(Clone)]
pub struct CoordinatorHandle {
    content_tx: mpsc::Sender<String>,
    redraw_tx: mpsc::Sender<RedrawRequest>,
    footer_tx: watch::Sender<Option<FooterSnapshot>>,
    streaming: Arc<AtomicBool>,
}

impl CoordinatorHandle {
    /// Priority 10. Blocks (awaits) if the channel is full rather than
    /// dropping — content is never dropped.
    pub async fn queue_content(&self, text: String) {
        // A closed receiver means the consumer task has shut down; there is
        // nothing left to deliver to.
        let _ = self.content_tx.send(text).await;
    }

    /// Priority 1, lossy: only the most recent snapshot survives.
    pub fn queue_footer(&self, snapshot: FooterSnapshot) {
        let _ = self.footer_tx.send(Some(snapshot));
    }

    /// Priority 5. Dropped outright while streaming, and dropped on
    /// overflow otherwise (the next tick will produce a fresher redraw
    /// anyway).
    pub fn queue_redraw(&self, buffer_height: u16, callback: impl FnOnce() -> String + Send + 'static) {
        if self.streaming.load(Ordering::Acquire) {
            return;
        }
        let _ = self.redraw_tx.try_send(RedrawRequest {
            buffer_height,
            callback: Box::new(callback),
        });
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }
}

/// Owns the terminal sink and runs the single consumer loop. Constructed
/// once by the composition root; [`UiCoordinator::handle`] is cloned out
/// to every producer.
pub struct UiCoordinator {
    handle: CoordinatorHandle,
    content_rx: Mutex<Option<mpsc::Receiver<String>>>,
    redraw_rx: Mutex<Option<mpsc::Receiver<RedrawRequest>>>,
    footer_rx: watch::Receiver<Option<FooterSnapshot>>,
    sink: Arc<Mutex<dyn TerminalSink>>,
    footer_throttle: Duration,
}

impl UiCoordinator {
    pub fn new(sink: Arc<Mutex<dyn TerminalSink>>) -> Self {
        Self::with_throttle(sink, DEFAULT_FOOTER_THROTTLE)
    }

    pub fn with_throttle(sink: Arc<Mutex<dyn TerminalSink>>, footer_throttle: Duration) -> Self {
        let (content_tx, content_rx) = mpsc::channel(CONTENT_CHANNEL_CAPACITY);
        let (redraw_tx, redraw_rx) = mpsc::channel(REDRAW_CHANNEL_CAPACITY);
        let (footer_tx, footer_rx) = watch::channel(None);
        Self {
            handle: CoordinatorHandle {
                content_tx,
                redraw_tx,
                footer_tx,
                streaming: Arc::new(AtomicBool::new(false)),
            },
            content_rx: Mutex::new(Some(content_rx)),
            redraw_rx: Mutex::new(Some(redraw_rx)),
            footer_rx,
            sink,
            footer_throttle,
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Runs the scheduler until every producer handle is dropped. On each
    /// iteration: a content item if present, else a redraw if not
    /// streaming, else a footer if the throttle has elapsed.
    pub async fn run(&self) {
        let mut content_rx = lock(&self.content_rx).take().expect("run called once");
        let mut redraw_rx = lock(&self.redraw_rx).take().expect("run called once");
        let mut footer_rx = self.footer_rx.clone();
        let mut last_footer_emit: Option<Instant> = None;

        loop {
            if let Ok(text) = content_rx.try_recv() {
                self.write_content(&text);
                continue;
            }
            if !self.handle.is_streaming() {
                if let Ok(request) = redraw_rx.try_recv() {
                    self.run_redraw(request);
                    continue;
                }
            }
            let throttle_elapsed = last_footer_emit
                .map(|t| t.elapsed() >= self.footer_throttle)
                .unwrap_or(true);
            if throttle_elapsed {
                if let Some(snapshot) = footer_rx.borrow_and_update().clone() {
                    self.render_footer(&snapshot);
                    last_footer_emit = Some(Instant::now());
                    continue;
                }
            }

            tokio::select! {
                maybe = content_rx.recv() => {
                    match maybe {
                        Some(text) => self.write_content(&text),
                        None => break,
                    }
                }
                _ = footer_rx.changed() => {}
                _ = tokio::time::sleep(self.footer_throttle) => {}
            }
        }
    }

    fn write_content(&self, text: &str) {
        let mut sink = match self.sink.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let _ = sink.write(text.as_bytes());
        let _ = sink.flush();
    }

    fn run_redraw(&self, request: RedrawRequest) {
        let text = (request.callback)();
        let mut sink = match self.sink.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let _ = sink.write(text.as_bytes());
        let _ = sink.flush();
        let _ = request.buffer_height;
    }

    fn render_footer(&self, snapshot: &FooterSnapshot) {
        let (separator, status) = render_footer(snapshot, self.terminal_width(), Instant::now());
        let mut sink = match self.sink.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let _ = sink.save_cursor();
        // The footer always renders on the last two rows of the terminal,
        // outside any scroll region the content area has claimed.
        let (_, height) = sink.size().unwrap_or((80, 24));
        let _ = sink.move_cursor(1, height.saturating_sub(1));
        let _ = sink.write(separator.as_bytes());
        let _ = sink.move_cursor(1, height);
        let _ = sink.write(status.as_bytes());
        let _ = sink.write(b"\x1b[0m");
        let _ = sink.restore_cursor();
        let _ = sink.flush();
    }

    fn terminal_width(&self) -> u16 {
        let sink = match self.sink.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        sink.size().map(|(w, _)| w).unwrap_or(80)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::RecordingSink;
    use std::time::Duration as StdDuration;

    fn test_snapshot() -> FooterSnapshot {
        FooterSnapshot {
            model: "test-model".to_string(),
            provider: "test".to_string(),
            total_tokens: 1000,
            cost: 0.01,
            iteration: 1,
            context_tokens: 100,
            max_context_tokens: 1000,
            git_branch: None,
            git_changes: 0,
            git_has_repo: false,
            git_remote: None,
            path: "/".to_string(),
            session_start: Instant::now(),
        }
    }

    #[tokio::test]
    async fn content_is_written_in_order() {
        let sink = Arc::new(Mutex::new(RecordingSink::new(80, 24)));
        let coordinator = UiCoordinator::new(sink.clone());
        let handle = coordinator.handle();

        let run_task = tokio::spawn(async move {
            coordinator.run().await;
        });

        handle.queue_content("a".to_string()).await;
        handle.queue_content("b".to_string()).await;
        handle.queue_content("c".to_string()).await;

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        drop(handle);
        let _ = tokio::time::timeout(StdDuration::from_secs(1), run_task).await;

        let written = sink.lock().expect("lock").written();
        assert_eq!(String::from_utf8_lossy(&written), "abc");
    }

    #[tokio::test]
    async fn redraw_is_dropped_while_streaming() {
        let sink = Arc::new(Mutex::new(RecordingSink::new(80, 24)));
        let coordinator = UiCoordinator::new(sink.clone());
        let handle = coordinator.handle();
        handle.set_streaming(true);

        let run_task = tokio::spawn(async move {
            coordinator.run().await;
        });

        handle.queue_redraw(1, || "should not appear".to_string());
        handle.queue_content("visible".to_string()).await;

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        drop(handle);
        let _ = tokio::time::timeout(StdDuration::from_secs(1), run_task).await;

        let written = sink.lock().expect("lock").written();
        assert_eq!(String::from_utf8_lossy(&written), "visible");
    }

    #[tokio::test]
    async fn footer_snapshot_is_rendered_after_throttle() {
        let sink = Arc::new(Mutex::new(RecordingSink::new(80, 24)));
        let coordinator = UiCoordinator::with_throttle(sink.clone(), StdDuration::from_millis(10));
        let handle = coordinator.handle();

        let run_task = tokio::spawn(async move {
            coordinator.run().await;
        });

        handle.queue_footer(test_snapshot());
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        drop(handle);
        let _ = tokio::time::timeout(StdDuration::from_secs(1), run_task).await;

        let written = sink.lock().expect("lock").written();
        assert!(String::from_utf8_lossy(&written).contains("test-model"));
    }

    #[test]
    fn acquiring_sink_lock_does_not_block_queueing_content() {
        // The sink lock and the formatter's internal lock are never held
        // together: queueing content only touches the channel, so holding
        // the sink lock on another thread cannot deadlock a producer.
        let sink = Arc::new(Mutex::new(RecordingSink::new(80, 24)));
        let coordinator = UiCoordinator::new(sink.clone());
        let handle = coordinator.handle();

        let _sink_guard = sink.lock().expect("lock");
        let start = Instant::now();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        rt.block_on(handle.queue_content("x".to_string()));
        assert!(start.elapsed() < StdDuration::from_secs(1));
    }
}
