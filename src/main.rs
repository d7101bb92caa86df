//! Binary entry point: argument parsing, tracing setup, and the
//! composition of every component into a running session. Kept thin per
//! `app-server/src/main.rs`'s convention of delegating real logic into the
//! library crate.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ledit_tui::agent::{AgentReport, EchoAgent};
use ledit_tui::console::{AgentConsole, CtrlCOutcome, InputRoute, NullShellExecutor};
use ledit_tui::coordinator::{CoordinatorHandle, UiCoordinator};
use ledit_tui::footer::FooterSnapshot;
use ledit_tui::history::HistoryStore;
use ledit_tui::input::{Focus, InputEditor, PasteDetector, PasteOutcome};
use ledit_tui::keys::{KeyEvent, KeyParser};
use ledit_tui::layout::{ComponentInfo, LayoutManager, Position, Region};
use ledit_tui::markdown::StreamingFormatter;
use ledit_tui::terminal::{CrosstermSink, RawModeGuard, TerminalSink};

/// Default context window assumed for the footer's percentage display when
/// the stand-in agent never reports one of its own.
const DEFAULT_MAX_CONTEXT_TOKENS: u64 = 128_000;

/// Interactive terminal front-end for an AI coding assistant.
#[derive(Parser, Debug)]
#[command(name = "ledit", version, about)]
struct Cli {
    /// A single prompt to send before entering interactive mode.
    prompt: Option<String>,

    /// Override the history file path (default `$HOME/.ledit_agent_history`).
    #[arg(long)]
    history_file: Option<PathBuf>,
}

fn init_tracing() {
    let debug = std::env::var("LEDIT_DEBUG").map(|v| !v.is_empty()).unwrap_or(false);
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // stdout is the raw-mode canvas; logs must never land there. Route to a
    // daily-rolling file under the cache directory instead.
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ledit-tui");
    let file_appender = tracing_appender::rolling::daily(log_dir, "ledit-tui.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    // Leak the guard: it must live for the process lifetime to flush
    // buffered log lines, and main() never returns a value that could own
    // it across the async runtime shutdown.
    std::mem::forget(_guard);
}

fn history_path(cli: &Cli) -> PathBuf {
    cli.history_file.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".ledit_agent_history")
    })
}

/// Recomputes the layout and reapplies the derived scroll region whenever
/// the terminal is resized. `SIGWINCH` drives this on unix; a 100ms poll is
/// the documented fallback used unconditionally elsewhere and additionally
/// here as a backstop in case a signal is coalesced away.
fn spawn_resize_watcher(layout: Arc<Mutex<LayoutManager>>, sink: Arc<Mutex<dyn TerminalSink>>) {
    tokio::spawn(async move {
        let mut last_size = {
            let guard = match sink.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            guard.size().unwrap_or((80, 24))
        };

        #[cfg(unix)]
        let mut winch = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change()).ok();

        loop {
            #[cfg(unix)]
            {
                if let Some(stream) = winch.as_mut() {
                    tokio::select! {
                        _ = stream.recv() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
                    }
                } else {
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
            #[cfg(not(unix))]
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;

            let current_size = {
                let guard = match sink.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                guard.size().unwrap_or(last_size)
            };
            if current_size == last_size {
                continue;
            }
            last_size = current_size;

            let region = {
                let mut layout_guard = match layout.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                layout_guard.resize(current_size.0, current_size.1);
                layout_guard.get_scroll_region()
            };
            let mut sink_guard = match sink.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            let _ = sink_guard.set_scroll_region(region);
        }
    });
}

/// Runs one prompt through the agent on a dedicated blocking thread,
/// streaming its chunks into the formatter and clearing the streaming flag
/// (which un-gates redraws) when it finishes. Shared by the initial
/// `cli.prompt` positional argument and every submission typed at the
/// interactive prompt.
fn dispatch_agent(
    prompt: String,
    console: Arc<AgentConsole>,
    formatter: Arc<StreamingFormatter>,
    coordinator_handle: CoordinatorHandle,
    last_report: Arc<Mutex<AgentReport>>,
    iteration: Arc<AtomicU32>,
) {
    console.record_submission(&prompt);
    coordinator_handle.set_streaming(true);
    iteration.fetch_add(1, Ordering::Relaxed);
    let streaming_handle = coordinator_handle.clone();
    tokio::task::spawn_blocking(move || {
        let result = console.run_agent(&prompt, &|chunk| {
            formatter.write(chunk);
        });
        formatter.finalize();
        streaming_handle.set_streaming(false);
        match result {
            Ok(report) => {
                let mut guard = match last_report.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                *guard = report;
            }
            Err(e) => tracing::warn!(error = %e, "agent run failed"),
        }
    });
}

/// Resolves a paste-detector outcome into the edit buffer: a single
/// character is replayed as an ordinary key, a resolved burst is inserted
/// verbatim in one step.
fn resolve_paste_outcome(outcome: Option<PasteOutcome>, editor: &mut InputEditor) {
    match outcome {
        Some(PasteOutcome::Single(c)) => {
            editor.handle_key(KeyEvent::Char(c));
        }
        Some(PasteOutcome::Burst(text)) => {
            editor.insert_text(&text);
        }
        None => {}
    }
}

/// Builds the escape sequence that paints the wrapped prompt+buffer into the
/// input region and parks the cursor at its wrapped row/column, per §4.4.
/// Every row the region reserves is repainted (cleared-to-eol first) so a
/// shrinking buffer never leaves a stale line behind.
fn build_input_redraw(region: Region, rendered: &ledit_tui::input::RenderedInput) -> String {
    let mut out = String::new();
    let rows = region.height.max(1);
    for i in 0..rows {
        out.push_str(&format!("\x1b[{};{}H\x1b[K", region.y + i, region.x));
        if let Some(line) = rendered.lines.get(i as usize) {
            out.push_str(line);
        }
    }
    let cursor_row = rendered.cursor_row.min(rows.saturating_sub(1));
    out.push_str(&format!("\x1b[{};{}H", region.y + cursor_row, region.x + rendered.cursor_col));
    out
}

/// Re-syncs the editor's cached line count against the current terminal
/// width (which drives the height-change callback on a wrap change) and
/// queues a redraw of the input region. Called after every key that can
/// touch the buffer or cursor.
fn redraw_input(editor: &mut InputEditor, layout: &Arc<Mutex<LayoutManager>>, coordinator_handle: &CoordinatorHandle) {
    let (width, region) = {
        let guard = match layout.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let (width, _) = guard.terminal_size();
        (width, guard.get_region("input"))
    };
    editor.sync_cached_line_count(width);
    let Ok(region) = region else { return };
    let rendered = editor.render(width);
    coordinator_handle.queue_redraw(rendered.lines.len() as u16, move || build_input_redraw(region, &rendered));
}

/// Shells out to `git` to answer the footer's branch/dirty/remote fields.
/// Absence of a repository (or of `git` itself) is not an error: the footer
/// simply shows no git context.
fn git_probe() -> (Option<String>, u32, bool, Option<String>) {
    use std::process::Command;

    let branch = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let has_repo = branch.is_some();
    if !has_repo {
        return (None, 0, false, None);
    }

    let changes = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.lines().filter(|l| !l.is_empty()).count() as u32)
        .unwrap_or(0);

    let remote = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    (branch, changes, has_repo, remote)
}

/// Periodically samples the most recent agent totals and git state and
/// queues a fresh [`FooterSnapshot`]; the coordinator throttles how often
/// these actually render, so sampling every second is cheap headroom.
fn spawn_footer_watcher(
    coordinator_handle: CoordinatorHandle,
    last_report: Arc<Mutex<AgentReport>>,
    iteration: Arc<AtomicU32>,
    session_start: Instant,
) {
    tokio::spawn(async move {
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "?".to_string());
        loop {
            let report = {
                let guard = match last_report.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                *guard
            };
            let (git_branch, git_changes, git_has_repo, git_remote) =
                tokio::task::spawn_blocking(git_probe).await.unwrap_or((None, 0, false, None));

            coordinator_handle.queue_footer(FooterSnapshot {
                model: "echo".to_string(),
                provider: "local".to_string(),
                total_tokens: report.total_tokens,
                cost: report.cost,
                iteration: iteration.load(Ordering::Relaxed),
                context_tokens: report.context_tokens,
                max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
                git_branch,
                git_changes,
                git_has_repo,
                git_remote,
                path: cwd.clone(),
                session_start,
            });

            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let sink = CrosstermSink::new();
    let (width, height) = sink
        .size()
        .map_err(|_| ledit_tui::Error::TerminalUnavailable)?;
    let sink: Arc<Mutex<dyn TerminalSink>> = Arc::new(Mutex::new(sink));

    let raw_guard = RawModeGuard::acquire(&sink).map_err(|e| {
        tracing::error!(error = %e, "failed to enter raw mode");
        e
    })?;

    let mut layout = LayoutManager::new(width, height);
    layout.register(ComponentInfo {
        name: "footer".to_string(),
        position: Position::Bottom,
        height: 4,
        priority: 10,
        visible: true,
        z_order: 1,
    });
    layout.register(ComponentInfo {
        name: "input".to_string(),
        position: Position::Bottom,
        height: 1,
        priority: 20,
        visible: true,
        z_order: 2,
    });
    {
        let region = layout.get_scroll_region();
        let mut sink_guard = match sink.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let _ = sink_guard.set_scroll_region(region);
    }
    let layout = Arc::new(Mutex::new(layout));
    spawn_resize_watcher(layout.clone(), sink.clone());

    let history = Arc::new(HistoryStore::new());
    let history_file = history_path(&cli);
    if let Err(e) = history.load_from_file(&history_file) {
        tracing::warn!(error = %e, path = %history_file.display(), "failed to load history");
    }

    let coordinator = UiCoordinator::new(sink.clone());
    let coordinator_handle = coordinator.handle();
    let coordinator_task = tokio::spawn(async move { coordinator.run().await });

    let emitter_handle = coordinator_handle.clone();
    let formatter = Arc::new(StreamingFormatter::new(Arc::new(move |text: &str| {
        let handle = emitter_handle.clone();
        let owned = text.to_string();
        // `emit` runs on the agent's dedicated worker thread, never on the
        // async runtime's own worker threads, so blocking here cannot
        // starve the coordinator it is sending to.
        let rt = tokio::runtime::Handle::current();
        rt.block_on(handle.queue_content(owned));
    })));

    let console = Arc::new(AgentConsole::new(
        history.clone(),
        Arc::new(EchoAgent),
        Arc::new(NullShellExecutor),
    ));

    let focus = Arc::new(Mutex::new(Focus::Input));
    let focus_for_editor = focus.clone();
    let layout_for_height = layout.clone();
    let sink_for_height = sink.clone();
    let on_height_change: Arc<dyn Fn(u16) + Send + Sync> = Arc::new(move |height: u16| {
        let region = {
            let mut layout_guard = match layout_for_height.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            if !layout_guard.set_height("input", height) {
                return;
            }
            layout_guard.get_scroll_region()
        };
        let mut sink_guard = match sink_for_height.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let _ = sink_guard.set_scroll_region(region);
    });
    let mut editor = InputEditor::new(
        "> ",
        history.clone(),
        Arc::new(move || {
            match focus_for_editor.lock() {
                Ok(g) => *g,
                Err(p) => *p.into_inner(),
            }
        }),
        on_height_change,
    );

    let session_start = Instant::now();
    let last_report = Arc::new(Mutex::new(AgentReport::default()));
    let iteration = Arc::new(AtomicU32::new(0));
    spawn_footer_watcher(
        coordinator_handle.clone(),
        last_report.clone(),
        iteration.clone(),
        session_start,
    );

    coordinator_handle.queue_content(
        "ledit-tui ready. Type a message and press Enter, or /help for commands.\r\n".to_string(),
    )
    .await;

    if let Some(initial_prompt) = cli.prompt.clone() {
        dispatch_agent(
            initial_prompt,
            console.clone(),
            formatter.clone(),
            coordinator_handle.clone(),
            last_report.clone(),
            iteration.clone(),
        );
    }

    let mut parser = KeyParser::new();
    let mut paste_detector = PasteDetector::new();
    let mut stdin_buf = [0u8; 1];
    use tokio::io::AsyncReadExt;
    let mut stdin = tokio::io::stdin();
    let mut paste_tick = tokio::time::interval(std::time::Duration::from_millis(20));

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            e
        })?;
    #[cfg(unix)]
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            e
        })?;

    loop {
        // Terminal-driven shutdown: restore raw mode before the process
        // goes down so a `kill` (or a closed terminal sending SIGTERM)
        // never leaves the user's shell in raw mode.
        #[cfg(unix)]
        let byte = tokio::select! {
            result = stdin.read(&mut stdin_buf) => match result {
                Ok(0) | Err(_) => break,
                Ok(_) => Some(stdin_buf[0]),
            },
            _ = paste_tick.tick() => {
                if paste_detector.quiet_timeout_elapsed(std::time::Instant::now()) {
                    resolve_paste_outcome(paste_detector.finish(), &mut editor);
                    redraw_input(&mut editor, &layout, &coordinator_handle);
                }
                None
            }
            _ = sigterm.recv() => {
                drop(raw_guard);
                let _ = history.save_to_file(&history_file);
                return Ok(());
            }
            _ = sigint.recv() => {
                drop(raw_guard);
                let _ = history.save_to_file(&history_file);
                return Ok(());
            }
        };
        #[cfg(not(unix))]
        let byte = tokio::select! {
            result = stdin.read(&mut stdin_buf) => match result {
                Ok(0) | Err(_) => break,
                Ok(_) => Some(stdin_buf[0]),
            },
            _ = paste_tick.tick() => {
                if paste_detector.quiet_timeout_elapsed(std::time::Instant::now()) {
                    resolve_paste_outcome(paste_detector.finish(), &mut editor);
                    redraw_input(&mut editor, &layout, &coordinator_handle);
                }
                None
            }
            _ = tokio::signal::ctrl_c() => {
                drop(raw_guard);
                let _ = history.save_to_file(&history_file);
                return Ok(());
            }
        };
        let Some(byte) = byte else { continue };

        for event in parser.feed(byte) {
            match event {
                KeyEvent::Interrupt => match console.handle_ctrl_c(std::time::Instant::now()) {
                    CtrlCOutcome::StopNotice => {
                        coordinator_handle
                            .queue_content("\r\n^C  \u{1f6d1} Stopping...\r\n".to_string())
                            .await;
                    }
                    CtrlCOutcome::Exit => {
                        drop(raw_guard);
                        let _ = history.save_to_file(&history_file);
                        return Ok(());
                    }
                },
                // Ctrl-D on an empty line ends the session, mirroring a
                // shell's EOF-on-empty-line convention; on a non-empty
                // buffer it is a no-op rather than a destructive discard.
                KeyEvent::Eof if editor.is_empty() => {
                    drop(raw_guard);
                    let _ = history.save_to_file(&history_file);
                    return Ok(());
                }
                // Every other character is gated through the paste-burst
                // detector only while the buffer is empty and the parser
                // is not mid-escape-sequence; typing into an
                // already-started line bypasses burst detection entirely.
                KeyEvent::Char(c) if editor.is_empty() && !parser.is_pending() => {
                    let resolved = paste_detector.observe(c, std::time::Instant::now());
                    resolve_paste_outcome(resolved, &mut editor);
                    redraw_input(&mut editor, &layout, &coordinator_handle);
                }
                other => {
                    // Any non-character event (Enter included) ends a
                    // pending burst immediately rather than waiting out the
                    // quiet timeout.
                    resolve_paste_outcome(paste_detector.finish(), &mut editor);
                    let action = editor.handle_key(other);
                    redraw_input(&mut editor, &layout, &coordinator_handle);
                    if let ledit_tui::input::InputAction::Submit(text) = action {
                        let route = console.route(&text);
                        match route {
                            InputRoute::Command(line) => {
                                let outcome = console.handle_command(&line);
                                match outcome {
                                    ledit_tui::console::CommandOutcome::Quit => {
                                        drop(raw_guard);
                                        let _ = history.save_to_file(&history_file);
                                        return Ok(());
                                    }
                                    ledit_tui::console::CommandOutcome::Message(msg)
                                    | ledit_tui::console::CommandOutcome::Unknown(msg) => {
                                        coordinator_handle.queue_content(format!("{msg}\r\n")).await;
                                    }
                                    ledit_tui::console::CommandOutcome::ClearContent => {
                                        let mut sink_guard = match sink.lock() {
                                            Ok(g) => g,
                                            Err(p) => p.into_inner(),
                                        };
                                        let _ = sink_guard.clear_screen();
                                    }
                                    ledit_tui::console::CommandOutcome::StopAgent => {}
                                }
                            }
                            InputRoute::Shell(cmd) => {
                                if let Ok(output) = console.handle_shell(&cmd) {
                                    coordinator_handle.queue_content(format!("{output}\r\n")).await;
                                }
                            }
                            InputRoute::ConfirmShortInput(text) => {
                                coordinator_handle
                                    .queue_content(format!("confirm and resend to continue: {text}\r\n"))
                                    .await;
                            }
                            InputRoute::Agent(prompt) => {
                                dispatch_agent(
                                    prompt,
                                    console.clone(),
                                    formatter.clone(),
                                    coordinator_handle.clone(),
                                    last_report.clone(),
                                    iteration.clone(),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    drop(raw_guard);
    let _ = history.save_to_file(&history_file);
    coordinator_task.abort();
    Ok(())
}
