use std::io::Write;
use std::time::Duration;

use env_logger::fmt::Color;
use env_logger::{Builder, Env};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{Level, LevelFilter};
use once_cell::sync::OnceCell;

/// The shared sink for progress bars. Bars registered here print above the
/// log lines instead of fighting them for the terminal.
static PROGRESS: OnceCell<MultiProgress> = OnceCell::new();

/// Redraw cadence for spinners on long operations.
const TICK: Duration = Duration::from_millis(120);

/// Install the process-wide logger.
///
/// The default level is Warn: merges and splits are logged as warnings and
/// form the operator's first audit surface, so they stay visible without
/// any flag. `-v` adds routine progress, `-vv` per-step calculation
/// detail, `-vvv` everything; `--quiet` drops to errors only. The
/// SNAPCLUST_LOG environment variable overrides the whole ladder.
///
/// Calling init twice (tests, mostly) keeps the first sink and only
/// adjusts the level.
pub fn init(verbose: u8, quiet: bool) {
    let filter = level_for(verbose, quiet);

    let logger = Builder::new()
        .filter_level(filter)
        .format(|buf, record| {
            let mut level_style = buf.style();
            level_style.set_color(colour_of(record.level())).set_bold(true);

            // errors keep their origin, so a failed transaction can be
            // traced without rerunning at higher verbosity
            let origin = match (record.level(), record.file(), record.line()) {
                (Level::Error, Some(file), Some(line)) => format!("[{file}:{line}] "),
                _ => String::new(),
            };
            writeln!(
                buf,
                "{} {:>5} {origin}{}",
                buf.timestamp_seconds(),
                level_style.value(record.level()),
                record.args()
            )
        })
        .parse_env(Env::default().filter("SNAPCLUST_LOG"))
        .build();

    let multi = PROGRESS.get_or_init(MultiProgress::new).clone();
    let _ = LogWrapper::new(multi, logger).try_init();
    log::set_max_level(filter);
}

fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        3..=u8::MAX => LevelFilter::Trace,
    }
}

fn colour_of(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn  => Color::Yellow,
        Level::Info  => Color::Green,
        Level::Debug | Level::Trace => Color::Cyan,
    }
}

/// A bar for counted work, e.g. a distance sweep over a known number of
/// samples. Finish or drop it to release the line.
pub fn progress(len: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(len).with_message(message.to_string());
    if let Ok(style) = ProgressStyle::with_template("{msg:<28} [{bar:32}] {pos}/{len} ({eta})") {
        bar.set_style(style);
    }
    attach(bar)
}

/// A spinner for work with no usable length, e.g. a whole admission or
/// removal. Ticks on its own until finished.
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner().with_message(message.to_string());
    spinner.enable_steady_tick(TICK);
    attach(spinner)
}

fn attach(bar: ProgressBar) -> ProgressBar {
    match PROGRESS.get() {
        Some(multi) => multi.add(bar),
        // logging was never initialised; let the bar draw on its own
        None => bar,
    }
}
