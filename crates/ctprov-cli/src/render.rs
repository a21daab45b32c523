use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use ctprov_installer::ArchiveFetcher;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style(plain: bool) -> OutputStyle {
    if plain {
        return OutputStyle::Plain;
    }
    resolve_output_style(std::io::stdout().is_terminal())
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!();
            println!("{}", colorize(section_style(), &line));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_progress(self, label: &str, message: &str) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed_precise}")
            {
                progress_bar.set_style(style.tick_chars(progress_tick_chars(label)));
            }
            progress_bar.set_message(message.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalProgress {
    pub(crate) fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) =
            render_progress_line(self.style, &self.label, Some(self.started_at.elapsed()))
        {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

/// Wraps a fetcher with a spinner for interactive terminals.
pub(crate) struct ProgressFetcher<F> {
    inner: F,
    renderer: TerminalRenderer,
}

impl<F: ArchiveFetcher> ProgressFetcher<F> {
    pub(crate) fn new(inner: F, renderer: TerminalRenderer) -> Self {
        Self { inner, renderer }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: ArchiveFetcher> ArchiveFetcher for ProgressFetcher<F> {
    fn fetch(&self, url: &str, destination: &Path, strip_components: u32) -> anyhow::Result<()> {
        let progress = self
            .renderer
            .start_progress("fetch", &format!("fetching {url}"));
        match self.inner.fetch(url, destination, strip_components) {
            Ok(()) => {
                progress.finish_success();
                Ok(())
            }
            Err(err) => {
                progress.finish_abandon();
                Err(err)
            }
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("[{}] {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    match status {
        "ok" => "OK".to_string(),
        "warn" => "WARN".to_string(),
        "error" => "ERR".to_string(),
        "step" => "..".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(format!("== {title} ==")),
    }
}

fn render_progress_line(
    style: OutputStyle,
    label: &str,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();
    Some(format!(
        "{}{}",
        colorize(progress_label_style(), label),
        suffix
    ))
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn progress_tick_chars(label: &str) -> &'static str {
    match label {
        "fetch" => ".oO@* ",
        _ => "|/-\\ ",
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
