use std::io;
use std::time::Duration;

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Alignment;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::reconcile::{ConfirmGate, DiscrepancyKind, DiscrepancySet};

const PREVIEW_MAX: usize = 40;

#[derive(Debug, Default)]
pub struct TerminalConfirm;

impl TerminalConfirm {
    pub fn new() -> Self {
        Self
    }

    fn prompt(&self, set: &DiscrepancySet) -> io::Result<bool> {
        enable_raw_mode()?;
        restoring(
            || {
                io::stdout().execute(EnterAlternateScreen)?;
                self.prompt_loop(set)
            },
            || {
                let left = io::stdout().execute(LeaveAlternateScreen).map(|_| ());
                disable_raw_mode().and(left)
            },
        )
    }

    fn prompt_loop(&self, set: &DiscrepancySet) -> io::Result<bool> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        let lines = dialog_lines(set);

        loop {
            terminal.draw(|frame| {
                let block = Block::default()
                    .borders(Borders::ALL)
                    .title("Correct ledger?");
                let text = Paragraph::new(lines.clone())
                    .alignment(Alignment::Center)
                    .wrap(Wrap { trim: true })
                    .block(block);
                frame.render_widget(text, frame.area());
            })?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    match key.code {
                        KeyCode::Char('y') | KeyCode::Char('Y') => return Ok(true),
                        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                            return Ok(false);
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

impl ConfirmGate for TerminalConfirm {
    fn confirm(&mut self, set: &DiscrepancySet) -> bool {
        match self.prompt(set) {
            Ok(confirmed) => confirmed,
            Err(err) => {
                tracing::error!(error = %err, "confirmation dialog failed, declining");
                false
            }
        }
    }
}

/// Runs `body`, then `restore` on every path. The body's error wins.
fn restoring<T>(
    body: impl FnOnce() -> io::Result<T>,
    restore: impl FnOnce() -> io::Result<()>,
) -> io::Result<T> {
    let result = body();
    let restored = restore();
    let value = result?;
    restored?;
    Ok(value)
}

fn dialog_lines(set: &DiscrepancySet) -> Vec<Line<'static>> {
    let action = match set.kind {
        DiscrepancyKind::LedgerRemoteNotMirrored => "mark as local",
        DiscrepancyKind::MirroredNotLedgerRemote => "mark as remote",
    };
    let mut preview = set
        .datasets
        .iter()
        .take(PREVIEW_MAX)
        .map(|id| id.as_str().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if set.datasets.len() > PREVIEW_MAX {
        preview.push_str(&format!(" … (+{})", set.datasets.len() - PREVIEW_MAX));
    }

    vec![
        Line::from(Span::styled(
            format!("{} {}", set.pipeline, set.kind),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(preview),
        Line::from(""),
        Line::from(format!(
            "{} {} dataset(s)? Press y to confirm, n to skip.",
            action,
            set.datasets.len()
        )),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::domain::{DatasetId, Pipeline};

    #[test]
    fn terminal_is_restored_when_setup_fails() {
        let mut restored = false;
        let result: io::Result<bool> = restoring(
            || Err(io::Error::other("alternate screen unavailable")),
            || {
                restored = true;
                Ok(())
            },
        );
        assert!(result.is_err());
        assert!(restored);
    }

    #[test]
    fn restore_error_surfaces_after_success() {
        let result = restoring(|| Ok(true), || Err(io::Error::other("raw mode stuck")));
        assert!(result.is_err());
    }

    #[test]
    fn long_sets_are_truncated_in_dialog() {
        let datasets = (1..=50)
            .map(|n| format!("ds{n:06}").parse::<DatasetId>().unwrap())
            .collect::<BTreeSet<_>>();
        let set = DiscrepancySet {
            pipeline: Pipeline::Mriqc,
            kind: DiscrepancyKind::MirroredNotLedgerRemote,
            datasets,
        };
        let lines = dialog_lines(&set);
        let preview = lines[2].to_string();
        assert!(preview.ends_with("(+10)"));
        assert!(lines[4].to_string().starts_with("mark as remote 50"));
    }
}
