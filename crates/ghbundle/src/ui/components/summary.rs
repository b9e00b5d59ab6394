//! Selection summary, last run statistics, and generation progress.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap};

use crate::app::tokens::TokenEstimate;
use crate::domain::model::{FileFailure, Progress, RepoInfo};

/// Outcome of the most recent finished generation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
    pub tokens: TokenEstimate,
    pub output: Option<String>,
}

/// Everything the panel shows, borrowed from the application state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryView<'a> {
    pub repo: Option<&'a RepoInfo>,
    pub selected: usize,
    pub eligible: usize,
    pub truncated: bool,
    pub progress: Option<Progress>,
    pub last_run: Option<&'a RunReport>,
}

#[derive(Debug, Default)]
pub struct Summary;

impl Summary {
    pub fn render(&self, frame: &mut Frame<'_>, area: Rect, view: &SummaryView<'_>) {
        let block = Block::default().title("Bundle").borders(Borders::ALL);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let progress_height = if view.progress.is_some() { 1 } else { 0 };
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4),
                Constraint::Length(progress_height),
                Constraint::Min(1),
            ])
            .split(inner);

        frame.render_widget(
            Paragraph::new(selection_lines(view)).wrap(Wrap { trim: true }),
            layout[0],
        );

        if let Some(progress) = view.progress {
            let gauge = Gauge::default()
                .gauge_style(Style::default().fg(Color::Cyan).bg(Color::Black))
                .ratio(progress.fraction().clamp(0.0, 1.0))
                .label(format!("{}/{}", progress.completed, progress.total));
            frame.render_widget(gauge, layout[1]);
        }

        match view.last_run {
            Some(report) => render_report(frame, layout[2], report),
            None => frame.render_widget(
                Paragraph::new("No bundle generated yet")
                    .style(Style::default().fg(Color::DarkGray)),
                layout[2],
            ),
        }
    }
}

fn selection_lines(view: &SummaryView<'_>) -> Vec<Line<'static>> {
    let repo = view
        .repo
        .map(ToString::to_string)
        .unwrap_or_else(|| "loading…".to_string());
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Repo", Style::default().fg(Color::Gray)),
            Span::raw(": "),
            Span::styled(repo, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::styled("Selected", Style::default().fg(Color::Gray)),
            Span::raw(format!(": {} / {} files", view.selected, view.eligible)),
        ]),
    ];
    if view.truncated {
        lines.push(Line::styled(
            "Listing truncated by GitHub",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::ITALIC),
        ));
    }
    lines
}

fn render_report(frame: &mut Frame<'_>, area: Rect, report: &RunReport) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(1)])
        .split(area);

    let tokens = &report.tokens;
    let usage_color = if tokens.over_budget {
        Color::Red
    } else if tokens.budget_percent() >= 90.0 {
        Color::Yellow
    } else {
        Color::Green
    };

    let mut header = vec![
        Line::from(vec![
            Span::styled("Files", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                ": {} of {} fetched",
                report.succeeded, report.attempted
            )),
        ]),
        Line::from(vec![
            Span::styled("Tokens", Style::default().fg(Color::Gray)),
            Span::raw(": "),
            Span::styled(
                format!("{} / {}", tokens.tokens, tokens.budget),
                Style::default().fg(usage_color),
            ),
            Span::raw(format!(" ({})", tokens.model)),
        ]),
    ];
    if let Some(output) = &report.output {
        header.push(Line::from(vec![
            Span::styled("Saved", Style::default().fg(Color::Gray)),
            Span::raw(format!(": {output}")),
        ]));
    }
    frame.render_widget(Paragraph::new(header).wrap(Wrap { trim: true }), layout[0]);

    let failures: Vec<ListItem> = report
        .failures
        .iter()
        .map(|failure| {
            ListItem::new(Line::from(vec![
                Span::styled("✗ ", Style::default().fg(Color::Red)),
                Span::raw(failure.path.clone()),
                Span::styled(
                    format!(" {}", failure.message),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();
    frame.render_widget(List::new(failures), layout[1]);
}
