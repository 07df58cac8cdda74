use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::db::Database;
use crate::models::{JobStatus, StoredPosting, VisaConfidence};

struct AppState {
    postings: Vec<StoredPosting>,
    selected: usize,
    scroll_offset: u16,
}

impl AppState {
    fn new(postings: Vec<StoredPosting>) -> Self {
        Self {
            postings,
            selected: 0,
            scroll_offset: 0,
        }
    }

    fn current(&self) -> Option<&StoredPosting> {
        self.postings.get(self.selected)
    }

    fn next(&mut self) {
        if !self.postings.is_empty() && self.selected < self.postings.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn set_status(&mut self, db: &Database, status: JobStatus) {
        if let Some(posting) = self.postings.get_mut(self.selected) {
            if db.set_status(&posting.stable_id, status.as_str()).is_ok() {
                posting.status = status;
            }
        }
    }

    fn toggle_saved(&mut self, db: &Database) {
        if let Some(posting) = self.postings.get_mut(self.selected) {
            if let Ok(saved) = db.toggle_saved(&posting.stable_id) {
                posting.saved = saved;
            }
        }
    }
}

pub fn run_board(db: &Database, limit: usize) -> Result<()> {
    let postings = db.top_postings(limit)?;
    if postings.is_empty() {
        println!("No postings found. Run 'greenlight ingest' first.");
        return Ok(());
    }

    let mut state = AppState::new(postings);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    db: &Database,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('s') => state.toggle_saved(db),
                KeyCode::Char('t') => state.set_status(db, JobStatus::ToApply),
                KeyCode::Char('a') => state.set_status(db, JobStatus::Applied),
                KeyCode::Char('i') => state.set_status(db, JobStatus::Interviewing),
                KeyCode::Char('o') => state.set_status(db, JobStatus::Offer),
                KeyCode::Char('x') => state.set_status(db, JobStatus::Rejected),
                KeyCode::Char('z') => state.set_status(db, JobStatus::Archived),
                KeyCode::Char('n') => state.set_status(db, JobStatus::New),
                _ => {}
            }
            list_state.select(Some(state.selected));
        }
    }
    Ok(())
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(frame.area());

    let items: Vec<ListItem> = state
        .postings
        .iter()
        .map(|posting| {
            let glyph = match posting.visa_confidence {
                VisaConfidence::Green => "G",
                VisaConfidence::Yellow => "Y",
                VisaConfidence::Red => "R",
                VisaConfidence::Unknown => "?",
            };
            let saved = if posting.saved { "*" } else { " " };
            let title = if posting.title.len() > 32 {
                format!("{}...", &posting.title[..29])
            } else {
                posting.title.clone()
            };
            ListItem::new(format!(
                "{saved}{glyph} {:>3}% {} | {}",
                posting.success_probability, title, posting.company
            ))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Postings ({}) ",
            state.postings.len()
        )))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    let detail = build_detail(state);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    let help_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let help = Paragraph::new(
        " j/k:navigate  J/K:scroll  s:save  t:to-apply a:applied i:interviewing o:offer x:reject z:archive  q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, help_area[1]);
}

fn build_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(posting) = state.current() else {
        return Text::raw("No posting selected");
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(
        &posting.title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", posting.company)));

    let status_style = match posting.status {
        JobStatus::New => Style::default().fg(Color::Green),
        JobStatus::ToApply => Style::default().fg(Color::Yellow),
        JobStatus::Applied => Style::default().fg(Color::Cyan),
        JobStatus::Interviewing => Style::default().fg(Color::Magenta),
        JobStatus::Offer => Style::default().fg(Color::LightGreen),
        JobStatus::Rejected => Style::default().fg(Color::Red),
        JobStatus::Archived => Style::default().fg(Color::DarkGray),
    };
    lines.push(Line::from(Span::styled(
        format!("Status: {}", posting.status.as_str()),
        status_style,
    )));

    let visa_style = match posting.visa_confidence {
        VisaConfidence::Green => Style::default().fg(Color::Green),
        VisaConfidence::Yellow => Style::default().fg(Color::Yellow),
        VisaConfidence::Red => Style::default().fg(Color::Red),
        VisaConfidence::Unknown => Style::default().fg(Color::DarkGray),
    };
    lines.push(Line::from(Span::styled(
        format!(
            "Visa: {} | score {} | probability {}%",
            posting.visa_confidence.as_str(),
            posting.match_score,
            posting.success_probability
        ),
        visa_style,
    )));

    if !posting.location.is_empty() {
        lines.push(Line::from(format!("Location: {}", posting.location)));
    }
    if let Some(salary) = posting.salary_annual_gbp {
        lines.push(Line::from(format!("Salary: ~£{salary}/yr")));
    } else if let Some(text) = &posting.salary_text {
        lines.push(Line::from(format!("Salary: {text}")));
    }
    if let Some(label) = &posting.occupation_label {
        let code = posting.occupation_code.as_deref().unwrap_or("?");
        lines.push(Line::from(format!("Occupation: {label} ({code})")));
    }
    if posting.is_bcorp {
        lines.push(Line::from(Span::styled(
            "Certified B Corp",
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(url) = &posting.url {
        lines.push(Line::from(format!("URL: {url}")));
    }

    lines.push(Line::from(""));
    for line in textwrap::fill(&posting.ai_summary, 70).lines() {
        lines.push(Line::from(line.to_string()));
    }
    lines.push(Line::from(""));
    for line in textwrap::fill(&posting.visa_reason, 70).lines() {
        lines.push(Line::from(Span::styled(
            line.to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    if !posting.notes.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Notes",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(&posting.notes, 70).lines() {
            lines.push(Line::from(line.to_string()));
        }
    }

    if !posting.description.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Description",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in crate::normalize::strip_html(&posting.description)
            .split(". ")
            .map(|s| s.to_string())
        {
            for wrapped in textwrap::fill(&line, 70).lines() {
                lines.push(Line::from(wrapped.to_string()));
            }
        }
    }

    Text::from(lines)
}
