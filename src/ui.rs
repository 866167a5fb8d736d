// Terminal dashboard and batch output

use crate::aggregate::{fill_histogram, Selection, SharedSelection, Term};
use crate::error::UiError;
use crate::monitor::Tick;
use crossbeam_channel::{Receiver, TryRecvError};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    DefaultTerminal, Frame,
};
use std::io::Write;
use std::time::Duration;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Three parallel columns, one entry per key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Rows {
    pub labels: Vec<String>,
    pub bars: Vec<String>,
    pub values: Vec<String>,
}

impl Rows {
    pub fn from_term(term: &Term, bar_width: usize) -> Rows {
        let sum = term.sum();
        let mut rows = Rows::default();
        for e in term.iter() {
            rows.labels.push(format!("{:>8}", e.key));
            rows.bars.push(fill_histogram(sum, e.value, bar_width));
            rows.values.push(format!("{:>8}", e.value));
        }
        rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Select(Selection),
    Quit,
}

pub fn action_for(key: &KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Char(c) => Selection::from_key(c).map(Action::Select),
        _ => None,
    }
}

/// Draw ticks until the user quits or the tick sender goes away.
pub fn run(ticks: Receiver<Tick>, selection: SharedSelection) -> Result<(), UiError> {
    let mut terminal = ratatui::try_init().map_err(UiError::Init)?;
    let result = event_loop(&mut terminal, &ticks, &selection);
    ratatui::restore();
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    ticks: &Receiver<Tick>,
    selection: &SharedSelection,
) -> Result<(), UiError> {
    let mut latest: Option<Tick> = None;
    let mut dirty = true;

    loop {
        loop {
            match ticks.try_recv() {
                Ok(tick) => {
                    latest = Some(tick);
                    dirty = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }

        if dirty {
            terminal
                .draw(|f| draw(f, latest.as_ref(), selection.get()))
                .map_err(UiError::Draw)?;
            dirty = false;
        }

        if !event::poll(INPUT_POLL).map_err(UiError::Event)? {
            continue;
        }
        match event::read().map_err(UiError::Event)? {
            Event::Key(key) => match action_for(&key) {
                Some(Action::Quit) => return Ok(()),
                Some(Action::Select(next)) => {
                    selection.set(next);
                    dirty = true;
                }
                None => {}
            },
            Event::Resize(..) => {
                terminal.clear().map_err(UiError::Draw)?;
                dirty = true;
            }
            _ => {}
        }
    }
}

/// Header text. The grouping named is the one the rows were built with;
/// a newer choice is shown as pending until the next refresh.
fn status_line(tick: Option<&Tick>, selection: Selection) -> String {
    let Some(t) = tick else {
        return format!(":PRESS q TO QUIT  by {}  waiting for data", selection);
    };
    let mut status = format!(
        ":PRESS q TO QUIT  [c]lient [s]erver [o]peration [u]ser  by {}",
        t.selection
    );
    if selection != t.selection {
        status.push_str(&format!(" (next: {})", selection));
    }
    status.push_str(&format!(
        "  {} requests  {}",
        t.term.sum(),
        t.at.format("%H:%M:%S")
    ));
    status
}

fn draw(f: &mut Frame, tick: Option<&Tick>, selection: Selection) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(f.area());

    let title = Paragraph::new(status_line(tick, selection))
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("NFS top")
                .border_style(Style::default().fg(Color::Cyan)),
        );
    f.render_widget(title, chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(4, 12),
            Constraint::Ratio(6, 12),
            Constraint::Ratio(2, 12),
        ])
        .split(chunks[1]);

    let rows = tick
        .map(|t| Rows::from_term(&t.term, columns[1].width as usize))
        .unwrap_or_default();

    for (column, items) in [rows.labels, rows.bars, rows.values].into_iter().enumerate() {
        let list = List::new(items.into_iter().map(ListItem::new).collect::<Vec<_>>());
        f.render_widget(list, columns[column]);
    }
}

/// Write every tick as one JSON line.
pub fn print_batch(ticks: Receiver<Tick>, mut out: impl Write) -> std::io::Result<()> {
    for tick in ticks {
        serde_json::to_writer(&mut out, &tick)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate_by;
    use crate::nfs::DecodeStats;
    use crate::stream::TrackerStats;
    use chrono::Local;
    use crossbeam_channel::unbounded;

    fn tick(selection: Selection, keys: &[&str], calls: u64) -> Tick {
        Tick {
            at: Local::now(),
            selection,
            term: aggregate_by(keys, |s| s.to_string()),
            segments: 4,
            connections: 1,
            decoder: DecodeStats {
                calls,
                ..DecodeStats::default()
            },
            tracker: TrackerStats::default(),
        }
    }

    #[test]
    fn rows_are_parallel_and_proportional() {
        let term = aggregate_by(&["a", "b", "a", "a"], |s| s.to_string());
        let rows = Rows::from_term(&term, 20);
        assert_eq!(rows.labels, ["       a", "       b"]);
        assert_eq!(rows.bars, ["|".repeat(15), "|".repeat(5)]);
        assert_eq!(rows.values, ["       3", "       1"]);
    }

    #[test]
    fn empty_term_has_no_rows() {
        assert_eq!(Rows::from_term(&Term::default(), 40), Rows::default());
    }

    #[test]
    fn keys_map_to_actions() {
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        let select = |s| Some(Action::Select(s));
        assert_eq!(action_for(&press(KeyCode::Char('s'))), select(Selection::ByServer));
        assert_eq!(action_for(&press(KeyCode::Char('u'))), select(Selection::ByUser));
        assert_eq!(action_for(&press(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(action_for(&press(KeyCode::Char('x'))), None);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(action_for(&ctrl_c), Some(Action::Quit));
    }

    #[test]
    fn header_names_the_grouping_of_the_rows() {
        assert!(status_line(None, Selection::ByUser).contains("by user  waiting"));

        let t = tick(Selection::ByClient, &["10.0.0.5", "10.0.0.5"], 2);
        let status = status_line(Some(&t), Selection::ByClient);
        assert!(status.contains("by client  2 requests"), "{}", status);
        assert!(!status.contains("next"));

        let status = status_line(Some(&t), Selection::ByOpCode);
        assert!(status.contains("by client (next: operation)"), "{}", status);
    }

    #[test]
    fn batch_writes_one_json_line_per_tick() {
        let (tx, rx) = unbounded();
        tx.send(tick(Selection::ByOpCode, &["READ", "READ", "WRITE"], 3)).unwrap();
        tx.send(tick(Selection::ByUser, &[], 0)).unwrap();
        drop(tx);

        let mut out = Vec::new();
        print_batch(rx, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with('\n'));

        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["selection"], "by_op_code");
        assert_eq!(lines[0]["term"]["sum"], 3);
        assert_eq!(lines[0]["term"]["elements"][0]["key"], "READ");
        assert_eq!(lines[0]["decoder"]["calls"], 3);
        assert_eq!(lines[1]["selection"], "by_user");
        assert_eq!(lines[1]["term"]["sum"], 0);
        assert_eq!(lines[1]["decoder"]["calls"], 0);
    }
}
