//! Ratatui-based terminal UI.
//!
//! A drill-down browser over the stored hierarchy (states, then commodities,
//! then markets, then records) with a price chart for the highlighted market.
//! Ingestion can be triggered on demand and, optionally, in the background.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};
use tracing::{error, info};

use crate::app::SourceSpec;
use crate::app::pipeline::{IngestReport, Orchestrator};
use crate::error::AppError;
use crate::query::{PriceSeries, QueryPath, QueryService, QueryView};
use crate::scheduler::IntervalScheduler;

mod plotters_chart;

use plotters_chart::PriceChart;

/// What the browser needs from the rest of the application.
pub struct TuiContext {
    pub orchestrator: Arc<Orchestrator>,
    pub query: QueryService,
    pub source: SourceSpec,
    /// Run ingestion in the background at this interval.
    pub background_interval: Option<Duration>,
}

/// Start the TUI.
pub fn run(context: TuiContext) -> Result<(), AppError> {
    let mut app = App::new(context)?;

    let _guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

type RunResult = Result<IngestReport, String>;

struct App {
    orchestrator: Arc<Orchestrator>,
    query: QueryService,
    source: SourceSpec,
    path: QueryPath,
    view: QueryView,
    selected: usize,
    series: PriceSeries,
    status: String,
    last_report: Option<IngestReport>,
    update_requested: bool,
    background: Option<(IntervalScheduler, Receiver<RunResult>)>,
}

impl App {
    fn new(context: TuiContext) -> Result<Self, AppError> {
        let TuiContext {
            orchestrator,
            query,
            source,
            background_interval,
        } = context;

        let view = query.query_by_path(&QueryPath::Root)?;
        let mut app = Self {
            orchestrator,
            query,
            source,
            path: QueryPath::Root,
            view,
            selected: 0,
            series: PriceSeries::default(),
            status: "Press u to fetch the latest prices.".to_string(),
            last_report: None,
            update_requested: false,
            background: None,
        };

        if let Some(interval) = background_interval {
            app.start_background(interval)?;
        }
        app.refresh_series()?;
        Ok(app)
    }

    fn start_background(&mut self, interval: Duration) -> Result<(), AppError> {
        let (tx, rx) = mpsc::channel::<RunResult>();
        let orchestrator = Arc::clone(&self.orchestrator);
        let source = self.source.clone();
        let scheduler = IntervalScheduler::spawn("mandi-tui-watch", interval, move || {
            let result = source
                .build()
                .map_err(|e| e.to_string())
                .and_then(|s| orchestrator.run(s.as_ref()).map_err(|e| e.to_string()));
            // The receiver is gone once the UI exits.
            let _ = tx.send(result);
        })?;
        self.status = format!("Background updates every {} min.", interval.as_secs() / 60);
        self.background = Some((scheduler, rx));
        Ok(())
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            // A requested update runs after the "Fetching..." frame is on screen.
            if self.update_requested {
                self.update_requested = false;
                self.update_now()?;
                needs_redraw = true;
                continue;
            }

            if self.drain_background()? {
                needs_redraw = true;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))?
            {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code)? {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }

        if let Some((scheduler, _)) = self.background.take() {
            scheduler.stop();
        }
        Ok(())
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool, AppError> {
        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Up => {
                if self.selected > 0 {
                    self.selected -= 1;
                    self.refresh_series()?;
                }
            }
            KeyCode::Down => {
                if self.selected + 1 < self.view.keys().len() {
                    self.selected += 1;
                    self.refresh_series()?;
                }
            }
            KeyCode::Enter | KeyCode::Right => self.descend()?,
            KeyCode::Backspace | KeyCode::Left | KeyCode::Esc => self.ascend()?,
            KeyCode::Char('r') => {
                self.reload()?;
                self.status = "Reloaded.".to_string();
            }
            KeyCode::Char('u') => {
                self.update_requested = true;
                self.status = "Fetching commodity data...".to_string();
            }
            _ => {}
        }
        Ok(false)
    }

    fn descend(&mut self) -> Result<(), AppError> {
        let Some(key) = self.view.keys().get(self.selected).cloned() else {
            return Ok(());
        };
        let Some(child) = self.path.child(&key) else {
            return Ok(());
        };
        self.navigate(child, None)
    }

    fn ascend(&mut self) -> Result<(), AppError> {
        if self.path == QueryPath::Root {
            return Ok(());
        }
        let came_from = leaf_key(&self.path);
        self.navigate(self.path.parent(), came_from)
    }

    /// Show `path`, keeping `focus` highlighted when it is still listed.
    fn navigate(&mut self, path: QueryPath, focus: Option<String>) -> Result<(), AppError> {
        self.view = self.query.query_by_path(&path)?;
        self.path = path;
        self.selected = focus
            .and_then(|key| self.view.keys().iter().position(|k| *k == key))
            .unwrap_or(0);
        self.refresh_series()
    }

    fn reload(&mut self) -> Result<(), AppError> {
        let focus = self.view.keys().get(self.selected).cloned();
        self.navigate(self.path.clone(), focus)
    }

    /// Chart the market under the cursor (markets view) or the open market.
    fn refresh_series(&mut self) -> Result<(), AppError> {
        self.series = match (&self.path, &self.view) {
            (QueryPath::Commodity { state, commodity }, QueryView::Markets { markets, .. }) => {
                match markets.get(self.selected) {
                    Some(market) => self.query.price_series(state, commodity, market)?,
                    None => PriceSeries::default(),
                }
            }
            (_, QueryView::Records { records, .. }) => PriceSeries::from_records(records),
            _ => PriceSeries::default(),
        };
        Ok(())
    }

    fn update_now(&mut self) -> Result<(), AppError> {
        let result = self
            .source
            .build()
            .map_err(|e| e.to_string())
            .and_then(|source| self.orchestrator.run(source.as_ref()).map_err(|e| e.to_string()));
        self.apply_run_result(result)
    }

    fn drain_background(&mut self) -> Result<bool, AppError> {
        let mut results = Vec::new();
        if let Some((_, rx)) = &self.background {
            loop {
                match rx.try_recv() {
                    Ok(result) => results.push(result),
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }
        }
        let changed = !results.is_empty();
        for result in results {
            self.apply_run_result(result)?;
        }
        Ok(changed)
    }

    fn apply_run_result(&mut self, result: RunResult) -> Result<(), AppError> {
        match result {
            Ok(report) => {
                info!(success_count = report.success_count, failure_count = report.failure_count, "TUI run finished");
                self.status = format!(
                    "Updated: {} ok, {} failed ({} fetched).",
                    report.success_count, report.failure_count, report.fetched
                );
                self.last_report = Some(report);
                self.reload()
            }
            Err(message) => {
                error!(error = %message, "TUI run failed");
                self.status = format!("Update failed: {message}");
                Ok(())
            }
        }
    }

    fn draw(&mut self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        lines.push(Line::from(vec![
            Span::styled("mandi", Style::default().fg(Color::Cyan)),
            Span::raw(" - daily commodity prices"),
            Span::styled(format!("  {}", self.path), Style::default().add_modifier(Modifier::BOLD)),
        ]));

        let last_run = match &self.last_report {
            Some(r) => format!(
                "last run: {} | ok={} failed={} inserted={} evicted={}",
                r.finished_at.format("%Y-%m-%d %H:%M UTC"),
                r.success_count,
                r.failure_count,
                r.inserted,
                r.evicted,
            ),
            None => "last run: - (this session)".to_string(),
        };
        lines.push(Line::from(Span::styled(last_run, Style::default().fg(Color::Gray))));

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(area);

        self.draw_list(frame, chunks[0]);

        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(7)])
            .split(chunks[1]);
        self.draw_chart(frame, right[0]);
        self.draw_records(frame, right[1]);
    }

    fn draw_list(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let title = match &self.view {
            QueryView::States { .. } => "States",
            QueryView::Commodities { .. } => "Commodities",
            QueryView::Markets { .. } => "Markets",
            QueryView::Records { .. } => "Market",
        };

        let items: Vec<ListItem> = match &self.view {
            QueryView::Records { market, .. } => vec![ListItem::new(market.clone())],
            view if view.keys().is_empty() => vec![ListItem::new("(none - press u to fetch)")],
            view => view.keys().iter().map(|k| ListItem::new(k.clone())).collect(),
        };

        let list = List::new(items)
            .block(Block::default().title(title).borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        state.select(Some(self.selected));
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_chart(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let block = Block::default()
            .title("Price (min / modal / max)")
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        frame.render_widget(Clear, inner);

        let Some(series) = ChartSeries::from_series(&self.series) else {
            let msg = Paragraph::new("Select a market to chart its prices.")
                .style(Style::default().fg(Color::Yellow))
                .block(Block::default());
            frame.render_widget(msg, inner);
            return;
        };

        let (chart_rect, insets) = chart_layout(inner);
        let widget = PriceChart {
            min: &series.min,
            modal: &series.modal,
            max: &series.max,
            x_bounds: series.x_bounds,
            y_bounds: series.y_bounds,
            x_label: "arrival date",
            y_label: "Rs/quintal",
            fmt_x: fmt_axis_date,
            fmt_y: fmt_axis_price,
        };

        frame.render_widget(widget, chart_rect);
        if let Some(insets) = insets {
            draw_axis_ticks(frame, inner, chart_rect, insets, series.x_bounds, series.y_bounds);
        }
    }

    fn draw_records(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        // Newest first, like the stored list.
        for p in self.series.points.iter().rev() {
            lines.push(Line::from(format!(
                "{}  min {:>9.2}  modal {:>9.2}  max {:>9.2}",
                p.date.format("%d/%m/%Y"),
                p.min_price,
                p.modal_price,
                p.max_price
            )));
        }
        if lines.is_empty() {
            lines.push(Line::from(Span::styled("-", Style::default().fg(Color::Gray))));
        }
        let p = Paragraph::new(Text::from(lines))
            .block(Block::default().title("Retained records").borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ select  Enter/→ open  Backspace/← back  u update  r reload  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn leaf_key(path: &QueryPath) -> Option<String> {
    match path {
        QueryPath::Root => None,
        QueryPath::State(state) => Some(state.clone()),
        QueryPath::Commodity { commodity, .. } => Some(commodity.clone()),
        QueryPath::Market { market, .. } => Some(market.clone()),
    }
}

/// Chart-ready series: x is the day number (days from CE), y the price.
#[derive(Debug, Clone, PartialEq)]
struct ChartSeries {
    min: Vec<(f64, f64)>,
    modal: Vec<(f64, f64)>,
    max: Vec<(f64, f64)>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

impl ChartSeries {
    fn from_series(series: &PriceSeries) -> Option<Self> {
        let (mut y_min, mut y_max) = series.price_bounds()?;
        let day = |d: NaiveDate| f64::from(d.num_days_from_ce());

        let min = series.points.iter().map(|p| (day(p.date), p.min_price)).collect::<Vec<_>>();
        let modal = series.points.iter().map(|p| (day(p.date), p.modal_price)).collect::<Vec<_>>();
        let max = series.points.iter().map(|p| (day(p.date), p.max_price)).collect::<Vec<_>>();

        let first = series.points.first().map(|p| day(p.date))?;
        let last = series.points.last().map(|p| day(p.date))?;
        // A lone date still needs a non-empty x range.
        let x_bounds = if last > first { [first, last] } else { [first - 1.0, last + 1.0] };

        if y_max <= y_min {
            y_min -= 1.0;
            y_max += 1.0;
        }
        let pad = ((y_max - y_min).abs() * 0.05).max(1e-12);
        let y_bounds = [y_min - pad, y_max + pad];

        Some(Self {
            min,
            modal,
            max,
            x_bounds,
            y_bounds,
        })
    }
}

fn fmt_axis_date(v: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(v.round() as i32)
        .map(|d| d.format("%d/%m").to_string())
        .unwrap_or_default()
}

fn fmt_axis_price(v: f64) -> String {
    format!("{v:.0}")
}

#[derive(Debug, Clone, Copy)]
struct AxisInsets {
    left: u16,
    right: u16,
    top: u16,
    bottom: u16,
}

fn chart_layout(inner: Rect) -> (Rect, Option<AxisInsets>) {
    let insets = AxisInsets {
        left: 8,
        right: 2,
        top: 1,
        bottom: 2,
    };

    if inner.width <= insets.left + insets.right + 10 || inner.height <= insets.top + insets.bottom + 5 {
        return (inner, None);
    }

    let rect = Rect {
        x: inner.x + insets.left,
        y: inner.y + insets.top,
        width: inner.width - insets.left - insets.right,
        height: inner.height - insets.top - insets.bottom,
    };

    (rect, Some(insets))
}

fn draw_axis_ticks(
    frame: &mut ratatui::Frame<'_>,
    inner: Rect,
    chart: Rect,
    insets: AxisInsets,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
) {
    let style = Style::default().fg(Color::Gray);

    // One x tick per whole day, at most five.
    let span_days = (x_bounds[1] - x_bounds[0]).round().max(1.0) as usize;
    let x_ticks = (span_days + 1).min(5);
    for i in 0..x_ticks {
        let u = if x_ticks > 1 { i as f64 / (x_ticks as f64 - 1.0) } else { 0.0 };
        let x_val = x_bounds[0] + u * (x_bounds[1] - x_bounds[0]);
        let x = chart.x + ((chart.width - 1) as f64 * u).round() as u16;
        let label = fmt_axis_date(x_val);
        let label_len = label.len() as u16;
        let start = x.saturating_sub(label_len / 2);
        let y = chart.y + chart.height;
        if y >= inner.y + inner.height - 1 {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let y_ticks = 5usize;
    for i in 0..y_ticks {
        let u = i as f64 / (y_ticks as f64 - 1.0);
        let y_val = y_bounds[0] + u * (y_bounds[1] - y_bounds[0]);
        let y = chart.y + (chart.height - 1) - ((chart.height - 1) as f64 * u).round() as u16;
        let label = fmt_axis_price(y_val);
        let label_len = label.len() as u16;
        let x = inner.x + insets.left.saturating_sub(1);
        let start = x.saturating_sub(label_len);
        if start < inner.x {
            continue;
        }
        frame.render_widget(
            Paragraph::new(label).style(style),
            Rect {
                x: start,
                y,
                width: label_len,
                height: 1,
            },
        );
    }

    let x_label = Paragraph::new("arrival date")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Gray));
    let x_rect = Rect {
        x: chart.x,
        y: chart.y + chart.height + 1,
        width: chart.width,
        height: 1,
    };
    if x_rect.y < inner.y + inner.height {
        frame.render_widget(x_label, x_rect);
    }

    let y_label = Paragraph::new("Rs/q").style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let y_rect = Rect {
        x: inner.x,
        y: inner.y,
        width: insets.left.saturating_sub(1),
        height: 1,
    };
    frame.render_widget(y_label, y_rect);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{SourceArgs, SourceKind};
    use crate::config::Settings;
    use crate::data::FetchOptions;
    use crate::store::{MemoryStore, StateStore};

    fn sample_spec() -> SourceSpec {
        SourceSpec::new(
            Settings::default(),
            SourceArgs {
                source: SourceKind::Sample,
                page_size: None,
                max_pages: None,
                sample_end_date: NaiveDate::from_ymd_opt(2024, 6, 5),
                sample_days: 4,
                sample_seed: 7,
                sample_defect_rate: 0.0,
            },
        )
    }

    fn app() -> App {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::open());
        App::new(TuiContext {
            orchestrator: Arc::new(Orchestrator::new(Arc::clone(&store), FetchOptions::default())),
            query: QueryService::new(store),
            source: sample_spec(),
            background_interval: None,
        })
        .unwrap()
    }

    #[test]
    fn empty_store_starts_at_root() {
        let app = app();
        assert_eq!(app.path, QueryPath::Root);
        assert!(app.view.keys().is_empty());
        assert!(app.series.is_empty());
    }

    #[test]
    fn update_then_drill_down_and_back() {
        let mut app = app();
        app.handle_key(KeyCode::Char('u')).unwrap();
        assert!(app.update_requested);
        app.update_now().unwrap();
        assert!(app.last_report.as_ref().is_some_and(|r| r.failure_count == 0));
        assert!(!app.view.keys().is_empty());

        app.handle_key(KeyCode::Enter).unwrap();
        assert!(matches!(app.path, QueryPath::State(_)));
        app.handle_key(KeyCode::Enter).unwrap();
        assert!(matches!(app.path, QueryPath::Commodity { .. }));
        assert!(!app.series.is_empty());
        assert!(app.series.points.len() <= 3);

        app.handle_key(KeyCode::Right).unwrap();
        let QueryView::Records { market, .. } = &app.view else {
            panic!("expected records view");
        };
        let market = market.clone();

        // Markets have no children; Enter is a no-op.
        app.handle_key(KeyCode::Enter).unwrap();
        assert!(matches!(app.path, QueryPath::Market { .. }));

        app.handle_key(KeyCode::Backspace).unwrap();
        assert_eq!(app.view.keys().get(app.selected), Some(&market));

        app.handle_key(KeyCode::Left).unwrap();
        app.handle_key(KeyCode::Left).unwrap();
        assert_eq!(app.path, QueryPath::Root);
        app.handle_key(KeyCode::Left).unwrap();
        assert_eq!(app.path, QueryPath::Root);
    }

    #[test]
    fn selection_is_clamped() {
        let mut app = app();
        app.update_now().unwrap();
        let n = app.view.keys().len();
        for _ in 0..n + 3 {
            app.handle_key(KeyCode::Down).unwrap();
        }
        assert_eq!(app.selected, n - 1);
        for _ in 0..n + 3 {
            app.handle_key(KeyCode::Up).unwrap();
        }
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn quit_key_stops_the_loop() {
        let mut app = app();
        assert!(app.handle_key(KeyCode::Char('q')).unwrap());
    }

    #[test]
    fn failed_update_keeps_the_view() {
        let mut app = app();
        app.apply_run_result(Err("fetch failed at offset 0: status 503".to_string()))
            .unwrap();
        assert!(app.status.contains("status 503"));
        assert!(app.last_report.is_none());
    }

    #[test]
    fn single_date_series_gets_a_usable_range() {
        let records = vec![crate::domain::PriceRecord {
            arrival_date: NaiveDate::from_ymd_opt(2024, 6, 5).unwrap(),
            district: "D".to_string(),
            variety: "V".to_string(),
            grade: "G".to_string(),
            min_price: 100.0,
            max_price: 100.0,
            modal_price: 100.0,
        }];
        let chart = ChartSeries::from_series(&PriceSeries::from_records(&records)).unwrap();
        assert!(chart.x_bounds[1] > chart.x_bounds[0]);
        assert!(chart.y_bounds[1] > chart.y_bounds[0]);
        assert_eq!(fmt_axis_date(chart.min[0].0), "05/06");
        assert!(ChartSeries::from_series(&PriceSeries::default()).is_none());
    }
}
