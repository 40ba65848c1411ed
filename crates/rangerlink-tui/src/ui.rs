//! UI rendering module

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use rangerlink_core::logging::LogLevel;
use rangerlink_core::{Command, LinkState};

use crate::app::App;

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // Header
            Constraint::Min(10),    // Controls + status
            Constraint::Length(10), // Log
            Constraint::Length(3),  // Key bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_main(frame, app, chunks[1]);
    draw_log(frame, app, chunks[2]);
    draw_key_bar(frame, app, chunks[3]);

    if let Some(notice) = &app.notice {
        draw_notice(frame, notice);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let state_style = Style::default().fg(state_color(app.link_state)).bold();
    let line = Line::from(vec![
        Span::styled(format!(" {} ", app.link_state), state_style),
        Span::raw("│ 目标: "),
        Span::styled(app.target.clone(), Style::default().fg(Color::Cyan)),
    ]);

    let header = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" 🤖 Rangerlink "),
    );

    frame.render_widget(header, area);
}

fn draw_main(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(7)])
        .split(chunks[0]);

    // 距离
    let distance_text = app.distance.as_deref().unwrap_or("Distance: -- cm");
    let distance = Paragraph::new(distance_text)
        .style(Style::default().fg(Color::Yellow).bold())
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(" 📏 距离 "));
    frame.render_widget(distance, left[0]);

    // 指令按钮，未连接时置灰
    let enabled = app.commands_enabled();
    let items: Vec<ListItem> = Command::ALL
        .iter()
        .map(|&cmd| {
            let content = format!("[{}] {}", cmd.key(), cmd.name());
            let style = if !enabled {
                Style::default().fg(Color::DarkGray)
            } else if app.last_command == Some(cmd) {
                Style::default().bg(Color::DarkGray).fg(Color::White).bold()
            } else {
                Style::default()
            };
            ListItem::new(content).style(style)
        })
        .collect();

    let buttons = List::new(items).block(Block::default().borders(Borders::ALL).title(" 🎮 模式 "));
    frame.render_widget(buttons, left[1]);

    // 状态：最新的行在底部，超出时只显示末尾
    let visible = usize::from(chunks[1].height.saturating_sub(2));
    let start = app.status_lines.len().saturating_sub(visible);
    let status = Paragraph::new(app.status_lines[start..].join("\n"))
        .block(Block::default().borders(Borders::ALL).title(" 📡 状态 "))
        .wrap(Wrap { trim: false });
    frame.render_widget(status, chunks[1]);
}

fn draw_log(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .visible_logs()
        .rev()
        .take(usize::from(area.height.saturating_sub(2)))
        .map(|entry| {
            ListItem::new(entry.to_string()).style(Style::default().fg(level_color(entry.level)))
        })
        .collect();

    let title = format!(" 📋 日志 [{}] ", app.log_filter);
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(list, area);
}

fn draw_key_bar(frame: &mut Frame, app: &App, area: Rect) {
    let connect_hint = match app.link_state {
        LinkState::Connected => "[x]断开",
        _ => "[c]连接",
    };

    let keys = Paragraph::new(format!(
        " {connect_hint} [l/o/h/s/d]指令 [v]日志级别 [e]清空 [q]退出"
    ))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(keys, area);
}

fn draw_notice(frame: &mut Frame, notice: &str) {
    let area = centered_rect(50, 20, frame.area());
    let popup = Paragraph::new(format!("{notice}\n\n按任意键关闭"))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" ⚠️ 提示 ")
                .style(Style::default().fg(Color::Yellow)),
        );

    frame.render_widget(Clear, area);
    frame.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn state_color(state: LinkState) -> Color {
    match state {
        LinkState::Connected => Color::Green,
        LinkState::Scanning | LinkState::Connecting => Color::Yellow,
        LinkState::Disconnected => Color::Red,
        LinkState::Idle => Color::White,
    }
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Error => Color::Red,
        LogLevel::Warn => Color::Yellow,
        LogLevel::Info => Color::White,
        LogLevel::Debug | LogLevel::Trace => Color::DarkGray,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use rangerlink_core::{ControllerOptions, RobotEvent, Telemetry};

    fn render(app: &App) -> String {
        let backend = TestBackend::new(100, 30);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
    }

    #[test]
    fn test_renders_distance_and_status() {
        let mut app = App::new(ControllerOptions::default());
        app.apply_robot_event(RobotEvent::State(LinkState::Connected));
        app.apply_robot_event(RobotEvent::Status("Connected".into()));
        app.apply_robot_event(RobotEvent::Telemetry(Telemetry::parse(b"DIST:18.2")));

        let screen = render(&app);
        assert!(screen.contains("Distance: 18.2 cm"));
        assert!(screen.contains("DIST:18.2"));
        assert!(screen.contains("00:1B:10:69:20:1E"));
        assert!(screen.contains("Line Follow"));
    }

    #[test]
    fn test_renders_notice_popup() {
        let mut app = App::new(ControllerOptions::default());
        app.apply_robot_event(RobotEvent::Notice("Enable Bluetooth".into()));

        let screen = render(&app);
        assert!(screen.contains("Enable Bluetooth"));
    }

    #[test]
    fn test_centered_rect_inside_parent() {
        let parent = Rect::new(0, 0, 100, 50);
        let rect = centered_rect(50, 20, parent);
        assert!(rect.x >= 25 && rect.right() <= 75);
        assert!(rect.y >= 20 && rect.bottom() <= 30);
    }
}
