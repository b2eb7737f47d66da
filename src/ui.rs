use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use counsel_core::{Mode, Sender, Template};
use crate::app::{App, BackendHealth, InputMode};

/// Parse one line of markdown into styled spans.
///
/// Handles `#` headings, `-`/`*` bullets and `**bold**`; everything else is
/// shown as written.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let trimmed = text.trim_start();

    if trimmed.starts_with('#') {
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let title = trimmed[level..].trim().to_string();
        let style = if level == 1 {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        };
        return Line::from(Span::styled(title, style));
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    let body = if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        let indent = text.len() - trimmed.len();
        spans.push(Span::raw(format!("{}• ", " ".repeat(indent))));
        rest
    } else {
        text
    };

    let mut chars = body.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            // Consume the second *
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Word-wrap a styled line to `width` columns.
///
/// Breaks at spaces (dropping them at the break) and only splits a word that
/// is wider than a whole row, so the caller can count rows exactly. Leading
/// indentation is kept on the first row.
fn wrap_line(line: &Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 || line.width() <= width {
        return vec![line.clone()];
    }

    let cells: Vec<(char, Style)> = line
        .spans
        .iter()
        .flat_map(|span| span.content.chars().map(move |c| (c, span.style)))
        .collect();

    let mut rows: Vec<Vec<(char, Style)>> = Vec::new();
    let mut row: Vec<(char, Style)> = Vec::new();

    // Close the current row, minus trailing spaces; an all-blank row is dropped
    let flush = |row: &mut Vec<(char, Style)>, rows: &mut Vec<Vec<(char, Style)>>| {
        while row.last().is_some_and(|(c, _)| *c == ' ') {
            row.pop();
        }
        if !row.is_empty() {
            rows.push(std::mem::take(row));
        }
    };

    let mut start = 0;
    while start < cells.len() {
        let space = cells[start].0 == ' ';
        let end = cells[start..]
            .iter()
            .position(|(c, _)| (*c == ' ') != space)
            .map(|n| start + n)
            .unwrap_or(cells.len());
        let run = &cells[start..end];
        start = end;

        if space {
            // Spaces that would open a continuation row are dropped
            if rows.is_empty() || !row.is_empty() {
                row.extend_from_slice(run);
            }
            continue;
        }

        // Move a word that fits on a row of its own down whole
        if run.len() <= width && row.len() + run.len() > width {
            flush(&mut row, &mut rows);
        }
        for &cell in run {
            if row.len() >= width {
                flush(&mut row, &mut rows);
            }
            row.push(cell);
        }
    }
    while row.last().is_some_and(|(c, _)| *c == ' ') {
        row.pop();
    }
    row.truncate(width);
    rows.push(row);

    rows.into_iter()
        .map(|cells| {
            let mut spans: Vec<Span<'static>> = Vec::new();
            let mut text = String::new();
            let mut style = None;
            for (c, s) in cells {
                if style.is_some_and(|current| current != s) {
                    spans.push(Span::styled(std::mem::take(&mut text), style.unwrap_or_default()));
                }
                style = Some(s);
                text.push(c);
            }
            if let Some(style) = style {
                spans.push(Span::styled(text, style));
            }
            Line::from(spans).style(line.style)
        })
        .collect()
}

/// Offset that keeps `pos` inside a window of `extent` cells
fn scroll_to_keep(pos: usize, extent: usize) -> usize {
    if extent == 0 {
        0
    } else {
        pos.saturating_sub(extent - 1)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.session.mode() {
        Mode::Chat => render_chat_screen(app, frame, body_area),
        Mode::Draft => render_draft_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (health_text, health_color) = match app.backend_health {
        BackendHealth::Unknown => ("checking server", Color::Gray),
        BackendHealth::Healthy => ("server online", Color::Green),
        BackendHealth::Unreachable => ("server offline", Color::Red),
    };

    let title = Line::from(vec![
        Span::styled(" Counsel ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(" Workspace > ", Style::default().fg(Color::Gray)),
        Span::styled(app.session.mode().workspace_title(), Style::default().fg(Color::White).bold()),
        Span::raw("  "),
        Span::styled(format!("[{}]", health_text), Style::default().fg(health_color)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.session.mode() {
        Mode::Chat => " CHAT ",
        Mode::Draft => " DRAFT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let hint = |key: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let mut hints: Vec<Span> = Vec::new();
    match (app.session.mode(), app.input_mode) {
        (Mode::Chat, InputMode::Editing) => {
            hints.extend(hint("Enter", "inquire"));
            hints.extend(hint("Tab", "drafting"));
            hints.extend(hint("Esc", "transcript"));
        }
        (Mode::Chat, InputMode::Normal) => {
            hints.extend(hint("j/k", "select"));
            hints.extend(hint("y", "copy"));
            if app.selected().is_some_and(|t| t.is_exportable()) {
                hints.extend(hint("e", "export"));
            }
            hints.extend(hint("i", "type"));
            hints.extend(hint("Tab", "drafting"));
            hints.extend(hint("q", "quit"));
        }
        (Mode::Draft, InputMode::Editing) => {
            hints.extend(hint("Ctrl+S", "synthesize"));
            hints.extend(hint("Tab", "consultant"));
            hints.extend(hint("Esc", "templates"));
        }
        (Mode::Draft, InputMode::Normal) => {
            hints.extend(hint("h/l", "template"));
            hints.extend(hint("Enter", "synthesize"));
            hints.extend(hint("i", "facts"));
            hints.extend(hint("Tab", "consultant"));
            hints.extend(hint("q", "quit"));
        }
    }

    if let Some(status) = &app.status {
        hints.push(Span::styled(
            format!(" {} ", status),
            Style::default().bg(Color::Black).fg(Color::Yellow),
        ));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

/// The transcript as styled lines, oldest turn first
fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let selected = app.selected_index();

    for (idx, turn) in app.session.turns().iter().enumerate() {
        let marker = if idx == selected { "> " } else { "  " };
        let mut label = vec![Span::styled(marker, Style::default().fg(Color::Magenta))];

        match turn.sender() {
            Sender::User => label.push(Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
            Sender::Bot => {
                let color = if turn.is_error() { Color::Red } else { Color::Yellow };
                label.push(Span::styled(
                    "Counsel:",
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ));
            }
        }
        if turn.is_draft() {
            label.push(Span::styled(" [draft]", Style::default().fg(Color::Magenta)));
        }
        if app.is_copied(turn) {
            label.push(Span::styled(" Copied", Style::default().fg(Color::Green).bold()));
        }
        lines.push(Line::from(label));

        for line in turn.text().lines() {
            match turn.sender() {
                Sender::User => lines.push(Line::from(line.to_string())),
                Sender::Bot => lines.push(parse_markdown_line(line)),
            }
        }

        if !turn.citations().is_empty() {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                "Legal Precedents & Sources",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            for citation in turn.citations() {
                lines.push(Line::from(vec![
                    Span::raw("  • "),
                    Span::styled(citation.source.clone(), Style::default().fg(Color::Gray)),
                ]));
            }
        }

        lines.push(Line::default());
    }

    if app.session.is_pending() {
        lines.push(Line::from(Span::styled(
            "  Counsel:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Synthesizing Legal Logic{}", dots),
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [transcript_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store area for mouse hit-testing
    app.transcript_area = Some(transcript_area);

    let transcript_focused = app.input_mode == InputMode::Normal;
    let border_color = if transcript_focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" AI Consultant ");

    // Inner size minus borders
    let inner_width = transcript_area.width.saturating_sub(2) as usize;
    let inner_height = transcript_area.height.saturating_sub(2) as usize;

    // Pre-wrapped, so every entry is exactly one screen row
    let lines: Vec<Line<'static>> = transcript_lines(app)
        .iter()
        .flat_map(|l| wrap_line(l, inner_width))
        .collect();
    let max_scroll = lines.len().saturating_sub(inner_height).min(u16::MAX as usize) as u16;

    if app.sync_with_log() {
        app.transcript_scroll = max_scroll;
    } else {
        app.transcript_scroll = app.transcript_scroll.min(max_scroll);
    }

    let transcript = Paragraph::new(Text::from(lines))
        .block(block)
        .scroll((app.transcript_scroll, 0));
    frame.render_widget(transcript, transcript_area);

    // Input box - highlight when editing
    let editing = app.input_mode == InputMode::Editing;
    let input_border_color = if app.session.is_pending() {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Ask a legal question or request research ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.chat_cursor;

    let scroll_offset = scroll_to_keep(cursor_pos, inner_width);

    let visible_text: String = app
        .session
        .chat_input()
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, input_area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

/// Row and column of a char cursor inside multiline text
fn cursor_row_col(text: &str, cursor: usize) -> (usize, usize) {
    let before: String = text.chars().take(cursor).collect();
    let row = before.matches('\n').count();
    let col = before.rsplit('\n').next().map(|s| s.chars().count()).unwrap_or(0);
    (row, col)
}

fn render_draft_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [templates_area, facts_area, action_area] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Min(3),
        Constraint::Length(3),
    ])
    .areas(area);

    app.transcript_area = None;

    // Template cards
    let templates = Template::all();
    let card_areas = Layout::horizontal(
        templates.iter().map(|_| Constraint::Ratio(1, templates.len() as u32)),
    )
    .split(templates_area);

    for (template, card_area) in templates.iter().zip(card_areas.iter()) {
        let active = *template == app.session.template();
        let color = if active { Color::Cyan } else { Color::DarkGray };
        let card = Paragraph::new(vec![
            Line::from(Span::styled(
                template.display_name(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(template.description(), Style::default().fg(Color::Gray))),
        ])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );
        frame.render_widget(card, *card_area);
    }

    // Facts editor
    let editing = app.input_mode == InputMode::Editing;
    let facts_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::DarkGray }))
        .title(" Case Facts & Instructions ");

    let facts = app.session.draft_facts();
    let (cursor_row, cursor_col) = cursor_row_col(facts, app.facts_cursor);
    let inner_height = facts_area.height.saturating_sub(2) as usize;
    let inner_width = facts_area.width.saturating_sub(2) as usize;
    let scroll = scroll_to_keep(cursor_row, inner_height);
    // Long lines scroll sideways with the cursor instead of wrapping
    let hscroll = scroll_to_keep(cursor_col, inner_width);

    let facts_text = if facts.is_empty() && !editing {
        Text::from(Span::styled(
            "Describe the legal situation, parties involved, and specific demands...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(facts.lines().map(|l| Line::from(l.to_string())).collect::<Vec<_>>())
    };

    let editor = Paragraph::new(facts_text)
        .block(facts_block)
        .scroll((scroll as u16, hscroll as u16));
    frame.render_widget(editor, facts_area);

    if editing {
        frame.set_cursor_position((
            facts_area.x + 1 + (cursor_col - hscroll) as u16,
            facts_area.y + 1 + (cursor_row - scroll) as u16,
        ));
    }

    // Action line
    let action = if app.session.is_pending() {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        Span::styled(
            format!("Generating Draft{}", dots),
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )
    } else if app.session.can_submit() {
        Span::styled(
            "Synthesize Legal Document",
            Style::default().fg(Color::Black).bg(Color::Cyan).bold(),
        )
    } else {
        Span::styled("Synthesize Legal Document", Style::default().fg(Color::DarkGray))
    };

    let action_widget = Paragraph::new(Line::from(action).centered())
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(action_widget, action_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_heading_strips_hashes() {
        let line = parse_markdown_line("## Connectivity Error");
        assert_eq!(plain(&line), "Connectivity Error");
        assert!(line.spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_bold_span() {
        let line = parse_markdown_line("The **holding** was narrow");
        assert_eq!(plain(&line), "The holding was narrow");
        assert_eq!(line.spans.len(), 3);
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(plain(&line), "a **b");
    }

    #[test]
    fn test_bullets() {
        let line = parse_markdown_line("- Key Facts");
        assert_eq!(plain(&line), "• Key Facts");
    }

    fn rows(lines: &[Line]) -> Vec<String> {
        lines.iter().map(plain).collect()
    }

    #[test]
    fn test_wrap_line_breaks_at_words() {
        let wrapped = wrap_line(&Line::from("aaaaaa bbbbbb cccccc"), 10);
        assert_eq!(rows(&wrapped), vec!["aaaaaa", "bbbbbb", "cccccc"]);

        let short = wrap_line(&Line::from("fits"), 10);
        assert_eq!(rows(&short), vec!["fits"]);
        assert_eq!(wrap_line(&Line::default(), 10).len(), 1);
    }

    #[test]
    fn test_wrap_line_splits_overlong_word_and_keeps_styles() {
        let line = Line::from(vec![
            Span::raw("  • "),
            Span::styled("Restatement", Style::default().fg(Color::Gray)),
        ]);
        let wrapped = wrap_line(&line, 8);
        assert_eq!(rows(&wrapped), vec!["  • Rest", "atement"]);
        assert_eq!(wrapped[1].spans[0].style.fg, Some(Color::Gray));
    }

    #[test]
    fn test_wrapped_rows_match_rendered_height() {
        use ratatui::{buffer::Buffer, widgets::Widget};

        let width = 10;
        let wrapped = wrap_line(&Line::from("aaaaaa bbbbbb cccccc dd"), width);
        let height = wrapped.len() as u16;
        let area = Rect::new(0, 0, width as u16, height + 1);
        let mut buf = Buffer::empty(area);
        Paragraph::new(Text::from(wrapped)).render(area, &mut buf);

        let row_text = |y: u16| -> String {
            (0..area.width).map(|x| buf[(x, y)].symbol().to_string()).collect()
        };
        assert_eq!(row_text(height - 1).trim_end(), "cccccc dd");
        assert_eq!(row_text(height).trim_end(), "");
    }

    #[test]
    fn test_scroll_to_keep() {
        assert_eq!(scroll_to_keep(3, 10), 0);
        assert_eq!(scroll_to_keep(9, 10), 0);
        assert_eq!(scroll_to_keep(10, 10), 1);
        assert_eq!(scroll_to_keep(25, 10), 16);
        assert_eq!(scroll_to_keep(5, 0), 0);
    }

    #[test]
    fn test_cursor_row_col() {
        assert_eq!(cursor_row_col("ab\ncd", 0), (0, 0));
        assert_eq!(cursor_row_col("ab\ncd", 4), (1, 1));
        assert_eq!(cursor_row_col("ab\n", 3), (1, 0));
    }
}
