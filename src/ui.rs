use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthChar;
use crate::app::{App, InputMode};
use crate::session::{DisplayMode, Message, Role, Session, SUGGESTIONS};

const SOURCE_BULLET: &str = "  • ";
const SOURCE_INDENT: &str = "    ";

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c != '*' || chars.peek() != Some(&'*') {
            current_text.push(c);
            continue;
        }
        chars.next();

        let mut bold_text = String::new();
        let mut found_close = false;
        while let Some(c) = chars.next() {
            if c == '*' && chars.peek() == Some(&'*') {
                chars.next();
                found_close = true;
                break;
            }
            bold_text.push(c);
        }

        if found_close && !bold_text.is_empty() {
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }
            spans.push(Span::styled(bold_text, Style::default().add_modifier(Modifier::BOLD)));
        } else {
            // No closing **, keep it literal
            current_text.push_str("**");
            current_text.push_str(&bold_text);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

/// One bullet per source. Multi-line sources continue indented under it.
fn source_items(sources: &[String]) -> impl Iterator<Item = Line<'static>> + '_ {
    sources.iter().flat_map(|source| {
        let mut rows = source.lines();
        let first = rows.next().unwrap_or_default();
        let mut lines = vec![Line::from(vec![
            Span::styled(SOURCE_BULLET, Style::default().fg(Color::Magenta)),
            Span::raw(first.to_string()),
        ])];
        lines.extend(rows.map(|row| Line::from(format!("{}{}", SOURCE_INDENT, row))));
        lines
    })
}

fn welcome_lines() -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from("👋 Bem-vindo!".bold()),
        Line::from("Pergunte sobre o estoque, vendas ou qualquer informação do sistema."),
        Line::default(),
    ];
    for (i, suggestion) in SUGGESTIONS.iter().enumerate() {
        lines.push(Line::from(vec![
            Span::styled(format!(" {} ", i + 1), Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(format!(" {}  ", suggestion.label)),
            Span::styled(suggestion.prompt, Style::default().fg(Color::DarkGray)),
        ]));
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled(
        "Esc e depois 1-3 para usar uma sugestão",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));
    lines
}

fn message_lines(message: &Message, sources_expanded: bool, lines: &mut Vec<Line<'static>>) {
    match message.role {
        Role::User => {
            lines.push(Line::from(Span::styled(
                "Você:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            lines.extend(message.text.lines().map(|l| Line::from(l.to_string())));
        }
        Role::Bot => {
            lines.push(Line::from(Span::styled(
                "Assistente:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            if message.is_error {
                let error_style = Style::default().fg(Color::Red);
                lines.extend(
                    message.text.lines().map(|l| Line::from(Span::styled(l.to_string(), error_style))),
                );
            } else {
                lines.extend(message.text.lines().map(parse_markdown_line));
            }
        }
    }

    if !message.sources.is_empty() {
        let marker = if sources_expanded { "▾" } else { "▸" };
        lines.push(Line::from(Span::styled(
            format!("{} 📚 {} fonte(s)", marker, message.sources.len()),
            Style::default().fg(Color::Magenta),
        )));
        if sources_expanded {
            lines.extend(source_items(&message.sources));
        }
    }

    lines.push(Line::default());
}

fn pending_line(label: &str, animation_frame: u8) -> Line<'static> {
    // Animated ellipsis: cycles through ".", "..", "..."
    let dots = ".".repeat(animation_frame as usize + 1);
    Line::from(Span::styled(
        format!("{}{}", label, dots),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    ))
}

/// Lines of the chat transcript, including the typing indicator.
pub fn chat_lines(session: &Session, sources_expanded: bool, animation_frame: u8) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    if let Some(transcript) = session.transcript() {
        for message in transcript.messages() {
            message_lines(message, sources_expanded, &mut lines);
        }
    }

    if session.is_loading() {
        lines.push(Line::from(Span::styled(
            "Assistente:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        lines.push(pending_line("Digitando", animation_frame));
    }

    lines
}

/// Lines of the single-result view. Sources are always listed here.
pub fn form_lines(session: &Session, animation_frame: u8) -> Vec<Line<'static>> {
    if session.is_loading() {
        return vec![pending_line("Consultando", animation_frame)];
    }

    let Some(result) = session.result() else {
        return Vec::new();
    };

    let mut lines = vec![
        Line::from(Span::styled(
            " 🤖 RAG Knowledge Base ",
            Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from("Resposta:".bold()),
    ];
    lines.extend(result.answer.lines().map(parse_markdown_line));

    if !result.sources.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            format!("Fontes Consultadas ({}):", result.sources.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.extend(source_items(&result.sources));
    }

    lines
}

/// Rows the paragraph occupies once wrapped to `width` columns.
fn wrapped_height(body: &Paragraph, width: u16) -> u16 {
    body.line_count(width).min(u16::MAX as usize) as u16
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_body(app, frame, body_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" 🤖 RAG Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled("Sistema RAG ", Style::default().fg(Color::White)),
        Span::styled(
            format!("[{}] ", app.session.mode().as_str()),
            Style::default().fg(Color::Black),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Black),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_body(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(match app.session.mode() {
            DisplayMode::Chat => " Conversa ",
            DisplayMode::Form => " Resultado ",
        });

    let lines = if app.session.is_pristine() {
        welcome_lines()
    } else {
        match app.session.mode() {
            DisplayMode::Chat => chat_lines(&app.session, app.sources_expanded, app.animation_frame),
            DisplayMode::Form => form_lines(&app.session, app.animation_frame),
        }
    };

    // Store viewport dimensions for scroll calculations (inner size minus borders)
    app.content_height = area.height.saturating_sub(2);
    let body = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    app.total_content_lines = wrapped_height(&body, area.width.saturating_sub(2));
    if app.follow_bottom {
        app.scroll = app.max_scroll();
    } else {
        app.scroll = app.scroll.min(app.max_scroll());
    }

    let body = body.block(block).scroll((app.scroll, 0));

    frame.render_widget(body, area);
}

/// First visible char and the cursor column for a single-line input of
/// `width` cells. Columns count display width, so wide chars take two.
fn input_viewport(input: &str, cursor: usize, width: usize) -> (usize, u16) {
    let widths: Vec<usize> = input.chars().take(cursor).map(|c| c.width().unwrap_or(0)).collect();
    let mut offset = 0;
    let mut column: usize = widths.iter().sum();
    // Keep one cell free for the cursor itself
    while width > 0 && column >= width && offset < widths.len() {
        column -= widths[offset];
        offset += 1;
    }
    (offset, column.min(u16::MAX as usize) as u16)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let session = &app.session;
    let editing = app.input_mode == InputMode::Editing;

    let (submit_label, submit_style) = if session.is_loading() {
        (" ⏳ aguardando ", Style::default().fg(Color::Yellow))
    } else if session.can_submit() {
        (" Enter ➤ enviar ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        (" ➤ ", Style::default().fg(Color::DarkGray))
    };

    let border_color = if editing && !session.is_loading() { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Pergunta ")
        .title_bottom(Line::from(Span::styled(submit_label, submit_style)).right_aligned());

    let inner_width = area.width.saturating_sub(2) as usize;
    let (scroll_offset, cursor_x) = input_viewport(session.input(), session.cursor(), inner_width);

    let content = if session.input().is_empty() {
        let placeholder = match session.mode() {
            DisplayMode::Chat => "Digite sua pergunta...",
            DisplayMode::Form => "Faça sua pergunta aqui...",
        };
        Line::from(Span::styled(placeholder, Style::default().fg(Color::DarkGray)))
    } else {
        let mut used = 0;
        let visible: String = session
            .input()
            .chars()
            .skip(scroll_offset)
            .take_while(|c| {
                used += c.width().unwrap_or(0);
                used <= inner_width
            })
            .collect();
        Line::from(Span::styled(visible, Style::default().fg(Color::Cyan)))
    };

    frame.render_widget(Paragraph::new(content).block(block), area);

    if editing && !session.is_loading() {
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" EDITAR ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[(" Enter ", " perguntar "), (" Esc ", " comandos "), (" PgUp/PgDn ", " rolar ")],
        InputMode::Normal => &[
            (" i ", " digitar "),
            (" 1-3 ", " sugestões "),
            (" s ", " fontes "),
            (" j/k ", " rolar "),
            (" q ", " sair "),
        ],
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(" ", label_style),
    ];
    for (key, label) in hints {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}
