use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::common::{ChatMessage, TypingUser};
use crate::ui::state::{display_name, AppState};

const DELETED_PLACEHOLDER: &str = "[message deleted]";

pub fn render(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let title = match &state.user_id {
        Some(user_id) => format!("Chat ({user_id})"),
        None => "Chat (signed out)".to_string(),
    };

    // Borders take two rows; keep the newest messages in view.
    let visible = usize::from(area.height.saturating_sub(2));
    let mut lines: Vec<Line> = state.messages.iter().map(message_line).collect();
    if let Some(typing) = typing_line(&state.typing) {
        lines.push(Line::from(Span::styled(
            typing,
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }
    let skip = lines.len().saturating_sub(visible);
    let lines: Vec<Line> = lines.into_iter().skip(skip).collect();

    let chat = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(chat, area);
}

fn message_line(message: &ChatMessage) -> Line<'static> {
    let style = if message.deleted {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };
    Line::from(Span::styled(render_message(message), style))
}

pub fn render_message(message: &ChatMessage) -> String {
    let time = message.created_at.format("%H:%M");
    let author = display_name(&message.user_name, &message.user_id);
    let badge = match message.role.as_deref() {
        Some("admin") => " [admin]",
        Some("moderator") => " [mod]",
        _ => "",
    };

    let body = if message.deleted {
        DELETED_PLACEHOLDER.to_string()
    } else if message.is_gif() {
        format!("[gif] {}", message.gif_url.as_deref().unwrap_or_default())
    } else {
        message.content.clone().unwrap_or_default()
    };
    format!("[{time}] {author}{badge} ({}): {body}", message.id)
}

pub fn typing_line(typing: &[TypingUser]) -> Option<String> {
    let names: Vec<&str> = typing
        .iter()
        .map(|user| display_name(&user.user_name, &user.user_id))
        .collect();
    match names.as_slice() {
        [] => None,
        [one] => Some(format!("{one} is typing...")),
        many => Some(format!("{} are typing...", many.join(", "))),
    }
}
