use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};

use crate::common::{NotificationEvent, OnlineUser, Role};
use crate::ui::state::{display_name, AppState};

pub fn render(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(area);

    let mut online: Vec<ListItem> = state
        .online
        .iter()
        .map(|user| ListItem::new(online_line(user)))
        .collect();
    if let Some(role) = role_label(state.role) {
        online.push(ListItem::new(Line::from(Span::styled(
            role,
            Style::default().fg(Color::Cyan),
        ))));
    }
    let online = List::new(online).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Online ({})", state.online.len())),
    );
    f.render_widget(online, chunks[0]);

    let notifications: Vec<ListItem> = state
        .notifications
        .iter()
        .rev()
        .map(|notification| ListItem::new(notification_line(notification)))
        .collect();
    let notifications = List::new(notifications)
        .block(Block::default().borders(Borders::ALL).title("Notifications"));
    f.render_widget(notifications, chunks[1]);
}

pub fn online_line(user: &OnlineUser) -> String {
    let marker = if user.is_admin {
        " [admin]"
    } else if user.is_moderator {
        " [mod]"
    } else {
        ""
    };
    format!("● {}{marker}", display_name(&user.user_name, &user.user_id))
}

fn role_label(role: Role) -> Option<&'static str> {
    if role.is_admin {
        Some("You are an admin")
    } else if role.is_moderator {
        Some("You are a moderator")
    } else {
        None
    }
}

fn notification_line(notification: &NotificationEvent) -> String {
    format!(
        "{} {}: {}",
        notification.created_at.format("%H:%M"),
        notification.kind,
        notification.item_id.as_deref().unwrap_or("(no item)")
    )
}
