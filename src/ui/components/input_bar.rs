use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::common::{BanKind, BanRequest, ComposerState, Draft};

/// What one line of terminal input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    Send(Draft),
    /// Resend the draft kept after a rate limit or failure.
    Retry,
    Delete(String),
    Clear,
    Ban(BanRequest),
    Unban(String),
    ListBans,
    AddModerator { user_id: String, user_name: String },
    RemoveModerator(String),
    ListModerators,
    TestNotification,
    Login { user_id: String, user_name: String, admin: bool },
    Logout,
    Hide,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
/gif <url>                 send a GIF
/retry                     resend the last unsent message
/delete <id>               delete a message
/clear                     clear the chat (admin)
/ban <user> [minutes] [reason]   ban from chat (moderator)
/mute <user> [minutes] [reason]  mute (moderator)
/unban <user>              lift a ban (moderator)
/bans                      list bans (moderator)
/mod <user> [name]         add a moderator (admin)
/unmod <user>              remove a moderator (admin)
/mods                      list moderators
/test                      request a test notification (admin)
/login <user> [name] [--admin]
/logout
/hide | /show              simulate the window being hidden or shown
/quit                      (or Ctrl-C)";

pub fn render(f: &mut Frame<'_>, area: Rect, input: &str, composer: &ComposerState) {
    let (title, style) = match composer {
        ComposerState::Enabled => ("Message (Enter to send, /help)".to_string(), Style::default()),
        ComposerState::Disabled(reason) => (
            format!("Chat input disabled: {reason}"),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let input_box = Paragraph::new(input)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(input_box, area);

    let width = u16::try_from(input.chars().count()).unwrap_or(u16::MAX);
    let max_x = area.x + area.width.saturating_sub(2);
    f.set_cursor((area.x + 1).saturating_add(width).min(max_x), area.y + 1);
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Result<InputAction, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Some(Ok(InputAction::Send(Draft::text(line))));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    let action = match (name, args.as_slice()) {
        ("gif", [url]) => Ok(InputAction::Send(Draft::gif(*url))),
        ("retry", []) => Ok(InputAction::Retry),
        ("delete", [id]) => Ok(InputAction::Delete(id.to_string())),
        ("clear", []) => Ok(InputAction::Clear),
        ("ban", [user, rest @ ..]) => ban(user, BanKind::Chat, rest),
        ("mute", [user, rest @ ..]) => ban(user, BanKind::Snooze, rest),
        ("unban", [user]) => Ok(InputAction::Unban(user.to_string())),
        ("bans", []) => Ok(InputAction::ListBans),
        ("mod", [user]) => Ok(InputAction::AddModerator {
            user_id: user.to_string(),
            user_name: user.to_string(),
        }),
        ("mod", [user, name]) => Ok(InputAction::AddModerator {
            user_id: user.to_string(),
            user_name: name.to_string(),
        }),
        ("unmod", [user]) => Ok(InputAction::RemoveModerator(user.to_string())),
        ("mods", []) => Ok(InputAction::ListModerators),
        ("test", []) => Ok(InputAction::TestNotification),
        ("login", [user, rest @ ..]) => login(user, rest),
        ("logout", []) => Ok(InputAction::Logout),
        ("hide", []) => Ok(InputAction::Hide),
        ("show", []) => Ok(InputAction::Show),
        ("help", _) => Ok(InputAction::Help),
        ("quit" | "exit", []) => Ok(InputAction::Quit),
        _ => Err(format!("Unknown command or wrong arguments: /{command}")),
    };
    Some(action)
}

fn ban(user: &str, ban_type: BanKind, rest: &[&str]) -> Result<InputAction, String> {
    let (duration_minutes, reason) = match rest {
        [] => (None, &[][..]),
        [first, reason @ ..] => match first.parse::<u32>() {
            Ok(minutes) => (Some(minutes), reason),
            Err(_) => (None, rest),
        },
    };
    Ok(InputAction::Ban(BanRequest {
        user_id: user.to_string(),
        user_name: String::new(),
        ban_type,
        duration_minutes,
        reason: (!reason.is_empty()).then(|| reason.join(" ")),
    }))
}

fn login(user: &str, rest: &[&str]) -> Result<InputAction, String> {
    let admin = rest.contains(&"--admin");
    let user_name = rest
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .map_or_else(|| user.to_string(), |name| name.to_string());
    Ok(InputAction::Login {
        user_id: user.to_string(),
        user_name,
        admin,
    })
}
