//! Discord message construction from Travis notifications

use chrono::DateTime;
use serde::Serialize;
use tracing::warn;

use crate::error::{RelayError, Result};
use crate::webhook::Notification;
use crate::{BranchStyle, RelayConfig};

pub const USERNAME: &str = "Travis CI";
pub const AVATAR_URL: &str = "https://travis-ci.com/images/logos/TravisCI-Mascot-1.png";
const SHORT_COMMIT_LEN: usize = 7;

/// Mascot variant shown next to the embed author line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Blue,
    Grey,
    Red,
}

impl StatusIcon {
    pub fn for_status(status: &str) -> Self {
        match status {
            "passed" | "fixed" => StatusIcon::Blue,
            "pending" | "canceled" => StatusIcon::Grey,
            _ => StatusIcon::Red,
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            StatusIcon::Blue => "https://travis-ci.com/images/logos/TravisCI-Mascot-blue.png",
            StatusIcon::Grey => "https://travis-ci.com/images/logos/TravisCI-Mascot-grey.png",
            StatusIcon::Red => "https://travis-ci.com/images/logos/TravisCI-Mascot-red.png",
        }
    }
}

/// Which notification timestamp the embed carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    StartedAt,
    FinishedAt,
}

impl TimestampSource {
    pub fn for_status(status: &str) -> Self {
        if status == "pending" {
            TimestampSource::StartedAt
        } else {
            TimestampSource::FinishedAt
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            TimestampSource::StartedAt => "started_at",
            TimestampSource::FinishedAt => "finished_at",
        }
    }

    /// The selected timestamp as sent, once it is known to be RFC 3339.
    fn select(self, notification: &Notification) -> Result<String> {
        let field = self.field_name();
        let timestamp = match self {
            TimestampSource::StartedAt => notification.started_at.as_ref(),
            TimestampSource::FinishedAt => notification.finished_at.as_ref(),
        }
        .ok_or(RelayError::MissingField(field))?;
        DateTime::parse_from_rfc3339(timestamp)
            .map_err(|source| RelayError::InvalidTimestamp { field, source })?;
        Ok(timestamp.clone())
    }
}

/// How a status keyword is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub color: u32,
    pub icon: StatusIcon,
    pub timestamp_source: TimestampSource,
}

/// Maps a status keyword to its presentation. The keyword is matched
/// case-insensitively. A status without a configured color fails unless a
/// `default_color` is set.
pub fn present(status_message: &str, config: &RelayConfig) -> Result<Presentation> {
    let status = status_message.to_lowercase();
    let color = match (config.colors.get(&status), config.default_color) {
        (Some(color), _) => *color,
        (None, Some(default)) => {
            warn!(
                "No color configured for status '{}', using default color {}",
                status, default
            );
            default
        }
        (None, None) => return Err(RelayError::UnmappedStatus(status)),
    };

    Ok(Presentation {
        color,
        icon: StatusIcon::for_status(&status),
        timestamp_source: TimestampSource::for_status(&status),
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscordMessage {
    pub username: String,
    pub avatar_url: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub color: u32,
    pub author: EmbedAuthor,
    pub title: String,
    pub url: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: String) -> Self {
        Self {
            name: name.to_string(),
            value,
            inline: true,
        }
    }
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Lines of a message. `\r\n`, a bare `\r` and the Unicode line and
/// paragraph separators all end a line; a trailing break adds no empty line.
pub fn message_lines(message: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = message;
    while !rest.is_empty() {
        let Some(end) = rest.find(is_line_break) else {
            lines.push(rest);
            break;
        };
        lines.push(&rest[..end]);
        let break_len = if rest[end..].starts_with("\r\n") {
            2
        } else {
            rest[end..].chars().next().map_or(1, char::len_utf8)
        };
        rest = &rest[end + break_len..];
    }
    lines
}

/// Splits a commit message into its first line and the remaining lines.
pub fn split_message(message: &str) -> (String, String) {
    let lines = message_lines(message);
    let title = lines.first().copied().unwrap_or_default().to_string();
    let description = lines.iter().skip(1).copied().collect::<Vec<_>>().join("\n");
    (title, description)
}

/// First seven characters of a commit hash.
pub fn short_commit(commit: &str) -> String {
    commit.chars().take(SHORT_COMMIT_LEN).collect()
}

/// Link to the pull request, or an empty string for branch builds.
fn pull_request_url(notification: &Notification) -> Result<String> {
    if !notification.pull_request {
        return Ok(String::new());
    }
    let number = notification
        .pull_request_number
        .as_deref()
        .ok_or(RelayError::MissingField("pull_request_number"))?;
    Ok(format!(
        "https://github.com/{}/pull/{}",
        notification.slug(),
        number
    ))
}

fn branch_value(notification: &Notification, style: BranchStyle) -> String {
    match style {
        BranchStyle::Link => format!(
            "[`{}`](https://github.com/{}/tree/{})",
            notification.branch,
            notification.slug(),
            notification.branch
        ),
        BranchStyle::Code => format!("`{}`", notification.branch),
    }
}

/// Builds the Discord webhook message for a notification.
pub fn build_message(
    notification: &Notification,
    presentation: &Presentation,
    branch_style: BranchStyle,
) -> Result<DiscordMessage> {
    let (title, description) = split_message(&notification.message);
    let timestamp = presentation.timestamp_source.select(notification)?;

    let embed = Embed {
        color: presentation.color,
        author: EmbedAuthor {
            name: format!(
                "Build #{} {} - {}",
                notification.number,
                notification.status_message,
                notification.slug()
            ),
            url: notification.build_url.clone(),
            icon_url: presentation.icon.url().to_string(),
        },
        title,
        url: pull_request_url(notification)?,
        description,
        fields: vec![
            EmbedField::inline(
                "Commit",
                format!(
                    "[`{}`]({})",
                    short_commit(&notification.commit),
                    notification.compare_url
                ),
            ),
            EmbedField::inline("Branch", branch_value(notification, branch_style)),
        ],
        timestamp,
    };

    Ok(DiscordMessage {
        username: USERNAME.to_string(),
        avatar_url: AVATAR_URL.to_string(),
        embeds: vec![embed],
    })
}
