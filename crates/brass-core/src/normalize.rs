//! Inbound message normalization and text flattening.
//!
//! [`normalize`] runs on every event before matching. It only adds derived
//! fields and strips link markup, never fails, and is idempotent.
//!
//! [`flatten_text`] turns platform markup into readable text for display
//! (console logging, help output); it is not applied to events.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::directory::Directory;
use crate::event::Event;

static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(http[^>]+)>").unwrap());
static USER_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@(\w+)(?:\|[^>]*)?>").unwrap());
static CHANNEL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#(\w+)(?:\|[^>]*)?>").unwrap());
static NOTICE_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<!(\w+)>").unwrap());
static URL_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^@#!<>][^<>]*)>").unwrap());

/// Enriches an inbound event in place.
///
/// - `channel_name` is set when the `channel` id resolves.
/// - `user_name` is set when the `user` id resolves.
/// - `<http…>` link markup in `text` is reduced to the bare URL.
pub fn normalize(directory: &Directory, event: &mut Event) {
    if let Some(name) = event.channel().and_then(|id| directory.channel_name(id)) {
        event.set("channel_name", name);
    }

    if let Some(nick) = event.user().and_then(|id| directory.nick(id)) {
        event.set("user_name", nick);
    }

    if let Some(text) = event.text()
        && text.contains("<http")
    {
        let stripped = strip_links(text);
        event.set("text", stripped);
    }
}

fn strip_links(text: &str) -> String {
    let mut current = text.to_string();
    // Nested markup like `<<http://a>>` needs more than one pass.
    while let Cow::Owned(next) = LINK.replace_all(&current, "$1") {
        current = next;
    }
    current
}

/// Rewrites platform markup into readable text.
///
/// `<@U…>` becomes `@nick`, `<#C…>` becomes `#channel`, `<!word>` becomes
/// `@word` and `<url>` becomes `url`. References that do not resolve are
/// left as they are. HTML entities (`&lt;`, `&gt;`, `&amp;`) are unescaped
/// last.
pub fn flatten_text(directory: &Directory, text: &str) -> String {
    let out = USER_REF.replace_all(text, |caps: &Captures<'_>| match directory.nick(&caps[1]) {
        Some(nick) => format!("@{nick}"),
        None => caps[0].to_string(),
    });
    let out = CHANNEL_REF.replace_all(&out, |caps: &Captures<'_>| {
        directory
            .channel_name(&caps[1])
            .unwrap_or_else(|| caps[0].to_string())
    });
    let out = NOTICE_REF.replace_all(&out, "@$1");
    let out = URL_REF.replace_all(&out, "$1");

    unescape(&out)
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
