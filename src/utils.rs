use once_cell::sync::Lazy;
use regex::Regex;
use serenity::all::{Http, UserId};
use std::time::Duration as StdDuration;

/// Every name a member could appear under in a run screenshot: nicknames in
/// this community stack alternate names behind separators, e.g.
/// "Main | Alt" or "Main / Alt".
pub fn aliases_from_names(nick: Option<&str>, username: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(nick) = nick {
        for part in nick.split(['|', '/', ',']) {
            let cleaned: String = part.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            if !cleaned.is_empty() && !out.iter().any(|a| a.eq_ignore_ascii_case(&cleaned)) {
                out.push(cleaned);
            }
        }
    }
    if !out.iter().any(|a| a.eq_ignore_ascii_case(username)) {
        out.push(username.to_string());
    }
    out
}

/// Parsed claim-panel custom_id. Component ids carry the join message id as
/// the instance key, plus a reaction key where the op needs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentId {
    pub op: String,
    pub message_id: u64,
    pub key: Option<String>,
}

/* custom_id formats used: rd:<op>:<message_id>[:<react_key>] */
pub fn parse_component_id(s: &str) -> Option<ComponentId> {
    let s = s.strip_prefix("rd:")?;
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [op @ ("o" | "a" | "x" | "l" | "e"), mid] => Some(ComponentId {
            op: (*op).to_string(),
            message_id: mid.parse().ok()?,
            key: None,
        }),
        [op @ ("c" | "ok" | "no"), mid, key] => Some(ComponentId {
            op: (*op).to_string(),
            message_id: mid.parse().ok()?,
            key: Some((*key).to_string()),
        }),
        _ => None,
    }
}

/// Parses a human window length like "90s", "5m", "5 min", "1h" into a
/// duration. Bare numbers read as minutes.
pub fn parse_window(text: &str) -> Option<StdDuration> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?ix)
            ^\s*
            (?P<num>\d+(?:[.,]\d+)?)
            \s*
            (?P<unit>s|sec|secs|m|min|mins|h|hr|hours?)?
            \s*$
        "#,
        )
        .unwrap()
    });
    let caps = RE.captures(text)?;
    let num: f64 = caps["num"].replace(',', ".").parse().ok()?;
    if num <= 0.0 {
        return None;
    }
    let secs = match caps.name("unit").map(|m| m.as_str().to_ascii_lowercase()) {
        Some(u) if u.starts_with('s') => num,
        Some(u) if u.starts_with('h') => num * 3600.0,
        _ => num * 60.0,
    };
    // Absurd magnitudes read as invalid rather than overflowing.
    StdDuration::try_from_secs_f64(secs).ok()
}

pub async fn dm_user(http: &Http, user_id: u64, content: String) {
    let uid = UserId::new(user_id);
    if let Ok(dm) = uid.create_dm_channel(http).await {
        let _ = dm.say(http, content).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_ids_round_trip() {
        assert_eq!(
            parse_component_id("rd:c:42:KEY"),
            Some(ComponentId { op: "c".into(), message_id: 42, key: Some("KEY".into()) })
        );
        assert_eq!(
            parse_component_id("rd:o:42"),
            Some(ComponentId { op: "o".into(), message_id: 42, key: None })
        );
        assert_eq!(parse_component_id("rd:zz:42"), None);
        assert_eq!(parse_component_id("r:j:m:42"), None);
        assert_eq!(parse_component_id("rd:c:notanumber:KEY"), None);
    }

    #[test]
    fn window_parsing() {
        assert_eq!(parse_window("90s"), Some(StdDuration::from_secs(90)));
        assert_eq!(parse_window("5m"), Some(StdDuration::from_secs(300)));
        assert_eq!(parse_window("5 min"), Some(StdDuration::from_secs(300)));
        assert_eq!(parse_window("1h"), Some(StdDuration::from_secs(3600)));
        assert_eq!(parse_window("6"), Some(StdDuration::from_secs(360)));
        assert_eq!(parse_window("junk"), None);
        assert_eq!(parse_window("0"), None);
        // Out of range for a Duration; must not panic.
        assert_eq!(parse_window("99999999999999999999h"), None);
        assert_eq!(parse_window("99999999999999999999"), None);
    }

    #[test]
    fn nickname_aliases_split_and_clean() {
        let aliases = aliases_from_names(Some("Main | AltOne / Alt.Two"), "Account");
        assert_eq!(aliases, vec!["Main", "AltOne", "AltTwo", "Account"]);
        let aliases = aliases_from_names(None, "Account");
        assert_eq!(aliases, vec!["Account"]);
    }
}
