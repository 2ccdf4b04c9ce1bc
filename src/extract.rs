//! Regex-based text annotation.
//!
//! Best-effort passes over document content: markup stripping for connector
//! snippets, PII redaction for log output, contact signals (e-mails, phone
//! numbers, `@handles`, domains) and simple dated timeline events. Nothing
//! here takes part in document identity or deduplication.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Replacement text for masked PII.
pub const REDACTED: &str = "[REDACTED]";

const EVENT_CONFIDENCE: f64 = 0.9;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\w.\-]+@([\w.\-]+\.[A-Za-z]{2,})").expect("email regex is valid")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\d[\d\s-]{7,}\d").expect("phone regex is valid"))
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^\w.@])(@[A-Za-z0-9_]{2,})").expect("username regex is valid")
    })
}

fn domain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}\b")
            .expect("domain regex is valid")
    })
}

fn event_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"On (?P<date>\d{1,2} [A-Za-z]+ \d{4}), ",
            r"(?P<who>[A-Z][a-z]+(?: [A-Z][a-z]+)*) ",
            r"(?P<verb>founded|acquired|visited) ",
            r"(?P<target>[A-Z][a-z]+(?: [A-Z][a-z]+)*) ",
            r"in (?P<place>[A-Z][a-z]+(?: [A-Z][a-z]+)*)",
        ))
        .expect("event regex is valid")
    })
}

/// Remove HTML tags such as `<span class="searchmatch">`, keeping their text.
pub fn strip_tags(text: &str) -> String {
    tag_re().replace_all(text, "").into_owned()
}

/// Mask e-mail addresses and phone numbers so they never reach log output.
pub fn redact(text: &str) -> String {
    let masked = email_re().replace_all(text, REDACTED);
    phone_re().replace_all(&masked, REDACTED).into_owned()
}

/// Contact signals found in free text. Each list keeps first-seen order
/// without repeats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub usernames: Vec<String>,
    pub domains: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

impl Signals {
    /// Fold another set in, keeping this set's entries first.
    pub fn merge(&mut self, other: Signals) {
        for v in &other.emails {
            push_unique(&mut self.emails, v);
        }
        for v in &other.phones {
            push_unique(&mut self.phones, v);
        }
        for v in &other.usernames {
            push_unique(&mut self.usernames, v);
        }
        for v in &other.domains {
            push_unique(&mut self.domains, v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
            && self.phones.is_empty()
            && self.usernames.is_empty()
            && self.domains.is_empty()
    }
}

/// Extract e-mails, phone numbers, `@handles` and domain names from `text`.
///
/// E-mail domains are listed first among the domains. Bare domains are then
/// read from the text with the e-mail addresses blanked out, so an address's
/// local part (`alice.smith@...`) is never mistaken for a host name.
pub fn extract_signals(text: &str) -> Signals {
    let mut signals = Signals::default();

    for caps in email_re().captures_iter(text) {
        push_unique(&mut signals.emails, &caps[0]);
        push_unique(&mut signals.domains, &caps[1].to_ascii_lowercase());
    }
    for m in phone_re().find_iter(text) {
        push_unique(&mut signals.phones, m.as_str().trim());
    }
    for caps in username_re().captures_iter(text) {
        push_unique(&mut signals.usernames, &caps[1]);
    }

    let without_emails = email_re().replace_all(text, " ");
    for m in domain_re().find_iter(&without_emails) {
        push_unique(&mut signals.domains, &m.as_str().to_ascii_lowercase());
    }

    signals
}

/// A dated action recognised in document text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub who: String,
    pub what: String,
    pub target: String,
    pub when: NaiveDate,
    #[serde(rename = "where")]
    pub place: String,
    pub source: String,
    pub confidence: f64,
    pub citations: Vec<String>,
}

/// Recognise sentences like `On 1 Jan 2020, Alice founded Acme in Sydney.`
///
/// Month names may be abbreviated or spelled out. Matches whose date does
/// not parse are skipped.
pub fn extract_events(text: &str, source: &str) -> Vec<TimelineEvent> {
    event_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let when = NaiveDate::parse_from_str(&caps["date"], "%d %b %Y").ok()?;
            Some(TimelineEvent {
                who: caps["who"].to_string(),
                what: caps["verb"].to_string(),
                target: caps["target"].to_string(),
                when,
                place: caps["place"].to_string(),
                source: source.to_string(),
                confidence: EVENT_CONFIDENCE,
                citations: vec![source.to_string()],
            })
        })
        .collect()
}
