//! Credential scrubbing applied to tool output before it reaches the LLM or
//! gets logged. Tools declare a [`ScrubLevel`]; the registry applies it to
//! whatever string the tool returns.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrubLevel {
    /// Full regex scrub — cookies, PEM blocks, querystring secrets. Default.
    #[default]
    Aggressive,
    /// High-confidence patterns only (JWTs, `sk-*` keys, bot tokens). Won't
    /// corrupt code or regex output the way the aggressive pass can.
    Safe,
    /// The tool has its own dedicated scrubber; the registry leaves it alone.
    None,
}

fn safe_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"eyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}").unwrap(),
            Regex::new(r"sk-[A-Za-z0-9]{20,}").unwrap(),
            Regex::new(r"\d{9,10}:[A-Za-z0-9_-]{30,}").unwrap(), // Telegram bot tokens
        ]
    })
}

fn aggressive_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let mut v = safe_patterns().to_vec();
        v.push(Regex::new(r"(?i)cookie:\s*\S+").unwrap());
        v.push(Regex::new(r"-----BEGIN [A-Z ]*PRIVATE KEY-----[\s\S]*?-----END [A-Z ]*PRIVATE KEY-----").unwrap());
        v.push(Regex::new(r"(?i)([?&](?:token|api_key|apikey|secret|password|access_token)=)[^&\s]+").unwrap());
        v
    })
}

/// Apply the given scrub level to `text`, replacing matches with `[REDACTED]`.
pub fn scrub(text: &str, level: ScrubLevel) -> String {
    let patterns: &[Regex] = match level {
        ScrubLevel::None => return text.to_string(),
        ScrubLevel::Safe => safe_patterns(),
        ScrubLevel::Aggressive => aggressive_patterns(),
    };

    let mut out = text.to_string();
    for pattern in patterns {
        out = pattern.replace_all(&out, "[REDACTED]").into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggressive_scrubs_cookie_header() {
        let out = scrub("Set-Cookie: session=abc123xyz", ScrubLevel::Aggressive);
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn safe_scrubs_sk_key_but_leaves_plain_text() {
        let out = scrub("key is sk-abcdefghijklmnopqrstuvwx, done", ScrubLevel::Safe);
        assert!(out.contains("[REDACTED]"));
        assert!(out.contains("done"));
    }

    #[test]
    fn none_level_is_passthrough() {
        let text = "Cookie: secret=1234567890";
        assert_eq!(scrub(text, ScrubLevel::None), text);
    }
}
