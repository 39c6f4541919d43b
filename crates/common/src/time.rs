use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix seconds.
///
/// Second resolution is all the log needs; record ids break ties.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Parse a compact time-window expression like `"2h30m"` into seconds.
///
/// Accepts any sequence of `<integer><unit>` tokens with unit one of
/// `w`, `d`, `h`, `m`, `s`, in any order, repeats allowed. Characters
/// outside `[0-9smhdw]` are stripped before tokenization, so `"2h 30m"`
/// and `"2H30M"` both parse. Returns `None` for empty or entirely
/// non-matching input; malformed input never errors.
pub fn parse_duration(input: &str) -> Option<u64> {
    if input.is_empty() {
        return None;
    }
    let cleaned: String = input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, 's' | 'm' | 'h' | 'd' | 'w'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let mut total: Option<u64> = None;
    let mut digits = String::new();
    for c in cleaned.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        // A unit without preceding digits is not a token; drop it.
        if digits.is_empty() {
            continue;
        }
        let value: u64 = match digits.parse() {
            Ok(v) => v,
            Err(_) => {
                digits.clear();
                continue;
            }
        };
        digits.clear();
        let unit_secs = match c {
            'w' => 7 * 24 * 60 * 60,
            'd' => 24 * 60 * 60,
            'h' => 60 * 60,
            'm' => 60,
            's' => 1,
            _ => unreachable!("filtered above"),
        };
        total = Some(total.unwrap_or(0) + value * unit_secs);
    }
    total
}

const AGE_UNITS: [(&str, u64); 6] = [
    ("year", 365 * 24 * 60 * 60),
    ("month", 30 * 24 * 60 * 60),
    ("day", 24 * 60 * 60),
    ("hour", 60 * 60),
    ("minute", 60),
    ("second", 1),
];

/// Format the age of `timestamp` (unix seconds) relative to `now` as a
/// human-readable phrase: `"2 hours, 5 minutes and 3 seconds ago"`.
///
/// At most `level` components are emitted, largest units first; zero-valued
/// units are skipped. An age of zero renders as `"just now"`.
pub fn time_ago(timestamp: u64, now: u64, level: usize) -> String {
    let mut remaining = now.saturating_sub(timestamp);
    let mut parts: Vec<String> = Vec::new();
    for (name, secs) in AGE_UNITS {
        if parts.len() == level {
            break;
        }
        let count = remaining / secs;
        if count == 0 {
            continue;
        }
        remaining -= count * secs;
        let plural = if count > 1 { "s" } else { "" };
        parts.push(format!("{count} {name}{plural}"));
    }
    match parts.len() {
        0 => "just now".to_string(),
        1 => format!("{} ago", parts[0]),
        n => {
            let head = parts[..n - 1].join(", ");
            format!("{} and {} ago", head, parts[n - 1])
        }
    }
}
