//! Alert text (Telegram Markdown).
//!
//! Free text (names, sources, upstream error strings) is escaped so a
//! stray `_` or `*` cannot break entity parsing and get the message
//! rejected by the Bot API.

use chrono::{DateTime, Utc};

use crate::types::{Direction, Signal};

/// Backslash-escape the characters legacy Telegram Markdown treats as
/// entity delimiters.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Currency prefix for prices quoted in `quote`.
fn currency_symbol(instrument: &str) -> String {
    match instrument.split_once('-').map(|(_, q)| q.to_uppercase()) {
        Some(q) if q == "USD" || q == "USDT" || q == "USDC" => "$".to_string(),
        Some(q) => format!("{q} "),
        None => String::new(),
    }
}

/// Render a signal as a Markdown alert.
pub fn signal_message(
    signal: &Signal,
    instrument: &str,
    instrument_name: &str,
    now: DateTime<Utc>,
) -> String {
    let (headline, verb) = match signal.direction {
        Direction::Call => ("🟢 BUY CALL OPTION", "CALL"),
        Direction::Put => ("🔴 BUY PUT OPTION", "PUT"),
    };
    let cur = currency_symbol(instrument);
    let name = escape_markdown(&instrument_name.to_uppercase());
    let instrument_text = escape_markdown(instrument);
    let source = escape_markdown(&signal.source);

    let mut lines = vec![
        format!("*{name} WEEKLY OPTIONS ALERT*"),
        String::new(),
        format!("*Signal:* {headline} (Confidence: {:.2}%)", signal.confidence),
        format!("*Action:* Buy {instrument_text} {verb} options"),
        format!("*Recommended Strike:* {}", signal.strike),
        format!("*Expiry Date:* {}", signal.expiry.format("%Y-%m-%d")),
        format!("*Current Price:* {cur}{:.2} ({source})", signal.price),
        format!("*Expected Profit:* {:.1}%", signal.expected_profit * 100.0),
        format!("*Volatility:* {:.4}", signal.volatility),
    ];

    if signal.degraded {
        lines.push(format!(
            "⚠️ _Built from cached data observed at {}_",
            signal.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }

    lines.push(String::new());
    lines.push(format!("*Time:* {}", now.format("%Y-%m-%d %H:%M:%S UTC")));
    lines.join("\n")
}

/// Startup notice sent when the agent comes up.
pub fn startup_message(agent_name: &str, instrument_name: &str, interval_secs: u64) -> String {
    format!(
        "🚀 *{} started*\n\nMonitoring {} for trade signals every {} minute(s).",
        escape_markdown(agent_name),
        escape_markdown(instrument_name),
        (interval_secs / 60).max(1)
    )
}

/// Operator alert after a streak of failed cycles.
pub fn error_streak_message(agent_name: &str, failures: u32, last_error: &str) -> String {
    let last: String = last_error.chars().take(100).collect();
    format!(
        "⚠️ *{}*: {failures} consecutive cycles failed. Last error: {}",
        escape_markdown(agent_name),
        escape_markdown(&last)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn signal(direction: Direction, degraded: bool) -> Signal {
        Signal {
            direction,
            confidence: 91.234,
            strike: dec!(61000),
            expiry: NaiveDate::from_ymd_opt(2026, 4, 3).unwrap(),
            generated_at: Utc.with_ymd_and_hms(2026, 4, 1, 11, 50, 0).unwrap(),
            price: dec!(61342.1),
            source: "binance".into(),
            degraded,
            expected_profit: 0.25,
            volatility: 0.0031,
        }
    }

    #[test]
    fn test_call_message() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let msg = signal_message(&signal(Direction::Call, false), "BTC-USD", "Bitcoin", now);
        assert!(msg.starts_with("*BITCOIN WEEKLY OPTIONS ALERT*"));
        assert!(msg.contains("BUY CALL OPTION (Confidence: 91.23%)"));
        assert!(msg.contains("*Recommended Strike:* 61000"));
        assert!(msg.contains("*Expiry Date:* 2026-04-03"));
        assert!(msg.contains("*Current Price:* $61342.10 (binance)"));
        assert!(msg.contains("*Expected Profit:* 25.0%"));
        assert!(!msg.contains("cached data"));
    }

    #[test]
    fn test_put_degraded_message() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let msg = signal_message(&signal(Direction::Put, true), "BTC-EUR", "Bitcoin", now);
        assert!(msg.contains("BUY PUT OPTION"));
        assert!(msg.contains("EUR 61342.10"));
        assert!(msg.contains("cached data observed at 2026-04-01 11:50:00 UTC"));
    }

    #[test]
    fn test_operator_messages() {
        assert!(startup_message("VIGIL", "Bitcoin", 600).contains("every 10 minute(s)"));
        let long = "x".repeat(500);
        let msg = error_streak_message("VIGIL", 3, &long);
        assert!(msg.contains("3 consecutive cycles failed"));
        assert!(msg.len() < 200);
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("btc_weekly"), "btc\\_weekly");
        assert_eq!(escape_markdown("*a* `b` [c]"), "\\*a\\* \\`b\\` \\[c]");
        assert_eq!(escape_markdown("plain text (ok)"), "plain text (ok)");
    }

    #[test]
    fn test_error_streak_escapes_free_text() {
        let err = "Source unavailable (binance): HTTP 400: {\"msg\":\"bad symbol BTC_USDT\"}";
        let msg = error_streak_message("btc_weekly", 3, err);
        assert!(msg.starts_with("⚠️ *btc\\_weekly*: 3 consecutive"));
        assert!(msg.contains("BTC\\_USDT"));
        // Only the agent-name bold markers remain unescaped.
        let bare = msg.replace("\\*", "").replace("\\_", "");
        assert_eq!(bare.matches('*').count(), 2);
        assert!(!bare.contains('_'));
    }

    #[test]
    fn test_signal_message_escapes_names() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let mut s = signal(Direction::Call, false);
        s.source = "my_feed".into();
        let msg = signal_message(&s, "BTC-USD", "Wrapped_BTC", now);
        assert!(msg.starts_with("*WRAPPED\\_BTC WEEKLY OPTIONS ALERT*"));
        assert!(msg.contains("(my\\_feed)"));
        assert!(startup_message("vigil_bot", "Bitcoin", 600).contains("*vigil\\_bot started*"));
    }
}
