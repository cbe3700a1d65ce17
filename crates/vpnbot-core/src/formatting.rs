//! Text helpers for Telegram HTML screens and log lines.

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Two-decimal amount, as the backend reports balances and prices.
pub fn format_money(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Char-boundary-safe truncation with a trailing ellipsis.
pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn money_has_two_decimals() {
        assert_eq!(format_money(150.0), "150.00");
        assert_eq!(format_money(-3.456), "-3.46");
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_text("короткий", 20), "короткий");
        assert_eq!(truncate_text("ключ доступа", 4), "ключ...");
    }
}
