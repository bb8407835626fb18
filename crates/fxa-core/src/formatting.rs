//! Reply rendering per channel (Telegram HTML, WhatsApp, web widget) and
//! number formatting.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Escape HTML special characters (Telegram HTML parse mode and the web widget).
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_]*\n?(.*?)```|`([^`\n]+)`").expect("valid regex"))
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s<>"]+"#).expect("valid regex"))
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid regex"))
}

/// Convert the Markdown subset our replies use to Telegram HTML.
///
/// Telegram accepts only a few tags: `<b>`, `<i>`, `<code>`, `<pre>`, `<a href="...">`.
/// Code spans are rendered first and protected from the other rules.
pub fn markdown_to_telegram_html(input: &str) -> String {
    let mut stash: Vec<String> = Vec::new();
    let text = code_re().replace_all(input, |caps: &Captures| {
        let html = match (caps.get(1), caps.get(2)) {
            (Some(block), _) => format!("<pre>{}</pre>", escape_html(block.as_str())),
            (None, Some(inline)) => format!("<code>{}</code>", escape_html(inline.as_str())),
            (None, None) => String::new(),
        };
        stash.push(html);
        format!("\0{}\0", stash.len() - 1)
    });

    let text = escape_html(&text);

    // Line by line so emphasis never spans lines.
    let mut lines = Vec::new();
    for line in text.split('\n') {
        let line = match line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            Some(rest) => format!("• {rest}"),
            None => line.to_string(),
        };
        let line = replace_pairs(&line, "**", "<b>", "</b>");
        let line = replace_single(&line, '_', "<i>", "</i>");
        let line = replace_single(&line, '*', "<b>", "</b>");
        lines.push(line);
    }
    let mut text = link_re()
        .replace_all(&lines.join("\n"), r#"<a href="$2">$1</a>"#)
        .into_owned();

    for (i, html) in stash.iter().enumerate() {
        text = text.replace(&format!("\0{i}\0"), html);
    }

    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }
    text
}

/// Render reply text for the browser widget.
///
/// Order: link URLs, newlines to `<br>`, then `**bold**` to `<strong>`. URLs
/// are found on the raw text (so `<`, `>` and `"` end them) and every piece is
/// escaped on its way out.
pub fn render_web_reply(text: &str) -> String {
    let mut linked = String::with_capacity(text.len() + 64);
    let mut last = 0usize;
    for m in url_re().find_iter(text) {
        let raw = m
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '\'']);
        let url = escape_html(raw);
        linked.push_str(&escape_html(&text[last..m.start()]));
        linked.push_str(&format!(
            r#"<a href="{url}" target="_blank" rel="noopener noreferrer">{url}</a>"#
        ));
        last = m.start() + raw.len();
    }
    linked.push_str(&escape_html(&text[last..]));

    let broken = linked.replace("\r\n", "\n").replace('\n', "<br>");
    bold_re()
        .replace_all(&broken, "<strong>$1</strong>")
        .into_owned()
}

/// WhatsApp uses single asterisks for bold.
pub fn to_whatsapp(text: &str) -> String {
    bold_re().replace_all(text, "*$1*").into_owned()
}

/// `1234567.891` -> `1,234,567.89`; whole numbers print without decimals.
pub fn format_amount(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    if value < 0.0 && cents != 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if frac != 0 {
        out.push_str(&format!(".{frac:02}"));
    }
    out
}

/// Rates below 1 (e.g. XAF -> USD) need more precision than money amounts.
pub fn format_rate(value: f64) -> String {
    if value >= 1.0 {
        return format_amount(value);
    }
    let s = format!("{value:.6}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn replace_pairs(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(start) = rest.find(delim) {
        let after = &rest[start + delim.len()..];
        let Some(end) = after.find(delim) else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(open);
        out.push_str(&after[..end]);
        out.push_str(close);
        rest = &after[end + delim.len()..];
    }
    out.push_str(rest);
    out
}

fn replace_single(text: &str, delim: char, open: &str, close: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_lone = |i: usize| {
        chars[i] == delim
            && !(i > 0 && chars[i - 1] == delim)
            && !(i + 1 < chars.len() && chars[i + 1] == delim)
    };

    let mut out = String::new();
    let mut i = 0usize;
    while i < chars.len() {
        if is_lone(i) {
            // Closing delimiter must follow a non-space character.
            let close_at = (i + 2..chars.len()).find(|&j| is_lone(j) && !chars[j - 1].is_whitespace());
            if let Some(j) = close_at {
                if !chars[i + 1].is_whitespace() {
                    out.push_str(open);
                    out.extend(&chars[i + 1..j]);
                    out.push_str(close);
                    i = j + 1;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
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
    fn web_reply_links_breaks_then_bolds() {
        let html = render_web_reply("Visit https://example.com now **please**\nThanks");

        assert_eq!(html.matches("<a ").count(), 1);
        assert_eq!(html.matches("<br>").count(), 1);
        assert_eq!(html.matches("<strong>please</strong>").count(), 1);
        assert!(html.contains(r#"href="https://example.com""#));

        let a = html.find("<a ").unwrap();
        let strong = html.find("<strong>").unwrap();
        let br = html.find("<br>").unwrap();
        assert!(a < strong && strong < br);
        assert!(html.ends_with("<br>Thanks"));
    }

    #[test]
    fn web_links_exclude_trailing_punctuation() {
        let html = render_web_reply("See https://example.com/rates.");
        assert!(html.contains(r#">https://example.com/rates</a>."#));

        let html = render_web_reply("(https://example.com/a?x=1&y=2)");
        assert!(html.contains(r#"href="https://example.com/a?x=1&amp;y=2""#));
        assert!(html.ends_with("</a>)"));
    }

    #[test]
    fn web_links_stop_at_angle_brackets_and_quotes() {
        let html = render_web_reply("See <https://example.com> now");
        assert!(html.contains(r#"href="https://example.com""#));
        assert!(html.starts_with("See &lt;<a "));
        assert!(html.ends_with("</a>&gt; now"));

        let html = render_web_reply(r#"go "https://example.com/x" ok"#);
        assert!(html.contains(r#"href="https://example.com/x""#));
        assert!(html.contains("</a>&quot; ok"));
    }

    #[test]
    fn web_reply_escapes_user_markup() {
        let html = render_web_reply("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn telegram_html_bold_italic_code_links() {
        let html = markdown_to_telegram_html("**1 USD** = _604.5_ XAF, try `/rates`\n- [site](https://x.y)");
        assert_eq!(
            html,
            "<b>1 USD</b> = <i>604.5</i> XAF, try <code>/rates</code>\n• <a href=\"https://x.y\">site</a>"
        );
    }

    #[test]
    fn telegram_code_blocks_are_untouched() {
        let html = markdown_to_telegram_html("hi\n```\n**x** <b>\n```\nbye");
        assert!(html.contains("<pre>**x** &lt;b&gt;\n</pre>"));
    }

    #[test]
    fn whatsapp_bold() {
        assert_eq!(to_whatsapp("**100 USD** = 60,450 XAF"), "*100 USD* = 60,450 XAF");
    }

    #[test]
    fn amounts_have_separators_and_two_decimals_max() {
        assert_eq!(format_amount(60450.0), "60,450");
        assert_eq!(format_amount(1234567.891), "1,234,567.89");
        assert_eq!(format_amount(604.5), "604.50");
        assert_eq!(format_amount(999.999), "1,000");
        assert_eq!(format_amount(-1500.0), "-1,500");
        assert_eq!(format_amount(0.0), "0");
    }

    #[test]
    fn small_rates_keep_precision() {
        assert_eq!(format_rate(0.001654), "0.001654");
        assert_eq!(format_rate(655.957), "655.96");
    }
}
