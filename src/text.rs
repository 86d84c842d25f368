use regex::Regex;
use std::sync::OnceLock;

fn break_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("static pattern"))
}

fn paragraph_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</p\s*>\s*<p(?:\s[^<>]*)?>|</?p(?:\s[^<>]*)?>|</div\s*>").expect("static pattern"))
}

fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*(?:\s[^<>]*)?/?>").expect("static pattern"))
}

fn blank_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n[\s]*").expect("static pattern"))
}

/// Turns the rich-text editor's HTML fragments into plain text. Paragraph and
/// line-break tags become newlines and other tags are dropped. A `<` that
/// does not open a tag name, as in `p < 0.5`, is text.
pub fn html_to_text(input: &str) -> String {
    if !input.contains('<') && !input.contains('&') {
        return input.to_string();
    }
    let text = break_tag().replace_all(input, "\n");
    let text = paragraph_tag().replace_all(&text, "\n");
    let text = any_tag().replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = blank_runs().replace_all(&text, "\n");
    text.trim_matches('\n').to_string()
}

/// Removes control characters. Newlines survive, tabs become spaces and
/// carriage returns are folded into the following newline.
pub fn strip_control_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    out.push('\n');
                }
            }
            '\n' => out.push('\n'),
            '\t' => out.push(' '),
            c if c.is_control() => {}
            '\u{00a0}' => out.push(' '),
            c => out.push(c),
        }
    }
    out
}

pub fn sanitize(input: &str) -> String {
    strip_control_chars(&html_to_text(input)).trim().to_string()
}

/// `None` for strings that carry no visible text.
pub fn non_empty(input: Option<&str>) -> Option<String> {
    let cleaned = sanitize(input?);
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Like [`non_empty`] for text that is never HTML, such as equations.
pub fn non_empty_plain(input: Option<&str>) -> Option<String> {
    let cleaned = strip_control_chars(input?).trim().to_string();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
