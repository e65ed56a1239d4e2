//! Model response grammar
//!
//! Responses carry XML-ish tags: an optional reflection triple
//! (`<decision>`, `<summary>`, `<lessons>`), required `<thoughts>`, one or
//! more `<action>` blocks, and an optional `<property>`. Action contents may
//! be wrapped in single backticks or a fenced code block; both are stripped.

use regex::Regex;

/// First occurrence of `<tag>...</tag>`, trimmed; empty when absent.
pub fn parse_tag(content: &str, tag: &str) -> String {
    let pattern = format!(r"(?s)<{tag}>(.*?)</{tag}>");
    let Ok(re) = Regex::new(&pattern) else {
        return String::new();
    };
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Every non-empty `<action>` block, backticks and fences stripped.
pub fn parse_actions(content: &str) -> Vec<String> {
    let re = Regex::new(r"(?s)<action>(.*?)</action>").expect("static pattern");
    re.captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| strip_backticks(m.as_str()))
        .filter(|action| !action.is_empty())
        .collect()
}

pub fn strip_backticks(text: &str) -> String {
    let s = text.trim();
    if s.starts_with("```") {
        let open = Regex::new(r"^```\w*\n?").expect("static pattern");
        let s = open.replace(s, "");
        let close = Regex::new(r"\n?```$").expect("static pattern");
        let s = close.replace(&s, "");
        return s.trim().to_string();
    }
    if s.len() >= 2 && s.starts_with('`') && s.ends_with('`') {
        return s[1..s.len() - 1].trim().to_string();
    }
    s.to_string()
}
