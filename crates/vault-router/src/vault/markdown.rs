//! Markdown helpers: frontmatter, sections, headings and pipe tables.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|\z)").expect("valid frontmatter regex")
});

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*?)\s*$").expect("valid heading regex"));

static TABLE_SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|[-:| ]+\|$").expect("valid table separator regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: usize,
    pub title: String,
}

/// Split YAML frontmatter from the body. Missing or unparseable frontmatter
/// yields an empty object and the text unchanged.
pub fn parse_frontmatter(text: &str) -> (Value, &str) {
    let Some(caps) = FRONTMATTER_RE.captures(text) else {
        return (Value::Object(Map::new()), text);
    };
    let body = caps.get(0).map_or(text, |m| &text[m.end()..]);
    let raw = caps.get(1).map_or("", |m| m.as_str());

    let data = serde_yaml::from_str::<serde_yaml::Value>(raw)
        .ok()
        .and_then(|yaml| serde_json::to_value(yaml).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Map::new()));

    (data, body)
}

fn parse_heading(line: &str) -> Option<Heading> {
    let caps = HEADING_RE.captures(line)?;
    Some(Heading {
        level: caps[1].len(),
        title: caps[2].to_string(),
    })
}

pub fn headings(markdown: &str) -> Vec<Heading> {
    markdown.lines().filter_map(parse_heading).collect()
}

/// Text under the heading titled exactly `heading`, up to the next heading of
/// the same or a higher level.
pub fn extract_section(markdown: &str, heading: &str) -> Option<String> {
    let lines: Vec<&str> = markdown.lines().collect();
    let (start, level) = lines.iter().enumerate().find_map(|(i, line)| {
        parse_heading(line)
            .filter(|h| h.title == heading)
            .map(|h| (i, h.level))
    })?;

    let section: Vec<&str> = lines[start + 1..]
        .iter()
        .take_while(|line| parse_heading(line).map_or(true, |h| h.level > level))
        .copied()
        .collect();

    Some(section.join("\n").trim().to_string())
}

/// Pipe tables: a header row, a separator row and at least one body row.
pub fn extract_tables(markdown: &str) -> Vec<String> {
    let lines: Vec<&str> = markdown.lines().map(str::trim_end).collect();
    let mut tables = Vec::new();
    let mut i = 0;

    while i + 2 < lines.len() {
        let is_header = lines[i].starts_with('|') && lines[i].ends_with('|') && lines[i].len() > 1;
        if is_header && TABLE_SEPARATOR_RE.is_match(lines[i + 1]) && lines[i + 2].starts_with('|') {
            let end = lines[i + 2..]
                .iter()
                .position(|line| !line.starts_with('|'))
                .map_or(lines.len(), |offset| i + 2 + offset);
            tables.push(lines[i..end].join("\n"));
            i = end;
        } else {
            i += 1;
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOTE: &str = "---\ntitle: 部品\ntags: [a, b]\n---\n# 部品\n\n概要です。\n\n## 手順\n1. 開く\n### 詳細\n細かい話\n## 参考\nリンク\n";

    #[test]
    fn test_frontmatter_split() {
        let (fm, body) = parse_frontmatter(NOTE);
        assert_eq!(fm, json!({"title": "部品", "tags": ["a", "b"]}));
        assert!(body.starts_with("# 部品"));
    }

    #[test]
    fn test_no_or_broken_frontmatter() {
        let (fm, body) = parse_frontmatter("# Title\ntext");
        assert_eq!(fm, json!({}));
        assert_eq!(body, "# Title\ntext");

        let (fm, body) = parse_frontmatter("---\n- just\n- a list\n---\nbody");
        assert_eq!(fm, json!({}));
        assert_eq!(body, "body");
    }

    #[test]
    fn test_section_stops_at_same_level() {
        let (_, body) = parse_frontmatter(NOTE);
        assert_eq!(
            extract_section(body, "手順").as_deref(),
            Some("1. 開く\n### 詳細\n細かい話")
        );
        assert_eq!(extract_section(body, "参考").as_deref(), Some("リンク"));
        assert_eq!(extract_section(body, "存在しない"), None);
    }

    #[test]
    fn test_headings_outline() {
        let (_, body) = parse_frontmatter(NOTE);
        let outline: Vec<(usize, String)> = headings(body).into_iter().map(|h| (h.level, h.title)).collect();
        assert_eq!(
            outline,
            vec![
                (1, "部品".to_string()),
                (2, "手順".to_string()),
                (3, "詳細".to_string()),
                (2, "参考".to_string()),
            ]
        );
    }

    #[test]
    fn test_extract_tables() {
        let md = "intro\n| a | b |\n|---|:-:|\n| 1 | 2 |\n| 3 | 4 |\ntext\n\n| only | header |\n|---|---|\n\n| x |\n|---|\n| y |";
        let tables = extract_tables(md);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0], "| a | b |\n|---|:-:|\n| 1 | 2 |\n| 3 | 4 |");
        assert_eq!(tables[1], "| x |\n|---|\n| y |");
    }

    #[test]
    fn test_no_tables() {
        assert!(extract_tables("no | pipes here\n").is_empty());
        assert!(extract_tables("").is_empty());
    }
}
