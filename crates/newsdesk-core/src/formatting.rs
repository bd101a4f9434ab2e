//! Telegram HTML helpers and message formatting.

use crate::article::Article;

/// Escape text for Telegram's HTML parse mode (and for the generated site).
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

/// One line per article: `#id · date · title`.
pub fn format_article_list(articles: &[Article]) -> String {
    if articles.is_empty() {
        return "No articles yet. Send /add to write the first one.".to_string();
    }

    let mut lines = vec![format!("📰 <b>Articles ({})</b>\n", articles.len())];
    for a in articles {
        let marker = if a.image.is_some() { " 🖼" } else { "" };
        lines.push(format!(
            "<code>#{}</code> {} · {}{}",
            a.id,
            a.date.format("%Y-%m-%d"),
            escape_html(&a.title),
            marker
        ));
    }
    lines.join("\n")
}

/// Full article body for `/show`, bounded to `max_chars` of content.
pub fn format_article_card(a: &Article, max_chars: usize) -> String {
    let author = if a.author.is_empty() {
        String::new()
    } else {
        format!(" · {}", escape_html(&a.author))
    };
    format!(
        "<b>{}</b>\n<i>#{} · {}{}</i>\n\n{}",
        escape_html(&a.title),
        a.id,
        a.date.format("%Y-%m-%d"),
        author,
        escape_html(&truncate_text(&a.content, max_chars))
    )
}

/// Split HTML into chunks of at most `limit` bytes, preferring line boundaries.
///
/// Lines longer than the limit are cut at a char boundary that is never inside
/// an entity (`&amp;`) or a tag. Tag pairs must not span lines.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(16);
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out = Vec::new();
    let mut chunk = String::new();
    for line in text.split_inclusive('\n') {
        let mut line = line;
        while !line.is_empty() {
            let room = limit - chunk.len();
            if line.len() <= room {
                chunk.push_str(line);
                break;
            }
            if !chunk.is_empty() {
                out.push(std::mem::take(&mut chunk));
                continue;
            }
            let cut = markup_safe_cut(line, limit);
            chunk.push_str(&line[..cut]);
            out.push(std::mem::take(&mut chunk));
            line = &line[cut..];
        }
    }
    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

fn markup_safe_cut(s: &str, max: usize) -> usize {
    let cut = floor_char_boundary(s, max);
    let head = &s[..cut];
    let unterminated = [('&', ';'), ('<', '>')]
        .into_iter()
        .filter_map(|(open, close)| {
            let at = head.rfind(open)?;
            (!head[at..].contains(close)).then_some(at)
        })
        .min();
    match unterminated {
        Some(at) if at > 0 => at,
        _ => cut,
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut idx = max.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    if idx == 0 {
        // Always make progress.
        s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
    } else {
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArticleId;
    use chrono::NaiveDate;

    fn article(id: u64, title: &str) -> Article {
        Article {
            id: ArticleId(id),
            title: title.to_string(),
            content: "body".to_string(),
            image: None,
            date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            author: "Ira".to_string(),
        }
    }

    #[test]
    fn list_escapes_titles() {
        let out = format_article_list(&[article(3, "<b>Sale</b> & more")]);
        assert!(out.contains("#3"));
        assert!(out.contains("&lt;b&gt;Sale&lt;/b&gt; &amp; more"));
        assert!(out.contains("2026-10-16"));
    }

    #[test]
    fn empty_list_has_hint() {
        assert!(format_article_list(&[]).contains("/add"));
    }

    #[test]
    fn split_prefers_line_breaks_and_respects_limit() {
        let text = (0..50).map(|i| format!("line {i}\n")).collect::<String>();
        let chunks = split_message(&text, 40);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 40));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn split_never_breaks_entities_or_tags() {
        let text = escape_html(&"a&".repeat(1000));
        for limit in [40, 41, 42, 43, 44, 4000] {
            let chunks = split_message(&text, limit);
            assert_eq!(chunks.concat(), text);
            for chunk in &chunks {
                assert!(chunk.len() <= limit);
                assert!(!chunk.starts_with("amp;") && !chunk.starts_with("mp;"));
                for (i, _) in chunk.match_indices('&') {
                    assert!(chunk[i..].starts_with("&amp;"), "entity cut in {chunk:?}");
                }
            }
        }

        let tagged = format!("{}<b>x</b>", "y".repeat(30));
        let chunks = split_message(&tagged, 32);
        assert_eq!(chunks.concat(), tagged);
        assert!(chunks.iter().all(|c| c.matches('<').count() == c.matches('>').count()));
    }

    #[test]
    fn split_handles_long_multibyte_lines() {
        let text = "ї".repeat(100);
        let chunks = split_message(&text, 33);
        assert!(chunks.iter().all(|c| c.len() <= 33));
        assert_eq!(chunks.concat(), text);
    }
}
