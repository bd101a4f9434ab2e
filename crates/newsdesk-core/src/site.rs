//! Static site rendering.
//!
//! The renderer is a pure function of the article list; writing the result to
//! disk and publishing it is the pipeline's job.

use std::collections::HashSet;

use crate::{article::Article, domain::MediaRef, formatting::escape_html, Result};

/// Path prefix of images inside the published site.
pub const MEDIA_URL_PREFIX: &str = "media";

pub trait SiteRenderer: Send + Sync {
    /// Render the index page. `available` holds the images that exist on disk;
    /// articles pointing anywhere else get a placeholder.
    fn render(&self, articles: &[Article], available: &HashSet<MediaRef>) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct HtmlSiteRenderer {
    pub title: String,
    /// Raw HTML placed in the footer (operator-controlled, not escaped).
    pub footer_html: Option<String>,
    pub lang: String,
}

impl HtmlSiteRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            footer_html: None,
            lang: "uk".to_string(),
        }
    }

    fn head(&self) -> String {
        let title = escape_html(&self.title);
        format!(
            r#"<!DOCTYPE html>
<html lang="{lang}">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 0; padding: 0; background: #f9f9f9; }}
        header {{ background: #222; color: #fff; padding: 1rem; }}
        .logo {{ font-size: 1.5rem; font-weight: bold; }}
        .container {{ padding: 2rem; max-width: 1000px; margin: auto; }}
        .articles {{ display: grid; gap: 1rem; grid-template-columns: repeat(auto-fit, minmax(280px, 1fr)); }}
        article {{ background: white; padding: 1rem; border-radius: 10px; box-shadow: 0 2px 6px rgba(0,0,0,0.1); }}
        article img {{ width: 100%; border-radius: 6px; }}
        .placeholder {{ background: #eee; color: #999; text-align: center; padding: 2rem 0; border-radius: 6px; }}
        .empty {{ color: #777; }}
        footer {{ padding: 2rem; background: #eee; text-align: center; }}
    </style>
</head>
<body>
<header>
    <div class="logo">{title}</div>
</header>
<div class="container">
    <section class="articles">
"#,
            lang = escape_html(&self.lang),
        )
    }

    fn card(&self, a: &Article, available: &HashSet<MediaRef>) -> String {
        let image = match &a.image {
            Some(m) if available.contains(m) => format!(
                r#"<img src="{MEDIA_URL_PREFIX}/{}" alt="{}">"#,
                escape_html(m.as_str()),
                escape_html(&a.title)
            ),
            Some(_) => r#"<div class="placeholder">no image</div>"#.to_string(),
            None => String::new(),
        };
        let author = if a.author.is_empty() {
            String::new()
        } else {
            format!(" · {}", escape_html(&a.author))
        };
        let body = a
            .content
            .lines()
            .map(escape_html)
            .collect::<Vec<_>>()
            .join("<br>\n");

        format!(
            r#"        <article id="article-{id}">
            {image}
            <h3>{title}</h3>
            <small>{date}{author}</small>
            <p>{body}</p>
        </article>
"#,
            id = a.id,
            title = escape_html(&a.title),
            date = a.date.format("%Y-%m-%d"),
        )
    }
}

impl SiteRenderer for HtmlSiteRenderer {
    fn render(&self, articles: &[Article], available: &HashSet<MediaRef>) -> Result<String> {
        let mut html = self.head();
        if articles.is_empty() {
            html.push_str("        <p class=\"empty\">No news yet.</p>\n");
        }
        for a in articles {
            html.push_str(&self.card(a, available));
        }
        html.push_str("    </section>\n</div>\n");
        if let Some(footer) = &self.footer_html {
            html.push_str(&format!("<footer>\n{footer}\n</footer>\n"));
        }
        html.push_str("</body>\n</html>\n");
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArticleId;
    use chrono::NaiveDate;

    fn article(id: u64, image: Option<&str>) -> Article {
        Article {
            id: ArticleId(id),
            title: format!("Title {id} <x>"),
            content: "line one\nline & two".to_string(),
            image: image.map(|s| MediaRef(s.to_string())),
            date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            author: "Ira".to_string(),
        }
    }

    #[test]
    fn renders_escaped_cards_in_given_order() {
        let r = HtmlSiteRenderer::new("GeniusBar");
        let html = r
            .render(&[article(2, None), article(1, None)], &HashSet::new())
            .unwrap();

        assert!(html.contains("<title>GeniusBar</title>"));
        assert!(html.contains("Title 2 &lt;x&gt;"));
        assert!(html.contains("line one<br>\nline &amp; two"));
        assert!(html.find("article-2").unwrap() < html.find("article-1").unwrap());
    }

    #[test]
    fn missing_image_degrades_to_placeholder() {
        let r = HtmlSiteRenderer::new("Site");
        let present = MediaRef("1_aa.jpg".to_string());
        let available = HashSet::from([present]);
        let html = r
            .render(
                &[article(1, Some("1_aa.jpg")), article(2, Some("1_gone.jpg"))],
                &available,
            )
            .unwrap();

        assert!(html.contains(r#"src="media/1_aa.jpg""#));
        assert!(!html.contains("1_gone.jpg"));
        assert!(html.contains("no image"));
    }

    #[test]
    fn empty_site_still_renders() {
        let html = HtmlSiteRenderer::new("Site")
            .render(&[], &HashSet::new())
            .unwrap();
        assert!(html.contains("No news yet."));
        assert!(html.ends_with("</html>\n"));
    }
}
