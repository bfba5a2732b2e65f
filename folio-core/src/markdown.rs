use std::collections::HashSet;
use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};
use serde::Serialize;
use syntect::highlighting::ThemeSet;
use syntect::html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

// Initialize syntax highlighting resources once
static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u32,
    pub text: String,
    pub id: String,
}

/// A page body converted to HTML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedBody {
    pub html: String,
    pub headings: Vec<Heading>,
    /// First paragraph as plain text, cut to the configured word count.
    pub summary: String,
}

/// Converts Markdown bodies to HTML.
///
/// Rendering never fails: anything pulldown-cmark does not recognise comes
/// out as literal text. Output depends only on the input text and the
/// renderer's settings.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    highlight: bool,
    summary_words: usize,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(true, 70)
    }
}

impl MarkdownRenderer {
    pub fn new(highlight: bool, summary_words: usize) -> Self {
        Self {
            highlight,
            summary_words,
        }
    }

    pub fn render(&self, body: &str) -> RenderedBody {
        let events: Vec<Event> = Parser::new_ext(body, options()).collect();
        let mut processed_events = Vec::with_capacity(events.len());
        let mut headings = Vec::new();
        // Explicit `{#id}`s are reserved up front so generated ids avoid them
        // wherever they appear.
        let mut taken_ids: HashSet<String> = events
            .iter()
            .filter_map(|event| match event {
                Event::Start(Tag::Heading { id: Some(id), .. }) => Some(id.to_string()),
                _ => None,
            })
            .collect();
        let mut summary: Option<String> = None;
        let mut i = 0;

        while i < events.len() {
            match &events[i] {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => language_tag(info),
                        CodeBlockKind::Indented => None,
                    };

                    let mut code = String::new();
                    i += 1;
                    while i < events.len() {
                        match &events[i] {
                            Event::End(TagEnd::CodeBlock) => break,
                            Event::Text(text) => code.push_str(text),
                            _ => {}
                        }
                        i += 1;
                    }

                    let block = self.code_block(language.as_deref(), &code);
                    processed_events.push(Event::Html(block.into()));
                }
                Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                }) => {
                    let end = closing_index(&events, i);
                    let text = plain_text(&events[i + 1..end]);
                    let id = match id {
                        Some(explicit) => explicit.to_string(),
                        None => unique_id(&text, &mut taken_ids),
                    };

                    headings.push(Heading {
                        level: heading_level(*level),
                        text,
                        id: id.clone(),
                    });
                    processed_events.push(Event::Start(Tag::Heading {
                        level: *level,
                        id: Some(id.into()),
                        classes: classes.clone(),
                        attrs: attrs.clone(),
                    }));
                }
                Event::Start(Tag::Paragraph) => {
                    if summary.is_none() {
                        let end = closing_index(&events, i);
                        let text = plain_text(&events[i + 1..end]);
                        if !text.trim().is_empty() {
                            summary = Some(truncate_words(&text, self.summary_words));
                        }
                    }
                    processed_events.push(events[i].clone());
                }
                other => processed_events.push(other.clone()),
            }
            i += 1;
        }

        let mut out = String::new();
        html::push_html(&mut out, processed_events.into_iter());

        RenderedBody {
            html: out,
            headings,
            summary: summary.unwrap_or_default(),
        }
    }

    /// Code blocks always come out as `<pre><code>`; the client script looks
    /// them up with the `pre code` selector.
    fn code_block(&self, language: Option<&str>, code: &str) -> String {
        let class = language
            .map(|lang| {
                format!(
                    " class=\"language-{}\"",
                    html_escape::encode_double_quoted_attribute(lang)
                )
            })
            .unwrap_or_default();

        let inner = language
            .filter(|_| self.highlight)
            .and_then(|lang| highlight(lang, code))
            .unwrap_or_else(|| html_escape::encode_text(code).into_owned());

        format!("<pre><code{class}>{inner}</code></pre>\n")
    }
}

fn highlight(language: &str, code: &str) -> Option<String> {
    let syntax = SYNTAX_SET.find_syntax_by_token(language).or_else(|| {
        // Fallback mappings for languages the default set lacks
        match language {
            "toml" => SYNTAX_SET.find_syntax_by_name("YAML"),
            _ => None,
        }
    })?;

    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, ClassStyle::Spaced);
    for line in LinesWithEndings::from(code) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .ok()?;
    }
    Some(generator.finalize())
}

/// Stylesheet matching the classes emitted for highlighted code.
pub fn theme_css(theme: &str) -> Option<String> {
    let theme = THEME_SET.themes.get(theme)?;
    css_for_theme_with_class_style(theme, ClassStyle::Spaced).ok()
}

fn language_tag(info: &str) -> Option<String> {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
}

fn heading_level(level: HeadingLevel) -> u32 {
    level as u32
}

/// Index of the event closing the element opened at `start`.
fn closing_index(events: &[Event], start: usize) -> usize {
    let mut depth = 0usize;
    for (offset, event) in events[start..].iter().enumerate() {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return start + offset;
                }
            }
            _ => {}
        }
    }
    events.len()
}

fn plain_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

fn truncate_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if limit == 0 || words.len() <= limit {
        return words.join(" ");
    }
    format!("{}…", words[..limit].join(" "))
}

fn unique_id(text: &str, taken: &mut HashSet<String>) -> String {
    let mut base = slugify(text);
    if base.is_empty() {
        base = "section".to_string();
    }

    let mut id = base.clone();
    let mut n = 1;
    while taken.contains(&id) {
        id = format!("{base}-{n}");
        n += 1;
    }
    taken.insert(id.clone());
    id
}

/// Lowercase ASCII letters and digits joined by single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' || c == '/' || c == '.' {
            pending_hyphen = true;
        }
    }

    slug
}

/// Like [`slugify`] but keeps letters and digits outside ASCII, so tags such
/// as `日本語` still get a page. Never empty.
pub fn tag_slug(tag: &str) -> String {
    let mut slug = String::with_capacity(tag.len());
    let mut pending_hyphen = false;

    for c in tag.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("tag");
    }
    slug
}

/// Text of the first level-1 heading in a Markdown body.
pub fn first_heading(body: &str) -> Option<String> {
    let mut in_heading = false;
    let mut text = String::new();

    for event in Parser::new_ext(body, options()) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => in_heading = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if in_heading => {
                let title = text.trim().to_string();
                return (!title.is_empty()).then_some(title);
            }
            Event::Text(t) | Event::Code(t) if in_heading => text.push_str(&t),
            _ => continue,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plain() -> MarkdownRenderer {
        MarkdownRenderer::new(false, 5)
    }

    #[test]
    fn heading_gets_slug_id() {
        let out = plain().render("# Hi there\n");
        assert_eq!(out.html, "<h1 id=\"hi-there\">Hi there</h1>\n");
        assert_eq!(
            out.headings,
            vec![Heading {
                level: 1,
                text: "Hi there".into(),
                id: "hi-there".into()
            }]
        );
    }

    #[test]
    fn duplicate_headings_get_suffixes() {
        let out = plain().render("## Setup\n\n## Setup\n\n## Setup {#custom}\n");
        let ids: Vec<_> = out.headings.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["setup", "setup-1", "custom"]);
    }

    #[test]
    fn generated_ids_avoid_explicit_ones() {
        let out = plain().render("## Intro\n\n## A {#intro}\n\n## Intro\n");
        let ids: Vec<_> = out.headings.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["intro-1", "intro", "intro-2"]);
    }

    #[test]
    fn fenced_code_keeps_pre_code_shape() {
        let out = plain().render("```go\nfmt.Println(\"<hi>\")\n```\n");
        assert_eq!(
            out.html,
            "<pre><code class=\"language-go\">fmt.Println(&quot;&lt;hi&gt;&quot;)\n</code></pre>\n"
        );
    }

    #[test]
    fn highlighted_code_stays_inside_pre_code() {
        let out = MarkdownRenderer::new(true, 5).render("```rust\nfn main() {}\n```\n");
        assert!(out.html.starts_with("<pre><code class=\"language-rust\">"));
        assert!(out.html.contains("<span class="));
        assert!(out.html.ends_with("</code></pre>\n"));
    }

    #[test]
    fn unknown_language_is_escaped_text() {
        let out = MarkdownRenderer::new(true, 5).render("```nosuchlang\na < b\n```\n");
        assert_eq!(
            out.html,
            "<pre><code class=\"language-nosuchlang\">a &lt; b\n</code></pre>\n"
        );
    }

    #[test]
    fn untagged_fence_has_no_class() {
        let out = plain().render("```\nplain\n```\n");
        assert_eq!(out.html, "<pre><code>plain\n</code></pre>\n");
    }

    #[test]
    fn block_elements_render() {
        let out = plain().render(
            "Some *em* and **strong** with [a link](/x/) and ![alt](/i.png)\n\n\
             - one\n- two\n\n1. first\n\n> quoted\n",
        );
        assert!(out.html.contains("<em>em</em>"));
        assert!(out.html.contains("<strong>strong</strong>"));
        assert!(out.html.contains("<a href=\"/x/\">a link</a>"));
        assert!(out.html.contains("<img src=\"/i.png\" alt=\"alt\" />"));
        assert!(out.html.contains("<ul>\n<li>one</li>\n<li>two</li>\n</ul>"));
        assert!(out.html.contains("<ol>\n<li>first</li>\n</ol>"));
        assert!(out.html.contains("<blockquote>\n<p>quoted</p>\n</blockquote>"));
    }

    #[test]
    fn malformed_inline_degrades_to_text() {
        let out = plain().render("an *unclosed emphasis and [broken link(\n");
        assert_eq!(
            out.html,
            "<p>an *unclosed emphasis and [broken link(</p>\n"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let body = "# T\n\ntext\n\n```rust\nlet x = 1;\n```\n";
        let r = MarkdownRenderer::default();
        assert_eq!(r.render(body), r.render(body));
    }

    #[test]
    fn summary_is_first_paragraph_truncated() {
        let out = plain().render("# Title\n\none two three four five six\n\nsecond\n");
        assert_eq!(out.summary, "one two three four five…");
    }

    #[test]
    fn first_heading_finds_h1() {
        assert_eq!(
            first_heading("intro\n\n## Sub\n\n# Main `code`\n"),
            Some("Main code".to_string())
        );
        assert_eq!(first_heading("no headings"), None);
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Hello, World -- Again! "), "hello-world-again");
        assert_eq!(slugify("v1.2_notes"), "v1-2-notes");
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn tag_slugs_keep_non_ascii_letters() {
        assert_eq!(tag_slug("日本語"), "日本語");
        assert_eq!(tag_slug("Rust Lang"), "rust-lang");
        assert_eq!(tag_slug("C++"), "c");
        assert_eq!(tag_slug("++"), "tag");
    }

    #[test]
    fn theme_css_for_known_theme() {
        assert!(theme_css("base16-ocean.dark").is_some());
        assert!(theme_css("no-such-theme").is_none());
    }
}
