//! Markdown sources.
//!
//! A source starts with a block of `Key: value` lines, optionally fenced by
//! `---`. The rest is Markdown. `{{slug}}` and `[label]{{slug}}` in text
//! become links whose `href` is a `url_for` call, resolved later when the
//! page template runs the body through the `flatearth_render` filter.

use std::path::Path;
use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, TextMergeStream, html};
use regex::Regex;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::error::Result;
use crate::meta::RawMeta;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

static URL_FOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\[([^\[\]]+)\])?\{\{([\w_-]+)\}\}").expect("valid url_for pattern"));
static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ ]{0,3}([A-Za-z0-9_-]+):\s*(.*)$").expect("valid meta pattern"));
static META_MORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ ]{4,}(.*)$").expect("valid meta continuation pattern"));
static BEGIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-{3}(\s.*)?$").expect("valid begin pattern"));
static END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-{3}|\.{3})(\s.*)?$").expect("valid end pattern"));

pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// One loaded source file: raw metadata and rendered HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    pub meta: RawMeta,
    pub html: String,
}

/// Turns a source file into metadata plus HTML.
pub trait SourceLoader {
    fn load_str(&self, text: &str) -> Result<Source>;

    fn load(&self, path: &Path) -> Result<Source> {
        let text = std::fs::read_to_string(path)?;
        self.load_str(&text)
    }
}

#[derive(Debug, Clone)]
pub struct MarkdownLoader {
    theme: String,
}

impl Default for MarkdownLoader {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_string(),
        }
    }
}

impl MarkdownLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Syntect theme for fenced code. Unknown themes fall back to plain
    /// `<pre><code>` blocks.
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }
}

impl SourceLoader for MarkdownLoader {
    fn load_str(&self, text: &str) -> Result<Source> {
        let (meta, body) = split_front_matter(text);
        let html = render_markdown(&body, &self.theme);
        Ok(Source { meta, html })
    }
}

/// Split the metadata block off the top of a source.
pub fn split_front_matter(text: &str) -> (RawMeta, String) {
    let mut lines = text.lines().peekable();
    let mut meta = RawMeta::new();
    let mut key: Option<String> = None;

    if lines.peek().is_some_and(|line| BEGIN_RE.is_match(line)) {
        lines.next();
    }

    while let Some(&line) = lines.peek() {
        if line.trim().is_empty() {
            lines.next();
            break;
        }
        if END_RE.is_match(line) {
            lines.next();
            break;
        }

        if let Some(caps) = META_RE.captures(line) {
            let name = caps[1].to_lowercase();
            let value = caps[2].trim().to_string();
            meta.entry(name.clone()).or_default().push(value);
            key = Some(name);
        } else if let (Some(caps), Some(name)) = (META_MORE_RE.captures(line), key.as_ref()) {
            meta.entry(name.clone())
                .or_default()
                .push(caps[1].trim().to_string());
        } else {
            break;
        }
        lines.next();
    }

    (meta, lines.collect::<Vec<_>>().join("\n"))
}

/// Render a Markdown body to HTML.
pub fn render_markdown(body: &str, theme: &str) -> String {
    let options = Options::all()
        - Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
        - Options::ENABLE_PLUSES_DELIMITED_METADATA_BLOCKS;
    let parser = TextMergeStream::new(Parser::new_ext(body, options));
    let mut events = Vec::new();
    let mut code: Option<(String, String)> = None;
    // Image alt text is escaped by the writer, so it stays plain text.
    let mut image_depth = 0usize;

    for event in parser {
        if let Some((lang, content)) = code.as_mut() {
            match event {
                Event::Text(text) => content.push_str(&text),
                Event::End(TagEnd::CodeBlock) => {
                    events.push(Event::Html(highlight(lang, content, theme).into()));
                    code = None;
                }
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some((lang, String::new()));
            }
            Event::Start(Tag::Image { .. }) => {
                image_depth += 1;
                events.push(event);
            }
            Event::End(TagEnd::Image) => {
                image_depth = image_depth.saturating_sub(1);
                events.push(event);
            }
            Event::Text(text) | Event::Code(text) if image_depth > 0 => {
                events.push(Event::Text(guard_template(text.into_string()).into()));
            }
            Event::Text(text) => events.push(Event::InlineHtml(link_slugs(&text).into())),
            Event::Html(html) => events.push(Event::Html(guard_template(html.into_string()).into())),
            Event::InlineHtml(html) => {
                events.push(Event::InlineHtml(guard_template(html.into_string()).into()))
            }
            Event::Code(text) => {
                let code = format!("<code>{}</code>", html_escape::encode_text(&*text));
                events.push(Event::InlineHtml(guard_template(code).into()));
            }
            event => events.push(event),
        }
    }

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}

/// Escape `text` and turn slug references into `url_for` links.
pub fn link_slugs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in URL_FOR_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&guard_template(html_escape::encode_text(&text[last..whole.start()]).into_owned()));

        let slug = &caps[3];
        let url = format!("{{{{ url_for(endpoint='{slug}') }}}}");
        let label = match caps.get(2) {
            Some(label) => html_escape::encode_text(label.as_str().trim()).into_owned(),
            None => url.clone(),
        };
        out.push_str(&format!("<a href=\"{url}\">{label}</a>"));
        last = whole.end();
    }

    out.push_str(&guard_template(html_escape::encode_text(&text[last..]).into_owned()));
    out
}

fn highlight(lang: &str, content: &str, theme: &str) -> String {
    let plain = || format!("<pre><code>{}</code></pre>", html_escape::encode_text(content));

    let syntax = (!lang.is_empty())
        .then(|| SYNTAX_SET.find_syntax_by_token(lang))
        .flatten()
        .or_else(|| match lang {
            "toml" => SYNTAX_SET.find_syntax_by_name("YAML"),
            _ => None,
        });

    let html = match (syntax, THEME_SET.themes.get(theme)) {
        (Some(syntax), Some(theme)) => {
            highlighted_html_for_string(content, &SYNTAX_SET, syntax, theme).unwrap_or_else(|_| plain())
        }
        _ => plain(),
    };
    guard_template(html)
}

/// Keep literal template delimiters from being evaluated when the body is
/// rendered as a template.
fn guard_template(html: String) -> String {
    if html.contains("{{") || html.contains("{%") || html.contains("{#") {
        format!("{{% raw %}}{html}{{% endraw %}}")
    } else {
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_matter_keys_and_continuations() {
        let text = "Title: Hello\nAuthor: alice\n    bob\nTYPE: article\n\n# Body\n";
        let (meta, body) = split_front_matter(text);

        assert_eq!(meta["title"], vec!["Hello".to_string()]);
        assert_eq!(meta["author"], vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(meta["type"], vec!["article".to_string()]);
        assert_eq!(body, "# Body");
    }

    #[test]
    fn test_front_matter_fenced() {
        let text = "---\nslug: intro\n---\nHello";
        let (meta, body) = split_front_matter(text);

        assert_eq!(meta["slug"], vec!["intro".to_string()]);
        assert_eq!(body, "Hello");
    }

    #[test]
    fn test_no_front_matter() {
        let (meta, body) = split_front_matter("Just text here.\nMore.");
        assert!(meta.is_empty());
        assert_eq!(body, "Just text here.\nMore.");
    }

    #[test]
    fn test_slug_links() {
        let html = link_slugs("See [the intro]{{intro}} and {{about}} & more");
        assert_eq!(
            html,
            "See <a href=\"{{ url_for(endpoint='intro') }}\">the intro</a> and \
             <a href=\"{{ url_for(endpoint='about') }}\">{{ url_for(endpoint='about') }}</a> &amp; more"
        );
    }

    #[test]
    fn test_render_links_outside_code_only() {
        let html = render_markdown("Read [this]{{intro}}.\n\n`{{intro}}`\n", DEFAULT_THEME);

        assert!(html.contains("<a href=\"{{ url_for(endpoint='intro') }}\">this</a>"));
        assert!(html.contains("{% raw %}<code>{{intro}}</code>{% endraw %}"));
    }

    #[test]
    fn test_raw_html_keeps_template_syntax() {
        let html = render_markdown("<div>{{ name }}</div>\n\nText.\n", DEFAULT_THEME);

        assert!(html.contains("{% raw %}<div>{{ name }}</div>"), "{html}");
        assert!(html.contains("<p>Text.</p>"));
    }

    #[test]
    fn test_raw_html_renders_through_filter() {
        let html = render_markdown("<div>{{ name }}</div>\n\nA <span>{% if x %}</span> b.\n", DEFAULT_THEME);
        let rendered = tera::Tera::one_off(&html, &tera::Context::new(), false).unwrap();

        assert!(rendered.contains("<div>{{ name }}</div>"), "{rendered}");
        assert!(rendered.contains("<span>{% if x %}</span>"), "{rendered}");
    }

    #[test]
    fn test_image_alt_is_escaped_once() {
        let html = render_markdown("![a & b](x.png)\n", DEFAULT_THEME);
        assert!(html.contains("alt=\"a &amp; b\""), "{html}");

        let html = render_markdown("![`{{x}}`](x.png)\n", DEFAULT_THEME);
        let rendered = tera::Tera::one_off(&html, &tera::Context::new(), false).unwrap();
        assert!(rendered.contains("alt=\"{{x}}\""), "{rendered}");
    }

    #[test]
    fn test_fenced_code_is_highlighted() {
        let html = render_markdown("```rust\nfn main() {}\n```\n", DEFAULT_THEME);
        assert!(html.contains("<pre style="));
        assert!(!html.contains("```"));
    }

    #[test]
    fn test_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intro.md");
        std::fs::write(&path, "type: article\nslug: intro\n\n*hi*\n").unwrap();

        let source = MarkdownLoader::new().load(&path).unwrap();
        assert_eq!(source.meta["slug"], vec!["intro".to_string()]);
        assert_eq!(source.html.trim(), "<p><em>hi</em></p>");
    }
}
