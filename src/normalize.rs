//! Markup stripping for the plain-text fallback body

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());

static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// `&amp;amp;...` escape chains; each level would otherwise cost a full pass
static AMP_CHAIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(?:amp;)+").unwrap());

/// Entities decoded by [`strip_markup`]; anything else is left verbatim.
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&lsquo;", "'"),
    ("&rsquo;", "'"),
    ("&#8216;", "'"),
    ("&#8217;", "'"),
    ("&ldquo;", "\""),
    ("&rdquo;", "\""),
    ("&#8220;", "\""),
    ("&#8221;", "\""),
    ("&ndash;", "–"),
    ("&#8211;", "–"),
    ("&mdash;", "—"),
    ("&#8212;", "—"),
];

/// Reduce an HTML document to readable plain text.
///
/// Script and style blocks go first (their content never survives), then the
/// entity table is decoded, remaining tags are dropped, whitespace runs
/// become a single space and the result is trimmed. Decoding can surface new
/// markup such as `&lt;b&gt;`, so passes repeat until the text is stable;
/// every pass either shortens the text or only rewrites whitespace, which
/// bounds the loop.
pub fn strip_markup(html: &str) -> String {
    let mut current = strip_once(html);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_once(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = SCRIPT_BLOCK.replace_all(html, "");
    let text = STYLE_BLOCK.replace_all(&text, "");
    let text = AMP_CHAIN.replace_all(&text, "&");
    let text = decode_entities(&text);
    let text = TAG.replace_all(&text, "");
    let text = WHITESPACE_RUN.replace_all(&text, " ");

    text.trim().to_string()
}

/// Single left-to-right pass; `&amp;lt;` yields `&lt;` rather than `<`
fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match ENTITIES
            .iter()
            .find(|(entity, _)| rest.starts_with(entity))
        {
            Some((entity, replacement)) => {
                out.push_str(replacement);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
