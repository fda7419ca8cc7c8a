use std::sync::LazyLock;

use regex::Regex;

static WIKI_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[.*?\]\]").unwrap());

/// Blank out every `[[...]]` link with spaces, one per byte.
///
/// The result has exactly the byte length of `text`, so offsets reported on it
/// address the same positions in the original note, and nothing inside an
/// existing link can be detected as a new mention. `[text](target)` links are
/// left as they are.
pub fn neutralize_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in WIKI_LINK_RE.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        out.extend(std::iter::repeat(' ').take(m.len()));
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}
