use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Markup construct that must never receive a new link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Heading,
    CodeFence,
    InlineLink,
    WikiLink,
    HtmlComment,
}

struct ZonePattern {
    regex: Regex,
    kind: ZoneKind,
}

/// Matched textually; nested or unbalanced markup resolves by leftmost match.
static ZONE_PATTERNS: LazyLock<Vec<ZonePattern>> = LazyLock::new(|| {
    vec![
        ZonePattern {
            regex: Regex::new(r"(?m)^#+\s.*$").unwrap(),
            kind: ZoneKind::Heading,
        },
        ZonePattern {
            regex: Regex::new(r"(?s)```.*?```").unwrap(),
            kind: ZoneKind::CodeFence,
        },
        ZonePattern {
            regex: Regex::new(r"\[.*?\]\(.*?\)").unwrap(),
            kind: ZoneKind::InlineLink,
        },
        ZonePattern {
            regex: Regex::new(r"\[\[.*?\]\]").unwrap(),
            kind: ZoneKind::WikiLink,
        },
        ZonePattern {
            regex: Regex::new(r"(?s)<!--.*?-->").unwrap(),
            kind: ZoneKind::HtmlComment,
        },
    ]
});

/// A byte range of a note covered by protected markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeZone {
    pub kind: ZoneKind,
    pub range: Range<usize>,
}

/// Every protected range of one text, computed once.
#[derive(Debug, Clone, Default)]
pub struct UnsafeZones {
    zones: Vec<UnsafeZone>,
}

impl UnsafeZones {
    pub fn scan(text: &str) -> Self {
        let mut zones: Vec<UnsafeZone> = ZONE_PATTERNS
            .iter()
            .flat_map(|p| {
                p.regex.find_iter(text).map(|m| UnsafeZone {
                    kind: p.kind,
                    range: m.range(),
                })
            })
            .collect();
        zones.sort_by_key(|z| z.range.start);
        Self { zones }
    }

    /// The zone covering `offset`, if any (`start <= offset < end`).
    pub fn zone_at(&self, offset: usize) -> Option<&UnsafeZone> {
        self.zones
            .iter()
            .take_while(|z| z.range.start <= offset)
            .find(|z| offset < z.range.end)
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.zone_at(offset).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnsafeZone> {
        self.zones.iter()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Whether a link may be inserted at byte `offset` of `text`.
pub fn is_editable(text: &str, offset: usize) -> bool {
    !UnsafeZones::scan(text).contains(offset)
}
