use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FRONTMATTER_RE: Regex = Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---\r?\n?").unwrap();
    static ref TITLE_RE: Regex = Regex::new(r"(?m)^title:\s*(.+)$").unwrap();
    static ref HUB_RE: Regex = Regex::new(r"(?m)^(?:hub|smart_hub):\s*(.+)$").unwrap();
    static ref TAGS_INLINE_RE: Regex = Regex::new(r"(?m)^tags:\s*\[(.*?)\]").unwrap();
    static ref TAGS_BLOCK_RE: Regex = Regex::new(r"(?m)^tags:\s*\r?\n((?:\s+-\s*.+\r?\n?)+)").unwrap();
}

/// The handful of frontmatter fields the index cares about
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub hub: Option<String>,
    pub tags: Vec<String>,
}

impl Frontmatter {
    /// Split a note into its frontmatter (if any) and body
    pub fn split(content: &str) -> (Option<Self>, &str) {
        match FRONTMATTER_RE.captures(content) {
            Some(caps) => {
                let raw = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let body_start = caps.get(0).map(|m| m.end()).unwrap_or(0);
                (Some(Self::parse_raw(raw)), &content[body_start..])
            }
            None => (None, content),
        }
    }

    pub fn parse(content: &str) -> Option<Self> {
        Self::split(content).0
    }

    fn parse_raw(raw: &str) -> Self {
        Self {
            title: TITLE_RE.captures(raw).map(|c| unquote(&c[1])).filter(|t| !t.is_empty()),
            hub: HUB_RE.captures(raw).map(|c| unquote(&c[1])).filter(|h| !h.is_empty()),
            tags: extract_tags(raw),
        }
    }
}

fn unquote(value: &str) -> String {
    value.trim().trim_matches('"').trim_matches('\'').to_string()
}

fn extract_tags(raw: &str) -> Vec<String> {
    let tags: Vec<String> = if let Some(c) = TAGS_INLINE_RE.captures(raw) {
        c[1].split(',').map(unquote).collect()
    } else if let Some(c) = TAGS_BLOCK_RE.captures(raw) {
        c[1].lines()
            .filter_map(|l| l.trim().strip_prefix('-'))
            .map(unquote)
            .collect()
    } else {
        Vec::new()
    };

    tags.into_iter()
        .map(|t| t.trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_fields() {
        let content = "---\ntitle: \"GPU Memory\"\nhub: hardware\ntags: [gpu, \"#cuda\"]\n---\nBody text";
        let (fm, body) = Frontmatter::split(content);
        let fm = fm.unwrap();
        assert_eq!(fm.title.as_deref(), Some("GPU Memory"));
        assert_eq!(fm.hub.as_deref(), Some("hardware"));
        assert_eq!(fm.tags, vec!["gpu", "cuda"]);
        assert_eq!(body, "Body text");
    }

    #[test]
    fn test_block_tags() {
        let content = "---\ntags:\n  - rust\n  - 'search'\n---\n";
        let fm = Frontmatter::parse(content).unwrap();
        assert_eq!(fm.tags, vec!["rust", "search"]);
        assert!(fm.title.is_none());
    }

    #[test]
    fn test_no_frontmatter() {
        let (fm, body) = Frontmatter::split("# Heading\ntext");
        assert!(fm.is_none());
        assert_eq!(body, "# Heading\ntext");
    }
}
