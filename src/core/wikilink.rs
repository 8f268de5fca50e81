use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // [[target]], [[target|display]], [[target#heading]]
    static ref WIKILINK_RE: Regex = Regex::new(r"\[\[([^\]|#]+)(?:#[^\]|]*)?(?:\|[^\]]+)?\]\]").unwrap();
}

/// Link targets in order of appearance, including repeats
pub fn extract_wikilinks(content: &str) -> Vec<String> {
    WIKILINK_RE
        .captures_iter(content)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_without_alias_or_heading() {
        let links = extract_wikilinks("See [[Alice]], [[Acme Corp|Acme]] and [[Rust#Ownership]].");
        assert_eq!(links, vec!["Alice", "Acme Corp", "Rust"]);
    }

    #[test]
    fn test_repeats_kept() {
        assert_eq!(extract_wikilinks("[[a]] [[a]]").len(), 2);
    }
}
