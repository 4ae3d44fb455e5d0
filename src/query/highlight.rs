use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

pub fn build_highlight_regex(tokens: &[String]) -> Option<Regex> {
    let mut unique = Vec::new();
    let mut seen = HashSet::new();
    for token in tokens {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            unique.push(trimmed.to_owned());
        }
    }
    if unique.is_empty() {
        return None;
    }
    unique.sort_by(|a, b| b.len().cmp(&a.len()));
    let pattern = unique
        .iter()
        .map(|token| regex::escape(token))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

/// Wraps every case-insensitive occurrence of `query` in `[` `]`.
pub fn highlight_matches(text: &str, query: &str) -> String {
    let Some(regex) = build_highlight_regex(&[query.to_owned()]) else {
        return text.to_owned();
    };
    regex.replace_all(text, "[$0]").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_longer_tokens_first() {
        let regex = build_highlight_regex(&["ceph".into(), "ceph storage".into()]).expect("regex");
        let matches: Vec<_> = regex
            .find_iter("Proxmox with Ceph Storage")
            .map(|m| m.as_str())
            .collect();
        assert_eq!(matches, vec!["Ceph Storage"]);
    }

    #[test]
    fn wraps_matches_keeping_original_case() {
        assert_eq!(
            highlight_matches("HA Proxmox Cluster", "proxmox"),
            "HA [Proxmox] Cluster"
        );
        assert_eq!(highlight_matches("a.b", "."), "a[.]b");
        assert_eq!(highlight_matches("unchanged", "  "), "unchanged");
    }
}
