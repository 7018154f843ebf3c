//! Markdown metadata extraction.
//!
//! Pulls out everything the indexer derives from raw document text: search
//! tokens, tags, outbound wikilinks, title, preview, and a content fingerprint.
//! Extraction never fails; malformed markup just yields less metadata.

use sha2::{Digest, Sha256};

/// Maximum length of previews and link context snippets, in characters.
pub const SNIPPET_CHARS: usize = 200;

/// An outbound `[[wikilink]]` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLink {
    /// Raw target text, before any `|alias` or `#heading`.
    pub target: String,
    /// 1-based line number.
    pub line: usize,
    pub context: String,
}

/// SHA-256 of the document text, hex-encoded.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Case-insensitive word tokens: maximal runs of alphanumeric characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Tags: `#word` markers outside code, plus level-2 heading text.
///
/// Lower-cased, deduplicated in first-seen order, and capped at `cap`.
pub fn extract_tags(text: &str, cap: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let push = |tag: String, tags: &mut Vec<String>| {
        if !tag.is_empty() && tags.len() < cap && !tags.contains(&tag) {
            tags.push(tag);
        }
    };

    for line in prose_lines(text) {
        if let Some(heading) = heading_text(line, 2) {
            push(heading.to_lowercase(), &mut tags);
        }
        for tag in hashtags(&strip_code_spans(line)) {
            push(tag, &mut tags);
        }
        if tags.len() >= cap {
            break;
        }
    }
    tags
}

/// All `[[target]]` spans outside code, in document order.
pub fn extract_links(text: &str) -> Vec<OutboundLink> {
    let mut links = Vec::new();
    for ((idx, line), prose) in text.lines().enumerate().zip(prose_mask(text)) {
        if !prose {
            continue;
        }
        let stripped = strip_code_spans(line);
        let mut rest = stripped.as_str();
        while let Some(start) = rest.find("[[") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("]]") else {
                break;
            };
            let inner = &after[..end];
            let target = inner
                .split(['|', '#'])
                .next()
                .unwrap_or("")
                .trim();
            if !target.is_empty() {
                links.push(OutboundLink {
                    target: target.to_string(),
                    line: idx + 1,
                    context: truncate_chars(line.trim(), SNIPPET_CHARS),
                });
            }
            rest = &after[end + 2..];
        }
    }
    links
}

/// First level-1 heading, falling back to the file stem of `path`.
pub fn title(text: &str, path: &str) -> String {
    prose_lines(text)
        .find_map(|line| heading_text(line, 1))
        .map(|h| h.to_string())
        .unwrap_or_else(|| {
            let name = path.rsplit('/').next().unwrap_or(path);
            name.rsplit_once('.')
                .map(|(stem, _)| stem)
                .unwrap_or(name)
                .to_string()
        })
}

/// First [`SNIPPET_CHARS`] characters of body prose, skipping headings and
/// front matter.
pub fn preview(text: &str) -> String {
    let body: Vec<&str> = prose_lines(text)
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    truncate_chars(&body.join(" "), SNIPPET_CHARS)
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ============ Line classification ============

/// Lines outside fenced code blocks and YAML front matter.
fn prose_lines(text: &str) -> impl Iterator<Item = &str> {
    let mask = prose_mask(text);
    text.lines()
        .zip(mask)
        .filter_map(|(line, prose)| prose.then_some(line))
}

fn prose_mask(text: &str) -> Vec<bool> {
    let mut mask = Vec::new();
    let mut in_fence: Option<&str> = None;
    let mut in_front_matter = false;

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if idx == 0 && line.trim_end() == "---" {
            in_front_matter = true;
            mask.push(false);
            continue;
        }
        if in_front_matter {
            if line.trim_end() == "---" || line.trim_end() == "..." {
                in_front_matter = false;
            }
            mask.push(false);
            continue;
        }
        if let Some(fence) = in_fence {
            if trimmed.starts_with(fence) {
                in_fence = None;
            }
            mask.push(false);
            continue;
        }
        if trimmed.starts_with("```") {
            in_fence = Some("```");
            mask.push(false);
            continue;
        }
        if trimmed.starts_with("~~~") {
            in_fence = Some("~~~");
            mask.push(false);
            continue;
        }
        mask.push(true);
    }
    mask
}

/// Text of an ATX heading of exactly `level`, without closing hashes.
fn heading_text(line: &str, level: usize) -> Option<&str> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes != level {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let text = rest.trim().trim_end_matches('#').trim();
    (!text.is_empty()).then_some(text)
}

/// Removes inline code spans (`` `like this` ``) from a line.
fn strip_code_spans(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_code = false;
    for c in line.chars() {
        if c == '`' {
            in_code = !in_code;
            out.push(' ');
            continue;
        }
        if !in_code {
            out.push(c);
        }
    }
    out
}

fn hashtags(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut tags = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let at_word_start = i == 0 || chars[i - 1].is_whitespace() || chars[i - 1] == '(';
        if chars[i] == '#' && at_word_start && chars.get(i + 1).is_some_and(|c| c.is_alphabetic())
        {
            let mut j = i + 1;
            while j < chars.len()
                && (chars[j].is_alphanumeric() || matches!(chars[j], '_' | '-' | '/'))
            {
                j += 1;
            }
            let tag: String = chars[i + 1..j].iter().collect();
            let tag = tag.trim_end_matches(['-', '/']).to_lowercase();
            if !tag.is_empty() {
                tags.push(tag);
            }
            i = j;
        } else {
            i += 1;
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Hello, World! foo_bar 42x"),
            vec!["hello", "world", "foo", "bar", "42x"]
        );
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn test_hashtag_and_h2_tags() {
        let text = "# Today\nhello #work and #Work again\n## Projects\n#ideas/rust";
        assert_eq!(
            extract_tags(text, 5),
            vec!["work", "projects", "ideas/rust"]
        );
    }

    #[test]
    fn test_h1_and_h3_are_not_tags() {
        assert!(extract_tags("# Title\n### Deep", 5).is_empty());
    }

    #[test]
    fn test_tags_skip_code() {
        let text = "`#inline` text\n```\n#fenced\n```\nreal #tag";
        assert_eq!(extract_tags(text, 5), vec!["tag"]);
    }

    #[test]
    fn test_tags_ignore_mid_word_hash_and_numbers() {
        assert!(extract_tags("issue#12 and #42 and c#", 5).is_empty());
    }

    #[test]
    fn test_tag_cap() {
        let text = "#a1 #b1 #c1 #d1 #e1 #f1 #g1";
        let tags = extract_tags(text, 5);
        assert_eq!(tags, vec!["a1", "b1", "c1", "d1", "e1"]);
    }

    #[test]
    fn test_extract_links_with_alias_and_heading() {
        let text = "intro\nsee [[Project Plan|the plan]] and [[notes/ideas#top]]\n```\n[[ignored]]\n```";
        let links = extract_links(text);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "Project Plan");
        assert_eq!(links[0].line, 2);
        assert_eq!(links[1].target, "notes/ideas");
        assert!(links[1].context.contains("[[notes/ideas#top]]"));
    }

    #[test]
    fn test_unterminated_link_is_ignored() {
        assert!(extract_links("broken [[link").is_empty());
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        assert_eq!(title("# Daily Log\nbody", "x/y.md"), "Daily Log");
        assert_eq!(title("no heading", "notes/2024-01-15.md"), "2024-01-15");
    }

    #[test]
    fn test_preview_skips_front_matter_and_headings() {
        let text = "---\ntags: [a]\n---\n# Title\n\nFirst line.\nSecond line.";
        assert_eq!(preview(text), "First line. Second line.");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("").len(), 64);
    }
}
