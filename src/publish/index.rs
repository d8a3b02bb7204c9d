/*!
 * Translation table maintained in the index document.
 *
 * The table sits between two HTML comment markers so later runs can find
 * and replace it. Languages already listed keep their rows; languages from
 * the current batch are added or refreshed. Rows are ordered by code, so
 * applying the same entries twice yields the same document.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use super::paths::TRANSLATIONS_ROOT;
use crate::language_utils::get_language_name;

pub const INDEX_START_MARKER: &str = "<!-- docglot:translations:start -->";
pub const INDEX_END_MARKER: &str = "<!-- docglot:translations:end -->";

/// Content used when the index document does not exist yet
pub const DEFAULT_INDEX_CONTENT: &str = "# README";

static ROW_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\]\((translations/([^/)]+)/[^)]*)\)").expect("valid row link pattern")
});

/// One row of the translation table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub language: String,
    /// Repository-relative link target
    pub link: String,
}

/// One entry per language, linking the translated README when the batch has one
pub fn entries_for<'a, I>(translated: I) -> Vec<IndexEntry>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut links: BTreeMap<String, String> = BTreeMap::new();
    for (language, path) in translated {
        let root = format!("{}/{}/", TRANSLATIONS_ROOT, language);
        let is_readme = path
            .strip_prefix(&root)
            .is_some_and(|rest| rest.eq_ignore_ascii_case("README.md") || rest.eq_ignore_ascii_case("README.mdx"));
        let link = links.entry(language.to_string()).or_insert_with(|| root.clone());
        if is_readme {
            *link = path.to_string();
        }
    }
    links
        .into_iter()
        .map(|(language, link)| IndexEntry { language, link })
        .collect()
}

fn block_bounds(document: &str) -> Option<(usize, usize)> {
    let start = document.find(INDEX_START_MARKER)?;
    let end = document[start..].find(INDEX_END_MARKER)? + start + INDEX_END_MARKER.len();
    Some((start, end))
}

fn render_block(rows: &BTreeMap<String, String>) -> String {
    let mut block = format!(
        "{}\n## Translations\n\n| Language | Code | Documentation |\n|---|---|---|\n",
        INDEX_START_MARKER
    );
    for (language, link) in rows {
        block.push_str(&format!(
            "| {} | `{}` | [View]({}) |\n",
            get_language_name(language),
            language,
            link
        ));
    }
    block.push_str(INDEX_END_MARKER);
    block
}

/// Insert or refresh the translation table in `existing`
pub fn update_index(existing: &str, entries: &[IndexEntry]) -> String {
    let mut rows: BTreeMap<String, String> = BTreeMap::new();

    if let Some((start, end)) = block_bounds(existing) {
        for caps in ROW_LINK.captures_iter(&existing[start..end]) {
            rows.insert(caps[2].to_string(), caps[1].to_string());
        }
    }
    for entry in entries {
        rows.insert(entry.language.clone(), entry.link.clone());
    }

    let block = render_block(&rows);
    match block_bounds(existing) {
        Some((start, end)) => format!("{}{}{}", &existing[..start], block, &existing[end..]),
        None if existing.trim().is_empty() => format!("{}\n", block),
        None => format!("{}\n\n{}\n", existing.trim_end(), block),
    }
}
