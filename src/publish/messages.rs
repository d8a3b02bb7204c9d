/*!
 * Branch names, commit messages and pull request text.
 */

use crate::language_utils::get_language_name;

/// Above this many languages, text shows a count instead of names
const NAMED_LANGUAGE_LIMIT: usize = 3;

/// `translation/fr-ja-1700000000000`, or `translation/5-langs-…` for many languages
pub fn branch_name(languages: &[String], timestamp_ms: i64) -> String {
    let suffix = if languages.len() <= NAMED_LANGUAGE_LIMIT {
        languages.join("-")
    } else {
        format!("{}-langs", languages.len())
    };
    format!("translation/{}-{}", suffix, timestamp_ms)
}

/// Name used when `branch` already exists
pub fn uniquify(branch: &str, timestamp_ms: i64) -> String {
    format!("{}-{}", branch, timestamp_ms)
}

fn language_list(languages: &[String]) -> String {
    if languages.len() <= NAMED_LANGUAGE_LIMIT {
        languages
            .iter()
            .map(|code| get_language_name(code))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        format!("{} languages", languages.len())
    }
}

pub fn commit_message(languages: &[String], file_count: usize, incremental: bool) -> String {
    let kind = if incremental { "Incremental" } else { "Full" };
    format!(
        "{} translation to {}\n\n- Translated {} markdown file(s)\n- Target languages: {}",
        kind,
        language_list(languages),
        file_count,
        languages.join(", ")
    )
}

/// Message for the index document update
pub fn index_commit_message(languages: &[String]) -> String {
    format!("Update translation index for {}", languages.join(", "))
}

pub fn pr_title(languages: &[String]) -> String {
    format!("Translation update ({})", languages.join(", "))
}

pub fn pr_body(languages: &[String], file_count: usize, incremental: bool, task_id: i64) -> String {
    let language_lines = languages
        .iter()
        .map(|code| format!("- {} (`{}`)", get_language_name(code), code))
        .collect::<Vec<_>>()
        .join("\n");
    let (scope, kind) = if incremental {
        ("incremental", "Incremental (changed files only)")
    } else {
        ("full", "Full (all files)")
    };

    format!(
        "## Translation Update

This PR contains {scope} translations for your documentation.

### Target Languages
{language_lines}

### Statistics
- **Files translated**: {file_count}
- **Translation type**: {kind}

### Review Notes
- All translations are stored in `translations/{{lang}}/` directory
- Original file structure is preserved
- Technical terms and code blocks are preserved unchanged

---
*Task ID: {task_id}*"
    )
}
