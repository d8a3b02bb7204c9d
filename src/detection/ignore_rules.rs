/*!
 * Glob-style ignore rules.
 *
 * Rules are newline separated; blank lines and lines starting with `#` are
 * skipped. In a pattern `*` matches within one path segment, `**` matches
 * across segments (a leading `**` followed by a slash also matches zero
 * segments) and every other character is literal. A pattern must match
 * the whole path.
 */

use log::warn;
use regex::Regex;

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    regex: Regex,
}

/// Compiled set of ignore patterns
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    rules: Vec<Rule>,
}

impl IgnoreRules {
    /// Compile a rule text; `None` or blank text ignores nothing
    pub fn parse(text: Option<&str>) -> Self {
        let rules = text
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|pattern| match Regex::new(&glob_to_regex(pattern)) {
                Ok(regex) => Some(Rule {
                    pattern: pattern.to_string(),
                    regex,
                }),
                Err(e) => {
                    warn!("Ignoring invalid ignore rule '{}': {}", pattern, e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.pattern.as_str())
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.regex.is_match(path))
    }

    /// Keep only the items whose path no rule matches
    pub fn retain<T, F>(&self, items: Vec<T>, path_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        if self.is_empty() {
            return items;
        }
        items
            .into_iter()
            .filter(|item| !self.is_ignored(path_of(item)))
            .collect()
    }
}

/// Translate one glob pattern into an anchored regular expression
pub fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '*' {
            if chars.get(i + 1) == Some(&'*') {
                let at_segment_start = i == 0 || chars[i - 1] == '/';
                if at_segment_start && chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            } else {
                out.push_str("[^/]*");
                i += 1;
            }
        } else {
            out.push_str(&regex::escape(&c.to_string()));
            i += 1;
        }
    }

    out.push('$');
    out
}
