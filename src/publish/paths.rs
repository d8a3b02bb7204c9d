/*!
 * Where translated files land in the repository.
 *
 * Every translation lives under `translations/{lang}/` mirroring the source
 * tree. Outside the base language, file names that are not plain ASCII are
 * mapped to English slugs through a small term table; names the table does
 * not know pass through unchanged.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Root directory for all translated output
pub const TRANSLATIONS_ROOT: &str = "translations";

/// Known Chinese document titles and their English slugs, checked in order
const TERM_TABLE: &[(&str, &str)] = &[
    ("安装指南", "installation-guide"),
    ("快速开始", "quick-start"),
    ("使用手册", "user-guide"),
    ("开发文档", "development-guide"),
    ("API 文档", "api-reference"),
    ("贡献指南", "contributing"),
    ("更新日志", "changelog"),
    ("许可证", "license"),
    ("常见问题", "faq"),
    ("配置说明", "configuration"),
    ("部署指南", "deployment-guide"),
    ("用户指南", "user-guide"),
    ("教程", "tutorial"),
    ("示例", "examples"),
    ("文档", "docs"),
    ("说明", "guide"),
];

static ASCII_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9._-]+\.mdx?$").expect("valid ASCII name pattern"));

static CHINESE_README: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(zh|cn)(\.mdx?)$").expect("valid README pattern"));

static LANGUAGE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(zh|en|ja|ko|es|fr|de)\.mdx?$").expect("valid suffix pattern")
});

/// `.md` or `.mdx`, with the original casing
fn extension(file_name: &str) -> &str {
    file_name
        .rfind('.')
        .map(|idx| &file_name[idx..])
        .unwrap_or(".md")
}

/// ASCII file name for a translated document
pub fn normalize_file_name(file_name: &str, base_language: &str) -> String {
    if ASCII_NAME.is_match(file_name) {
        return file_name.to_string();
    }

    if file_name.starts_with("README") {
        if let Some(caps) = CHINESE_README.captures(file_name) {
            return format!("README{}", &caps[2]);
        }
    }

    let ext = extension(file_name);
    let stem = &file_name[..file_name.len() - ext.len()];
    for (term, slug) in TERM_TABLE {
        if stem.contains(term) {
            let suffix = LANGUAGE_SUFFIX
                .captures(file_name)
                .map(|caps| caps[1].to_lowercase())
                .filter(|suffix| suffix != base_language);
            return match suffix {
                Some(suffix) => format!("{}.{}{}", slug, suffix, ext),
                None => format!("{}{}", slug, ext),
            };
        }
    }

    file_name.to_string()
}

/// Destination path of `original_path` translated into `language`
pub fn translated_path(original_path: &str, language: &str, base_language: &str) -> String {
    let trimmed = original_path.trim_matches('/');
    let (dir, file_name) = match trimmed.rsplit_once('/') {
        Some((dir, file_name)) => (Some(dir), file_name),
        None => (None, trimmed),
    };
    let file_name = if file_name.is_empty() { "README.md" } else { file_name };

    let file_name = if language == base_language {
        file_name.to_string()
    } else {
        normalize_file_name(file_name, base_language)
    };

    match dir {
        Some(dir) => format!("{}/{}/{}/{}", TRANSLATIONS_ROOT, language, dir, file_name),
        None => format!("{}/{}/{}", TRANSLATIONS_ROOT, language, file_name),
    }
}
