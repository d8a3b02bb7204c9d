/*!
 * Change detection: which Markdown files to translate for a run.
 */

pub mod change_detector;
pub mod ignore_rules;

pub use change_detector::{ChangeDetector, DetectionResult, is_markdown};
pub use ignore_rules::IgnoreRules;
