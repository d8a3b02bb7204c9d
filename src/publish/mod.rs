/*!
 * Publishing translations back to the repository.
 *
 * - `paths`: destination paths under `translations/{lang}/`
 * - `messages`: branch names, commit messages, pull request text
 * - `index`: the translation table in the index document
 * - `writer`: branch, file, index and pull request batch
 */

pub mod index;
pub mod messages;
pub mod paths;
pub mod writer;

pub use writer::{BatchCommitWriter, CommitOptions, CommitOutcome, CommitRequest, TranslatedFile};
