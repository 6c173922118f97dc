//! Bug references and the texts posted to bugs and pull requests.

pub mod comments;
mod title;

pub use title::parse_bug_id;
