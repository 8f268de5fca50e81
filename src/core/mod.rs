//! Vault-facing pieces: paths, document IDs, notes and the document source

pub mod docid;
pub mod frontmatter;
pub mod note;
pub mod paths;
pub mod source;
pub mod wikilink;
