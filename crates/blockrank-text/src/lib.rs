//! blockrank-text
//!
//! Tantivy keyword index used by the local backend. `index` builds it from
//! documents, `search` answers keyword queries against it.
pub mod index;
pub mod search;
pub mod tantivy_utils;

pub use index::KeywordIndexer;
pub use search::KeywordIndex;
