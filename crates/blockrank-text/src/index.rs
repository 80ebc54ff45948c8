use std::path::Path;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tantivy::schema::Field;
use tantivy::{Index, IndexWriter, TantivyDocument};
use tracing::info;

use blockrank_core::Document;

use crate::search::KeywordIndex;
use crate::tantivy_utils::{build_schema, register_tokenizer, text_fields, ID_FIELD, SOURCE_FIELD};

const WRITER_HEAP_BYTES: usize = 50_000_000;

pub struct KeywordIndexer {
    index: Index,
    id_field: Field,
    source_field: Field,
    text_fields: Vec<(String, Field)>,
    show_progress: bool,
}

impl KeywordIndexer {
    /// Create a fresh on-disk index in `index_dir`, replacing any previous one.
    pub fn create(index_dir: &Path, fields: &[String]) -> Result<Self> {
        let schema = build_schema(fields)?;
        if index_dir.exists() {
            std::fs::remove_dir_all(index_dir)?;
        }
        std::fs::create_dir_all(index_dir)?;
        Self::from_index(Index::create_in_dir(index_dir, schema)?)
    }

    pub fn create_in_ram(fields: &[String]) -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema(fields)?))
    }

    fn from_index(index: Index) -> Result<Self> {
        register_tokenizer(&index);
        let schema = index.schema();
        let id_field = schema.get_field(ID_FIELD)?;
        let source_field = schema.get_field(SOURCE_FIELD)?;
        let text_fields = text_fields(&schema);
        Ok(Self { index, id_field, source_field, text_fields, show_progress: false })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Add `documents` and commit. Returns the number of documents written.
    pub fn index_documents(&self, documents: &[Document]) -> Result<usize> {
        let mut writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES)?;
        let pb = if self.show_progress { ProgressBar::new(documents.len() as u64) } else { ProgressBar::hidden() };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} docs ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );

        for document in documents {
            writer.add_document(self.to_tantivy(document)?)?;
            pb.inc(1);
        }
        writer.commit()?;
        pb.finish_with_message("keyword index committed");
        info!(documents = documents.len(), fields = self.text_fields.len(), "keyword index written");
        Ok(documents.len())
    }

    fn to_tantivy(&self, document: &Document) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::default();
        doc.add_text(self.id_field, &document.id);
        doc.add_text(self.source_field, serde_json::to_string(&document.fields)?);
        for (name, field) in &self.text_fields {
            match document.fields.get(name) {
                Some(Value::String(text)) => doc.add_text(*field, text),
                Some(Value::Array(items)) => {
                    for text in items.iter().filter_map(Value::as_str) {
                        doc.add_text(*field, text);
                    }
                }
                _ => {}
            }
        }
        Ok(doc)
    }

    /// Open the committed index for searching.
    pub fn into_search_index(self) -> Result<KeywordIndex> {
        KeywordIndex::from_index(self.index)
    }
}
