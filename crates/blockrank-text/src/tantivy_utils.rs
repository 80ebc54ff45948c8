use anyhow::{anyhow, Result};
use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};
use tantivy::Index;

pub const ID_FIELD: &str = "_id";
pub const SOURCE_FIELD: &str = "_source";
pub const TOKENIZER: &str = "text_with_stopwords";

/// `_id` (exact, stored), `_source` (stored JSON), and one analyzed field per
/// searchable text field.
pub fn build_schema(text_fields: &[String]) -> Result<Schema> {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(ID_FIELD, STRING | STORED);
    schema_builder.add_text_field(SOURCE_FIELD, STORED);
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default().set_indexing_options(indexing);
    for name in text_fields {
        if name.starts_with('_') {
            return Err(anyhow!("text field '{name}' collides with a reserved field"));
        }
        schema_builder.add_text_field(name, text_options.clone());
    }
    Ok(schema_builder.build())
}

pub fn register_tokenizer(index: &Index) {
    let stop_words = vec![
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of",
        "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them",
        "their", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom",
        "whose", "can", "could", "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have",
        "had", "having",
    ];
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
        .build();
    index.tokenizers().register(TOKENIZER, tokenizer);
}

/// Run `text` through the index analyzer, keeping term order and duplicates out.
pub fn analyze(index: &Index, text: &str) -> Result<Vec<String>> {
    let mut analyzer = index
        .tokenizers()
        .get(TOKENIZER)
        .ok_or_else(|| anyhow!("tokenizer '{TOKENIZER}' is not registered"))?;
    let mut stream = analyzer.token_stream(text);
    let mut terms: Vec<String> = Vec::new();
    while stream.advance() {
        let term = &stream.token().text;
        if !terms.contains(term) {
            terms.push(term.clone());
        }
    }
    Ok(terms)
}

/// Indexed text fields of `schema`, in schema order.
pub fn text_fields(schema: &Schema) -> Vec<(String, Field)> {
    schema
        .fields()
        .filter(|(_, entry)| !entry.name().starts_with('_'))
        .map(|(field, entry)| (entry.name().to_string(), field))
        .collect()
}
