use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, BoostQuery, DisjunctionMaxQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value as _};
use tantivy::{Index, IndexReader, TantivyDocument, Term};
use tracing::debug;

use blockrank_core::{apply_boost, matches_filters, BackendHit, KeywordQuery, WeightedField};

use crate::tantivy_utils::{analyze, register_tokenizer, text_fields, ID_FIELD, SOURCE_FIELD};

const MAX_FUZZY_DISTANCE: u8 = 2;

pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    id_field: Field,
    source_field: Field,
    fields: HashMap<String, Field>,
}

impl KeywordIndex {
    pub fn open(index_dir: &Path) -> Result<Self> {
        Self::from_index(Index::open_in_dir(index_dir)?)
    }

    pub(crate) fn from_index(index: Index) -> Result<Self> {
        register_tokenizer(&index);
        let schema = index.schema();
        let id_field = schema.get_field(ID_FIELD)?;
        let source_field = schema.get_field(SOURCE_FIELD)?;
        let fields = text_fields(&schema).into_iter().collect();
        let reader = index.reader()?;
        Ok(Self { index, reader, id_field, source_field, fields })
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Best-first hits for `query`, scaled by its boost and cut to its size.
    pub fn search(&self, query: &KeywordQuery) -> Result<Vec<BackendHit>> {
        let terms = analyze(&self.index, &query.query_text)?;
        if terms.is_empty() || query.size == 0 {
            return Ok(Vec::new());
        }
        let compiled = self.build_query(query, &terms)?;

        let searcher = self.reader.searcher();
        let limit = match &query.filters {
            Some(filters) if !filters.is_empty() => (searcher.num_docs() as usize).max(query.size),
            _ => query.size,
        };
        let top_docs = searcher.search(compiled.as_ref(), &TopDocs::with_limit(limit.max(1)))?;

        let mut hits = Vec::with_capacity(query.size);
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("indexed document without {ID_FIELD}"))?;
            let source: Map<String, Value> = match doc.get_first(self.source_field).and_then(|v| v.as_str()) {
                Some(raw) => serde_json::from_str(raw)?,
                None => Map::new(),
            };
            if let Some(filters) = &query.filters {
                if !matches_filters(&source, filters) {
                    continue;
                }
            }
            let mut hit = BackendHit::new(id, f64::from(score));
            hit.source_fields = source;
            hit.index = query.index.clone();
            hits.push(hit);
            if hits.len() == query.size {
                break;
            }
        }
        apply_boost(&mut hits, query.boost);
        debug!(terms = terms.len(), hits = hits.len(), "keyword search");
        Ok(hits)
    }

    fn build_query(&self, query: &KeywordQuery, terms: &[String]) -> Result<Box<dyn Query>> {
        let fields: Vec<(Field, f32)> = query
            .fields
            .iter()
            .filter_map(|WeightedField { name, boost }| match self.fields.get(name) {
                Some(field) => Some((*field, *boost as f32)),
                None => {
                    debug!(field = %name, "field is not indexed; skipping");
                    None
                }
            })
            .collect();
        if fields.is_empty() {
            bail!("none of the requested fields are indexed");
        }
        let distance = fuzzy_distance(query.fuzziness.as_ref())?;

        // one clause per query term, each matching the term in any field
        let clauses: Vec<Box<dyn Query>> = terms
            .iter()
            .map(|text| {
                let mut per_field: Vec<Box<dyn Query>> = fields
                    .iter()
                    .map(|(field, boost)| {
                        let term = Term::from_field_text(*field, text);
                        let leaf: Box<dyn Query> = match distance {
                            0 => Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)),
                            d => Box::new(FuzzyTermQuery::new(term, d, true)),
                        };
                        if *boost == 1.0 {
                            leaf
                        } else {
                            Box::new(BoostQuery::new(leaf, *boost)) as Box<dyn Query>
                        }
                    })
                    .collect();
                if per_field.len() == 1 {
                    per_field.remove(0)
                } else {
                    Box::new(DisjunctionMaxQuery::new(per_field)) as Box<dyn Query>
                }
            })
            .collect();

        let total = clauses.len();
        if query.operator.eq_ignore_ascii_case("and") {
            let must = clauses.into_iter().map(|q| (Occur::Must, q)).collect();
            return Ok(Box::new(BooleanQuery::new(must)));
        }
        let required = minimum_should_match(query.minimum_should_match.as_ref(), total)?;
        let should = clauses.into_iter().map(|q| (Occur::Should, q)).collect();
        Ok(Box::new(BooleanQuery::with_minimum_required_clauses(should, required)))
    }
}

/// `AUTO` maps to one edit; explicit distances are capped at two.
fn fuzzy_distance(fuzziness: Option<&Value>) -> Result<u8> {
    let distance = match fuzziness {
        None => 0,
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| anyhow!("fuzziness must be a non-negative integer"))?,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("auto") || s.to_ascii_lowercase().starts_with("auto:") => 1,
        Some(Value::String(s)) => s.trim().parse().map_err(|_| anyhow!("unsupported fuzziness '{s}'"))?,
        Some(other) => bail!("unsupported fuzziness {other}"),
    };
    Ok(distance.min(u64::from(MAX_FUZZY_DISTANCE)) as u8)
}

/// Number of optional clauses that must match: `n`, `-n`, `p%`, or `-p%` of
/// `total`, clamped to `1..=total`.
fn minimum_should_match(spec: Option<&Value>, total: usize) -> Result<usize> {
    let raw = match spec {
        None => return Ok(1.min(total)),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => bail!("unsupported minimum_should_match {other}"),
    };
    let (negative, body) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.as_str()),
    };
    let amount = match body.strip_suffix('%') {
        Some(pct) => {
            let pct: f64 = pct.trim().parse().map_err(|_| anyhow!("invalid minimum_should_match '{raw}'"))?;
            (total as f64 * pct.clamp(0.0, 100.0) / 100.0).floor() as usize
        }
        None => body.parse::<usize>().map_err(|_| anyhow!("invalid minimum_should_match '{raw}'"))?,
    };
    let required = if negative { total.saturating_sub(amount) } else { amount };
    Ok(required.clamp(1.min(total), total))
}
