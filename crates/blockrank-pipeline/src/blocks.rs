use std::collections::BTreeMap;

use blockrank_core::{
    BackendAdapter, BackendHit, BlockConfig, Error, ExecutionContext, KeywordQuery, Result, ResultSet, SearchHit,
    VectorQuery, WeightedField,
};
use blockrank_fusion::{merge, FieldBoost, MergeSpec, MergeStrategy};
use serde_json::{Map, Value};
use tracing::debug;

pub const DEFAULT_SIZE: usize = 10;
pub const DEFAULT_OPERATOR: &str = "or";

/// Whether a block produces candidates or combines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    Generation,
    Combination,
}

/// A validated block, built from a [`BlockConfig`] by the registry.
#[derive(Debug, Clone)]
pub enum Block {
    KeywordSearch(KeywordSearchBlock),
    VectorSearch(VectorSearchBlock),
    Merge(MergeBlock),
    Rerank(RerankBlock),
}

impl Block {
    pub fn role(&self) -> BlockRole {
        match self {
            Self::KeywordSearch(_) | Self::VectorSearch(_) => BlockRole::Generation,
            Self::Merge(_) | Self::Rerank(_) => BlockRole::Combination,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::KeywordSearch(_) => "keyword_search",
            Self::VectorSearch(_) => "vector_search",
            Self::Merge(_) => "merge",
            Self::Rerank(_) => "rerank",
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::KeywordSearch(b) => &b.label,
            Self::VectorSearch(b) => &b.label,
            Self::Merge(b) => &b.label,
            Self::Rerank(b) => &b.label,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordSearchBlock {
    pub label: String,
    pub source_index: usize,
    pub fields: Vec<WeightedField>,
    pub operator: String,
    pub minimum_should_match: Option<Value>,
    pub fuzziness: Option<Value>,
    pub boost: f64,
    pub size: usize,
    pub index: Option<String>,
}

impl KeywordSearchBlock {
    pub fn from_config(config: &BlockConfig) -> Result<Block> {
        let params = Params::new(config);

        let raw_fields = params.required_array("fields")?;
        if raw_fields.is_empty() {
            return Err(params.invalid("fields", "must list at least one field"));
        }
        let mut fields = Vec::with_capacity(raw_fields.len());
        for raw in raw_fields {
            let spec = raw.as_str().ok_or_else(|| params.invalid("fields", "entries must be strings"))?;
            let field = WeightedField::parse(spec)
                .map_err(|e| Error::ConfigValidation(format!("block '{}': {}", params.label, inner_message(&e))))?;
            fields.push(field);
        }

        Ok(Block::KeywordSearch(Self {
            label: params.label.clone(),
            source_index: 0,
            fields,
            operator: params.optional_str("operator")?.unwrap_or(DEFAULT_OPERATOR).to_string(),
            minimum_should_match: params.string_or_integer("minimum_should_match", true)?,
            fuzziness: params.string_or_integer("fuzziness", false)?,
            boost: params.non_negative_number("boost")?.unwrap_or(1.0),
            size: params.positive_integer("size")?.unwrap_or(DEFAULT_SIZE),
            index: params.optional_str("index")?.map(str::to_string),
        }))
    }

    pub fn query(&self, ctx: &ExecutionContext) -> KeywordQuery {
        KeywordQuery {
            index: self.index.clone().or_else(|| ctx.index.clone()),
            fields: self.fields.clone(),
            operator: self.operator.clone(),
            minimum_should_match: self.minimum_should_match.clone(),
            fuzziness: self.fuzziness.clone(),
            boost: self.boost,
            size: self.size,
            query_text: ctx.query_text.clone(),
            filters: ctx.overrides.filters.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchBlock {
    pub label: String,
    pub source_index: usize,
    pub field: String,
    pub k: usize,
    pub num_candidates: usize,
    pub similarity: Option<String>,
    pub boost: f64,
    pub index: Option<String>,
}

impl VectorSearchBlock {
    pub fn from_config(config: &BlockConfig) -> Result<Block> {
        let params = Params::new(config);

        let field = params.required_str("field")?;
        if field.trim().is_empty() {
            return Err(params.invalid("field", "must not be empty"));
        }
        let k = params.positive_integer("k")?.ok_or_else(|| params.missing("k"))?;
        let num_candidates = params
            .positive_integer("num_candidates")?
            .ok_or_else(|| params.missing("num_candidates"))?;
        if num_candidates < k {
            return Err(params.invalid("num_candidates", &format!("{num_candidates} is smaller than k = {k}")));
        }

        Ok(Block::VectorSearch(Self {
            label: params.label.clone(),
            source_index: 0,
            field: field.to_string(),
            k,
            num_candidates,
            similarity: params.optional_str("similarity")?.map(str::to_string),
            boost: params.non_negative_number("boost")?.unwrap_or(1.0),
            index: params.optional_str("index")?.map(str::to_string),
        }))
    }

    /// Fails with `MissingQueryVector` when the request carries no vector.
    pub fn query(&self, ctx: &ExecutionContext) -> Result<VectorQuery> {
        let vector = ctx
            .query_vector
            .as_ref()
            .ok_or_else(|| Error::MissingQueryVector { block: self.label.clone() })?;
        Ok(VectorQuery {
            index: self.index.clone().or_else(|| ctx.index.clone()),
            field: self.field.clone(),
            k: self.k,
            num_candidates: self.num_candidates,
            similarity: self.similarity.clone(),
            boost: self.boost,
            query_vector: vector.clone(),
            filters: ctx.overrides.filters.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeBlock {
    pub label: String,
    pub spec: MergeSpec,
}

impl MergeBlock {
    pub fn from_config(config: &BlockConfig) -> Result<Block> {
        let params = Params::new(config);

        let tag = params.required_str("strategy")?;
        let mut strategy = MergeStrategy::from_tag(tag)
            .map_err(|e| Error::Merge(format!("block '{}': {}", params.label, inner_message(&e))))?;

        match &mut strategy {
            MergeStrategy::Rrf { k } => {
                if let Some(custom) = params.positive_number("k")? {
                    *k = custom;
                }
            }
            MergeStrategy::Weighted { weights } => *weights = params.source_weights()?,
            MergeStrategy::Concatenate | MergeStrategy::Interleave => {}
        }

        let mut spec = MergeSpec::new(strategy);
        if let Some(max) = params.positive_integer("max_results")? {
            spec = spec.with_max_results(max);
        }
        Ok(Block::Merge(Self { label: params.label.clone(), spec }))
    }

    pub fn combine(&self, sources: Vec<ResultSet>) -> ResultSet {
        merge(sources, &self.spec)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RerankBlock {
    pub label: String,
    pub boost: FieldBoost,
}

impl RerankBlock {
    pub fn from_config(config: &BlockConfig) -> Result<Block> {
        let params = Params::new(config);

        for opaque in ["function_score", "script_score"] {
            match params.get(opaque) {
                None => {}
                Some(Value::Object(_)) => {
                    debug!(block = %params.label, key = opaque, "ignoring backend-specific rerank options")
                }
                Some(_) => return Err(params.invalid(opaque, "must be an object")),
            }
        }

        let boost = FieldBoost {
            field: params.optional_str("boost_by_field")?.map(str::to_string),
            weight: params.number("weight")?.unwrap_or(1.0),
        };
        Ok(Block::Rerank(Self { label: params.label.clone(), boost }))
    }

    pub fn apply(&self, results: ResultSet) -> ResultSet {
        self.boost.apply(results)
    }
}

/// A candidate generation block as it sits inside a compiled stage.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationBlock {
    Keyword(KeywordSearchBlock),
    Vector(VectorSearchBlock),
}

impl GenerationBlock {
    pub fn label(&self) -> &str {
        match self {
            Self::Keyword(b) => &b.label,
            Self::Vector(b) => &b.label,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Keyword(_) => "keyword_search",
            Self::Vector(_) => "vector_search",
        }
    }

    pub fn source_index(&self) -> usize {
        match self {
            Self::Keyword(b) => b.source_index,
            Self::Vector(b) => b.source_index,
        }
    }

    pub fn needs_query_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    /// Issue the block's single backend call.
    pub async fn run(&self, backend: &dyn BackendAdapter, ctx: &ExecutionContext) -> Result<ResultSet> {
        match self {
            Self::Keyword(block) => {
                let query = block.query(ctx);
                let hits = backend.search_keyword(&query).await?;
                Ok(collect(hits, block.source_index, block.size))
            }
            Self::Vector(block) => {
                let query = block.query(ctx)?;
                let hits = backend.search_vector(&query).await?;
                Ok(collect(hits, block.source_index, block.k))
            }
        }
    }
}

fn collect(hits: Vec<BackendHit>, source_index: usize, limit: usize) -> ResultSet {
    let hits = hits.into_iter().map(|hit| SearchHit::from_backend(hit, source_index)).collect();
    let mut set = ResultSet::from_scored(hits);
    set.truncate(limit);
    set
}

fn inner_message(err: &Error) -> String {
    match err {
        Error::Merge(msg) | Error::ConfigValidation(msg) | Error::PipelineOrder(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// Typed accessors over a block's `config` object. Every failure is a
/// `ConfigValidation` error naming the block and key.
struct Params<'a> {
    label: String,
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    fn new(config: &'a BlockConfig) -> Self {
        Self { label: config.label().to_string(), map: &config.config }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&self, key: &str, reason: &str) -> Error {
        Error::ConfigValidation(format!("block '{}': '{key}' {reason}", self.label))
    }

    fn missing(&self, key: &str) -> Error {
        Error::ConfigValidation(format!("block '{}': missing required '{key}'", self.label))
    }

    fn required_str(&self, key: &str) -> Result<&'a str> {
        self.optional_str(key)?.ok_or_else(|| self.missing(key))
    }

    fn optional_str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(key, "must be a string")),
        }
    }

    fn required_array(&self, key: &str) -> Result<&'a Vec<Value>> {
        match self.get(key) {
            None => Err(self.missing(key)),
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(self.invalid(key, "must be an array")),
        }
    }

    fn number(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) if v.is_finite() => Ok(Some(v)),
                _ => Err(self.invalid(key, "must be a finite number")),
            },
            Some(_) => Err(self.invalid(key, "must be a number")),
        }
    }

    fn non_negative_number(&self, key: &str) -> Result<Option<f64>> {
        match self.number(key)? {
            Some(v) if v < 0.0 => Err(self.invalid(key, "must not be negative")),
            other => Ok(other),
        }
    }

    fn positive_number(&self, key: &str) -> Result<Option<f64>> {
        match self.number(key)? {
            Some(v) if v <= 0.0 => Err(self.invalid(key, "must be greater than zero")),
            other => Ok(other),
        }
    }

    fn positive_integer(&self, key: &str) -> Result<Option<usize>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match value.as_u64() {
                Some(n) if n > 0 => {
                    usize::try_from(n).map(Some).map_err(|_| self.invalid(key, "is too large"))
                }
                _ => Err(self.invalid(key, "must be an integer greater than zero")),
            },
        }
    }

    /// Opaque backend option: a string, or an integer (signed when allowed).
    fn string_or_integer(&self, key: &str, allow_negative: bool) -> Result<Option<Value>> {
        match self.get(key) {
            None => Ok(None),
            Some(v @ Value::String(_)) => Ok(Some(v.clone())),
            Some(v @ Value::Number(n)) if n.is_u64() || (allow_negative && n.is_i64()) => Ok(Some(v.clone())),
            Some(_) if allow_negative => Err(self.invalid(key, "must be a string or an integer")),
            Some(_) => Err(self.invalid(key, "must be a string or a non-negative integer")),
        }
    }

    fn source_weights(&self) -> Result<BTreeMap<usize, f64>> {
        let Some(raw) = self.get("weights") else {
            return Ok(BTreeMap::new());
        };
        let Value::Object(entries) = raw else {
            return Err(self.invalid("weights", "must be an object keyed by source index"));
        };
        let mut weights = BTreeMap::new();
        for (key, value) in entries {
            let source: usize = key
                .trim()
                .parse()
                .map_err(|_| self.invalid("weights", &format!("key '{key}' is not a source index")))?;
            let weight = value
                .as_f64()
                .filter(|w| w.is_finite())
                .ok_or_else(|| self.invalid("weights", &format!("weight for source {source} must be a number")))?;
            weights.insert(source, weight);
        }
        Ok(weights)
    }
}
