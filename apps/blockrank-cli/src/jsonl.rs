use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};

use blockrank_core::Document;

/// Read one JSON object per line, taking each document's id from `id_field`.
/// Blank lines are skipped.
pub fn read_documents(path: &Path, id_field: &str) -> Result<Vec<Document>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut documents = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(&line).with_context(|| format!("{}:{}", path.display(), line_no + 1))?;
        documents.push(to_document(value, id_field).with_context(|| format!("{}:{}", path.display(), line_no + 1))?);
    }
    Ok(documents)
}

fn to_document(value: Value, id_field: &str) -> Result<Document> {
    let Value::Object(mut fields) = value else {
        bail!("expected a JSON object");
    };
    let id = match fields.remove(id_field) {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => bail!("'{id_field}' must be a string or number, got {other}"),
        None => return Err(anyhow!("missing '{id_field}'")),
    };
    Ok(Document { id, fields })
}

/// A query vector stored as a JSON array of numbers.
pub fn read_vector(path: &Path) -> Result<Vec<f32>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of numbers", path.display()))
}

/// `--filters` value: a JSON object of exact-match constraints.
pub fn parse_filters(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw).context("filters must be valid JSON")? {
        Value::Object(filters) => Ok(filters),
        other => bail!("filters must be a JSON object, got {other}"),
    }
}
