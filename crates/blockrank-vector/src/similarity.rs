use anyhow::{bail, Result};

/// Vector similarity, scored so that larger is always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Similarity {
    #[default]
    Cosine,
    DotProduct,
    MaxInnerProduct,
    L2Norm,
}

impl Similarity {
    pub fn parse(name: Option<&str>) -> Result<Self> {
        Ok(match name.map(str::to_ascii_lowercase).as_deref() {
            None | Some("cosine") => Self::Cosine,
            Some("dot_product") => Self::DotProduct,
            Some("max_inner_product") => Self::MaxInnerProduct,
            Some("l2_norm") => Self::L2Norm,
            Some(other) => bail!("unsupported similarity '{other}'"),
        })
    }

    /// `a` and `b` must have the same length.
    pub fn score(self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            Self::Cosine => {
                let (dot, na, nb) = a.iter().zip(b).fold((0.0, 0.0, 0.0), |(dot, na, nb), (&x, &y)| {
                    let (x, y) = (f64::from(x), f64::from(y));
                    (dot + x * y, na + x * x, nb + y * y)
                });
                let cosine = if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na.sqrt() * nb.sqrt()) };
                (1.0 + cosine) / 2.0
            }
            Self::DotProduct => (1.0 + dot(a, b)) / 2.0,
            Self::MaxInnerProduct => {
                let dot = dot(a, b);
                if dot < 0.0 {
                    1.0 / (1.0 - dot)
                } else {
                    dot + 1.0
                }
            }
            Self::L2Norm => {
                let squared: f64 = a.iter().zip(b).map(|(&x, &y)| (f64::from(x) - f64::from(y)).powi(2)).sum();
                1.0 / (1.0 + squared)
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum()
}
