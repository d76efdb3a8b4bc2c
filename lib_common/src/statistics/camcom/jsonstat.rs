//! # JSON-stat Dataset Model
//!
//! Strongly-typed representation of a JSON-stat 2.0 `dataset` response.
//! JSON-stat disseminates statistical tables as a set of labeled dimensions
//! (`id`/`size`), per-dimension category maps and a single flat `value`
//! array laid out in row-major order over the dimension sizes.
//!
//! The wire format has two notorious degrees of freedom this model absorbs:
//! - `category.index` is either a code→position map or an ordered code
//!   array;
//! - `value` is either a dense array (with nulls for missing cells) or a
//!   sparse position→value map.
//!
//! [`JsonStatDataset::parse`] validates the structural invariants once, so
//! downstream flattening can walk the cross-product without re-checking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonStatError {
    #[error("payload is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("payload does not match the JSON-stat dataset schema: {0}")]
    Schema(String),

    #[error("`id` lists {ids} dimensions but `size` lists {sizes}")]
    DimensionCountMismatch { ids: usize, sizes: usize },

    #[error("dimension `{0}` is declared in `id` but missing from the dimension map")]
    MissingDimension(String),

    #[error("dimension `{dimension}` has {categories} categories but `size` declares {declared}")]
    CategoryCountMismatch {
        dimension: String,
        categories: usize,
        declared: usize,
    },

    #[error("category index of dimension `{dimension}` is not a permutation of 0..{size}")]
    BadCategoryIndex { dimension: String, size: usize },

    #[error("dense `value` array has {actual} entries, expected {expected}")]
    ValueLengthMismatch { actual: usize, expected: usize },
}

/// Top-level JSON-stat 2.0 dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonStatDataset {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Dimension names, in the order the `value` array iterates them.
    pub id: Vec<String>,
    /// Category count per dimension, aligned with `id`.
    pub size: Vec<usize>,
    pub dimension: HashMap<String, Dimension>,
    pub value: Values,
}

/// A single dimension: an optional display label plus its category set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    #[serde(default)]
    pub label: Option<String>,
    pub category: Category,
}

/// Category codes and display labels of one dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub index: Option<CategoryIndex>,
    #[serde(default)]
    pub label: Option<HashMap<String, String>>,
}

/// `category.index` in its two wire shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryIndex {
    /// Code → zero-based position.
    Positions(HashMap<String, usize>),
    /// Codes already in position order.
    Ordered(Vec<String>),
}

/// `value` in its two wire shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    /// One entry per cell of the cross-product; `null` marks missing data.
    Dense(Vec<Option<f64>>),
    /// Stringified position → value; absent positions are missing data.
    Sparse(HashMap<String, f64>),
}

impl Values {
    /// The value at linear position `pos`, if present.
    pub fn get(&self, pos: usize) -> Option<f64> {
        match self {
            Values::Dense(values) => values.get(pos).copied().flatten(),
            Values::Sparse(map) => map.get(&pos.to_string()).copied(),
        }
    }
}

impl Category {
    /// Returns the category codes in position order.
    ///
    /// When `index` is absent the dimension must be single-category with
    /// its only code carried by `label` (a shape JSON-stat allows for
    /// constant dimensions).
    pub fn ordered_codes(&self, dimension: &str, size: usize) -> Result<Vec<String>, JsonStatError> {
        match &self.index {
            Some(CategoryIndex::Ordered(codes)) => {
                if codes.len() != size {
                    return Err(JsonStatError::CategoryCountMismatch {
                        dimension: dimension.to_string(),
                        categories: codes.len(),
                        declared: size,
                    });
                }
                Ok(codes.clone())
            }
            Some(CategoryIndex::Positions(positions)) => {
                if positions.len() != size {
                    return Err(JsonStatError::CategoryCountMismatch {
                        dimension: dimension.to_string(),
                        categories: positions.len(),
                        declared: size,
                    });
                }
                let mut ordered: Vec<Option<&String>> = vec![None; size];
                for (code, &pos) in positions {
                    if pos >= size || ordered[pos].is_some() {
                        return Err(JsonStatError::BadCategoryIndex {
                            dimension: dimension.to_string(),
                            size,
                        });
                    }
                    ordered[pos] = Some(code);
                }
                // Every slot is filled: len == size and positions are unique.
                Ok(ordered.into_iter().map(|c| c.unwrap().clone()).collect())
            }
            None => {
                let label = self.label.as_ref().filter(|l| l.len() == 1 && size == 1);
                match label {
                    Some(l) => Ok(l.keys().cloned().collect()),
                    None => Err(JsonStatError::CategoryCountMismatch {
                        dimension: dimension.to_string(),
                        categories: self.label.as_ref().map_or(0, |l| l.len()),
                        declared: size,
                    }),
                }
            }
        }
    }

    /// Display label for `code`, falling back to the code itself.
    pub fn display_label<'a>(&'a self, code: &'a str) -> &'a str {
        self.label
            .as_ref()
            .and_then(|labels| labels.get(code))
            .map(String::as_str)
            .unwrap_or(code)
    }
}

/// One cell of the flattened cross-product: the category code per
/// dimension (in `id` order) and the cell value, if present.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub categories: Vec<String>,
    pub value: Option<f64>,
}

impl JsonStatDataset {
    /// Parses and validates a raw JSON-stat payload.
    pub fn parse(bytes: &[u8]) -> Result<Self, JsonStatError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let dataset: JsonStatDataset =
            serde_json::from_value(value).map_err(|e| JsonStatError::Schema(e.to_string()))?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// Structural invariants: aligned `id`/`size`, every declared dimension
    /// present with a consistent category set, dense values covering the
    /// whole cross-product.
    fn validate(&self) -> Result<(), JsonStatError> {
        if let Some(class) = &self.class {
            if class != "dataset" {
                return Err(JsonStatError::Schema(format!(
                    "unsupported class `{class}`, expected `dataset`"
                )));
            }
        }
        if self.id.is_empty() {
            return Err(JsonStatError::Schema("dataset declares no dimensions".to_string()));
        }
        if self.id.len() != self.size.len() {
            return Err(JsonStatError::DimensionCountMismatch {
                ids: self.id.len(),
                sizes: self.size.len(),
            });
        }
        for (name, &size) in self.id.iter().zip(&self.size) {
            let dim = self
                .dimension
                .get(name)
                .ok_or_else(|| JsonStatError::MissingDimension(name.clone()))?;
            dim.category.ordered_codes(name, size)?;
        }
        if let Values::Dense(values) = &self.value {
            let expected: usize = self.size.iter().product();
            if values.len() != expected {
                return Err(JsonStatError::ValueLengthMismatch {
                    actual: values.len(),
                    expected,
                });
            }
        }
        Ok(())
    }

    /// Zero-based position of `name` within the `id` array.
    pub fn dimension_position(&self, name: &str) -> Option<usize> {
        self.id.iter().position(|d| d == name)
    }

    /// Category codes of `name`, in position order.
    pub fn category_codes(&self, name: &str) -> Result<Vec<String>, JsonStatError> {
        let pos = self
            .dimension_position(name)
            .ok_or_else(|| JsonStatError::MissingDimension(name.to_string()))?;
        self.dimension[name].category.ordered_codes(name, self.size[pos])
    }

    /// Walks the row-major cross-product of the declared dimension sizes,
    /// yielding one [`Observation`] per cell.
    ///
    /// The flattening is bounded by the dataset's own sizes; a dataset with
    /// an empty dimension yields no observations.
    pub fn observations(&self) -> Result<Vec<Observation>, JsonStatError> {
        let dims = self.id.len();
        let mut codes: Vec<Vec<String>> = Vec::with_capacity(dims);
        for (name, &size) in self.id.iter().zip(&self.size) {
            codes.push(self.dimension[name].category.ordered_codes(name, size)?);
        }

        let total: usize = self.size.iter().product();
        if self.size.iter().any(|&s| s == 0) {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(total);
        for pos in 0..total {
            let mut rem = pos;
            let mut categories = vec![String::new(); dims];
            for k in (0..dims).rev() {
                let size = self.size[k];
                categories[k] = codes[k][rem % size].clone();
                rem /= size;
            }
            out.push(Observation {
                categories,
                value: self.value.get(pos),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Vec<u8> {
        json!({
            "version": "2.0",
            "class": "dataset",
            "label": "Imprese attive",
            "id": ["tempo", "settore_ateco"],
            "size": [2, 3],
            "dimension": {
                "tempo": {
                    "label": "Periodo",
                    "category": {
                        "index": {"2020-12-31": 0, "2021-12-31": 1},
                        "label": {"2020-12-31": "Anno 2020", "2021-12-31": "Anno 2021"}
                    }
                },
                "settore_ateco": {
                    "label": "Settore",
                    "category": {
                        "index": ["A", "C", "F"]
                    }
                }
            },
            "value": [10.0, 20.0, null, 11.0, 22.0, 33.0]
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn parses_and_flattens_dense_dataset() {
        let dataset = JsonStatDataset::parse(&sample_payload()).unwrap();
        let obs = dataset.observations().unwrap();
        assert_eq!(obs.len(), 6);

        // Row-major: tempo varies slowest, settore fastest.
        assert_eq!(obs[0].categories, vec!["2020-12-31", "A"]);
        assert_eq!(obs[0].value, Some(10.0));
        assert_eq!(obs[2].categories, vec!["2020-12-31", "F"]);
        assert_eq!(obs[2].value, None);
        assert_eq!(obs[5].categories, vec!["2021-12-31", "F"]);
        assert_eq!(obs[5].value, Some(33.0));
    }

    #[test]
    fn sparse_values_resolve_by_position() {
        let payload = json!({
            "class": "dataset",
            "id": ["tempo"],
            "size": [3],
            "dimension": {
                "tempo": {"category": {"index": ["2019", "2020", "2021"]}}
            },
            "value": {"0": 5.0, "2": 7.0}
        })
        .to_string()
        .into_bytes();

        let dataset = JsonStatDataset::parse(&payload).unwrap();
        let obs = dataset.observations().unwrap();
        assert_eq!(obs[0].value, Some(5.0));
        assert_eq!(obs[1].value, None);
        assert_eq!(obs[2].value, Some(7.0));
    }

    #[test]
    fn category_map_index_is_ordered_by_position() {
        let dataset = JsonStatDataset::parse(&sample_payload()).unwrap();
        assert_eq!(
            dataset.category_codes("tempo").unwrap(),
            vec!["2020-12-31", "2021-12-31"]
        );
    }

    #[test]
    fn dense_value_length_is_checked() {
        let payload = json!({
            "class": "dataset",
            "id": ["tempo"],
            "size": [2],
            "dimension": {"tempo": {"category": {"index": ["2020", "2021"]}}},
            "value": [1.0]
        })
        .to_string()
        .into_bytes();

        let err = JsonStatDataset::parse(&payload).unwrap_err();
        assert!(matches!(
            err,
            JsonStatError::ValueLengthMismatch { actual: 1, expected: 2 }
        ));
    }

    #[test]
    fn missing_dimension_entry_is_rejected() {
        let payload = json!({
            "class": "dataset",
            "id": ["tempo", "settore_ateco"],
            "size": [1, 1],
            "dimension": {"tempo": {"category": {"index": ["2020"]}}},
            "value": [1.0]
        })
        .to_string()
        .into_bytes();

        let err = JsonStatDataset::parse(&payload).unwrap_err();
        assert!(matches!(err, JsonStatError::MissingDimension(d) if d == "settore_ateco"));
    }

    #[test]
    fn non_dataset_class_is_rejected() {
        let payload = json!({
            "class": "collection",
            "id": ["tempo"],
            "size": [1],
            "dimension": {"tempo": {"category": {"index": ["2020"]}}},
            "value": [1.0]
        })
        .to_string()
        .into_bytes();

        assert!(matches!(
            JsonStatDataset::parse(&payload),
            Err(JsonStatError::Schema(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_syntax_error() {
        assert!(matches!(
            JsonStatDataset::parse(b"{not json"),
            Err(JsonStatError::Syntax(_))
        ));
    }

    #[test]
    fn display_label_falls_back_to_code() {
        let dataset = JsonStatDataset::parse(&sample_payload()).unwrap();
        let tempo = &dataset.dimension["tempo"].category;
        assert_eq!(tempo.display_label("2020-12-31"), "Anno 2020");
        let settore = &dataset.dimension["settore_ateco"].category;
        assert_eq!(settore.display_label("C"), "C");
    }
}
