use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use genome::{PositionSet, VariantSet};

use crate::error::IngestError;

/// The per-contig position lists of the variant payload. The gap list is
/// keyed "-" on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSets {
    #[serde(rename = "A")]
    pub a: Vec<u32>,
    #[serde(rename = "C")]
    pub c: Vec<u32>,
    #[serde(rename = "G")]
    pub g: Vec<u32>,
    #[serde(rename = "T")]
    pub t: Vec<u32>,
    #[serde(rename = "N")]
    pub n: Vec<u32>,
    #[serde(rename = "-")]
    pub gap: Vec<u32>,
}

/// One sample's variant payload: positions per contig, plus free-form
/// annotations such as coverage metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantPayload {
    pub positions: BTreeMap<String, PayloadSets>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl VariantPayload {
    /// Read a payload from a JSON file, gzip-compressed or plain. The shape
    /// is checked strictly: every contig must carry exactly the six
    /// position lists.
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let open_err = |source| IngestError::Open { path: path.to_path_buf(), source };
        let file = File::open(path).map_err(open_err)?;

        let mut text = String::new();
        if path.extension().is_some_and(|ext| ext == "gz") {
            GzDecoder::new(BufReader::new(file)).read_to_string(&mut text).map_err(open_err)?;
        } else {
            BufReader::new(file).read_to_string(&mut text).map_err(open_err)?;
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|source| IngestError::Corrupted { path: path.to_path_buf(), source })?;
        check_shape(&raw).then_some(()).ok_or_else(|| IngestError::WrongShape(path.to_path_buf()))?;

        serde_json::from_value(raw)
            .map_err(|source| IngestError::Corrupted { path: path.to_path_buf(), source })
    }

    pub fn to_file(&self, path: &Path) -> Result<(), IngestError> {
        let open_err = |source| IngestError::Open { path: path.to_path_buf(), source };
        let file = File::create(path).map_err(open_err)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|source| IngestError::Corrupted { path: path.to_path_buf(), source })
    }

    /// Convert the raw position lists into validated per-contig variant
    /// sets.
    pub fn to_variant_sets(&self) -> Result<BTreeMap<String, VariantSet>, IngestError> {
        let mut sets = BTreeMap::new();
        for (contig, lists) in &self.positions {
            let variant = VariantSet::new(
                PositionSet::from_unsorted(lists.a.clone()),
                PositionSet::from_unsorted(lists.c.clone()),
                PositionSet::from_unsorted(lists.g.clone()),
                PositionSet::from_unsorted(lists.t.clone()),
                PositionSet::from_unsorted(lists.n.clone()),
                PositionSet::from_unsorted(lists.gap.clone()),
            )?;
            sets.insert(contig.clone(), variant);
        }
        Ok(sets)
    }

    /// The mean coverage recorded by the pipeline, when present.
    pub fn mean_coverage(&self) -> Result<f64, IngestError> {
        let text = self.annotations.get("coverageMetaData").ok_or(
            IngestError::MissingAnnotation { gate: "coverage", annotation: "coverageMetaData" },
        )?;
        annotation_field(text, "mean", "coverage")
    }

    /// The N-less N50 recorded by the pipeline, when present.
    pub fn nless_n50(&self) -> Result<f64, IngestError> {
        let text = self.annotations.get("nlessnessMetaData").ok_or(
            IngestError::MissingAnnotation { gate: "nlessness", annotation: "nlessnessMetaData" },
        )?;
        annotation_field(text, "n50", "nlessness")
    }
}

/// Annotations are comma-separated key=value lists, e.g. "mean=55.2,sd=3.1".
fn annotation_field(text: &str, field: &str, what: &'static str) -> Result<f64, IngestError> {
    text.split(',')
        .filter_map(|item| item.split_once('='))
        .find(|(key, _)| key.trim() == field)
        .and_then(|(_, value)| value.trim().parse().ok())
        .ok_or_else(|| IngestError::MalformedAnnotation { what, text: text.to_string() })
}

/// Every contig entry must hold exactly the keys -, A, C, G, N, T.
fn check_shape(raw: &Value) -> bool {
    let Some(positions) = raw.get("positions").and_then(Value::as_object) else {
        return false;
    };
    positions.values().all(|contig| {
        contig.as_object().is_some_and(|entry| {
            let mut keys: Vec<&str> = entry.keys().map(String::as_str).collect();
            keys.sort_unstable();
            keys == ["-", "A", "C", "G", "N", "T"]
        })
    })
}
