//! Result types: detected marks, split outcomes and inspection plans.

use crate::pipeline::plan::SplitMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One decoded machine-readable code and the page it was found on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mark {
    /// 0-indexed page, aligned with the rasterised page order.
    pub page: usize,
    /// Decoded payload.
    pub value: String,
}

impl Mark {
    pub fn new(page: usize, value: impl Into<String>) -> Self {
        Self {
            page,
            value: value.into(),
        }
    }

    /// True when the value equals the separator sentinel exactly.
    pub fn is_separator(&self, separator: &str) -> bool {
        self.value == separator
    }

    /// True when the value starts with the ASN prefix.
    pub fn is_asn(&self, prefix: &str) -> bool {
        self.value.starts_with(prefix)
    }
}

/// Why a document was left whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum NotSplitReason {
    /// Barcode scanning is switched off.
    Disabled,
    /// The MIME type is not one the engine handles.
    UnsupportedFormat { mime_type: String },
    /// The source is encrypted or protected; its pages could not be counted.
    UnreadableSource,
    /// Scanning finished but produced no split points.
    NoSplitPoints,
}

/// Final result of one [`crate::split::DocumentSplitter::split`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SplitOutcome {
    /// The document was cut; `documents` lists the placed files in segment order.
    Split { documents: Vec<PathBuf> },
    /// The document should go through the regular single-document path.
    NotSplit(NotSplitReason),
}

impl SplitOutcome {
    /// `true` when at least one segment was produced and placed.
    pub fn did_split(&self) -> bool {
        matches!(self, SplitOutcome::Split { documents } if !documents.is_empty())
    }

    /// Placed files, empty when the document was not split.
    pub fn documents(&self) -> &[PathBuf] {
        match self {
            SplitOutcome::Split { documents } => documents,
            SplitOutcome::NotSplit(_) => &[],
        }
    }
}

/// What a split would do, computed without cutting anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPlan {
    /// Pages in the (normalised) document.
    pub page_count: usize,
    /// Pages rendered and scanned.
    pub pages_scanned: usize,
    /// Every mark found, in page order.
    pub marks: Vec<Mark>,
    /// Page → keep flag derived from the marks.
    pub split_map: SplitMap,
    /// Source pages of every document a split would produce, in order.
    pub segments: Vec<Vec<usize>>,
    /// `Some` when the engine would leave the document whole.
    pub not_split: Option<NotSplitReason>,
}

/// Processing stage of one document, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Detecting,
    Deciding,
    Splitting,
    Placing,
    Done,
    NotSplit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_is_exact_match() {
        assert!(Mark::new(0, "PATCHT").is_separator("PATCHT"));
        assert!(!Mark::new(0, "PATCHT ").is_separator("PATCHT"));
        assert!(!Mark::new(0, "patcht").is_separator("PATCHT"));
    }

    #[test]
    fn asn_is_prefix_match() {
        assert!(Mark::new(1, "ASN00042").is_asn("ASN"));
        assert!(!Mark::new(1, "XASN00042").is_asn("ASN"));
        assert!(!Mark::new(1, "asn00042").is_asn("ASN"));
    }

    #[test]
    fn did_split_requires_documents() {
        let split = SplitOutcome::Split {
            documents: vec![PathBuf::from("a.pdf")],
        };
        assert!(split.did_split());
        assert_eq!(split.documents().len(), 1);

        assert!(!SplitOutcome::Split { documents: vec![] }.did_split());

        let whole = SplitOutcome::NotSplit(NotSplitReason::NoSplitPoints);
        assert!(!whole.did_split());
        assert!(whole.documents().is_empty());
    }

    #[test]
    fn outcome_serialises_tagged() {
        let json = serde_json::to_string(&SplitOutcome::NotSplit(NotSplitReason::UnsupportedFormat {
            mime_type: "text/plain".into(),
        }))
        .unwrap();
        assert!(json.contains("\"outcome\":\"not_split\""), "got: {json}");
        assert!(json.contains("\"reason\":\"unsupported_format\""), "got: {json}");
    }
}
