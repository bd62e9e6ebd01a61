//! Document extraction boundary.
//!
//! Turning an uploaded quote (PDF, spreadsheet, photo) into candidate lines is
//! somebody else's job: an OCR service, a parsing microservice, a person. The
//! workflow only needs the candidates, and it must keep going when extraction
//! fails: the submission is then reconciled against an empty list and flagged
//! for manual entry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Context as _;
use tracing::warn;

use quoteflow_reconciliation::CandidateItem;
use quoteflow_rfq::DocumentRef;

pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, document: &DocumentRef) -> anyhow::Result<Vec<CandidateItem>>;
}

impl<S> DocumentExtractor for Arc<S>
where
    S: DocumentExtractor + ?Sized,
{
    fn extract(&self, document: &DocumentRef) -> anyhow::Result<Vec<CandidateItem>> {
        (**self).extract(document)
    }
}

/// Extracts nothing. Every document goes to manual entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExtractor;

impl DocumentExtractor for NullExtractor {
    fn extract(&self, _document: &DocumentRef) -> anyhow::Result<Vec<CandidateItem>> {
        Ok(Vec::new())
    }
}

/// Serves candidates prepared ahead of time, keyed by document reference.
///
/// Used when extraction runs out of band and its results are handed in before
/// the supplier submits. Unknown documents are an extraction failure.
#[derive(Debug, Default)]
pub struct PreparedExtractor {
    prepared: RwLock<HashMap<String, Vec<CandidateItem>>>,
}

impl PreparedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepare(&self, document: &DocumentRef, candidates: Vec<CandidateItem>) {
        if let Ok(mut prepared) = self.prepared.write() {
            prepared.insert(document.0.clone(), candidates);
        }
    }
}

impl DocumentExtractor for PreparedExtractor {
    fn extract(&self, document: &DocumentRef) -> anyhow::Result<Vec<CandidateItem>> {
        let prepared = self
            .prepared
            .read()
            .map_err(|_| anyhow::anyhow!("prepared extraction store poisoned"))?;
        prepared
            .get(&document.0)
            .cloned()
            .with_context(|| format!("no extraction result for document {}", document.0))
    }
}

/// Run extraction, degrading to an empty candidate list on failure.
pub fn extract_or_empty(extractor: &dyn DocumentExtractor, document: &DocumentRef) -> Vec<CandidateItem> {
    match extractor.extract(document) {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(document = %document.0, error = %format!("{err:#}"), "document extraction failed; falling back to manual entry");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl DocumentExtractor for Broken {
        fn extract(&self, _document: &DocumentRef) -> anyhow::Result<Vec<CandidateItem>> {
            anyhow::bail!("ocr service unavailable")
        }
    }

    #[test]
    fn failures_degrade_to_no_candidates() {
        let doc = DocumentRef("uploads/quote-17.pdf".to_string());
        assert!(extract_or_empty(&Broken, &doc).is_empty());
        assert!(extract_or_empty(&NullExtractor, &doc).is_empty());
    }

    #[test]
    fn prepared_results_are_served_by_reference() {
        let doc = DocumentRef("uploads/quote-18.pdf".to_string());
        let extractor = PreparedExtractor::new();
        assert!(extractor.extract(&doc).is_err());

        extractor.prepare(&doc, vec![CandidateItem::named("Oak Side Table")]);
        let got = extract_or_empty(&extractor, &doc);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "Oak Side Table");
    }
}
