//! Result assembly: outcomes → ordered page records plus failure reports.

use crate::output::{PageFailureReport, PageRecord, ParsedDocument};
use crate::pipeline::dispatch::ConversionOutcome;

/// Split outcomes into a [`ParsedDocument`] (successes, ascending by page)
/// and failure reports (ascending by page). Each record gets a fresh UUID.
pub fn assemble(
    outcomes: Vec<ConversionOutcome>,
    doc_id: &str,
) -> (ParsedDocument, Vec<PageFailureReport>) {
    let mut records = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome {
            ConversionOutcome::Success {
                page_number,
                markdown,
            } => records.push(PageRecord::new(page_number, doc_id, markdown)),
            ConversionOutcome::Failure {
                page_number,
                reason,
            } => failures.push(PageFailureReport {
                page_number,
                doc_id: doc_id.to_string(),
                reason,
            }),
        }
    }

    failures.sort_by_key(|f| f.page_number);
    (ParsedDocument::from_records(records), failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use std::collections::HashSet;

    fn ok(page_number: usize) -> ConversionOutcome {
        ConversionOutcome::Success {
            page_number,
            markdown: format!("page {page_number}"),
        }
    }

    fn failed(page_number: usize) -> ConversionOutcome {
        ConversionOutcome::Failure {
            page_number,
            reason: ConversionError::Rejected("unreadable scan".into()),
        }
    }

    #[test]
    fn failed_pages_are_omitted_and_order_restored() {
        let outcomes = vec![ok(4), failed(5), ok(1), failed(2), ok(3)];
        let (doc, failures) = assemble(outcomes, "doc-9");

        assert_eq!(doc.page_numbers(), vec![1, 3, 4]);
        assert_eq!(
            failures.iter().map(|f| f.page_number).collect::<Vec<_>>(),
            vec![2, 5]
        );
        assert!(failures.iter().all(|f| f.doc_id == "doc-9"));
        assert!(doc.records().iter().all(|r| r.metadata.doc_id == "doc-9"));
        assert_eq!(doc.records()[1].page_content, "page 3");
    }

    #[test]
    fn every_record_gets_a_distinct_id() {
        let (doc, _) = assemble((1..=20).map(ok).collect(), "d");
        let ids: HashSet<_> = doc.records().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 20);
    }

    #[test]
    fn all_failed_yields_an_empty_document() {
        let (doc, failures) = assemble(vec![failed(1), failed(2)], "d");
        assert!(doc.is_empty());
        assert_eq!(failures.len(), 2);
    }
}
