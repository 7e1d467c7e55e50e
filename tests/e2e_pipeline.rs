//! End-to-end tests for run lifecycle: cancellation, failure states, the
//! JSON report and re-importing an exported tree.

use std::fs;

use clb_normalizer::export::export_text_tree;
use clb_normalizer::{
    CancelFlag, Error, ImportContext, Issue, MemoryStore, NormalizationReport, Normalizer, NormalizerConfig,
    NormalizerState,
};
use pretty_assertions::assert_eq;

const TREE: &str = "\
Plantae [kingdom]
  Pinaceae [family]
    Abies Mill. [genus]
      Abies alba Mill. [species]
        $Pinus picea L. [species]
        *Abies pectinata DC. [species]
    Picea A.Dietr. [genus]
";

fn tree_dir(text: &str) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("tree.txtree"), text).unwrap();
    tmp
}

// ============================================================================
// 1. Cancellation and failures
// ============================================================================

#[tokio::test]
async fn test_cancelled_run_reports_state_and_closes_store() {
    let tmp = tree_dir(TREE);
    let cancel = CancelFlag::new();
    cancel.cancel();
    let ctx = ImportContext::new(42, 3).with_cancel_flag(cancel);
    let normalizer = Normalizer::new(MemoryStore::new(), tmp.path(), ctx, NormalizerConfig::default());
    assert_eq!(normalizer.state(), NormalizerState::Parsing);

    let err = normalizer.run().await.unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!((err.dataset_key, err.attempt, err.state), (42, 3, NormalizerState::Parsing));
    assert!(err.to_string().contains("dataset 42 attempt 3"));
}

#[tokio::test]
async fn test_corrupt_zip_fails_while_parsing() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("broken.zip");
    // zip magic followed by garbage
    fs::write(&path, b"PK\x03\x04not really a zip").unwrap();
    let err = Normalizer::new(MemoryStore::new(), &path, ImportContext::new(1, 1), NormalizerConfig::default())
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.state, NormalizerState::Parsing);
    assert!(matches!(err.source, Error::Zip(_) | Error::CorruptArchive(_)));
}

// ============================================================================
// 2. Report
// ============================================================================

#[tokio::test]
async fn test_report_round_trips_through_json() {
    let tmp = tree_dir(TREE);
    let (_, report) = Normalizer::new(MemoryStore::new(), tmp.path(), ImportContext::new(9, 1), NormalizerConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.insert.usages, 7);
    assert_eq!(report.relationships.parent_of, 4);
    assert_eq!(report.relationships.synonym_of, 2);
    assert_eq!(report.relationships.has_basionym, 1);
    assert!(report.validation.valid);
    assert!(report.finished >= report.started);

    let json = report.to_json().unwrap();
    assert!(json.contains("\"format\": \"text_tree\""));
    let back: NormalizationReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

#[tokio::test]
async fn test_issue_counts_are_keyed_by_issue_name() {
    let tmp = tree_dir("Plantae [kingdom]\n  Abies [nonsense]\n  *Pinus picea L. [species]\n");
    let (_, report) = Normalizer::new(MemoryStore::new(), tmp.path(), ImportContext::new(9, 1), NormalizerConfig::default())
        .run()
        .await
        .unwrap();
    assert_eq!(report.issue_count(Issue::RankInvalid), 1);
    assert_eq!(report.issue_count(Issue::AcceptedNameMissing), 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["issues"]["ACCEPTED_NAME_MISSING"], 1);
}

// ============================================================================
// 3. Export and re-import
// ============================================================================

#[tokio::test]
async fn test_exported_tree_reimports_to_the_same_tree() {
    let tmp = tree_dir(TREE);
    let (store, _) = Normalizer::new(MemoryStore::new(), tmp.path(), ImportContext::new(1, 1), NormalizerConfig::default())
        .run()
        .await
        .unwrap();
    let mut first = Vec::new();
    let lines = export_text_tree(&store, &mut first, &CancelFlag::new()).await.unwrap();
    assert_eq!(lines, 7);
    let first = String::from_utf8(first).unwrap();
    assert!(first.contains("        $Pinus picea L. [species]"));

    let again = tree_dir(&first);
    let (store, report) =
        Normalizer::new(MemoryStore::new(), again.path(), ImportContext::new(1, 2), NormalizerConfig::default())
            .run()
            .await
            .unwrap();
    assert!(report.validation.valid);
    let mut second = Vec::new();
    export_text_tree(&store, &mut second, &CancelFlag::new()).await.unwrap();
    assert_eq!(String::from_utf8(second).unwrap(), first);
}
