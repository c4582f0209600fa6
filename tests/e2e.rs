//! Live end-to-end tests for the vision engine and GCS storage.
//!
//! These render pages with pdfium and call a real vision LLM, so they are
//! gated behind the `E2E_ENABLED` environment variable. The provider comes
//! from `EDGEQUAKE_LLM_PROVIDER` / `EDGEQUAKE_MODEL` or the usual API key
//! variables; pdfium from `PDFIUM_LIB_PATH` or the system library. The GCS
//! test also needs `GCS_TEST_BUCKET` and `GCS_ACCESS_TOKEN`.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use edgequake_pdfingest::{
    DocumentPipeline, GcsStore, IngestConfig, MemoryStore, ObjectStore, TextLayerConverter,
    VisionConfig, VisionConverter,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

macro_rules! e2e_skip_unless_enabled {
    () => {
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    };
}

/// Two pages with a heading line each.
fn write_pdf(path: &Path) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for line in ["Informe anual 2023", "Resultados por region"] {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 28.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let media_box: Vec<Object> = vec![0.into(), 0.into(), 612.into(), 792.into()];
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn vision_config() -> VisionConfig {
    let mut builder = VisionConfig::builder().languages(["es"]).max_retries(2);
    if let Ok(provider) = std::env::var("EDGEQUAKE_LLM_PROVIDER") {
        builder = builder.provider_name(provider);
    }
    if let Ok(model) = std::env::var("EDGEQUAKE_MODEL") {
        builder = builder.model(model);
    }
    if let Ok(lib) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_library(lib);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn vision_engine_transcribes_every_page() {
    e2e_skip_unless_enabled!();

    let dir = TempDir::new().unwrap();
    let source = dir.path().join("informe.pdf");
    write_pdf(&source);
    let scratch = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());

    let pipeline = DocumentPipeline::new(
        IngestConfig::builder()
            .concurrency(2)
            .scratch_dir(scratch.path())
            .build()
            .unwrap(),
        Arc::new(VisionConverter::new(vision_config())),
        store.clone(),
    );

    let report = pipeline
        .parse(&source.to_string_lossy(), "e2e-informe")
        .await
        .unwrap();
    println!("{}", serde_json::to_string_pretty(&report.stats).unwrap());

    assert!(report.failures.is_empty(), "failures: {:?}", report.failures);
    assert_eq!(report.document.page_numbers(), vec![1, 2]);
    for record in report.document.records() {
        let md = &record.page_content;
        println!("── page {} ──\n{md}", record.metadata.page_number);
        assert!(!md.trim().is_empty());
        assert!(!md.starts_with("```"), "page wrapped in a fence: {md:?}");
        assert!(!md.contains("\n\n\n"));
    }
    assert!(report.document.records()[0].page_content.contains("2023"));

    let stored: Vec<serde_json::Value> =
        serde_json::from_slice(&store.get("parsed/e2e-informe.json").unwrap()).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn gcs_store_accepts_an_upload() {
    e2e_skip_unless_enabled!();
    let (Ok(bucket), Ok(token)) = (
        std::env::var("GCS_TEST_BUCKET"),
        std::env::var("GCS_ACCESS_TOKEN"),
    ) else {
        println!("SKIP: set GCS_TEST_BUCKET and GCS_ACCESS_TOKEN");
        return;
    };

    let store = GcsStore::new(bucket, Some(token), 60).unwrap();
    store
        .put_json("parsed/e2e-probe.json", b"[]")
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let source = dir.path().join("informe.pdf");
    write_pdf(&source);
    let pipeline = DocumentPipeline::new(
        IngestConfig::builder().build().unwrap(),
        Arc::new(TextLayerConverter::new()),
        Arc::new(store),
    );
    let report = pipeline
        .parse(&source.to_string_lossy(), "e2e-text-layer")
        .await
        .unwrap();
    assert_eq!(report.persisted_key.as_deref(), Some("parsed/e2e-text-layer.json"));
}
