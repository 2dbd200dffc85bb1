//! End-to-end run of the built-in step graph over a real work
//! directory: ingestion with sidecar provenance, classification, email
//! and URL extraction, seed-based entity matching, and terminal
//! metadata assembly.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use pipeline::{
    ingest_document,
    steps::{
        AssembleMetadataStep, ClassifyStep, ExtractEmailMetadataStep, ExtractEntitiesStep,
        ExtractUrlsStep,
    },
    DocumentStatus, EntityKind, EntitySeed, FsManifestStore, ManifestStore, RunOutcome, Runner,
    SeedEntity, StepRegistry, StepStatus, WorkDir,
};

const EMAIL_BODY: &str = "\
From: Jane Roe <jane@example.com>
To: Sam Park <sam@example.com>
Subject: Island travel plans
Sent: 3/14/2015

Sam - Jane Roe here. Acme Corp confirmed the booking.
Details at https://example.org/itinerary.pdf and https://youtu.be/abc123.
";

/// Write `entity_seed.json` into the work directory and load it back
/// the way a deployment would.
async fn install_seed(workdir: &WorkDir) -> Arc<EntitySeed> {
    let seed = EntitySeed {
        generated_at: Utc::now(),
        entities: vec![
            SeedEntity {
                name: "Jane Roe".into(),
                kind: EntityKind::Person,
                mention_count: 12,
                aliases: vec!["J. Roe".into()],
            },
            SeedEntity {
                name: "Acme Corp".into(),
                kind: EntityKind::Organization,
                mention_count: 4,
                aliases: vec![],
            },
        ],
    };
    tokio::fs::write(
        workdir.entity_seed_path(),
        serde_json::to_vec_pretty(&seed).unwrap(),
    )
    .await
    .unwrap();
    Arc::new(EntitySeed::load(&workdir.entity_seed_path()).await.unwrap())
}

fn full_registry(seed: Arc<EntitySeed>) -> StepRegistry {
    StepRegistry::builder()
        .register(ClassifyStep::new())
        .register(ExtractEmailMetadataStep::new())
        .register(ExtractUrlsStep::new())
        .register(ExtractEntitiesStep::new(seed))
        .register(AssembleMetadataStep::new())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_email_document_flows_to_completed_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = WorkDir::new(dir.path().join("corpus"));
    workdir.ensure_layout().await.unwrap();
    let store = Arc::new(FsManifestStore::open(workdir.manifests()).await.unwrap());

    // Arriving document plus provenance sidecar.
    let arrival = dir.path().join("HOUSE_2_0417.txt");
    tokio::fs::write(&arrival, EMAIL_BODY).await.unwrap();
    tokio::fs::write(
        dir.path().join("HOUSE_2_0417.meta.json"),
        br#"{"source": "HOUSE", "batch": "2", "batch_date": "2025-11-12"}"#,
    )
    .await
    .unwrap();

    let doc_id = ingest_document(&arrival, &workdir, store.as_ref())
        .await
        .unwrap();

    let seed = install_seed(&workdir).await;
    let runner = Runner::new(
        Arc::new(full_registry(seed)),
        Arc::clone(&store),
        workdir.clone(),
    );
    let (run_id, outcome) = runner.run_once().await.unwrap().unwrap();
    assert_eq!(run_id, doc_id);
    assert_eq!(outcome, RunOutcome::Completed);

    let manifest = store.load(&doc_id).await.unwrap();
    assert_eq!(manifest.status, DocumentStatus::Completed);
    assert_eq!(manifest.provenance.source.as_deref(), Some("HOUSE"));
    assert_eq!(manifest.step_count(), 5);

    // Every step ran for real; the email step applied.
    assert_eq!(
        manifest.step("extract_email_metadata").unwrap().status,
        StepStatus::Success
    );

    let metadata = manifest.metadata();
    assert_eq!(metadata["doc_type"], json!("email"));
    assert_eq!(metadata["subject"], json!("Island travel plans"));
    assert_eq!(metadata["urls_count"], json!(2));
    let persons = metadata["persons"].as_array().unwrap();
    assert!(persons.contains(&json!("Jane Roe")));
    assert!(persons.contains(&json!("Sam Park")));
    assert_eq!(metadata["organizations"], json!(["Acme Corp"]));

    let counts = workdir.status_counts().await.unwrap();
    assert_eq!(counts.completed, 1);
}

#[tokio::test]
async fn test_non_email_document_skips_email_step_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let workdir = WorkDir::new(dir.path().join("corpus"));
    workdir.ensure_layout().await.unwrap();
    let store = Arc::new(FsManifestStore::open(workdir.manifests()).await.unwrap());

    let arrival = dir.path().join("COURT_1_088.txt");
    tokio::fs::write(
        &arrival,
        "UNITED STATES DISTRICT COURT\nDoe v. Acme Corp, Case No. 1:23-cv-456\nPlaintiff alleges Jane Roe attended.\n",
    )
    .await
    .unwrap();

    let doc_id = ingest_document(&arrival, &workdir, store.as_ref())
        .await
        .unwrap();
    let seed = install_seed(&workdir).await;
    let runner = Runner::new(
        Arc::new(full_registry(seed)),
        Arc::clone(&store),
        workdir.clone(),
    );
    let (_, outcome) = runner.run_once().await.unwrap().unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let manifest = store.load(&doc_id).await.unwrap();
    assert_eq!(
        manifest.step("extract_email_metadata").unwrap().status,
        StepStatus::Skipped
    );
    // Dependents of the skipped step still ran to completion.
    assert_eq!(
        manifest.step("extract_entities").unwrap().status,
        StepStatus::Success
    );
    assert_eq!(manifest.metadata()["doc_type"], json!("legal"));
    assert!(!manifest.metadata().contains_key("subject"));
}
