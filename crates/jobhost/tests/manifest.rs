// Integration tests for manifest-described modules on a file-backed registry

use assert_matches::assert_matches;
use jobhost::config::{HostConfig, StoreConfig};
use jobhost::{IndexError, Location, RunOutcome};
use tempfile::NamedTempFile;

const MANIFEST: &str = r#"
module: billing
types:
  - name: Billing.Jobs
    methods:
      - name: ProcessOrder
        markers: [job, "description=Charge one order"]
        parameters:
          - name: order
            type: { kind: object, name: Order }
            binding: { kind: queue, name: orders }
          - name: id
            type: { kind: text }
          - name: receipt
            type: { kind: bytes }
            direction: out
            binding: { kind: blob, path: "receipts/{id}" }
      - name: Broken
        markers: [job]
        parameters:
          - name: receipt
            type: { kind: bytes }
            direction: out
            binding: { kind: blob, path: "receipts/{missing}" }
      - name: Helper
"#;

fn file_config(dir: &tempfile::TempDir) -> HostConfig {
	HostConfig {
		store: StoreConfig::File {
			path: dir.path().to_path_buf(),
		},
		..Default::default()
	}
}

/// Index a YAML manifest by file URI and read the result back from disk
#[tokio::test]
async fn test_manifest_locator_with_file_store() -> anyhow::Result<()> {
	let store_dir = tempfile::tempdir()?;
	let manifest = NamedTempFile::with_suffix(".yaml")?;
	std::fs::write(manifest.path(), MANIFEST)?;
	let locator = format!("file://{}", manifest.path().display());

	let indexer = file_config(&store_dir).build_indexer()?;
	let report = indexer.index_locator(&locator).await?;

	let process = Location::new("billing", "Billing.Jobs", "ProcessOrder");
	assert_eq!(report.module, "billing");
	assert_eq!(report.added_functions, vec![process.clone()]);
	assert_eq!(report.outcome, RunOutcome::CompletedWithErrors);
	assert_eq!(report.errors.len(), 1);
	assert_eq!(report.errors[0].function, "Billing.Jobs.Broken");

	// A fresh indexer over the same directory sees the persisted descriptor
	let reopened = file_config(&store_dir).build_indexer()?;
	let stored = reopened.registry().lookup(&process).await?.expect("persisted");
	assert_eq!(stored.hints.description.as_deref(), Some("Charge one order"));
	assert!(stored.hints.route_parameters.contains("id"));
	let providers: Vec<&str> = stored.bindings.iter().map(|b| b.provider.as_str()).collect();
	assert_eq!(providers, vec!["in-object", "route", "out-bytes"]);

	// Re-indexing the unchanged manifest from a plain path is a no-op
	let again = reopened.index_locator(&manifest.path().display().to_string()).await?;
	assert!(again.added_functions.is_empty());
	assert!(again.updated_functions.is_empty());
	assert!(again.deleted_functions.is_empty());
	Ok(())
}

#[tokio::test]
async fn test_bad_locators() -> anyhow::Result<()> {
	let store_dir = tempfile::tempdir()?;
	let indexer = file_config(&store_dir).build_indexer()?;

	let err = indexer.index_locator("https://example.com/billing.yaml").await.unwrap_err();
	assert!(err.is_user_error());

	let err = indexer
		.index_locator(&store_dir.path().join("absent.yaml").display().to_string())
		.await
		.unwrap_err();
	assert_matches!(err, IndexError::Module(_));
	assert!(!err.is_user_error());
	Ok(())
}

#[tokio::test]
async fn test_report_serializes_for_reporting_boundary() -> anyhow::Result<()> {
	let store_dir = tempfile::tempdir()?;
	let manifest = NamedTempFile::with_suffix(".yaml")?;
	std::fs::write(manifest.path(), MANIFEST)?;

	let indexer = file_config(&store_dir).build_indexer()?;
	let report = indexer.index_locator(&manifest.path().display().to_string()).await?;
	let json = serde_json::to_value(&report)?;

	assert_eq!(json["addedFunctions"], serde_json::json!(["billing:Billing.Jobs.ProcessOrder"]));
	assert_eq!(json["outcome"]["status"], "completedWithErrors");
	assert_eq!(json["errors"][0]["function"], "Billing.Jobs.Broken");
	Ok(())
}

/// Two indexers over the same store directory converge on one record per function
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_separate_indexers_share_file_store() -> anyhow::Result<()> {
	let store_dir = tempfile::tempdir()?;
	let manifest = NamedTempFile::with_suffix(".yaml")?;
	std::fs::write(manifest.path(), MANIFEST)?;
	let locator = manifest.path().display().to_string();

	let left = file_config(&store_dir).build_indexer()?;
	let right = file_config(&store_dir).build_indexer()?;
	let (a, b) = tokio::join!(left.index_locator(&locator), right.index_locator(&locator));
	let (a, b) = (a?, b?);

	// Exactly one of the runs performed the insert
	assert_eq!(a.added_functions.len() + b.added_functions.len(), 1);
	let stored = left.registry().read_all().await?;
	assert_eq!(stored.len(), 1);
	assert_eq!(stored[0].location, Location::new("billing", "Billing.Jobs", "ProcessOrder"));
	Ok(())
}
