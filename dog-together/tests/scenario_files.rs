use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use walkdir::WalkDir;

use dog_together::prelude::*;

/// Six one-byte files named "0".."5", each containing its own name
fn fixture_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for n in 0..6 {
        fs::write(dir.path().join(n.to_string()), n.to_string()).unwrap();
    }
    dir
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

fn digest_of(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Walk a tree, pushing every regular file as a job
async fn walk_files(
    root: PathBuf,
    jobs: JobSender<PathBuf>,
) -> Result<(), ProductionError<String>> {
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|err| ProductionError::failed(err.to_string()))?;
        if entry.file_type().is_file() {
            jobs.send(entry.into_path()).await?;
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_hash_tree_with_single_worker_keeps_walk_order() {
    let dir = fixture_dir();
    let mut hashes = Vec::new();
    let mut walk_errors = Vec::new();
    let mut hash_errors = Vec::new();

    let summary = JobQueue::builder()
        .concurrency(1)
        .add_job({
            let root = dir.path().to_path_buf();
            move |jobs| walk_files(root, jobs)
        })
        .do_job(|path: PathBuf| async move {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            hash_file(&path)
                .map(|hash| (name, hash))
                .map_err(|err| format!("{}: {err}", path.display()))
        })
        .on_add_job_error(|err| walk_errors.push(err))
        .on_job_error(|err| hash_errors.push(err))
        .on_job_success(|entry| hashes.push(entry))
        .build()
        .unwrap()
        .run()
        .await;

    let expected: Vec<(String, String)> = (0..6)
        .map(|n| (n.to_string(), digest_of(&n.to_string())))
        .collect();
    assert_eq!(hashes, expected);
    assert!(walk_errors.is_empty());
    assert!(hash_errors.is_empty());
    assert!(summary.is_clean());
    assert_eq!(summary.jobs.accepted, 6);
}

#[tokio::test]
async fn test_hash_tree_with_many_workers_reports_every_file() {
    let dir = fixture_dir();
    let mut hashes = Vec::new();

    let summary = JobQueue::builder()
        .concurrency(4)
        .add_job({
            let root = dir.path().to_path_buf();
            move |jobs| walk_files(root, jobs)
        })
        .do_job(|path: PathBuf| async move {
            hash_file(&path).map_err(|err| err.to_string())
        })
        .on_add_job_error(|err| panic!("walk failed: {err}"))
        .on_job_error(|err| panic!("hash failed: {err}"))
        .on_job_success(|hash| hashes.push(hash))
        .build()
        .unwrap()
        .run()
        .await;

    let mut expected: Vec<String> = (0..6).map(|n| digest_of(&n.to_string())).collect();
    expected.sort();
    hashes.sort();
    assert_eq!(hashes, expected);
    assert_eq!(summary.jobs.succeeded, 6);
}

#[tokio::test]
async fn test_missing_root_is_a_production_error() {
    let dir = fixture_dir();
    let missing = dir.path().join("does-not-exist");
    let mut production_errors = Vec::new();
    let mut hashed = 0;

    let summary = JobQueue::builder()
        .concurrency(2)
        .add_job(move |jobs| walk_files(missing, jobs))
        .do_job(|path: PathBuf| async move { hash_file(&path).map_err(|err| err.to_string()) })
        .on_add_job_error(|err| production_errors.push(err))
        .on_job_error(|_| {})
        .on_job_success(|_| hashed += 1)
        .build()
        .unwrap()
        .run()
        .await;

    assert_eq!(production_errors.len(), 1);
    assert!(production_errors[0].as_failed().is_some());
    assert_eq!(hashed, 0);
    assert_eq!(summary.production, ProductionStatus::Failed);
}
