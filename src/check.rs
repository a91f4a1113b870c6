//! One-shot manifest validation (`kubeblog check`).
//!
//! Runs every manifest the server would see through the same converters,
//! without starting a watch. Reports files that cannot be read or parsed,
//! records that would be dropped, and ids claimed by more than one manifest
//! (the later one would shadow the other).

use crate::{
    config::SiteConfig,
    content::{Page, Post},
    log,
    sync::{ManifestSource, Resource, manifest::matches_watch},
};
use anyhow::{Result, bail};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::path::PathBuf;

/// Problems found in one resource kind.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub converted: usize,
    pub failed: usize,
    pub duplicates: usize,
}

/// Check all manifests for the configured namespace.
///
/// # Errors
///
/// Fails if the manifest directory is missing, if any file is not valid
/// JSON, or if any record would be dropped or shadowed.
pub fn check_manifests(config: &SiteConfig) -> Result<()> {
    let source = ManifestSource::new(&config.source.manifests);
    if !source.root().is_dir() {
        bail!("manifest directory not found: {}", source.root().display());
    }

    let mut unreadable = 0;
    let mut records = Vec::new();
    for (path, read) in source.read_all() {
        match read {
            Ok(record) => records.push((path, record)),
            Err(err) => {
                unreadable += 1;
                log!("error"; "{}: {err:#}", path.display());
            }
        }
    }

    let namespace = &config.source.namespace;
    let reports = [
        check_kind::<Post>(&records, namespace),
        check_kind::<Page>(&records, namespace),
    ];

    let failed = unreadable + reports.iter().map(|r| r.failed + r.duplicates).sum::<usize>();
    if failed > 0 {
        bail!("{failed} manifest(s) need attention");
    }

    let converted: usize = reports.iter().map(|r| r.converted).sum();
    log!("check"; "all {converted} manifest(s) in namespace {namespace} are valid");
    Ok(())
}

/// Convert every parsed manifest of one kind and log each problem.
pub fn check_kind<R: Resource>(records: &[(PathBuf, Value)], namespace: &str) -> Report {
    let mut report = Report::default();
    let mut seen: FxHashMap<String, &PathBuf> = FxHashMap::default();

    let matching = records
        .iter()
        .filter(|(_, record)| matches_watch(record, R::KIND, namespace));
    for (path, record) in matching {
        match R::from_record(record) {
            Ok(resource) => {
                report.converted += 1;
                let id = resource.id().to_owned();
                if let Some(first) = seen.get(&id) {
                    report.duplicates += 1;
                    log!("error"; "{} id={id} in {} duplicates {}",
                        R::KIND, path.display(), first.display());
                } else {
                    seen.insert(id, path);
                }
            }
            Err(err) => {
                report.failed += 1;
                log!("error"; "{}: {err}", path.display());
            }
        }
    }

    log!("check"; "{}: {} converted, {} failed, {} duplicate(s)",
        R::KIND, report.converted, report.failed, report.duplicates);
    report
}
