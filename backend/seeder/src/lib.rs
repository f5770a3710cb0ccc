//! # Seeding
//!
//! Loads the JSON fixtures under `_data/` into a store, or wipes every
//! collection the API serves. Bootcamps go in first so courses and reviews
//! always point at a record that exists.
use anyhow::{Context, Error};
use indicatif::{ProgressBar, ProgressStyle};

use catalog::{Fixtures, Resource};
use devcamper::{database::DocumentStore, query::FilterPredicate};

pub fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Inserts every fixture record, returning how many were written.
pub async fn import(
    store: &dyn DocumentStore,
    fixtures: &Fixtures,
    pb: &ProgressBar,
) -> Result<usize, Error> {
    let mut written = 0;

    for resource in Resource::ALL {
        pb.set_message(resource.collection());

        for document in fixtures.get(resource) {
            store
                .insert(resource, document.clone())
                .await
                .with_context(|| format!("Failed to insert into {resource}"))?;

            written += 1;
            pb.inc(1);
        }
    }

    pb.finish_with_message("Done");
    Ok(written)
}

/// Empties every collection, returning how many records were removed.
pub async fn destroy(store: &dyn DocumentStore) -> Result<u64, Error> {
    let mut removed = 0;

    for resource in Resource::ALL {
        removed += store
            .delete_many(resource, &FilterPredicate::new())
            .await
            .with_context(|| format!("Failed to clear {resource}"))?;
    }

    Ok(removed)
}
