//! Inspect command

use anyhow::{Context, Result};
use ota_core::{Distributor, OtaConfig};
use ota_schema::{MetadataStatus, PackageArtifact};

use super::{descriptor_rows, print_rows};

/// Run the pipeline for one package and print what a device would receive
pub async fn inspect(config: OtaConfig, path: &str, group: &str, json: bool) -> Result<()> {
    let distributor = Distributor::new(config);
    let artifact = distributor
        .process_async(path, group)
        .await
        .with_context(|| format!("Failed to process {path}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifact)?);
    } else {
        print_rows(&heading(&artifact), &rows(&artifact));
    }
    Ok(())
}

fn heading(artifact: &PackageArtifact) -> String {
    match (artifact.descriptor(), &artifact.file_name) {
        (Some(descriptor), _) => descriptor.title(),
        (None, Some(name)) => name.clone(),
        (None, None) => artifact.path.clone(),
    }
}

fn rows(artifact: &PackageArtifact) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("type", artifact.file_type.to_string()),
        ("group", artifact.distribution_group.clone()),
    ];

    match &artifact.metadata {
        MetadataStatus::Available(descriptor) => rows.extend(descriptor_rows(descriptor)),
        MetadataStatus::Unavailable { reason } => {
            rows.push(("metadata", format!("unavailable ({reason})")));
        }
        MetadataStatus::NotApplicable => {}
    }

    rows.push((
        "download",
        artifact.download_url.clone().unwrap_or_else(|| "-".to_string()),
    ));
    if let Some(description) = &artifact.description {
        rows.push(("description", description.clone()));
    }
    rows
}
