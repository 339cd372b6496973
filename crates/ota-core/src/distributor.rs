//! Per-request pipeline.
//!
//! classify -> resource directory -> description -> extract -> decode ->
//! manifest/link. Fatal errors abort the current request only; extraction
//! and decoding failures leave the package servable with
//! [`MetadataStatus::Unavailable`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ota_schema::{FileType, MetadataStatus, PackageArtifact};
use thiserror::Error;

use crate::cache::{self, CacheError};
use crate::config::OtaConfig;
use crate::descriptor::{DecoderRegistry, DescriptorDecoder};
use crate::io::extract::{self, ExtractError, ExtractOptions};
use crate::lock::DirLocks;
use crate::manifest::{ManifestError, ManifestSynthesizer};
use crate::paths::{self, PathError, ResourceDir};

/// Request-scoped failure. Never terminates the process.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Invalid package request: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Failed to create resource directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare description {}: {source}", path.display())]
    Description {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Processing {path} timed out after {}s", limit.as_secs())]
    Timeout { path: String, limit: Duration },

    #[error("Task panic: {0}")]
    Join(String),
}

impl From<CacheError> for ProcessError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Directory { path, source } => Self::Directory { path, source },
            CacheError::Description { path, source } => Self::Description { path, source },
        }
    }
}

/// Processes package requests against one document root.
///
/// Cheap to clone; clones share the decoder registry and the lock table.
#[derive(Debug, Clone)]
pub struct Distributor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: OtaConfig,
    registry: DecoderRegistry,
    synthesizer: ManifestSynthesizer,
    locks: DirLocks,
}

impl Distributor {
    /// Distributor with the built-in IPA and APK decoders.
    pub fn new(config: OtaConfig) -> Self {
        Self::with_registry(config, DecoderRegistry::new())
    }

    pub fn with_registry(config: OtaConfig, registry: DecoderRegistry) -> Self {
        let synthesizer = ManifestSynthesizer::new(config.base_url.clone(), config.manifest_policy);
        Self {
            inner: Arc::new(Inner {
                config,
                registry,
                synthesizer,
                locks: DirLocks::new(),
            }),
        }
    }

    pub fn config(&self) -> &OtaConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.inner.registry
    }

    /// Run the pipeline for `path` (relative to the document root) listed
    /// under `group`, blocking the calling thread.
    ///
    /// Unknown package types return immediately without touching the
    /// filesystem.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessError`] when the request cannot be completed: an
    /// unsafe path, a directory/description/write failure, or the archive
    /// scan outliving the configured timeout.
    pub fn process(&self, path: &str, group: &str) -> Result<PackageArtifact, ProcessError> {
        // A timeout past the clock's range means no deadline.
        let deadline = Instant::now().checked_add(self.config().timeout());
        self.process_until(path, group, deadline)
    }

    /// [`Self::process`] on the blocking pool, bounded by the configured
    /// timeout.
    ///
    /// On timeout the blocking pass is abandoned; its archive scan stops at
    /// the next entry, and every write it may still finish is atomic.
    pub async fn process_async(
        &self,
        path: impl Into<String>,
        group: impl Into<String>,
    ) -> Result<PackageArtifact, ProcessError> {
        let path = path.into();
        let group = group.into();
        let limit = self.config().timeout();

        let this = self.clone();
        let task_path = path.clone();
        let task = tokio::task::spawn_blocking(move || this.process(&task_path, &group));

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ProcessError::Join(e.to_string())),
            Err(_) => {
                tracing::warn!("Gave up on {path} after {}s", limit.as_secs());
                Err(ProcessError::Timeout { path, limit })
            }
        }
    }

    fn process_until(
        &self,
        path: &str,
        group: &str,
        deadline: Option<Instant>,
    ) -> Result<PackageArtifact, ProcessError> {
        let mut artifact = PackageArtifact::new(path, group);
        let Some(name) = artifact.file_name.clone() else {
            tracing::debug!("Skipping {path}: not a mobile package");
            return Ok(artifact);
        };

        paths::validate_relative(path)?;
        paths::validate_segment(group)?;
        paths::validate_segment(&name)?;

        let config = self.config();
        let resource = ResourceDir::new(
            &config.root,
            paths::resource_dir(&config.files_dir, group, &name),
        );

        cache::ensure_directory(resource.path())?;
        artifact.description = Some(cache::ensure_description(resource.path())?);

        let package = config.root.join(path);
        self.inner.locks.with_lock(resource.path(), || {
            artifact.metadata =
                self.read_metadata(artifact.file_type, &package, &resource, deadline)?;

            let synthesized = self.inner.synthesizer.synthesize(
                artifact.file_type,
                artifact.metadata.descriptor(),
                path,
                &resource,
            )?;
            artifact.download_url = synthesized.map(|s| s.download_url);
            Ok::<_, ProcessError>(())
        })?;

        tracing::info!(
            "Processed {path} ({}, metadata {})",
            artifact.file_type,
            match &artifact.metadata {
                MetadataStatus::Available(_) => "available",
                MetadataStatus::Unavailable { .. } => "unavailable",
                MetadataStatus::NotApplicable => "n/a",
            }
        );
        Ok(artifact)
    }

    /// Extract (once) and decode the package's descriptor.
    fn read_metadata(
        &self,
        file_type: FileType,
        package: &Path,
        resource: &ResourceDir,
        deadline: Option<Instant>,
    ) -> Result<MetadataStatus, ProcessError> {
        let Some(decoder) = self.registry().get(file_type) else {
            return Ok(MetadataStatus::Unavailable {
                reason: format!("No descriptor decoder registered for {file_type}"),
            });
        };

        let options = ExtractOptions {
            deadline,
            ..ExtractOptions::default()
        };
        match extract::extract_if_missing(package, decoder.entry_name(), resource.path(), &options)
        {
            Ok(_) => {}
            Err(e) if e.is_recoverable() => {
                tracing::warn!("{e}");
                return Ok(MetadataStatus::Unavailable {
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(self.extract_failed(e, package)),
        }

        decode_cached(decoder, resource)
    }

    fn extract_failed(&self, err: ExtractError, package: &Path) -> ProcessError {
        match err {
            ExtractError::Io { path, source } => ProcessError::Io { path, source },
            ExtractError::Timeout { .. } => ProcessError::Timeout {
                path: package.display().to_string(),
                limit: self.config().timeout(),
            },
            other => ProcessError::Io {
                path: package.to_path_buf(),
                source: io::Error::other(other.to_string()),
            },
        }
    }
}

fn decode_cached(
    decoder: &dyn DescriptorDecoder,
    resource: &ResourceDir,
) -> Result<MetadataStatus, ProcessError> {
    let entry = resource.file(decoder.entry_name());
    let bytes = fs::read(&entry).map_err(|source| ProcessError::Io {
        path: entry.clone(),
        source,
    })?;

    Ok(match decoder.decode(&bytes) {
        Ok(descriptor) => MetadataStatus::Available(descriptor),
        Err(e) => {
            tracing::warn!("Failed to decode {}: {e}", entry.display());
            MetadataStatus::Unavailable {
                reason: format!("Failed to decode {}: {e}", decoder.entry_name()),
            }
        }
    })
}
