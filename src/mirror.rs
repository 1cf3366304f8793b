// Mirror orchestration: per-source discovery and the per-tag transfer loop

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::discovery::TagDiscovery;
use crate::ledger::TransferLedger;
use crate::reference::{derive_destination_tag, ImageReference};
use crate::sources::{DuplicateNameIndex, MirrorSource};
use crate::transport::ImageTransport;

/// Where a single (repository, tag) pair should end up.
#[derive(Debug, Clone)]
pub struct DestinationPlan {
    pub source: ImageReference,
    pub target_registry: String,
    pub target_namespace: String,
    pub derived_tag: String,
}

impl DestinationPlan {
    /// Full destination reference. When no tag component survived
    /// derivation the `:tag` suffix is omitted and the container CLI
    /// applies its default.
    pub fn destination_reference(&self) -> String {
        let base = format!(
            "{}/{}/{}",
            self.target_registry, self.target_namespace, self.source.repository
        );
        if self.derived_tag.is_empty() {
            base
        } else {
            format!("{}:{}", base, self.derived_tag)
        }
    }
}

/// Terminal state of one per-tag transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Already in the ledger; transport never invoked.
    Skipped,
    /// Pulled, retagged, pushed, and recorded.
    Mirrored,
    /// Pull, tag, or push failed; logged and left unrecorded so the next
    /// run retries it.
    Failed,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub mirrored: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn tally(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Mirrored => self.mirrored += 1,
            TransferOutcome::Skipped => self.skipped += 1,
            TransferOutcome::Failed => self.failed += 1,
        }
    }
}

/// Drives the whole mirror run: discovery per source, then the per-tag
/// transfer state machine. Sources and tags are processed strictly
/// sequentially so at most one transfer's worth of image data is on local
/// disk at a time.
pub struct Orchestrator<'a> {
    config: &'a MirrorConfig,
    transport: &'a dyn ImageTransport,
    discovery: &'a dyn TagDiscovery,
    ledger: TransferLedger,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a MirrorConfig,
        transport: &'a dyn ImageTransport,
        discovery: &'a dyn TagDiscovery,
    ) -> Self {
        let ledger = TransferLedger::new(&config.ledger_path);
        Self {
            config,
            transport,
            discovery,
            ledger,
        }
    }

    /// Mirror every configured source. Per-source and per-tag failures are
    /// logged and skipped; only a missing transport binary or an unusable
    /// ledger aborts the run.
    pub async fn run(&self, sources: &[MirrorSource]) -> Result<RunSummary> {
        // First pass: find bare repository names used under more than one
        // namespace, so naming is collision-aware from the first transfer
        let index = DuplicateNameIndex::build(sources);
        let mut summary = RunSummary::default();

        for source in sources {
            match source {
                MirrorSource::Pinned {
                    reference,
                    platform,
                } => {
                    let outcome = self
                        .process_tag(reference, platform.as_deref(), &index)
                        .await?;
                    summary.tally(outcome);
                }
                MirrorSource::TagListing {
                    namespace,
                    repository,
                } => {
                    let tags = self
                        .discovery
                        .list_recent_tags(namespace, repository, self.config.tags_per_repo)
                        .await;
                    if tags.is_empty() {
                        warn!(
                            "No tags discovered for {}/{}; skipping source",
                            namespace, repository
                        );
                        continue;
                    }
                    for tag in &tags {
                        let reference = ImageReference::new(namespace, repository, tag);
                        let outcome = self.process_tag(&reference, None, &index).await?;
                        summary.tally(outcome);
                    }
                }
            }
        }

        info!(
            "Mirror run complete: {} mirrored, {} already recorded, {} failed",
            summary.mirrored, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Derive the destination for one source reference. The namespace
    /// qualifier is added only when the bare repository name collides with
    /// another source under a different namespace in this run.
    fn plan_destination(
        &self,
        reference: &ImageReference,
        platform: Option<&str>,
        index: &DuplicateNameIndex,
    ) -> DestinationPlan {
        let namespace_qualifier = if index.is_duplicate(&reference.repository)
            && !reference.namespace.is_empty()
        {
            Some(reference.namespace.as_str())
        } else {
            None
        };
        let derived_tag = derive_destination_tag(&reference.tag, platform, namespace_qualifier);

        DestinationPlan {
            source: reference.clone(),
            target_registry: self.config.target_registry.clone(),
            target_namespace: self.config.target_namespace.clone(),
            derived_tag,
        }
    }

    /// Run the per-tag state machine: ledger check, then pull, retag, push,
    /// record. A transport failure ends this tag only; the ledger is left
    /// unmodified so the next scheduled run retries it.
    ///
    /// The ledger is keyed on the derived destination tag, not the source
    /// tag: same-named repositories from different namespaces derive
    /// distinct destination tags, and each must be mirrored in its own
    /// right. For non-colliding sources the derived tag equals the source
    /// tag, so ledger lines look the same either way.
    async fn process_tag(
        &self,
        reference: &ImageReference,
        platform: Option<&str>,
        index: &DuplicateNameIndex,
    ) -> Result<TransferOutcome> {
        let plan = self.plan_destination(reference, platform, index);
        if self
            .ledger
            .is_recorded(&reference.repository, &plan.derived_tag)?
        {
            debug!("Already mirrored, skipping: {}", reference);
            return Ok(TransferOutcome::Skipped);
        }

        let source_ref = reference.to_string();
        let destination_ref = plan.destination_reference();
        info!("Mirroring {} -> {}", source_ref, destination_ref);

        let transfer = self
            .transport
            .pull(&source_ref, platform)
            .and_then(|_| self.transport.retag(&source_ref, &destination_ref))
            .and_then(|_| self.transport.push(&destination_ref));

        if let Err(err) = transfer {
            if err.is_fatal() {
                return Err(err.into());
            }
            warn!("Transfer failed, will retry on next run: {}", err);
            return Ok(TransferOutcome::Failed);
        }

        self.ledger.record(&reference.repository, &plan.derived_tag)?;

        // Bound local disk usage between transfers; removal failures are
        // harmless
        for image in [&source_ref, &destination_ref] {
            if let Err(err) = self.transport.remove(image) {
                debug!("Local cleanup of {} failed: {}", image, err);
            }
        }

        Ok(TransferOutcome::Mirrored)
    }
}
