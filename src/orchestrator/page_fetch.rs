//! Artifact retrieval for a single page.
//!
//! Fetches run strictly one after another (preview, derived document, then
//! details) to bound the load a job puts on the service.

use crate::error::Result;
use crate::resources::ResourceHandle;
use crate::schema::PageEntry;
use crate::store::FetchedPage;
use crate::types::{ArtifactKind, Representation};

use super::context::PollContext;

/// Fetch everything a ready page offers
///
/// On failure any artifact already pulled for this page is released again, so
/// an error leaves nothing behind in the resource store.
pub(super) async fn fetch_page(ctx: &PollContext, entry: &PageEntry) -> Result<FetchedPage> {
    let mut fetched = FetchedPage::default();

    let result = fetch_into(ctx, entry, &mut fetched).await;
    if let Err(e) = result {
        let released = ctx
            .registries
            .resources
            .release_all(fetched.handles())
            .await;
        if released > 0 {
            tracing::debug!(
                job_id = %ctx.job_id,
                page = entry.page,
                released,
                "Released partial artifacts after failed page fetch"
            );
        }
        return Err(e);
    }

    Ok(fetched)
}

async fn fetch_into(ctx: &PollContext, entry: &PageEntry, fetched: &mut FetchedPage) -> Result<()> {
    if let Some(name) = &entry.img {
        fetched.image_ref = Some(fetch_artifact(ctx, entry.page, name, ArtifactKind::Preview).await?);
    }

    if let Some(name) = &entry.pdf {
        fetched.file_ref = Some(fetch_artifact(ctx, entry.page, name, ArtifactKind::Document).await?);
    }

    // Details inlined into the status payload were stored by the upsert already
    if entry.details.is_none() {
        fetched.details = Some(
            ctx.service
                .fetch_page_details(&ctx.job_id, entry.page)
                .await?,
        );
    }

    Ok(())
}

async fn fetch_artifact(
    ctx: &PollContext,
    page: u32,
    name: &str,
    kind: ArtifactKind,
) -> Result<ResourceHandle> {
    let artifact = ctx
        .service
        .fetch_page_artifact(&ctx.job_id, page, name, Representation::Binary)
        .await?;

    let size = artifact.body.len();
    let handle = ctx.registries.resources.insert(artifact).await;
    tracing::debug!(
        job_id = %ctx.job_id,
        page,
        artifact = name,
        ?kind,
        size,
        %handle,
        "Fetched page artifact"
    );
    Ok(handle)
}
