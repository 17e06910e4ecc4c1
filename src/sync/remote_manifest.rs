//! Manifest of the remote bucket, built by paging through the listing.

use tracing::debug;

use super::error::Result;
use super::manifest::FileRecord;
use crate::store::ObjectStore;

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// List the whole bucket as `{path: "/" + key, checksum: etag}` records.
///
/// Pages of up to `page_size` keys are requested, each continuing after the
/// last key of the previous page, until a page comes back empty.
pub async fn fetch_remote_manifest(
    store: &dyn ObjectStore,
    page_size: u32,
) -> Result<Vec<FileRecord>> {
    let page_size = page_size.max(1);
    let mut records = Vec::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list_objects(marker.as_deref(), page_size).await?;
        let Some(last) = page.last() else {
            break;
        };
        marker = Some(last.key.clone());
        pages += 1;

        records.extend(page.into_iter().map(|object| FileRecord {
            path: format!("/{}", object.key),
            checksum: object.etag,
        }));
    }

    debug!(
        "fetched {} remote records from s3://{} in {} pages",
        records.len(),
        store.bucket(),
        pages
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_two_pages_of_1000_and_3() {
        let mut builder = MemoryObjectStore::builder("bucket");
        for i in 0..1003 {
            builder = builder.with_object(format!("file-{:05}", i), format!("{}", i));
        }
        let store = builder.build();

        let records = fetch_remote_manifest(&store, DEFAULT_PAGE_SIZE).await.unwrap();
        assert_eq!(records.len(), 1003);

        let unique: HashSet<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(unique.len(), 1003);
        assert_eq!(records[0].path, "/file-00000");
        assert_eq!(records[1002].path, "/file-01002");

        // Two full pages then the empty page that ends the listing.
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_bucket() {
        let store = MemoryObjectStore::new("bucket");
        let records = fetch_remote_manifest(&store, 10).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_records_carry_etags() {
        let store = MemoryObjectStore::builder("bucket")
            .with_object("www/a.txt", "")
            .build();

        let records = fetch_remote_manifest(&store, 10).await.unwrap();
        assert_eq!(
            records,
            vec![FileRecord::new(
                "/www/a.txt",
                "d41d8cd98f00b204e9800998ecf8427e"
            )]
        );
    }
}
