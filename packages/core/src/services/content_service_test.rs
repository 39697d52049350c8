//! Tests for ContentService
//!
//! Tests cover:
//! - Lazy empty documents and block CRUD
//! - Stable single-element reorder
//! - Block id uniqueness across nesting
//! - Version conflicts between two sessions sharing a store
//! - Rejection of edits to deleted or unknown pages

#[cfg(test)]
mod tests {
    use crate::db::{MemoryStore, SiteStore};
    use crate::models::{BlockType, CodeKind, ContentBlock, PageRecord};
    use crate::services::content_service::ContentService;
    use crate::services::error::SiteError;
    use crate::services::page_tree::{PageTree, SharedTree};
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::{broadcast, RwLock};

    async fn fixture() -> (ContentService, Arc<MemoryStore>, SharedTree) {
        let mut home = PageRecord::new_with_id("home", "Home", "/", None);
        home.last_modified = Utc::now() - Duration::days(1);
        let mut trash = PageRecord::new_with_id("trash", "Old", "/old", None);
        trash.is_deleted = true;

        let store = Arc::new(MemoryStore::with_pages(vec![home, trash]).await);
        let tree = Arc::new(RwLock::new(PageTree::from_records(store.list_pages().await.unwrap())));
        let (tx, _) = broadcast::channel(64);
        (ContentService::new(store.clone(), tree.clone(), tx), store, tree)
    }

    fn text(id: &str) -> ContentBlock {
        ContentBlock::new(BlockType::RichText, json!({"content": id})).with_id(id)
    }

    fn ids(blocks: &[ContentBlock]) -> Vec<&str> {
        blocks.iter().map(|b| b.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_get_or_init_does_not_persist() -> Result<()> {
        let (content, store, _) = fixture().await;
        let doc = content.get_or_init("home").await?;
        assert!(doc.blocks.is_empty());
        assert_eq!(doc.custom_code.css, "");
        assert_eq!(doc.version, 0);
        assert!(store.get_content_document("home").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_moves_single_block() -> Result<()> {
        let (content, _, _) = fixture().await;
        for id in ["x", "y", "z"] {
            content.add_block("home", text(id)).await?;
        }

        let doc = content.reorder_blocks("home", 0, 2).await?;
        assert_eq!(ids(&doc.blocks), ["y", "z", "x"]);

        let doc = content.reorder_blocks("home", 2, 0).await?;
        assert_eq!(ids(&doc.blocks), ["x", "y", "z"]);

        let err = content.reorder_blocks("home", 0, 3).await.unwrap_err();
        assert!(matches!(err, SiteError::InvalidOperation(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_every_mutation_persists_full_document() -> Result<()> {
        let (content, store, _) = fixture().await;
        content.add_block("home", text("a")).await?;
        content.set_custom_code("home", CodeKind::Css, "body { margin: 0 }").await?;
        content.set_custom_code("home", CodeKind::Js, "init()").await?;

        let stored = store.get_content_document("home").await?.unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(ids(&stored.blocks), ["a"]);
        assert_eq!(stored.custom_code.css, "body { margin: 0 }");
        assert_eq!(stored.custom_code.js, "init()");
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_block_ids_are_rejected() -> Result<()> {
        let (content, _, _) = fixture().await;
        let grid = ContentBlock::new(BlockType::GridSystem, json!({}))
            .with_id("grid")
            .with_children(vec![text("cell")]);
        content.add_block("home", grid).await?;

        let err = content.add_block("home", text("cell")).await.unwrap_err();
        assert!(matches!(err, SiteError::InvalidOperation(_)));

        let self_dup = ContentBlock::new(BlockType::ExperienceFragment, json!({}))
            .with_id("frag")
            .with_children(vec![text("twin"), text("twin")]);
        assert!(content.add_block("home", self_dup).await.is_err());

        let doc = content.get_or_init("home").await?;
        assert!(doc.has_unique_block_ids());
        assert_eq!(doc.block_ids(), ["grid", "cell"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_children_on_leaf_block_type_rejected() {
        let (content, _, _) = fixture().await;
        let hero = ContentBlock::new(BlockType::HeroCover, json!({}))
            .with_children(vec![text("inner")]);
        assert!(matches!(
            content.add_block("home", hero).await,
            Err(SiteError::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_props_merges_nested_block() -> Result<()> {
        let (content, _, _) = fixture().await;
        let grid = ContentBlock::new(BlockType::GridSystem, json!({"columns": 2}))
            .with_id("grid")
            .with_children(vec![ContentBlock::new(
                BlockType::ProductShowcase,
                json!({"sku": "A-1", "price": 10}),
            )
            .with_id("product")]);
        content.add_block("home", grid).await?;

        let patch = json!({"price": 12, "badge": "sale"});
        let mut doc = content
            .update_block_props("home", "product", patch.as_object().unwrap())
            .await?;
        let product = doc.find_block_mut("product").unwrap();
        assert_eq!(product.props["sku"], json!("A-1"));
        assert_eq!(product.props["price"], json!(12));
        assert_eq!(product.props["badge"], json!("sale"));

        let err = content
            .update_block_props("home", "missing", patch.as_object().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, SiteError::block_not_found("home", "missing"));
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_nested_block() -> Result<()> {
        let (content, _, _) = fixture().await;
        content
            .add_block(
                "home",
                ContentBlock::new(BlockType::GridSystem, json!({}))
                    .with_id("grid")
                    .with_children(vec![text("a"), text("b")]),
            )
            .await?;
        let doc = content.remove_block("home", "a").await?;
        assert_eq!(doc.block_ids(), ["grid", "b"]);
        assert!(content.remove_block("home", "a").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_write_stamps_last_modified() -> Result<()> {
        let (content, store, tree) = fixture().await;
        let before = tree.read().await.get("home").unwrap().last_modified;

        content.add_block("home", text("a")).await?;

        let after = tree.read().await.get("home").unwrap().last_modified;
        assert!(after > before);
        let stored = store.list_pages().await?;
        assert_eq!(stored.iter().find(|p| p.id == "home").unwrap().last_modified, after);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_session_gets_version_conflict() -> Result<()> {
        let (first, store, tree) = fixture().await;
        let (tx, _) = broadcast::channel(16);
        let second = ContentService::new(store.clone(), tree, tx);

        first.add_block("home", text("a")).await?;
        assert_eq!(second.get_or_init("home").await?.version, 1);
        first.add_block("home", text("b")).await?;

        let err = second.add_block("home", text("c")).await.unwrap_err();
        assert_eq!(err, SiteError::version_conflict("home", 1, 2));

        // The stale copy was evicted, so a retry builds on the winner
        let doc = second.add_block("home", text("c")).await?;
        assert_eq!(doc.version, 3);
        assert_eq!(ids(&doc.blocks), ["a", "b", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_edits_to_deleted_or_unknown_pages_rejected() {
        let (content, _, _) = fixture().await;
        assert_eq!(
            content.add_block("trash", text("a")).await.unwrap_err(),
            SiteError::page_deleted("trash")
        );
        assert_eq!(
            content.add_block("ghost", text("a")).await.unwrap_err(),
            SiteError::page_not_found("ghost")
        );
        assert!(content.get_or_init("trash").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() -> Result<()> {
        let (content, store, _) = fixture().await;
        content.add_block("home", text("a")).await?;

        store.set_offline(true);
        let err = content.add_block("home", text("b")).await.unwrap_err();
        assert!(matches!(err, SiteError::BackingStore(_)));
        store.set_offline(false);

        let doc = content.get_or_init("home").await?;
        assert_eq!(ids(&doc.blocks), ["a"]);
        assert_eq!(doc.version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_clone_document_is_independent() -> Result<()> {
        let (content, store, tree) = fixture().await;
        tree.write()
            .await
            .insert(PageRecord::new_with_id("copy", "Home (Copy)", "/copy", None));
        store
            .insert_page(PageRecord::new_with_id("copy", "Home (Copy)", "/copy", None))
            .await?;

        assert!(content.clone_document("home", "copy").await?.is_none());

        content.add_block("home", text("a")).await?;
        let cloned = content.clone_document("home", "copy").await?.unwrap();
        assert_eq!(cloned.version, 1);

        content.add_block("home", text("b")).await?;
        content.remove_block("copy", "a").await?;

        assert_eq!(ids(&content.get_or_init("home").await?.blocks), ["a", "b"]);
        assert!(content.get_or_init("copy").await?.blocks.is_empty());
        Ok(())
    }
}
