//! Site Lifecycle Tests
//!
//! End-to-end scenarios through the `Site` facade on the in-process store:
//! event emission, path uniqueness across a mixed sequence of operations,
//! request resolution through the redirect ledger, and audits.

#[cfg(test)]
mod site_lifecycle_tests {
    use anyhow::Result;
    use pagetree_core::config::SiteConfig;
    use pagetree_core::db::{MemoryStore, SiteStore};
    use pagetree_core::models::{BlockType, ContentBlock, PageRecord, SeoScore};
    use pagetree_core::services::{
        DeleteOutcome, NewPage, RenamePage, Resolution, Site, SiteError, SiteEvent,
    };
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::broadcast;
    use tokio::time::{timeout, Duration};

    async fn create_site(config: SiteConfig) -> Result<(Site, Arc<MemoryStore>)> {
        let store = Arc::new(MemoryStore::new());
        let site = Site::new(store.clone(), config);
        site.load().await?;
        Ok((site, store))
    }

    async fn seed(site: &Site) -> Result<(PageRecord, PageRecord, PageRecord)> {
        let home = site
            .tree()
            .add_page(None, NewPage::new("Home").with_slug(""))
            .await?;
        let shop = site.tree().add_page(Some(&home.id), NewPage::new("Shop")).await?;
        let shoes = site.tree().add_page(Some(&shop.id), NewPage::new("Shoes")).await?;
        Ok((home, shop, shoes))
    }

    async fn next_event(rx: &mut broadcast::Receiver<SiteEvent>) -> SiteEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event")
    }

    fn assert_active_paths_unique(pages: &[PageRecord]) {
        let mut seen = HashSet::new();
        for page in pages.iter().filter(|p| !p.is_deleted) {
            assert!(seen.insert(page.path.clone()), "duplicate path {}", page.path);
        }
    }

    #[tokio::test]
    async fn test_structural_operations_emit_events_in_order() -> Result<()> {
        let (site, _store) = create_site(SiteConfig::default()).await?;
        let mut rx = site.subscribe();

        let (home, shop, shoes) = seed(&site).await?;
        for expected in [&home, &shop, &shoes] {
            match next_event(&mut rx).await {
                SiteEvent::PageCreated(page) => assert_eq!(page.id, expected.id),
                other => panic!("Expected PageCreated, got {:?}", other),
            }
        }

        site.tree().move_page(&shoes.id, Some(&home.id)).await?;
        match next_event(&mut rx).await {
            SiteEvent::RedirectRecorded(record) => {
                assert_eq!(record.old_path, "/shop/shoes");
                assert_eq!(record.new_path, "/shoes");
            }
            other => panic!("Expected RedirectRecorded, got {:?}", other),
        }
        assert_eq!(
            next_event(&mut rx).await,
            SiteEvent::PageMoved {
                id: shoes.id.clone(),
                old_path: "/shop/shoes".into(),
                new_path: "/shoes".into(),
            }
        );

        site.tree().delete_page(&shoes.id).await?;
        assert_eq!(
            next_event(&mut rx).await,
            SiteEvent::PageSoftDeleted { id: shoes.id.clone() }
        );
        site.tree().delete_page(&shoes.id).await?;
        assert_eq!(
            next_event(&mut rx).await,
            SiteEvent::PageDeleted { ids: vec![shoes.id.clone()] }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_active_paths_stay_unique_across_operations() -> Result<()> {
        let (site, _store) = create_site(SiteConfig::default()).await?;
        let (home, shop, shoes) = seed(&site).await?;
        let blog = site.tree().add_page(Some(&home.id), NewPage::new("Blog")).await?;

        site.tree().copy_page(&shoes.id, Some(&shop.id)).await?;
        site.tree().copy_page(&shoes.id, Some(&shop.id)).await?;
        site.tree().move_page(&shop.id, Some(&blog.id)).await?;
        site.tree().delete_page(&blog.id).await?;

        // The soft-deleted page still holds its path in the tree, but a new
        // active page may take it
        let replacement = site.tree().add_page(Some(&home.id), NewPage::new("Blog")).await?;
        assert_eq!(replacement.path, "/blog");
        assert_eq!(
            site.tree().restore_page(&blog.id).await.unwrap_err(),
            SiteError::path_collision("/blog")
        );

        let unchanged = site
            .tree()
            .rename_page(&replacement.id, RenamePage::path("/blog"))
            .await?;
        assert_eq!(unchanged.path, "/blog");

        assert_active_paths_unique(&site.tree().pages().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_rejects_cycle_without_writes() -> Result<()> {
        let (site, store) = create_site(SiteConfig::default()).await?;
        let (_home, shop, shoes) = seed(&site).await?;
        let before = store.list_pages().await?;

        assert_eq!(
            site.tree().move_page(&shop.id, Some(&shoes.id)).await.unwrap_err(),
            SiteError::cycle(&shop.id, &shoes.id)
        );
        assert!(matches!(
            site.tree().move_page(&shop.id, Some(&shop.id)).await,
            Err(SiteError::Cycle { .. })
        ));
        assert_eq!(store.list_pages().await?, before);
        assert!(store.list_redirects().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_request_follows_ledger() -> Result<()> {
        let (site, _store) = create_site(SiteConfig::default()).await?;
        let (_home, shop, _shoes) = seed(&site).await?;

        site.tree().rename_page(&shop.id, RenamePage::path("store")).await?;

        match site.resolve_request("/store/shoes/").await? {
            Resolution::Page(page) => assert_eq!(page.title, "Shoes"),
            other => panic!("Expected page, got {:?}", other),
        }
        assert_eq!(
            site.resolve_request("/shop/shoes").await?,
            Resolution::Redirect("/store/shoes".into())
        );
        assert_eq!(
            site.resolve_request("/shop").await?,
            Resolution::Redirect("/store".into())
        );
        assert_eq!(site.resolve_request("/nowhere").await?, Resolution::NotFound);
        assert_eq!(site.resolve_request("  ").await?, Resolution::NotFound);

        // A page created at a retired path wins over its redirect
        let home = site.tree().find_by_path("/").await.unwrap();
        site.tree().add_page(Some(&home.id), NewPage::new("Shop")).await?;
        assert!(matches!(
            site.resolve_request("/shop").await?,
            Resolution::Page(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_redirects_survive_reload() -> Result<()> {
        let (site, store) = create_site(SiteConfig::default()).await?;
        let (_home, shop, _shoes) = seed(&site).await?;
        site.tree().rename_page(&shop.id, RenamePage::path("store")).await?;

        let reopened = Site::new(store, SiteConfig::default());
        reopened.load().await?;
        assert_eq!(
            reopened.resolve_request("/shop").await?,
            Resolution::Redirect("/store".into())
        );
        assert_eq!(reopened.redirects().list().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_hard_delete_removes_documents_and_reports() -> Result<()> {
        let (site, store) = create_site(SiteConfig::default()).await?;
        let (_home, shop, shoes) = seed(&site).await?;
        site.content()
            .add_block(&shoes.id, ContentBlock::new(BlockType::HeroCover, json!({})))
            .await?;
        site.audits().run_audit(&shoes.id).await?;

        site.tree().delete_page(&shop.id).await?;
        let outcome = site.tree().delete_page(&shop.id).await?;
        assert_eq!(
            outcome,
            DeleteOutcome::Removed {
                ids: vec![shop.id.clone(), shoes.id.clone()]
            }
        );
        assert!(store.get_content_document(&shoes.id).await?.is_none());
        assert!(site.audits().list_reports().await?.is_empty());
        assert_eq!(
            site.content().get_or_init(&shoes.id).await.unwrap_err(),
            SiteError::page_not_found(&shoes.id)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_global_audit_scores_each_active_page() -> Result<()> {
        let (site, _store) = create_site(SiteConfig::default()).await?;
        let (home, shop, shoes) = seed(&site).await?;

        site.tree()
            .rename_page(
                &home.id,
                RenamePage::default()
                    .with_seo_title("Home")
                    .with_seo_description("Everything we sell"),
            )
            .await?;
        site.content()
            .add_block(
                &home.id,
                ContentBlock::new(
                    BlockType::HeroCover,
                    json!({"title": "Welcome", "ctaHref": "/shop"}),
                ),
            )
            .await?;
        site.tree().delete_page(&shoes.id).await?;

        let reports = site.audits().run_global_audit().await?;
        let scores: Vec<(&str, SeoScore)> = reports
            .iter()
            .map(|r| (r.page_id.as_str(), r.score))
            .collect();
        assert_eq!(
            scores,
            [
                (home.id.as_str(), SeoScore::Good),
                (shop.id.as_str(), SeoScore::Critical)
            ]
        );
        assert_eq!(reports[0].missing_tags, ["og:image"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_local_state_matches_store_without_reload() -> Result<()> {
        let config = SiteConfig {
            reload_after_write: false,
            ..SiteConfig::default()
        };
        let (site, store) = create_site(config).await?;
        let (home, shop, shoes) = seed(&site).await?;
        site.tree().move_page(&shoes.id, Some(&home.id)).await?;
        site.tree().copy_page(&shop.id, None).await?;
        site.tree().reorder_sibling(&shoes.id, None).await?;

        let local = site.tree().nested().await;
        let fresh = Site::new(store, SiteConfig::default());
        fresh.load().await?;
        assert_eq!(fresh.tree().nested().await, local);
        Ok(())
    }

    #[tokio::test]
    async fn test_backing_store_failure_surfaces_message() -> Result<()> {
        let (site, store) = create_site(SiteConfig::default()).await?;
        let (home, _shop, _shoes) = seed(&site).await?;

        store.set_offline(true);
        let err = site
            .tree()
            .add_page(Some(&home.id), NewPage::new("Contact"))
            .await
            .unwrap_err();
        store.set_offline(false);

        match err {
            SiteError::BackingStore(message) => assert!(message.contains("offline")),
            other => panic!("Expected BackingStore, got {:?}", other),
        }
        assert!(site.tree().find_by_path("/contact").await.is_none());
        Ok(())
    }
}
