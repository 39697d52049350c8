//! Tests for the SEO audit engine
//!
//! Tests cover:
//! - The scoring gates on the four reference pages
//! - Alt text, link and new-context checks on block props
//! - Markdown and raw HTML scanning inside rich text
//! - Word count, reading time and keyword density
//! - Service behavior: persistence, deleted pages, aborted runs

#[cfg(test)]
mod tests {
    use crate::db::{MemoryStore, SiteStore};
    use crate::models::{BlockType, ContentBlock, ContentDocument, PageRecord, SeoMetadata, SeoScore};
    use crate::services::content_service::ContentService;
    use crate::services::error::SiteError;
    use crate::services::events::SiteEvent;
    use crate::services::page_tree::{PageTree, SharedTree};
    use crate::services::seo_audit::{audit_page, reading_time, score_report, SeoAuditService};
    use anyhow::Result;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::{broadcast, RwLock};

    fn page_with(title: Option<&str>, description: Option<&str>, og_image: Option<&str>) -> PageRecord {
        let mut page = PageRecord::new_with_id("p1", "Landing", "/landing", None);
        page.seo_metadata = SeoMetadata {
            title: title.map(String::from),
            description: description.map(String::from),
            og_image: og_image.map(String::from),
            ..SeoMetadata::default()
        };
        page
    }

    fn complete_page() -> PageRecord {
        page_with(Some("T"), Some("D"), Some("I"))
    }

    fn doc(blocks: Vec<ContentBlock>) -> ContentDocument {
        let mut doc = ContentDocument::empty("p1");
        doc.blocks = blocks;
        doc
    }

    fn hero() -> ContentBlock {
        ContentBlock::new(BlockType::HeroCover, json!({"title": "Welcome"}))
    }

    fn rich(markdown: &str) -> ContentBlock {
        ContentBlock::new(BlockType::RichText, json!({ "content": markdown }))
    }

    fn block(block_type: BlockType, props: Value) -> ContentBlock {
        ContentBlock::new(block_type, props)
    }

    fn paths(items: &[&str]) -> HashSet<String> {
        items.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_complete_page_scores_good() {
        let report = audit_page(&complete_page(), &doc(vec![hero()]), &paths(&["/"]), 200);
        assert_eq!(report.score, SeoScore::Good);
        assert!(report.missing_tags.is_empty());
        assert_eq!(report.page_id, "p1");
        assert_eq!(report.path, "/landing");
    }

    #[test]
    fn test_single_missing_tag_stays_good() {
        let page = page_with(Some("T"), None, Some("I"));
        let report = audit_page(&page, &doc(vec![hero()]), &paths(&["/"]), 200);
        assert_eq!(report.missing_tags, ["description"]);
        assert_eq!(report.score, SeoScore::Good);
    }

    #[test]
    fn test_two_tags_and_broken_link_warn_without_escalating() {
        let page = page_with(Some("T"), None, Some("I"));
        let blocks = vec![
            hero(),
            rich("# Second heading"),
            block(BlockType::ProductShowcase, json!({"href": "/gone"})),
        ];
        let report = audit_page(&page, &doc(blocks), &paths(&["/", "/landing"]), 200);

        assert_eq!(report.missing_tags, ["description", "h1-unique"]);
        assert_eq!(report.broken_links, 1);
        assert_eq!(report.score, SeoScore::Warning);
    }

    #[test]
    fn test_missing_title_is_critical_regardless() {
        let page = page_with(None, Some("D"), Some("I"));
        let report = audit_page(&page, &doc(vec![hero()]), &paths(&["/"]), 200);
        assert_eq!(report.missing_tags, ["title"]);
        assert_eq!(report.score, SeoScore::Critical);
    }

    #[test]
    fn test_score_gates() {
        let none: Vec<String> = Vec::new();
        assert_eq!(score_report(&none, 0, 0, 0), SeoScore::Good);
        assert_eq!(score_report(&none, 0, 1, 0), SeoScore::Warning);
        assert_eq!(score_report(&none, 0, 0, 1), SeoScore::Warning);
        assert_eq!(score_report(&none, 2, 0, 0), SeoScore::Warning);
        assert_eq!(score_report(&none, 3, 0, 0), SeoScore::Critical);
    }

    #[test]
    fn test_blank_metadata_counts_as_missing() {
        let page = page_with(Some("   "), Some("D"), Some(""));
        let report = audit_page(&page, &doc(vec![hero()]), &paths(&[]), 200);
        assert_eq!(report.missing_tags, ["title", "og:image"]);
    }

    #[test]
    fn test_zero_headings_flag_h1_unique() {
        let report = audit_page(&complete_page(), &doc(vec![]), &paths(&[]), 200);
        assert_eq!(report.missing_tags, ["h1-unique"]);
        assert_eq!(report.score, SeoScore::Good);
    }

    #[test]
    fn test_heading_level_prop_counts() {
        let blocks = vec![
            block(BlockType::RichText, json!({"headingLevel": 1})),
            block(BlockType::RichText, json!({"headingLevel": "h2"})),
        ];
        let report = audit_page(&complete_page(), &doc(blocks), &paths(&[]), 200);
        assert!(!report.has_tag("h1-unique"));
    }

    #[test]
    fn test_missing_alt_found_in_nested_children() {
        let grid = block(BlockType::GridSystem, json!({"columns": 2})).with_children(vec![
            block(BlockType::ProductShowcase, json!({"image": "/media/shoe.JPG?w=400"})),
            block(
                BlockType::ProductShowcase,
                json!({"image": "/media/bag.webp", "alt": "Leather bag"}),
            ),
            block(BlockType::ProductShowcase, json!({"image": "/media/hat.png", "alt": "  "})),
            block(BlockType::ProductShowcase, json!({"note": "see photo.png for details"})),
        ]);
        let report = audit_page(&complete_page(), &doc(vec![hero(), grid]), &paths(&[]), 200);
        assert_eq!(report.missing_alt_count, 2);
        assert_eq!(report.score, SeoScore::Warning);
    }

    #[test]
    fn test_external_link_in_new_context_needs_noopener() {
        let blocks = vec![
            hero(),
            block(
                BlockType::HeroCover,
                json!({"ctaHref": "https://shop.example.com", "target": "_blank"}),
            ),
            block(
                BlockType::ProductShowcase,
                json!({"link": "https://partner.example.com", "openInNewTab": true, "rel": "noopener noreferrer"}),
            ),
            block(
                BlockType::ProductShowcase,
                json!({"url": "//cdn.example.com/page", "newTab": true}),
            ),
            block(BlockType::ProductShowcase, json!({"href": "https://example.com"})),
        ];
        let report = audit_page(&complete_page(), &doc(blocks), &paths(&[]), 200);
        assert_eq!(report.security_issues, 2);
    }

    #[test]
    fn test_internal_links_checked_against_active_paths() {
        let active = paths(&["/", "/about", "/shop/shoes"]);
        let blocks = vec![
            hero(),
            block(
                BlockType::ProductShowcase,
                json!({
                    "href": "/about#team",
                    "buttonLink": "/shop/shoes/?color=red",
                    "url": "/",
                    "secondaryHref": "mailto:hello@example.com",
                    "anchorLink": "#pricing",
                    "label": "/not-a-link"
                }),
            ),
            block(BlockType::ProductShowcase, json!({"href": "/missing"})),
            block(BlockType::ProductShowcase, json!({"link": "/old//page/"})),
        ];
        let report = audit_page(&complete_page(), &doc(blocks), &active, 200);
        assert_eq!(report.broken_links, 2);
    }

    #[test]
    fn test_three_broken_links_escalate_to_critical() {
        let blocks = vec![
            hero(),
            block(BlockType::ProductShowcase, json!({"href": "/a"})),
            block(BlockType::ProductShowcase, json!({"href": "/b"})),
            block(BlockType::ProductShowcase, json!({"href": "/c"})),
        ];
        let report = audit_page(&complete_page(), &doc(blocks), &paths(&[]), 200);
        assert_eq!(report.broken_links, 3);
        assert_eq!(report.score, SeoScore::Critical);
    }

    #[test]
    fn test_markdown_content_is_scanned() {
        let markdown = "# Title\n\nSee [the team](/about) and [old news](/news).\n\n\
                        ![](/media/a.png) ![Team photo](/media/b.png)\n\n## Details\n";
        let report = audit_page(
            &complete_page(),
            &doc(vec![rich(markdown)]),
            &paths(&["/", "/about"]),
            200,
        );
        assert!(!report.has_tag("h1-unique"));
        assert_eq!(report.broken_links, 1);
        assert_eq!(report.missing_alt_count, 1);
    }

    #[test]
    fn test_raw_html_in_rich_text() {
        let markdown = "<h1>Hero</h1>\n\n\
                        Read <a href=\"https://example.com\" target=\"_blank\">this</a> and \
                        <a href=\"https://example.org\" target=\"_blank\" rel=\"noopener\">that</a>.\n";
        let report = audit_page(&complete_page(), &doc(vec![rich(markdown)]), &paths(&[]), 200);
        assert!(!report.has_tag("h1-unique"));
        assert_eq!(report.security_issues, 1);
    }

    #[test]
    fn test_word_count_and_reading_time() {
        let body = vec!["word"; 450].join(" ");
        let blocks = vec![hero(), rich(&body)];
        let report = audit_page(&complete_page(), &doc(blocks), &paths(&[]), 200);
        // 450 body words plus the hero title
        assert_eq!(report.word_count, 451);
        assert_eq!(report.reading_time_minutes, 3);

        assert_eq!(reading_time(0, 200), 0);
        assert_eq!(reading_time(1, 200), 1);
        assert_eq!(reading_time(400, 200), 2);
        assert_eq!(reading_time(10, 0), 10);
    }

    #[test]
    fn test_keyword_density_for_declared_keywords() {
        let mut page = complete_page();
        page.seo_metadata.keywords = vec!["running shoes".to_string(), "Sale".to_string()];
        let text = "Running shoes on sale. Our running shoes are light, durable and comfortable.";
        let report = audit_page(&page, &doc(vec![rich(text)]), &paths(&[]), 200);

        assert_eq!(report.word_count, 12);
        // Two two-word phrase hits out of twelve words
        assert_eq!(report.keyword_density["running shoes"], 33.33);
        assert_eq!(report.keyword_density["sale"], 8.33);
    }

    #[test]
    fn test_keyword_density_falls_back_to_top_terms() {
        let text = "garden tools garden hose garden gloves tools";
        let report = audit_page(&complete_page(), &doc(vec![rich(text)]), &paths(&[]), 200);
        let terms: Vec<&str> = report.keyword_density.keys().map(String::as_str).collect();
        assert_eq!(terms, ["garden", "gloves", "hose", "tools"]);
        assert_eq!(report.keyword_density["garden"], 42.86);
    }

    //
    // SERVICE
    //

    struct Fixture {
        audits: SeoAuditService,
        content: ContentService,
        store: Arc<MemoryStore>,
        tree: SharedTree,
        events: broadcast::Receiver<SiteEvent>,
    }

    async fn fixture() -> Fixture {
        let mut home = PageRecord::new_with_id("home", "Home", "/", None);
        home.seo_metadata.title = Some("Home".into());
        let about = PageRecord::new_with_id("about", "About", "/about", Some("home".into()));
        let mut trash = PageRecord::new_with_id("trash", "Old", "/old", Some("home".into()));
        trash.is_deleted = true;

        let store = Arc::new(MemoryStore::with_pages(vec![home, about, trash]).await);
        let tree: SharedTree = Arc::new(RwLock::new(PageTree::from_records(
            store.list_pages().await.unwrap(),
        )));
        let (tx, events) = broadcast::channel(64);
        let content = ContentService::new(store.clone(), tree.clone(), tx.clone());
        let audits = SeoAuditService::new(store.clone(), tree.clone(), content.clone(), 200, tx);
        Fixture {
            audits,
            content,
            store,
            tree,
            events,
        }
    }

    #[tokio::test]
    async fn test_run_audit_persists_report_and_emits_event() -> Result<()> {
        let mut f = fixture().await;
        f.content
            .add_block("home", block(BlockType::ProductShowcase, json!({"href": "/about"})))
            .await?;

        let report = f.audits.run_audit("home").await?;
        assert_eq!(report.broken_links, 0);
        assert_eq!(report.missing_tags, ["description", "og:image", "h1-unique"]);
        assert_eq!(report.score, SeoScore::Warning);

        let stored = f.audits.list_reports().await?;
        assert_eq!(stored, vec![report.clone()]);

        let mut saw_audit = false;
        while let Ok(event) = f.events.try_recv() {
            if let SiteEvent::AuditCompleted { page_id, score } = event {
                assert_eq!(page_id, "home");
                assert_eq!(score, SeoScore::Warning);
                saw_audit = true;
            }
        }
        assert!(saw_audit);
        Ok(())
    }

    #[tokio::test]
    async fn test_link_to_soft_deleted_page_is_broken() -> Result<()> {
        let f = fixture().await;
        f.content
            .add_block("about", block(BlockType::ProductShowcase, json!({"href": "/old"})))
            .await?;
        let report = f.audits.run_audit("about").await?;
        assert_eq!(report.broken_links, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_audit_of_deleted_or_unknown_page_rejected() {
        let f = fixture().await;
        assert_eq!(
            f.audits.run_audit("trash").await.unwrap_err(),
            SiteError::page_deleted("trash")
        );
        assert_eq!(
            f.audits.run_audit("ghost").await.unwrap_err(),
            SiteError::page_not_found("ghost")
        );
    }

    #[tokio::test]
    async fn test_failed_read_keeps_previous_report() -> Result<()> {
        let f = fixture().await;
        let first = f.audits.run_audit("about").await?;

        // A fresh session has nothing cached, so the content read hits the store
        let (tx, _) = broadcast::channel(8);
        let cold_content = ContentService::new(f.store.clone(), f.tree.clone(), tx.clone());
        let cold = SeoAuditService::new(f.store.clone(), f.tree.clone(), cold_content, 200, tx);

        f.store.set_offline(true);
        let err = cold.run_audit("about").await.unwrap_err();
        assert!(matches!(err, SiteError::BackingStore(_)));
        f.store.set_offline(false);

        let stored = f.store.list_seo_reports().await?;
        assert_eq!(stored, vec![first]);
        Ok(())
    }

    #[tokio::test]
    async fn test_global_audit_covers_active_pages_only() -> Result<()> {
        let f = fixture().await;
        let reports = f.audits.run_global_audit().await?;
        let ids: Vec<&str> = reports.iter().map(|r| r.page_id.as_str()).collect();
        assert_eq!(ids, ["home", "about"]);
        assert_eq!(f.audits.list_reports().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_global_audit_skips_failing_pages() -> Result<()> {
        let f = fixture().await;
        f.store.set_offline(true);
        let reports = f.audits.run_global_audit().await?;
        f.store.set_offline(false);
        assert!(reports.is_empty());
        assert!(f.audits.list_reports().await?.is_empty());
        Ok(())
    }
}
