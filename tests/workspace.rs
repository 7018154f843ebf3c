mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, test_config, write_note, TopicProvider};
use memory_harness::concurrency::WriteOutcome;
use memory_harness::error::WorkspaceError;
use memory_harness::models::{ChangeFrame, ChangeKind, SearchResults, TagCount};
use memory_harness::workspace::Workspace;
use tempfile::TempDir;

fn committed(outcome: WriteOutcome) -> i64 {
    match outcome {
        WriteOutcome::Committed { version } => version,
        other => panic!("expected commit, got {:?}", other),
    }
}

fn literal(results: SearchResults) -> Vec<memory_harness::models::LiteralHit> {
    match results {
        SearchResults::Literal(hits) => hits,
        other => panic!("expected literal results, got {:?}", other),
    }
}

#[tokio::test]
async fn test_write_search_tag_and_notify() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("notes/notes")).unwrap();
    let ws = Workspace::open(test_config(&tmp, true)).await.unwrap();
    ws.start().await.unwrap();
    let (_id, mut frames) = ws.events().subscribe();

    let v1 = committed(
        ws.write("notes/today.md", "# Today\nhello #work", None)
            .await
            .unwrap(),
    );
    assert!(v1 > 0);

    let hits = literal(ws.search_literal("hello"));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "notes/today.md");
    assert_eq!(hits[0].matches[0].line, 2);
    assert_eq!(
        ws.tags(),
        vec![TagCount {
            name: "work".to_string(),
            count: 1
        }]
    );

    let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("no change frame within 5s")
        .unwrap();
    assert_eq!(frame, ChangeFrame::file_change(ChangeKind::Add, "notes/today.md"));

    committed(ws.write("notes/today.md", "# Today\nbye", None).await.unwrap());
    assert!(literal(ws.search_literal("hello")).is_empty());
    assert!(ws.tags().is_empty());

    ws.stop().await;
}

#[tokio::test]
async fn test_stale_write_reports_conflict() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(test_config(&tmp, false)).await.unwrap();
    ws.start().await.unwrap();

    let v1 = committed(ws.write("a.md", "x", None).await.unwrap());
    let v2 = committed(ws.write("a.md", "y", Some(v1)).await.unwrap());
    assert!(v2 > v1);

    let outcome = ws.write("a.md", "z", Some(v1)).await.unwrap();
    assert_eq!(
        outcome,
        WriteOutcome::Conflict {
            server_content: "y".to_string(),
            server_version: v2,
        }
    );
    assert_eq!(ws.read("a.md").await.unwrap().content, "y");
}

#[tokio::test]
async fn test_external_edit_is_indexed_once() {
    let tmp = TempDir::new().unwrap();
    write_note(&tmp, "journal.md", "# Journal\nquiet day");
    let ws = Workspace::open(test_config(&tmp, true)).await.unwrap();
    ws.start().await.unwrap();
    let (_id, mut frames) = ws.events().subscribe();

    for i in 0..5 {
        write_note(&tmp, "journal.md", &format!("# Journal\nburst {} zeppelin", i));
    }

    let indexed = eventually(Duration::from_secs(5), || {
        let ws = ws.clone();
        async move { !literal(ws.search_literal("burst 4")).is_empty() }
    })
    .await;
    assert!(indexed, "external edit never reached the index");

    let first = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.path, "journal.md");
    assert_eq!(first.event, ChangeKind::Change);

    // Coalesced: no second frame for the same burst.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(frames.try_recv().is_err());

    ws.stop().await;
}

async fn next_frame(frames: &mut tokio::sync::mpsc::Receiver<ChangeFrame>) -> ChangeFrame {
    tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("no change frame within 5s")
        .unwrap()
}

#[tokio::test]
async fn test_local_edit_reports_change() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(test_config(&tmp, true)).await.unwrap();
    ws.start().await.unwrap();
    let (_id, mut frames) = ws.events().subscribe();

    let v1 = committed(ws.write("draft.md", "first", None).await.unwrap());
    assert_eq!(
        next_frame(&mut frames).await,
        ChangeFrame::file_change(ChangeKind::Add, "draft.md")
    );

    committed(ws.write("draft.md", "second", Some(v1)).await.unwrap());
    assert_eq!(
        next_frame(&mut frames).await,
        ChangeFrame::file_change(ChangeKind::Change, "draft.md")
    );

    ws.stop().await;
}

#[tokio::test]
async fn test_rename_over_existing_reports_change() {
    let tmp = TempDir::new().unwrap();
    write_note(&tmp, "journal.md", "# Journal\nbefore");
    let ws = Workspace::open(test_config(&tmp, true)).await.unwrap();
    ws.start().await.unwrap();
    let (_id, mut frames) = ws.events().subscribe();

    // Editor-style save: write a sibling temp file, then rename it over.
    let notes = tmp.path().join("notes");
    std::fs::write(notes.join(".journal.md.swp"), "# Journal\nafter").unwrap();
    std::fs::rename(notes.join(".journal.md.swp"), notes.join("journal.md")).unwrap();

    assert_eq!(
        next_frame(&mut frames).await,
        ChangeFrame::file_change(ChangeKind::Change, "journal.md")
    );
    assert_eq!(literal(ws.search_literal("after")).len(), 1);

    ws.stop().await;
}

#[tokio::test]
async fn test_document_written_during_reindex_survives() {
    let tmp = TempDir::new().unwrap();
    for i in 0..300 {
        write_note(&tmp, &format!("bulk/{:03}.md", i), &format!("bulk note {}", i));
    }
    let ws = Workspace::open(test_config(&tmp, false)).await.unwrap();
    ws.start().await.unwrap();

    let crawler = ws.clone();
    let crawl = tokio::spawn(async move { crawler.reindex().await });
    committed(ws.write("fresh.md", "freshly written marmalade", None).await.unwrap());
    crawl.await.unwrap().unwrap();

    let hits = literal(ws.search_literal("marmalade"));
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "fresh.md");
    assert_eq!(ws.stats().await.unwrap().index.documents, 301);
}

#[tokio::test]
async fn test_external_delete_unlinks() {
    let tmp = TempDir::new().unwrap();
    write_note(&tmp, "gone.md", "# Gone\nephemeral words");
    let ws = Workspace::open(test_config(&tmp, true)).await.unwrap();
    ws.start().await.unwrap();
    let (_id, mut frames) = ws.events().subscribe();

    std::fs::remove_file(tmp.path().join("notes/gone.md")).unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame, ChangeFrame::file_change(ChangeKind::Unlink, "gone.md"));
    assert!(literal(ws.search_literal("ephemeral")).is_empty());

    ws.stop().await;
}

#[tokio::test]
async fn test_crawl_indexes_existing_corpus() {
    let tmp = TempDir::new().unwrap();
    write_note(&tmp, "projects/plan.md", "# Plan\nShip it. #project");
    write_note(&tmp, "daily/2024-01-01.md", "Worked on [[plan]] today. #project");
    write_note(&tmp, ".obsidian/cache.md", "hidden #project");
    write_note(&tmp, "readme.txt", "not managed #project");

    let ws = Workspace::open(test_config(&tmp, false)).await.unwrap();
    ws.start().await.unwrap();

    let stats = ws.stats().await.unwrap();
    assert_eq!(stats.index.documents, 2);
    assert!(stats.index.ready);

    assert_eq!(ws.tags()[0].count, 2);
    let files = ws.files_for_tag("project");
    assert_eq!(files[0].path, "daily/2024-01-01.md");
    assert_eq!(files[1].title, "Plan");

    let backlinks = ws.backlinks("projects/plan.md").unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].path, "daily/2024-01-01.md");
    assert_eq!(backlinks[0].line, 1);

    let resolved = ws.resolve_wikilink("Plan");
    assert!(resolved.found);
    assert_eq!(resolved.path.as_deref(), Some("projects/plan.md"));
    assert!(!ws.resolve_wikilink("nowhere").found);

    let tree = ws.tree().await.unwrap();
    let names: Vec<&str> = tree.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["daily", "projects"]);
}

#[tokio::test]
async fn test_bm25_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    write_note(&tmp, "a.md", "rust rust ownership");
    write_note(&tmp, "b.md", "rust borrow checker lifetimes and more words here");
    write_note(&tmp, "c.md", "gardening tomatoes");
    let ws = Workspace::open(test_config(&tmp, false)).await.unwrap();
    ws.start().await.unwrap();

    let first = ws.search_bm25("rust");
    let second = ws.search_bm25("rust");
    assert_eq!(first, second);
    match first {
        SearchResults::Ranked(hits) => {
            let order: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
            assert_eq!(order, vec!["a.md", "b.md"]);
        }
        other => panic!("expected ranked results, got {:?}", other),
    }
}

#[tokio::test]
async fn test_sandbox_rejects_escape() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(test_config(&tmp, false)).await.unwrap();
    assert!(matches!(
        ws.read("../../etc/passwd.md").await,
        Err(WorkspaceError::InvalidPath(_))
    ));
    assert!(matches!(
        ws.write("../escape.md", "x", None).await,
        Err(WorkspaceError::InvalidPath(_))
    ));
    assert!(!tmp.path().join("escape.md").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_sandbox_rejects_symlink_out_of_root() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(test_config(&tmp, false)).await.unwrap();
    let outside = tmp.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    std::os::unix::fs::symlink(&outside, tmp.path().join("notes/link")).unwrap();

    assert!(matches!(
        ws.write("link/pwned.md", "x", None).await,
        Err(WorkspaceError::InvalidPath(_))
    ));
    assert!(matches!(
        ws.read("link/pwned.md").await,
        Err(WorkspaceError::InvalidPath(_))
    ));
    assert!(!outside.join("pwned.md").exists());
}

#[tokio::test]
async fn test_vector_search_disabled_by_default() {
    let tmp = TempDir::new().unwrap();
    let ws = Workspace::open(test_config(&tmp, false)).await.unwrap();
    assert!(matches!(
        ws.search_vector("anything", None).await,
        Err(WorkspaceError::EmbeddingsDisabled)
    ));
}

#[tokio::test]
async fn test_semantic_search_and_invalidation() {
    let tmp = TempDir::new().unwrap();
    write_note(&tmp, "rust.md", "# Rust\nrust rust ownership");
    write_note(&tmp, "python.md", "# Python\npython notebooks");
    write_note(&tmp, "food.md", "# Food\ncooking pasta");

    let provider = Arc::new(TopicProvider::new());
    let ws = Workspace::open_with_provider(test_config(&tmp, false), provider.clone())
        .await
        .unwrap();
    ws.start().await.unwrap();

    let drained = eventually(Duration::from_secs(5), || {
        let ws = ws.clone();
        async move { ws.pending_embeddings().await.unwrap().is_empty() }
    })
    .await;
    assert!(drained, "startup backfill did not finish");

    match ws.search_vector("rust", Some(2)).await.unwrap() {
        SearchResults::Semantic(hits) => {
            assert_eq!(hits.len(), 2);
            assert_eq!(hits[0].path, "rust.md");
            assert!(hits[0].score >= 99);
            assert_eq!(hits[0].snippet, "rust rust ownership");
            assert!(hits[1].score < hits[0].score);
        }
        other => panic!("expected semantic results, got {:?}", other),
    }

    // Cached: no provider call for an unchanged document.
    let before = provider.calls();
    ws.ensure_embedding("rust.md").await.unwrap();
    assert_eq!(provider.calls(), before);

    // Invalidated: the next ensure must call the provider even though the
    // content did not change.
    ws.invalidate_embedding("rust.md").await.unwrap();
    ws.ensure_embedding("rust.md").await.unwrap();
    assert_eq!(provider.calls(), before + 1);

    let stats = ws.stats().await.unwrap().embeddings;
    assert_eq!(stats.cached_count, 3);
    assert_eq!(stats.total_count, 3);
    assert_eq!(stats.coverage_percent, 100.0);
}
