use std::sync::Arc;

use librarium::db;
use librarium::domain::{DocumentStore, DomainError, StoreCollection, UniquenessConflict};
use librarium::infrastructure::{AppContext, Config, LocalCache, SeaOrmDocumentStore};
use librarium::models::{Book, GENRE_PALETTE, GenrePatch, NewBook};
use librarium::services::{
    AddOutcome, add_book, create_genre, delete_genre, list_genres, merge_genres, update_genre,
};

async fn setup_ctx() -> AppContext {
    let db = db::init_db("sqlite::memory:")
        .await
        .expect("Failed to init DB");
    let store: Arc<dyn DocumentStore> = Arc::new(SeaOrmDocumentStore::new(db));
    AppContext::new("reader-1", store, LocalCache::in_memory(), Config::default())
}

async fn add(ctx: &AppContext, title: &str, genres: &[&str]) -> Book {
    let new_book = NewBook {
        title: title.to_string(),
        author: "Someone".to_string(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        ..Default::default()
    };
    match add_book(ctx, new_book, None).await.expect("add failed") {
        AddOutcome::Added(book) => book,
        AddOutcome::Duplicate(check) => panic!("unexpected duplicate: {:?}", check),
    }
}

async fn book_genres(ctx: &AppContext, id: &str) -> Vec<String> {
    let doc = ctx
        .store
        .get(&ctx.user_id, StoreCollection::Books, id)
        .await
        .unwrap()
        .unwrap();
    doc.decode::<Book>().unwrap().genres
}

#[tokio::test]
async fn test_genre_names_are_unique_ignoring_case_and_spacing() {
    let ctx = setup_ctx().await;

    create_genre(&ctx, "Fiction", None).await.unwrap();

    for variant in ["fiction", "  FICTION  ", "Fiction"] {
        let err = create_genre(&ctx, variant, None).await.unwrap_err();
        assert!(
            matches!(err, DomainError::Uniqueness(UniquenessConflict::Name(_))),
            "{variant:?} should collide, got {err:?}"
        );
    }

    let scifi = create_genre(&ctx, "Science Fiction", None).await.unwrap();
    assert_eq!(scifi.normalized_name, "science fiction");
}

#[tokio::test]
async fn test_genre_colors_are_unique_and_auto_assigned() {
    let ctx = setup_ctx().await;

    let first = create_genre(&ctx, "Fiction", None).await.unwrap();
    assert_eq!(first.color, GENRE_PALETTE[0]);

    let second = create_genre(&ctx, "Poetry", None).await.unwrap();
    assert_eq!(second.color, GENRE_PALETTE[1]);

    let err = create_genre(&ctx, "Drama", Some(&GENRE_PALETTE[0].to_uppercase()))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Uniqueness(UniquenessConflict::Color(_))));
    assert!(err.to_string().contains("already in use"));

    let err = create_genre(&ctx, "Drama", Some("#fff")).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[tokio::test]
async fn test_update_genre_checks_other_genres_only() {
    let ctx = setup_ctx().await;
    let fiction = create_genre(&ctx, "Fiction", None).await.unwrap();
    let poetry = create_genre(&ctx, "Poetry", None).await.unwrap();

    // Renaming to its own name in another case is fine
    let renamed = update_genre(
        &ctx,
        &fiction.id,
        GenrePatch {
            name: Some("FICTION".to_string()),
            color: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.name, "FICTION");

    let err = update_genre(
        &ctx,
        &poetry.id,
        GenrePatch {
            name: Some("fiction".to_string()),
            color: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DomainError::Uniqueness(UniquenessConflict::Name(_))));

    let err = update_genre(
        &ctx,
        &poetry.id,
        GenrePatch {
            name: None,
            color: Some(fiction.color.clone()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DomainError::Uniqueness(UniquenessConflict::Color(_))));

    let err = update_genre(&ctx, "missing", GenrePatch::default()).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound));
}

#[tokio::test]
async fn test_delete_genre_cascades_to_books() {
    let ctx = setup_ctx().await;
    let fiction = create_genre(&ctx, "Fiction", None).await.unwrap();
    let poetry = create_genre(&ctx, "Poetry", None).await.unwrap();

    let a = add(&ctx, "A", &[&fiction.id]).await;
    let b = add(&ctx, "B", &[&fiction.id, &poetry.id]).await;
    let c = add(&ctx, "C", &[&poetry.id, &fiction.id]).await;
    let d = add(&ctx, "D", &[&poetry.id]).await;

    let touched = delete_genre(&ctx, &fiction.id).await.unwrap();
    assert_eq!(touched, 3);

    assert!(book_genres(&ctx, &a.id).await.is_empty());
    assert_eq!(book_genres(&ctx, &b.id).await, vec![poetry.id.clone()]);
    assert_eq!(book_genres(&ctx, &c.id).await, vec![poetry.id.clone()]);
    assert_eq!(book_genres(&ctx, &d.id).await, vec![poetry.id.clone()]);

    let genres = list_genres(&ctx).await;
    assert_eq!(genres.records.len(), 1);
    assert_eq!(genres.records[0].id, poetry.id);
}

#[tokio::test]
async fn test_delete_unreferenced_genre_returns_zero() {
    let ctx = setup_ctx().await;
    let lonely = create_genre(&ctx, "Lonely", None).await.unwrap();

    assert_eq!(delete_genre(&ctx, &lonely.id).await.unwrap(), 0);
    assert!(list_genres(&ctx).await.records.is_empty());

    let err = delete_genre(&ctx, &lonely.id).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound));
}

#[tokio::test]
async fn test_merge_genres_moves_books_and_counts() {
    let ctx = setup_ctx().await;
    let scifi = create_genre(&ctx, "Sci-Fi", None).await.unwrap();
    let sf = create_genre(&ctx, "Science Fiction", None).await.unwrap();

    let a = add(&ctx, "A", &[&scifi.id]).await;
    let b = add(&ctx, "B", &[&scifi.id, &sf.id]).await;

    let updated = merge_genres(&ctx, &scifi.id, &sf.id).await.unwrap();
    assert_eq!(updated, 2);

    assert_eq!(book_genres(&ctx, &a.id).await, vec![sf.id.clone()]);
    assert_eq!(book_genres(&ctx, &b.id).await, vec![sf.id.clone()]);

    let genres = list_genres(&ctx).await.records;
    assert_eq!(genres.len(), 1);
    assert_eq!(genres[0].book_count, 2);

    assert!(merge_genres(&ctx, &sf.id, &sf.id).await.is_err());
}

#[tokio::test]
async fn test_genre_listing_is_per_user() {
    let ctx = setup_ctx().await;
    create_genre(&ctx, "Fiction", None).await.unwrap();

    let other = ctx.for_user("reader-2");
    assert!(list_genres(&other).await.records.is_empty());
    // Same name is free for another user
    create_genre(&other, "Fiction", None).await.unwrap();
}
