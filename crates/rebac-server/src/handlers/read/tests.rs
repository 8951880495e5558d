//! Tests for the read handler.

use super::*;
use std::sync::Arc;

use rebac_storage::{DataStore, MemoryDataStore, StoredTuple};

async fn store_with(keys: &[(&str, &str, &str)]) -> Arc<MemoryDataStore> {
    let storage = Arc::new(MemoryDataStore::new());
    storage.create_store("store-1", "Test").await.unwrap();
    let tuples = keys
        .iter()
        .map(|(object, relation, user)| StoredTuple::from_keys(object, relation, user).unwrap())
        .collect();
    storage
        .write_tuples("store-1", tuples, vec![])
        .await
        .unwrap();
    storage
}

fn keys(response: &ReadResponse) -> Vec<(String, String, String)> {
    response
        .tuples
        .iter()
        .map(|t| (t.object(), t.relation.clone(), t.user()))
        .collect()
}

fn key(object: &str, relation: &str, user: &str) -> (String, String, String) {
    (object.to_string(), relation.to_string(), user.to_string())
}

async fn repo_store() -> Arc<MemoryDataStore> {
    store_with(&[
        ("repo:acme/web", "admin", "user:jose"),
        ("repo:acme/web", "owner", "user:jose"),
        ("repo:acme/web", "owner", "team:iam"),
        ("repo:acme/api", "admin", "user:jose"),
        ("org:acme", "member", "user:jose"),
    ])
    .await
}

// ============================================================
// Filters
// ============================================================

#[tokio::test]
async fn test_read_exact_tuple() {
    let query = ReadQuery::new(repo_store().await);

    let response = query
        .execute(
            &ReadRequest::new("store-1")
                .with_object("repo:acme/web")
                .with_relation("admin")
                .with_user("user:jose"),
        )
        .await
        .unwrap();

    assert_eq!(
        keys(&response),
        vec![key("repo:acme/web", "admin", "user:jose")]
    );
    assert!(response.continuation_token.is_none());
}

#[tokio::test]
async fn test_read_object_and_user_across_relations() {
    let query = ReadQuery::new(repo_store().await);

    let response = query
        .execute(
            &ReadRequest::new("store-1")
                .with_object("repo:acme/web")
                .with_user("user:jose"),
        )
        .await
        .unwrap();

    assert_eq!(
        keys(&response),
        vec![
            key("repo:acme/web", "admin", "user:jose"),
            key("repo:acme/web", "owner", "user:jose"),
        ]
    );
}

#[tokio::test]
async fn test_read_type_and_user_across_objects() {
    let query = ReadQuery::new(repo_store().await);

    let response = query
        .execute(
            &ReadRequest::new("store-1")
                .with_object("repo:")
                .with_relation("admin")
                .with_user("user:jose"),
        )
        .await
        .unwrap();

    assert_eq!(
        keys(&response),
        vec![
            key("repo:acme/api", "admin", "user:jose"),
            key("repo:acme/web", "admin", "user:jose"),
        ]
    );
}

#[tokio::test]
async fn test_read_object_regardless_of_user() {
    let query = ReadQuery::new(repo_store().await);

    let response = query
        .execute(
            &ReadRequest::new("store-1")
                .with_object("repo:acme/web")
                .with_relation("owner"),
        )
        .await
        .unwrap();

    assert_eq!(
        keys(&response),
        vec![
            key("repo:acme/web", "owner", "team:iam"),
            key("repo:acme/web", "owner", "user:jose"),
        ]
    );
}

#[tokio::test]
async fn test_empty_filter_reads_whole_store() {
    let query = ReadQuery::new(repo_store().await);

    let response = query.execute(&ReadRequest::new("store-1")).await.unwrap();

    assert_eq!(response.tuples.len(), 5);
    assert!(response.continuation_token.is_none());
}

// ============================================================
// Validation
// ============================================================

#[tokio::test]
async fn test_invalid_filters_are_rejected() {
    let query = ReadQuery::new(repo_store().await);
    let cases = [
        ("object without type", ReadRequest::new("store-1").with_object("acme/iam")),
        ("object is ':'", ReadRequest::new("store-1").with_object(":")),
        (
            "no object",
            ReadRequest::new("store-1")
                .with_relation("admin")
                .with_user("user:jon"),
        ),
        (
            "type only without user",
            ReadRequest::new("store-1")
                .with_object("repo:")
                .with_relation("writer"),
        ),
        (
            "relation only",
            ReadRequest::new("store-1").with_relation("writer"),
        ),
    ];

    for (name, request) in cases {
        let err = query.execute(&request).await.unwrap_err();
        assert!(
            matches!(err, ReadError::InvalidFilter { .. }),
            "{name}: unexpected {err:?}"
        );
    }
}

#[tokio::test]
async fn test_malformed_user_is_invalid_filter() {
    let query = ReadQuery::new(repo_store().await);

    let err = query
        .execute(
            &ReadRequest::new("store-1")
                .with_object("repo:acme/web")
                .with_user("jose"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReadError::InvalidFilter { .. }));
}

#[tokio::test]
async fn test_bad_continuation_token() {
    let query = ReadQuery::new(repo_store().await);

    let err = query
        .execute(
            &ReadRequest::new("store-1")
                .with_object("repo:acme/web")
                .with_continuation_token("foo"),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ReadError::InvalidContinuationToken);

    let err = query
        .execute(&ReadRequest::new("store-1").with_continuation_token("foo"))
        .await
        .unwrap_err();
    assert_eq!(err, ReadError::InvalidContinuationToken);
}

#[tokio::test]
async fn test_missing_store() {
    let query = ReadQuery::new(repo_store().await);

    let err = query.execute(&ReadRequest::new("nope")).await.unwrap_err();
    assert_eq!(
        err,
        ReadError::StoreNotFound {
            store_id: "nope".to_string()
        }
    );
}

// ============================================================
// Pagination
// ============================================================

#[tokio::test]
async fn test_read_all_pages_through_store() {
    let storage = store_with(&[
        ("repo:acme/foo", "admin", "user:jon"),
        ("repo:acme/bar", "admin", "user:jon"),
        ("repo:acme/baz", "admin", "user:jon"),
    ])
    .await;
    let query = ReadQuery::new(storage);

    let first = query
        .execute(&ReadRequest::new("store-1").with_page_size(1))
        .await
        .unwrap();
    assert_eq!(first.tuples.len(), 1);
    let token = first.continuation_token.clone().expect("more pages");

    let second = query
        .execute(&ReadRequest::new("store-1").with_continuation_token(token))
        .await
        .unwrap();
    assert_eq!(second.tuples.len(), 2);
    assert!(second.continuation_token.is_none());

    let mut objects: Vec<String> = first
        .tuples
        .iter()
        .chain(second.tuples.iter())
        .map(|t| t.object())
        .collect();
    objects.sort();
    assert_eq!(
        objects,
        vec!["repo:acme/bar", "repo:acme/baz", "repo:acme/foo"]
    );
}

#[tokio::test]
async fn test_default_page_size() {
    let storage = Arc::new(MemoryDataStore::new());
    storage.create_store("store-1", "Test").await.unwrap();
    let tuples = (0..(DEFAULT_READ_PAGE_SIZE + 5))
        .map(|i| StoredTuple::new("doc", format!("{i:03}"), "viewer", "user", "ann", None))
        .collect();
    storage.write_tuples("store-1", tuples, vec![]).await.unwrap();
    let query = ReadQuery::new(storage);

    let first = query.execute(&ReadRequest::new("store-1")).await.unwrap();
    assert_eq!(first.tuples.len(), DEFAULT_READ_PAGE_SIZE as usize);

    let rest = query
        .execute(
            &ReadRequest::new("store-1")
                .with_continuation_token(first.continuation_token.unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(rest.tuples.len(), 5);
    assert!(rest.continuation_token.is_none());
}
