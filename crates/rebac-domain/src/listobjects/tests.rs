//! ListObjects test suite.
//!
//! Covers both strategies, the result cap, the deadline, contextual tuples,
//! request validation and agreement between streaming and batch results.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use super::*;
use crate::model::{RelationDefinition, TypeDefinition, Userset};
use crate::resolver::tests::mocks::{MockModelReader, MockTupleReader};

type Query = ListObjectsQuery<MockTupleReader, MockModelReader>;

fn computed(relation: &str) -> Userset {
    Userset::ComputedUserset {
        relation: relation.to_string(),
    }
}

fn direct(name: &str, constraints: &[&str]) -> RelationDefinition {
    RelationDefinition::new(
        name,
        constraints.iter().map(|c| (*c).into()).collect(),
        Userset::This,
    )
}

async fn setup(types: Vec<TypeDefinition>) -> (Arc<MockTupleReader>, Arc<MockModelReader>) {
    let tuple_reader = Arc::new(MockTupleReader::new());
    let model_reader = Arc::new(MockModelReader::new());
    tuple_reader.add_store("store1").await;
    model_reader
        .add_type("store1", TypeDefinition::new("user", vec![]))
        .await;
    for type_def in types {
        model_reader.add_type("store1", type_def).await;
    }
    (tuple_reader, model_reader)
}

fn query(
    tuple_reader: &Arc<MockTupleReader>,
    model_reader: &Arc<MockModelReader>,
    options: ListObjectsOptions,
) -> Query {
    ListObjectsQuery::new(Arc::clone(tuple_reader), Arc::clone(model_reader), options)
}

fn request(object_type: &str, relation: &str, user: &str) -> ListObjectsRequest {
    ListObjectsRequest::new("store1", object_type, relation, user)
}

fn set(objects: &[&str]) -> HashSet<String> {
    objects.iter().map(|o| o.to_string()).collect()
}

fn as_set(objects: Vec<String>) -> HashSet<String> {
    let len = objects.len();
    let objects: HashSet<String> = objects.into_iter().collect();
    assert_eq!(objects.len(), len, "objects must not repeat");
    objects
}

fn repo_model() -> Vec<TypeDefinition> {
    vec![TypeDefinition::new("repo", vec![direct("admin", &["user"])])]
}

fn folder_document_model() -> Vec<TypeDefinition> {
    vec![
        TypeDefinition::new("folder", vec![direct("viewer", &["user"])]),
        TypeDefinition::new(
            "document",
            vec![
                direct("parent", &["folder"]),
                RelationDefinition::new(
                    "viewer",
                    vec![],
                    Userset::TupleToUserset {
                        tupleset: "parent".to_string(),
                        computed_userset: "viewer".to_string(),
                    },
                ),
            ],
        ),
    ]
}

fn org_model() -> Vec<TypeDefinition> {
    vec![TypeDefinition::new(
        "org",
        vec![
            direct("blocked", &["user"]),
            RelationDefinition::new(
                "admin",
                vec!["user".into()],
                Userset::Exclusion {
                    base: Box::new(Userset::This),
                    subtract: Box::new(computed("blocked")),
                },
            ),
        ],
    )]
}

/// Teams, folders and documents with unions, tuple-to-userset, an
/// intersection and an exclusion.
fn mixed_model() -> Vec<TypeDefinition> {
    vec![
        TypeDefinition::new("team", vec![direct("member", &["user", "team#member"])]),
        TypeDefinition::new("folder", vec![direct("viewer", &["user", "team#member"])]),
        TypeDefinition::new(
            "document",
            vec![
                direct("parent", &["folder"]),
                direct("owner", &["user"]),
                direct("banned", &["user"]),
                RelationDefinition::new(
                    "viewer",
                    vec!["user".into(), "user:*".into()],
                    Userset::Union {
                        children: vec![
                            Userset::This,
                            computed("owner"),
                            Userset::TupleToUserset {
                                tupleset: "parent".to_string(),
                                computed_userset: "viewer".to_string(),
                            },
                        ],
                    },
                ),
                RelationDefinition::new(
                    "can_read",
                    vec![],
                    Userset::Exclusion {
                        base: Box::new(computed("viewer")),
                        subtract: Box::new(computed("banned")),
                    },
                ),
                RelationDefinition::new(
                    "editor",
                    vec![],
                    Userset::Intersection {
                        children: vec![
                            computed("owner"),
                            Userset::TupleToUserset {
                                tupleset: "parent".to_string(),
                                computed_userset: "viewer".to_string(),
                            },
                        ],
                    },
                ),
            ],
        ),
    ]
}

async fn seed_mixed(tuples: &MockTupleReader) {
    tuples.add("store1", "team:t", "member", "user:alice").await;
    tuples.add("store1", "folder:f", "viewer", "team:t#member").await;
    tuples.add("store1", "folder:f", "viewer", "user:bob").await;
    tuples.add("store1", "document:1", "parent", "folder:f").await;
    tuples.add("store1", "document:2", "parent", "folder:f").await;
    tuples.add("store1", "document:2", "banned", "user:alice").await;
    tuples.add("store1", "document:3", "owner", "user:alice").await;
    tuples.add("store1", "document:4", "owner", "user:bob").await;
    tuples.add("store1", "document:4", "parent", "folder:f").await;
    tuples.add("store1", "document:5", "viewer", "user:alice").await;
    tuples.add("store1", "document:6", "viewer", "user:*").await;
}

/// Sink that records every object it receives.
#[derive(Default)]
struct RecordingSink {
    objects: Vec<String>,
}

#[async_trait]
impl ListObjectsSink for RecordingSink {
    async fn send(&mut self, object: String) -> DomainResult<()> {
        self.objects.push(object);
        Ok(())
    }
}

/// Sink whose client has gone away.
struct ClosedSink;

#[async_trait]
impl ListObjectsSink for ClosedSink {
    async fn send(&mut self, _object: String) -> DomainResult<()> {
        Err(DomainError::StreamClosed)
    }
}

/// Sink that takes `delay` to accept each object.
struct SlowSink {
    delay: Duration,
    objects: Vec<String>,
}

#[async_trait]
impl ListObjectsSink for SlowSink {
    async fn send(&mut self, object: String) -> DomainResult<()> {
        tokio::time::sleep(self.delay).await;
        self.objects.push(object);
        Ok(())
    }
}

// ========== Section 1: Result Cap ==========

#[tokio::test]
async fn test_cap_applies_to_stored_and_contextual_objects() {
    let (tuples, models) = setup(repo_model()).await;
    tuples.add("store1", "repo:1", "admin", "user:alice").await;
    tuples.add("store1", "repo:2", "admin", "user:alice").await;
    let request = request("repo", "admin", "user:alice").with_contextual_tuples(vec![
        ContextualTuple::new("user:alice", "admin", "repo:3"),
    ]);
    let all = set(&["repo:1", "repo:2", "repo:3"]);
    let query = query(&tuples, &models, ListObjectsOptions::default().with_max_results(2));

    let mut sink = RecordingSink::default();
    let summary = query.execute_streamed(&request, &mut sink).await.unwrap();
    assert_eq!(summary.count, 3);
    assert_eq!(summary.strategy, Some(ListObjectsStrategy::ReverseExpand));
    assert!(!summary.truncated);
    assert_eq!(as_set(sink.objects), all);

    let result = query.execute(&request).await.unwrap();
    assert_eq!(result.objects.len(), 2);
    assert!(result.truncated);
    assert!(as_set(result.objects).is_subset(&all));
}

#[tokio::test]
async fn test_cap_applies_to_tuple_to_userset_chain() {
    let (tuples, models) = setup(folder_document_model()).await;
    tuples.add("store1", "folder:x", "viewer", "user:alice").await;
    for id in 1..=3 {
        tuples
            .add("store1", &format!("document:{id}"), "parent", "folder:x")
            .await;
    }
    let all = set(&["document:1", "document:2", "document:3"]);

    let capped = query(&tuples, &models, ListObjectsOptions::default().with_max_results(2))
        .execute(&request("document", "viewer", "user:alice"))
        .await
        .unwrap();
    assert_eq!(capped.objects.len(), 2);
    assert_eq!(capped.strategy, Some(ListObjectsStrategy::ReverseExpand));
    assert!(as_set(capped.objects).is_subset(&all));

    let unbounded = query(&tuples, &models, ListObjectsOptions::default().with_max_results(0))
        .execute(&request("document", "viewer", "user:alice"))
        .await
        .unwrap();
    assert!(!unbounded.truncated);
    assert_eq!(as_set(unbounded.objects), all);
}

#[tokio::test]
async fn test_cap_applies_to_concurrent_checks() {
    let (tuples, models) = setup(org_model()).await;
    tuples.add("store1", "org:1", "admin", "user:charlie").await;
    tuples.add("store1", "org:2", "admin", "user:charlie").await;
    let request = request("org", "admin", "user:charlie").with_contextual_tuples(vec![
        ContextualTuple::new("user:charlie", "admin", "org:3"),
    ]);
    let all = set(&["org:1", "org:2", "org:3"]);

    let capped = query(&tuples, &models, ListObjectsOptions::default().with_max_results(2))
        .execute(&request)
        .await
        .unwrap();
    assert_eq!(capped.strategy, Some(ListObjectsStrategy::ConcurrentChecks));
    assert_eq!(capped.objects.len(), 2);
    assert!(as_set(capped.objects).is_subset(&all));

    let unbounded = query(&tuples, &models, ListObjectsOptions::default().with_max_results(0))
        .execute(&request)
        .await
        .unwrap();
    assert_eq!(as_set(unbounded.objects), all);
}

#[tokio::test]
async fn test_cap_above_result_count_returns_everything() {
    let (tuples, models) = setup(vec![TypeDefinition::new(
        "team",
        vec![direct("admin", &["user"])],
    )])
    .await;
    tuples.add("store1", "team:1", "admin", "user:bob").await;

    let result = query(&tuples, &models, ListObjectsOptions::default().with_max_results(2))
        .execute(&request("team", "admin", "user:bob"))
        .await
        .unwrap();
    assert_eq!(result.objects, vec!["team:1".to_string()]);
    assert!(!result.truncated);
}

// ========== Section 2: Deadline ==========

#[tokio::test]
async fn test_deadline_returns_empty_result_without_error() {
    let (tuples, models) = setup(repo_model()).await;
    tuples.add("store1", "repo:1", "admin", "user:alice").await;
    tuples.add("store1", "repo:2", "admin", "user:alice").await;
    tuples.set_read_delay(Duration::from_millis(500)).await;
    let query = query(
        &tuples,
        &models,
        ListObjectsOptions::default()
            .with_max_results(2)
            .with_deadline(Duration::from_millis(50)),
    );

    let started = std::time::Instant::now();
    let result = query
        .execute(&request("repo", "admin", "user:alice"))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(450));
    assert!(result.objects.is_empty());
    assert!(result.truncated);

    let mut sink = RecordingSink::default();
    let summary = query
        .execute_streamed(&request("repo", "admin", "user:alice"), &mut sink)
        .await
        .unwrap();
    assert_eq!(summary.count, 0);
    assert!(sink.objects.is_empty());
}

#[tokio::test]
async fn test_deadline_cuts_concurrent_checks_short() {
    let (tuples, models) = setup(org_model()).await;
    tuples.add("store1", "org:1", "admin", "user:charlie").await;
    tuples.set_read_delay(Duration::from_millis(500)).await;

    let result = query(
        &tuples,
        &models,
        ListObjectsOptions::default().with_deadline(Duration::from_millis(50)),
    )
    .execute(&request("org", "admin", "user:charlie"))
    .await
    .unwrap();
    assert!(result.objects.is_empty());
    assert!(result.truncated);
}

#[tokio::test]
async fn test_deadline_covers_store_and_model_lookup() {
    let (tuples, models) = setup(repo_model()).await;
    tuples.add("store1", "repo:1", "admin", "user:alice").await;
    tuples.set_store_lookup_delay(Duration::from_millis(500)).await;
    let query = query(
        &tuples,
        &models,
        ListObjectsOptions::default().with_deadline(Duration::from_millis(50)),
    );

    let started = std::time::Instant::now();
    let result = query
        .execute(&request("repo", "admin", "user:alice"))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(450));
    assert!(result.objects.is_empty());
    assert!(result.truncated);
    assert_eq!(result.strategy, None);
}

#[test]
fn test_zero_deadline_selects_default() {
    let options = ListObjectsOptions::default().with_deadline(Duration::ZERO);
    assert_eq!(options.effective_deadline(), DEFAULT_DEADLINE);
    let options = options.with_deadline(Duration::from_secs(3));
    assert_eq!(options.effective_deadline(), Duration::from_secs(3));
}

// ========== Section 3: Strategies ==========

#[tokio::test]
async fn test_exclusion_removes_blocked_objects() {
    let (tuples, models) = setup(org_model()).await;
    tuples.add("store1", "org:1", "admin", "user:charlie").await;
    tuples.add("store1", "org:2", "admin", "user:charlie").await;
    tuples.add("store1", "org:2", "blocked", "user:charlie").await;

    let result = query(&tuples, &models, ListObjectsOptions::default())
        .execute(&request("org", "admin", "user:charlie"))
        .await
        .unwrap();
    assert_eq!(result.objects, vec!["org:1".to_string()]);
}

#[tokio::test]
async fn test_mixed_model_resolves_every_relation() {
    let (tuples, models) = setup(mixed_model()).await;
    seed_mixed(&tuples).await;
    let query = query(&tuples, &models, ListObjectsOptions::default());

    let cases = [
        (
            "viewer",
            "user:alice",
            set(&[
                "document:1",
                "document:2",
                "document:3",
                "document:4",
                "document:5",
                "document:6",
            ]),
        ),
        (
            "can_read",
            "user:alice",
            set(&["document:1", "document:3", "document:4", "document:5", "document:6"]),
        ),
        ("editor", "user:alice", set(&[])),
        ("editor", "user:bob", set(&["document:4"])),
        ("viewer", "user:carol", set(&["document:6"])),
    ];

    for (relation, user, expected) in cases {
        let result = query
            .execute(&request("document", relation, user))
            .await
            .unwrap();
        assert_eq!(as_set(result.objects), expected, "{relation} for {user}");
    }
}

#[tokio::test]
async fn test_hybrid_candidates_agree_with_type_extent() {
    let (tuples, models) = setup(mixed_model()).await;
    seed_mixed(&tuples).await;
    let hybrid = query(&tuples, &models, ListObjectsOptions::default());
    let extent = query(
        &tuples,
        &models,
        ListObjectsOptions::default().with_hybrid_candidates(false),
    );

    for relation in ["can_read", "editor"] {
        for user in ["user:alice", "user:bob", "user:carol", "team:t#member"] {
            let request = request("document", relation, user);
            let narrowed = hybrid.execute(&request).await.unwrap();
            let full = extent.execute(&request).await.unwrap();
            assert_eq!(narrowed.strategy, Some(ListObjectsStrategy::ConcurrentChecks));
            assert_eq!(
                as_set(narrowed.objects),
                as_set(full.objects),
                "{relation} for {user}"
            );
        }
    }
}

#[tokio::test]
async fn test_only_type_extent_mode_scans_object_type() {
    let (tuples, models) = setup(mixed_model()).await;
    seed_mixed(&tuples).await;

    query(&tuples, &models, ListObjectsOptions::default())
        .execute(&request("document", "viewer", "user:alice"))
        .await
        .unwrap();
    query(&tuples, &models, ListObjectsOptions::default())
        .execute(&request("document", "can_read", "user:alice"))
        .await
        .unwrap();
    assert_eq!(tuples.type_scan_count(), 0);

    query(
        &tuples,
        &models,
        ListObjectsOptions::default().with_hybrid_candidates(false),
    )
    .execute(&request("document", "can_read", "user:alice"))
    .await
    .unwrap();
    assert_eq!(tuples.type_scan_count(), 1);
}

#[tokio::test]
async fn test_type_extent_includes_contextual_objects() {
    let (tuples, models) = setup(org_model()).await;
    tuples.add("store1", "org:1", "admin", "user:charlie").await;

    let result = query(
        &tuples,
        &models,
        ListObjectsOptions::default().with_hybrid_candidates(false),
    )
    .execute(
        &request("org", "admin", "user:charlie").with_contextual_tuples(vec![
            ContextualTuple::new("user:charlie", "admin", "org:9"),
        ]),
    )
    .await
    .unwrap();
    assert_eq!(as_set(result.objects), set(&["org:1", "org:9"]));
}

#[tokio::test]
async fn test_wildcard_tuples_grant_every_user() {
    let (tuples, models) = setup(vec![TypeDefinition::new(
        "document",
        vec![direct("viewer", &["user", "user:*"])],
    )])
    .await;
    tuples.add("store1", "document:1", "viewer", "user:*").await;
    tuples.add("store1", "document:2", "viewer", "user:alice").await;
    let query = query(&tuples, &models, ListObjectsOptions::default());

    let alice = query
        .execute(&request("document", "viewer", "user:alice"))
        .await
        .unwrap();
    assert_eq!(as_set(alice.objects), set(&["document:1", "document:2"]));

    let bob = query
        .execute(&request("document", "viewer", "user:bob"))
        .await
        .unwrap();
    assert_eq!(bob.objects, vec!["document:1".to_string()]);
}

#[tokio::test]
async fn test_group_cycles_terminate() {
    let (tuples, models) = setup(vec![
        TypeDefinition::new("group", vec![direct("member", &["user", "group#member"])]),
        TypeDefinition::new("document", vec![direct("viewer", &["group#member"])]),
    ])
    .await;
    tuples.add("store1", "group:a", "member", "group:b#member").await;
    tuples.add("store1", "group:b", "member", "group:a#member").await;
    tuples.add("store1", "group:b", "member", "user:alice").await;
    tuples.add("store1", "document:1", "viewer", "group:a#member").await;
    let query = query(&tuples, &models, ListObjectsOptions::default());

    let groups = query
        .execute(&request("group", "member", "user:alice"))
        .await
        .unwrap();
    assert_eq!(as_set(groups.objects), set(&["group:a", "group:b"]));

    let documents = query
        .execute(&request("document", "viewer", "user:alice"))
        .await
        .unwrap();
    assert_eq!(documents.objects, vec!["document:1".to_string()]);
}

#[tokio::test]
async fn test_userset_user_lists_objects_granted_to_the_set() {
    let (tuples, models) = setup(mixed_model()).await;
    seed_mixed(&tuples).await;

    let result = query(&tuples, &models, ListObjectsOptions::default())
        .execute(&request("document", "viewer", "team:t#member"))
        .await
        .unwrap();
    assert_eq!(
        as_set(result.objects),
        set(&["document:1", "document:2", "document:4"])
    );
}

// ========== Section 4: Streaming ==========

#[tokio::test]
async fn test_streaming_and_batch_agree() {
    let (tuples, models) = setup(mixed_model()).await;
    seed_mixed(&tuples).await;
    let query = query(&tuples, &models, ListObjectsOptions::default());

    for relation in ["viewer", "can_read", "editor"] {
        let request = request("document", relation, "user:alice");
        let mut sink = RecordingSink::default();
        let summary = query.execute_streamed(&request, &mut sink).await.unwrap();
        let batch = query.execute(&request).await.unwrap();

        assert_eq!(summary.count, sink.objects.len());
        assert_eq!(summary.strategy, batch.strategy);
        assert_eq!(as_set(sink.objects), as_set(batch.objects), "{relation}");
    }
}

#[tokio::test]
async fn test_repeated_requests_return_the_same_set() {
    let (tuples, models) = setup(mixed_model()).await;
    seed_mixed(&tuples).await;
    let query = query(&tuples, &models, ListObjectsOptions::default());
    let request = request("document", "can_read", "user:alice");

    let first = query.execute(&request).await.unwrap();
    let second = query.execute(&request).await.unwrap();
    assert_eq!(as_set(first.objects), as_set(second.objects));
}

#[tokio::test]
async fn test_sink_error_aborts_query() {
    let (tuples, models) = setup(repo_model()).await;
    tuples.add("store1", "repo:1", "admin", "user:alice").await;

    let result = query(&tuples, &models, ListObjectsOptions::default())
        .execute_streamed(&request("repo", "admin", "user:alice"), &mut ClosedSink)
        .await;
    assert!(matches!(result, Err(DomainError::StreamClosed)));
}

#[tokio::test]
async fn test_streaming_ignores_the_cap() {
    let (tuples, models) = setup(repo_model()).await;
    for id in 1..=4 {
        tuples
            .add("store1", &format!("repo:{id}"), "admin", "user:alice")
            .await;
    }
    let query = query(&tuples, &models, ListObjectsOptions::default().with_max_results(1));
    let request = request("repo", "admin", "user:alice");

    let mut sink = RecordingSink::default();
    let summary = query.execute_streamed(&request, &mut sink).await.unwrap();
    assert_eq!(summary.count, 4);
    assert!(!summary.truncated);
    assert_eq!(
        as_set(sink.objects),
        set(&["repo:1", "repo:2", "repo:3", "repo:4"])
    );

    let batch = query.execute(&request).await.unwrap();
    assert_eq!(batch.objects.len(), 1);
    assert!(batch.truncated);
}

#[tokio::test]
async fn test_count_excludes_send_cut_off_by_deadline() {
    let (tuples, models) = setup(repo_model()).await;
    for id in 1..=5 {
        tuples
            .add("store1", &format!("repo:{id}"), "admin", "user:alice")
            .await;
    }
    let query = query(
        &tuples,
        &models,
        ListObjectsOptions::default().with_deadline(Duration::from_millis(250)),
    );
    let mut sink = SlowSink {
        delay: Duration::from_millis(100),
        objects: Vec::new(),
    };

    let summary = query
        .execute_streamed(&request("repo", "admin", "user:alice"), &mut sink)
        .await
        .unwrap();
    assert!(summary.truncated);
    assert!(sink.objects.len() < 5);
    assert_eq!(summary.count, sink.objects.len());
}

// ========== Section 5: Errors ==========

#[tokio::test]
async fn test_storage_failure_is_reported() {
    let cases = [
        (repo_model(), "repo", true),
        (org_model(), "org", true),
        (org_model(), "org", false),
    ];

    for (model, object_type, hybrid_candidates) in cases {
        let (tuples, models) = setup(model).await;
        tuples
            .add("store1", &format!("{object_type}:1"), "admin", "user:alice")
            .await;
        tuples.fail_reads();

        let result = query(
            &tuples,
            &models,
            ListObjectsOptions::default().with_hybrid_candidates(hybrid_candidates),
        )
        .execute(&request(object_type, "admin", "user:alice"))
        .await;
        assert!(
            matches!(result, Err(DomainError::StorageError { .. })),
            "{object_type}: {result:?}"
        );
    }
}

#[tokio::test]
async fn test_validation_errors_precede_resolution() {
    let (tuples, models) = setup(repo_model()).await;
    tuples.add("store1", "repo:1", "admin", "user:alice").await;
    let query = query(&tuples, &models, ListObjectsOptions::default());

    let cases = [
        request("doc", "admin", "user:alice"),
        request("repo", "owner", "user:alice"),
        request("repo:1", "admin", "user:alice"),
        request("repo", "", "user:alice"),
        request("repo", "admin", "alice"),
        request("repo", "admin", "user:*"),
        request("repo", "admin", "bot:x"),
        request("repo", "admin", "repo:1#owner"),
        ListObjectsRequest::new("missing", "repo", "admin", "user:alice"),
        request("repo", "admin", "user:alice").with_model_id("nope"),
        request("repo", "admin", "user:alice").with_contextual_tuples(vec![ContextualTuple::new(
            "repo:2", "admin", "repo:3",
        )]),
        request("repo", "admin", "user:alice").with_contextual_tuples(vec![ContextualTuple::new(
            "user:alice",
            "admin",
            "repo",
        )]),
    ];

    for request in &cases {
        let err = query.execute(request).await.unwrap_err();
        assert!(err.is_validation(), "{request:?} gave {err:?}");
    }
    assert_eq!(tuples.read_count(), 0);
}

#[tokio::test]
async fn test_validation_error_kinds() {
    let (tuples, models) = setup(repo_model()).await;
    let query = query(&tuples, &models, ListObjectsOptions::default());

    let err = query
        .execute(&request("doc", "admin", "user:alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TypeNotFound { .. }));

    let err = query
        .execute(&request("repo", "owner", "user:alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::RelationNotFound { .. }));

    let err = query
        .execute(&request("repo", "admin", "user:*"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidUserFormat { .. }));

    let err = query
        .execute(&request("repo:1", "admin", "user:alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidObjectFormat { .. }));

    let err = query
        .execute(&request("repo", "admin", "user:alice").with_contextual_tuples(vec![
            ContextualTuple::new("repo:2", "admin", "repo:3"),
        ]))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidContextualTuple { .. }));

    let err = query
        .execute(&ListObjectsRequest::new("missing", "repo", "admin", "user:alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::StoreNotFound { .. }));

    let err = query
        .execute(&request("repo", "admin", "user:alice").with_model_id("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ModelNotFound { .. }));
}

#[tokio::test]
async fn test_model_version_is_honored() {
    let (tuples, models) = setup(repo_model()).await;
    tuples.add("store1", "repo:1", "admin", "user:alice").await;
    models
        .add_model(
            "store1",
            crate::model::AuthorizationModel::with_types(
                "1.1",
                vec![
                    TypeDefinition::new("user", vec![]),
                    TypeDefinition::new("repo", vec![direct("reader", &["user"])]),
                ],
            )
            .with_id("store1-model-2"),
        )
        .await;
    let query = query(&tuples, &models, ListObjectsOptions::default());

    let err = query
        .execute(&request("repo", "admin", "user:alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::RelationNotFound { .. }));

    let pinned = query
        .execute(&request("repo", "admin", "user:alice").with_model_id("store1-model-1"))
        .await
        .unwrap();
    assert_eq!(pinned.objects, vec!["repo:1".to_string()]);
}

// ========== Section 6: Properties ==========

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Admin and blocked tuples over a small id space.
fn org_tuples_strategy() -> impl Strategy<Value = (Vec<(u8, bool)>, Vec<u8>)> {
    (
        prop::collection::vec((0u8..12, any::<bool>()), 0..24),
        prop::collection::vec(0u8..12, 0..6),
    )
}

async fn seed_orgs(
    admins: &[(u8, bool)],
    blocked: &[u8],
) -> (Arc<MockTupleReader>, Arc<MockModelReader>) {
    let (tuples, models) = setup(org_model()).await;
    for (id, is_alice) in admins {
        let user = if *is_alice { "user:alice" } else { "user:bob" };
        tuples.add("store1", &format!("org:{id}"), "admin", user).await;
    }
    for id in blocked {
        tuples
            .add("store1", &format!("org:{id}"), "blocked", "user:alice")
            .await;
    }
    (tuples, models)
}

fn expected_orgs(admins: &[(u8, bool)], blocked: &[u8]) -> HashSet<String> {
    admins
        .iter()
        .filter(|(id, is_alice)| *is_alice && !blocked.contains(id))
        .map(|(id, _)| format!("org:{id}"))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_capped_results_are_a_subset_of_the_truth(
        (admins, blocked) in org_tuples_strategy(),
        cap in 0u32..6,
    ) {
        let truth = expected_orgs(&admins, &blocked);
        let result = block_on(async {
            let (tuples, models) = seed_orgs(&admins, &blocked).await;
            query(&tuples, &models, ListObjectsOptions::default().with_max_results(cap))
                .execute(&request("org", "admin", "user:alice"))
                .await
                .unwrap()
        });

        let objects = as_set(result.objects);
        prop_assert!(objects.is_subset(&truth));
        if cap == 0 {
            prop_assert_eq!(&objects, &truth);
        } else {
            prop_assert_eq!(objects.len(), truth.len().min(cap as usize));
        }
    }

    #[test]
    fn test_candidate_sources_agree(
        (admins, blocked) in org_tuples_strategy(),
    ) {
        let (narrowed, full) = block_on(async {
            let (tuples, models) = seed_orgs(&admins, &blocked).await;
            let request = request("org", "admin", "user:alice");
            let narrowed = query(&tuples, &models, ListObjectsOptions::default().with_max_results(0))
                .execute(&request)
                .await
                .unwrap();
            let full = query(
                &tuples,
                &models,
                ListObjectsOptions::default()
                    .with_max_results(0)
                    .with_hybrid_candidates(false),
            )
            .execute(&request)
            .await
            .unwrap();
            (narrowed, full)
        });

        prop_assert_eq!(as_set(narrowed.objects), as_set(full.objects));
    }
}
