//! Join construction and joined-row decoding, including self-joins.

mod common;

use common::{
    article_with_author_results, mock_context, register_entities, Article, MockAdapter, User,
};
use pretty_assertions::assert_eq;
use quarry::{alias_column, column, from, Error, JoinKind, PlanColumn};

// ============================================================================
// 1. Alias assignment and join conditions
// ============================================================================

#[test]
fn test_first_join_takes_alias_one() {
    register_entities();
    let adapter = MockAdapter::new();
    let ctx = mock_context("join-alias", &adapter);

    let query = from::<Article>(&ctx).inner_join("author");
    let plan = query.plan();

    assert_eq!(plan.root.alias, 0);
    assert_eq!(plan.root.entity, "articles");
    assert_eq!(plan.joins.len(), 1);

    let join = &plan.joins[0];
    assert_eq!(join.table.alias, 1);
    assert_eq!(join.table.entity, "users");
    assert_eq!(join.kind, JoinKind::Inner);
    assert_eq!(join.on.left, PlanColumn { alias: 0, column: "author_id".into() });
    assert_eq!(join.on.right, PlanColumn { alias: 1, column: "id".into() });

    // construction never reached the adapter
    assert_eq!(adapter.executed_count(), 0);
}

#[test]
fn test_has_many_join_links_pk_to_fk() {
    register_entities();
    let adapter = MockAdapter::new();
    let ctx = mock_context("join-hasmany", &adapter);

    let query = from::<User>(&ctx).inner_join("articles");
    let join = &query.plan().joins[0];
    assert_eq!(join.table.entity, "articles");
    assert_eq!(join.on.left, PlanColumn { alias: 0, column: "id".into() });
    assert_eq!(join.on.right, PlanColumn { alias: 1, column: "author_id".into() });
}

#[test]
fn test_filter_over_joined_column_composes_lazily() {
    register_entities();
    let adapter = MockAdapter::new();
    adapter.put_results("articles", article_with_author_results(2));
    let ctx = mock_context("join-filter", &adapter);

    let query = from::<Article>(&ctx)
        .inner_join("author")
        .r#where(column::<User>("name").ilike("foo"));
    assert_eq!(adapter.executed_count(), 0);

    query.each(|_| {}).unwrap();
    let plan = adapter.executed().pop().unwrap();
    match plan.filter.unwrap() {
        quarry::Predicate::Compare { column, .. } => {
            assert_eq!(column, PlanColumn { alias: 1, column: "name".into() });
        }
        other => panic!("expected a single comparison, got {other:?}"),
    }
}

#[test]
fn test_unknown_relation_member_surfaces_at_execution() {
    register_entities();
    let adapter = MockAdapter::new();
    let ctx = mock_context("join-unknown", &adapter);

    let err = from::<Article>(&ctx).inner_join("editor").each(|_| {}).unwrap_err();
    assert!(matches!(err, Error::Metadata(_)));
    assert_eq!(adapter.executed_count(), 0);
}

// ============================================================================
// 2. Joined belongs-to rows prime the relation cache
// ============================================================================

#[test]
fn test_joined_author_is_primed_without_a_second_query() {
    register_entities();
    let adapter = MockAdapter::new();
    adapter.put_results("articles", article_with_author_results(5));
    let ctx = mock_context("join-primed", &adapter);

    let mut counter = 0usize;
    from::<Article>(&ctx)
        .inner_join("author")
        .each(|article| {
            assert!(article.author.is_resolved());
            let author = article.author.get(&ctx).unwrap();
            assert_eq!(author.id, (counter + 100) as i64);
            assert_eq!(author.name, format!("User {}", counter + 100));
            counter += 1;
        })
        .unwrap();
    assert_eq!(counter, 5);
    // one plan for the whole loop: every get() hit the cache
    assert_eq!(adapter.executed_count(), 1);
}

#[test]
fn test_unjoined_author_stores_only_the_foreign_key() {
    register_entities();
    let adapter = MockAdapter::new();
    // root columns only; no alias-1 columns on the wire
    let mut results = article_with_author_results(1);
    results.columns.truncate(4);
    results.rows[0].truncate(4);
    adapter.put_results("articles", results);
    let ctx = mock_context("join-unjoined", &adapter);

    let article = from::<Article>(&ctx).first().unwrap().unwrap();
    assert_eq!(article.author.key(), Some(100.into()));
    assert!(!article.author.is_resolved());
}

// ============================================================================
// 3. Self-joins: labeled aliases
// ============================================================================

#[test]
fn test_self_join_builds_distinct_aliases() {
    register_entities();
    let adapter = MockAdapter::new();
    let ctx = mock_context("join-self", &adapter);

    let query = from::<User>(&ctx)
        .aliased("u")
        .inner_join_as("supervisor", "su")
        .r#where(alias_column("su", "name").ilike("boss%"));
    let plan = query.plan();

    assert_eq!(plan.root.alias, 0);
    assert_eq!(plan.root.label.as_deref(), Some("u"));
    let join = &plan.joins[0];
    assert_eq!(join.table.alias, 1);
    assert_eq!(join.table.entity, "users");
    assert_eq!(join.table.label.as_deref(), Some("su"));
    assert_eq!(join.on.left, PlanColumn { alias: 0, column: "supervisor_id".into() });
    assert_eq!(join.on.right, PlanColumn { alias: 1, column: "id".into() });

    match plan.filter.clone().unwrap() {
        quarry::Predicate::Compare { column, .. } => {
            assert_eq!(column, PlanColumn { alias: 1, column: "name".into() });
        }
        other => panic!("expected a single comparison, got {other:?}"),
    }
}

#[test]
fn test_type_based_column_on_self_join_is_ambiguous() {
    register_entities();
    let adapter = MockAdapter::new();
    let ctx = mock_context("join-ambiguous", &adapter);

    let err = from::<User>(&ctx)
        .aliased("u")
        .inner_join_as("supervisor", "su")
        .r#where(column::<User>("name").ilike("boss%"))
        .each(|_| {})
        .unwrap_err();
    match err {
        Error::Metadata(message) => assert!(message.contains("several aliases")),
        other => panic!("expected metadata error, got {other}"),
    }
    assert_eq!(adapter.executed_count(), 0);
}

#[test]
fn test_unknown_label_surfaces_at_execution() {
    register_entities();
    let adapter = MockAdapter::new();
    let ctx = mock_context("join-nolabel", &adapter);

    let err = from::<User>(&ctx)
        .inner_join_as("supervisor", "su")
        .r#where(alias_column("boss", "name").eq("x"))
        .each(|_| {})
        .unwrap_err();
    assert!(matches!(err, Error::Metadata(_)));
}
