//! Shared fixtures: a canned-result mock adapter and the test entity schema.
//!
//! The mock records every executed plan and serves results keyed by the
//! plan's root entity name, which is enough to exercise joins, lazy
//! relation resolution, and the lazy-construction law (no adapter contact
//! before execution).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use quarry::{
    Adapter, BelongsTo, Connection, Context, Entity, HasMany, PrimaryKey, QueryPlan, Result,
    ResultSet, Uri,
};

// ============================================================================
// Mock adapter
// ============================================================================

#[derive(Default)]
struct MockState {
    results: Mutex<HashMap<String, ResultSet>>,
    executed: Mutex<Vec<QueryPlan>>,
}

/// Adapter double: every connection shares the adapter's canned results and
/// plan log.
#[derive(Default)]
pub struct MockAdapter {
    state: Arc<MockState>,
}

impl MockAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `results` for plans rooted at `entity`.
    pub fn put_results(&self, entity: &str, results: ResultSet) {
        self.state.results.lock().unwrap().insert(entity.to_owned(), results);
    }

    /// Every plan executed so far, oldest first.
    pub fn executed(&self) -> Vec<QueryPlan> {
        self.state.executed.lock().unwrap().clone()
    }

    pub fn executed_count(&self) -> usize {
        self.state.executed.lock().unwrap().len()
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

impl Connection for MockConnection {
    fn execute(&self, plan: &QueryPlan) -> Result<ResultSet> {
        self.state.executed.lock().unwrap().push(plan.clone());
        let results = self.state.results.lock().unwrap();
        Ok(results.get(&plan.root.entity).cloned().unwrap_or_default())
    }
}

impl Adapter for MockAdapter {
    fn connect(&self, _uri: &Uri) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MockConnection { state: self.state.clone() }))
    }
}

/// Register `adapter` under `scheme` and produce a Context through the real
/// `setup` path. Each test uses its own scheme; the registrar is
/// process-wide.
pub fn mock_context(scheme: &str, adapter: &Arc<MockAdapter>) -> Context {
    quarry::register_adapter(scheme, adapter.clone()).unwrap();
    quarry::setup(&format!("{scheme}://mock")).unwrap()
}

// ============================================================================
// Test entity schema
// ============================================================================

#[derive(Debug, Default)]
pub struct Foo {
    pub id: PrimaryKey,
    pub string_value: String,
    pub nullable_string_value: Option<String>,
    pub int32_value: i32,
    pub double_value: f64,
}

#[derive(Debug, Default)]
pub struct Article {
    pub id: PrimaryKey,
    pub title: String,
    pub text: String,
    pub author: BelongsTo<User>,
}

#[derive(Debug, Default)]
pub struct User {
    pub id: PrimaryKey,
    pub name: String,
    pub articles: HasMany<Article>,
    pub supervisor: BelongsTo<User>,
}

impl Entity for Foo {}
impl Entity for Article {}
impl Entity for User {}

static REGISTER: Once = Once::new();

/// Register the schema exactly once per test process.
pub fn register_entities() {
    REGISTER.call_once(|| {
        quarry::entity::<Foo>("foos")
            .property("id", |f| &mut f.id)
            .property("string_value", |f| &mut f.string_value)
            .property("nullable_string_value", |f| &mut f.nullable_string_value)
            .property("int32_value", |f| &mut f.int32_value)
            .property("double_value", |f| &mut f.double_value)
            .register()
            .unwrap();

        quarry::entity::<Article>("articles")
            .property("id", |a| &mut a.id)
            .property("title", |a| &mut a.title)
            .property("text", |a| &mut a.text)
            .belongs_to("author", "author_id", |a| &mut a.author)
            .register()
            .unwrap();

        quarry::entity::<User>("users")
            .property("id", |u| &mut u.id)
            .property("name", |u| &mut u.name)
            .has_many("articles", "author_id", |u| &mut u.articles)
            .belongs_to("supervisor", "supervisor_id", |u| &mut u.supervisor)
            .register()
            .unwrap();
    });
}

// ============================================================================
// Canned results
// ============================================================================

/// `n` Foo rows: id 1..=n, nullable string present on even row indices.
pub fn foo_results(n: usize) -> ResultSet {
    ResultSet {
        columns: (0..5).map(|i| format!("t0_c{i}")).collect(),
        rows: (0..n)
            .map(|i| {
                vec![
                    Some(format!("{}", i + 1)),
                    Some(format!("String {i}")),
                    (i % 2 == 0).then(|| format!("Nullable String {i}")),
                    Some(format!("{}", (i as i32) * 2)),
                    Some(format!("{}", i as f64 * 123.4)),
                ]
            })
            .collect(),
    }
}

/// `n` Article rows joined with their author under alias 1, mirroring the
/// wire layout an adapter produces for `from(Article).inner_join(author)`.
pub fn article_with_author_results(n: usize) -> ResultSet {
    ResultSet {
        columns: vec![
            "t0_c0".into(), // Article id
            "t0_c1".into(), // Article title
            "t0_c2".into(), // Article text
            "t0_c3".into(), // Article author_id
            "t1_c0".into(), // User id
            "t1_c1".into(), // User name
        ],
        rows: (0..n)
            .map(|i| {
                vec![
                    Some(format!("{}", i + 1)),
                    Some(format!("Article {}", i + 1)),
                    Some(format!("Text for article {}.", i + 1)),
                    Some(format!("{}", i + 100)),
                    Some(format!("{}", i + 100)),
                    Some(format!("User {}", i + 100)),
                ]
            })
            .collect(),
    }
}

/// One User row: (id, name, supervisor_id).
pub fn user_results(id: i64, name: &str, supervisor_id: Option<i64>) -> ResultSet {
    ResultSet {
        columns: vec!["t0_c0".into(), "t0_c1".into(), "t0_c2".into()],
        rows: vec![vec![
            Some(id.to_string()),
            Some(name.to_owned()),
            supervisor_id.map(|s| s.to_string()),
        ]],
    }
}
