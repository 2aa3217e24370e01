use rowgraph::prelude::*;
use rowgraph::{MappingErrorKind, Record};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

fn author(id: &Value) -> Datum {
    let mut record = Record::new("Author");
    record.set("id", Datum::from(id.clone()));
    Datum::Object(ObjectRef::new(record))
}

/// Runs `selectAuthor` and `selectPosts` without caching, counting calls.
struct CountingExecutor {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingExecutor {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NestedQueryExecutor for CountingExecutor {
    fn run(&self, query_id: &str, params: &QueryParams) -> Result<Vec<Datum>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Custom("connection reset".into()));
        }
        let id = params.get("id").cloned().unwrap_or(Value::Null);
        match query_id {
            "selectAuthor" => Ok(vec![author(&id)]),
            "selectPosts" => Ok(vec![Datum::from(Value::Int(10)), Datum::from(Value::Int(11))]),
            other => Err(Error::Custom(format!("unknown query {other}"))),
        }
    }
}

fn blog_config(settings: Settings, author_mapping: FieldMapping) -> Configuration {
    Configuration::builder()
        .settings(settings)
        .types(
            TypeRegistry::new()
                .with(
                    TypeDescriptor::new("Blog")
                        .property("id", TargetType::I64)
                        .property("author", TargetType::object("Author"))
                        .property("posts", TargetType::list(TargetType::Any)),
                )
                .with(TypeDescriptor::new("Author").property("id", TargetType::I64)),
        )
        .plan(
            MappingPlan::builder("blog", TargetType::object("Blog"))
                .mapping(FieldMapping::id("id", "id"))
                .mapping(author_mapping)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

fn blog_rows() -> Vec<Box<dyn RowCursor>> {
    vec![Box::new(VecCursor::new(
        &["id", "author_id"],
        vec![
            vec![Value::BigInt(1), Value::BigInt(7)],
            vec![Value::BigInt(2), Value::BigInt(7)],
            vec![Value::BigInt(3), Value::Null],
        ],
    ))]
}

fn statement() -> StatementPlan {
    StatementPlan::new("selectBlogs").plan("blog")
}

#[test]
fn eager_query_runs_per_row() {
    let config = blog_config(
        Settings::default(),
        FieldMapping::query("author", "author_id", "selectAuthor"),
    );
    let executor = Arc::new(CountingExecutor::new());
    let statement = statement();

    let blogs = ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor.clone())
        .handle_result_sets(blog_rows())
        .unwrap()
        .into_single();

    // NULL parameter: the query is skipped and the property left unset.
    assert_eq!(executor.calls(), 2);
    let first = blogs[0].as_object().unwrap().get("author").unwrap();
    assert_eq!(first.as_object().unwrap().value("id"), Value::BigInt(7));
    assert_eq!(blogs[2].as_object().unwrap().get("author"), None);
}

#[test]
fn cached_result_is_installed_as_deferred_cell() {
    let config = blog_config(
        Settings::default(),
        FieldMapping::query("author", "author_id", "selectAuthor"),
    );
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let executor = Arc::new(CachingExecutor::new(move |_, params| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(vec![author(params.get("id").unwrap_or(&Value::Null))])
    }));
    let statement = statement();

    let blogs = ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor.clone())
        .handle_result_sets(blog_rows())
        .unwrap()
        .into_single();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let first = blogs[0].as_object().unwrap();
    let second = blogs[1].as_object().unwrap();
    assert!(first.get("author").unwrap().as_object().is_some());
    assert!(second.get("author").unwrap().as_deferred().is_some());

    // The cell serves the cached instance.
    let resolved = second.resolve("author").unwrap().unwrap();
    assert!(resolved
        .as_object()
        .unwrap()
        .ptr_eq(first.get("author").unwrap().as_object().unwrap()));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(executor.cached_len(), 1);
}

#[test]
fn lazy_query_runs_on_first_read() {
    let config = blog_config(
        Settings::default(),
        FieldMapping::query("author", "author_id", "selectAuthor").lazy(),
    );
    let executor = Arc::new(CountingExecutor::new());
    let statement = statement();

    let blogs = ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor.clone())
        .handle_result_sets(blog_rows())
        .unwrap()
        .into_single();
    assert_eq!(executor.calls(), 0);

    let blog = blogs[0].as_object().unwrap();
    let loaded = blog.resolve("author").unwrap().unwrap();
    assert_eq!(loaded.as_object().unwrap().value("id"), Value::BigInt(7));
    blog.resolve("author").unwrap();
    assert_eq!(executor.calls(), 1);
}

#[test]
fn lazy_flag_is_ignored_when_lazy_loading_is_disabled() {
    let config = blog_config(
        Settings::new().lazy_loading_enabled(false),
        FieldMapping::query("author", "author_id", "selectAuthor").lazy(),
    );
    let executor = Arc::new(CountingExecutor::new());
    let statement = statement();

    ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor.clone())
        .handle_result_sets(blog_rows())
        .unwrap();
    assert_eq!(executor.calls(), 2);
}

#[test]
fn eager_failure_aborts_the_pass() {
    let config = blog_config(
        Settings::default(),
        FieldMapping::query("author", "author_id", "selectAuthor"),
    );
    let statement = statement();

    let err = ResultSetMaterializer::new(&config, &statement)
        .with_executor(Arc::new(CountingExecutor::failing()))
        .handle_result_sets(blog_rows())
        .unwrap_err();
    assert_eq!(err.row_position(), Some(0));
    assert!(err.to_string().contains("selectAuthor"));
}

#[test]
fn lazy_failure_surfaces_on_read() {
    let config = blog_config(
        Settings::default(),
        FieldMapping::query("author", "author_id", "selectAuthor").lazy(),
    );
    let executor = Arc::new(CountingExecutor::failing());
    let statement = statement();

    let blogs = ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor.clone())
        .handle_result_sets(blog_rows())
        .unwrap()
        .into_single();

    let err = blogs[0].as_object().unwrap().resolve("author").unwrap_err();
    assert!(matches!(err, Error::NestedQuery(ref e) if e.query_id == "selectAuthor"));
    let again = blogs[0].as_object().unwrap().resolve("author").unwrap_err();
    assert!(matches!(again, Error::NestedQuery(ref e) if e.query_id == "selectAuthor"));
    assert_eq!(executor.calls(), 1);
}

#[test]
fn missing_executor_is_a_configuration_error() {
    let config = blog_config(
        Settings::default(),
        FieldMapping::query("author", "author_id", "selectAuthor"),
    );
    let statement = statement();

    let err = rowgraph::select_list(&config, &statement, blog_rows()).unwrap_err();
    assert_eq!(err.mapping_kind(), Some(MappingErrorKind::MissingExecutor));
}

#[test]
fn collection_target_keeps_every_row() {
    let config = blog_config(
        Settings::default(),
        FieldMapping::query("posts", "id", "selectPosts"),
    );
    let executor = Arc::new(CountingExecutor::new());
    let statement = statement();

    let blogs = ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor)
        .handle_result_sets(blog_rows())
        .unwrap()
        .into_single();
    assert_eq!(blogs[0].as_object().unwrap().list("posts").len(), 2);
}

#[test]
fn composite_parameters_and_constructor_queries() {
    let config = Configuration::builder()
        .types(
            TypeRegistry::new()
                .with(TypeDescriptor::new("Post").constructor(&[
                    ("id", TargetType::I64),
                    ("author", TargetType::object("Author")),
                ]))
                .with(TypeDescriptor::new("Author").property("id", TargetType::I64)),
        )
        .plan(
            MappingPlan::builder("post", TargetType::object("Post"))
                .mapping(FieldMapping::arg("id", "id", TargetType::I64))
                .mapping(
                    FieldMapping::query("author", "author_id", "selectAuthor")
                        .with_column_spec("{id=author_id,blog=blog_id}")
                        .unwrap()
                        .typed(TargetType::object("Author"))
                        .as_constructor_arg(),
                )
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let statement = StatementPlan::new("selectPosts").plan("post");
    let cursor = VecCursor::new(
        &["id", "author_id", "blog_id"],
        vec![
            vec![Value::BigInt(10), Value::BigInt(7), Value::BigInt(1)],
            vec![Value::BigInt(11), Value::BigInt(8), Value::Null],
        ],
    );
    let executor = Arc::new(CountingExecutor::new());

    let posts = ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor.clone())
        .handle_result_sets(vec![Box::new(cursor)])
        .unwrap()
        .into_single();

    let first = posts[0].as_object().unwrap().get("author").unwrap();
    assert_eq!(first.as_object().unwrap().value("id"), Value::BigInt(7));
    // A NULL component skips the query; the argument is NULL.
    assert!(posts[1].as_object().unwrap().get("author").unwrap().is_null());
    assert_eq!(executor.calls(), 1);
}

/// Records every query it runs as `queryId:param`.
#[derive(Default)]
struct RecordingExecutor {
    seen: Mutex<Vec<String>>,
}

impl NestedQueryExecutor for RecordingExecutor {
    fn run(&self, query_id: &str, params: &QueryParams) -> Result<Vec<Datum>> {
        let id = params.get("id").cloned().unwrap_or(Value::Null);
        self.seen
            .lock()
            .unwrap()
            .push(format!("{query_id}:{id}"));
        Ok(vec![author(&id)])
    }
}

#[test]
fn constructor_queries_run_in_declared_order() {
    let config = Configuration::builder()
        .types(
            TypeRegistry::new()
                .with(TypeDescriptor::new("Post").constructor(&[
                    ("editor", TargetType::object("Author")),
                    ("author", TargetType::object("Author")),
                ]))
                .with(TypeDescriptor::new("Author").property("id", TargetType::I64)),
        )
        .plan(
            MappingPlan::builder("post", TargetType::object("Post"))
                .mapping(
                    FieldMapping::query("editor", "editor_id", "selectEditor")
                        .typed(TargetType::object("Author"))
                        .as_constructor_arg(),
                )
                .mapping(
                    FieldMapping::query("author", "author_id", "selectAuthor")
                        .typed(TargetType::object("Author"))
                        .as_constructor_arg(),
                )
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let statement = StatementPlan::new("selectPosts").plan("post");
    let cursor = VecCursor::new(
        &["author_id", "editor_id"],
        vec![
            vec![Value::BigInt(7), Value::BigInt(5)],
            vec![Value::BigInt(8), Value::BigInt(6)],
        ],
    );
    let executor = Arc::new(RecordingExecutor::default());

    let posts = ResultSetMaterializer::new(&config, &statement)
        .with_executor(executor.clone())
        .handle_result_sets(vec![Box::new(cursor)])
        .unwrap()
        .into_single();

    assert_eq!(
        *executor.seen.lock().unwrap(),
        vec![
            "selectEditor:5",
            "selectAuthor:7",
            "selectEditor:6",
            "selectAuthor:8",
        ]
    );
    let post = posts[1].as_object().unwrap();
    let editor = post.get("editor").unwrap();
    assert_eq!(editor.as_object().unwrap().value("id"), Value::BigInt(6));
}
