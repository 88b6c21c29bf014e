#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rowkit::{
    ComponentHub, CustomConversions, JsonHolder, MaterializeError, MaterializerRegistry, QueryMethod, Row,
    row_mapper_fn,
};
use rowkit_db::{DbError, Params, QueryTemplate};
use rowkit_testing::{
    ActiveProfile, BootstrapError, InstanceState, SqliteLauncher, TestContext, TestDatabases, VendorTag,
    init_test_logging,
};

#[derive(Debug, PartialEq)]
struct Car {
    id: i64,
    model: String,
    specs: Option<JsonHolder>,
}

fn scripts_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/sql")
}

fn harness() -> Arc<TestDatabases> {
    TestDatabases::builder().launcher(SqliteLauncher).build()
}

fn template() -> QueryTemplate {
    let conversions = Arc::new(CustomConversions::with_json_holder());
    let mut builder = MaterializerRegistry::builder(Arc::new(ComponentHub::new()));
    builder
        .register_row_mapper(
            "car",
            row_mapper_fn(move |row: &Row, _| {
                let specs = conversions
                    .read_optional::<JsonHolder>(row.value(2)?)
                    .map_err(|e| MaterializeError::Strategy(e.into()))?;
                Ok(Car {
                    id: row.get_by_name("id")?,
                    model: row.get_by_name("model")?,
                    specs,
                })
            }),
        )
        .unwrap();
    QueryTemplate::new(Arc::new(builder.build()))
}

fn all_cars() -> QueryMethod {
    QueryMethod::new("SELECT id, model, specs FROM car ORDER BY id").with_row_mapper("car")
}

#[tokio::test]
async fn context_populates_schema_and_rolls_back() {
    init_test_logging();
    let harness = harness();
    let profile = ActiveProfile::new(VendorTag::Sqlite);
    let template = template();

    let mut ctx = TestContext::prepare(&harness, profile, "cars", &scripts_dir())
        .await
        .unwrap();
    assert_eq!(ctx.vendor(), VendorTag::Sqlite);
    assert_eq!(ctx.populate_report().executed, 4);
    assert_eq!(harness.state(VendorTag::Sqlite), InstanceState::Ready);

    let cars: Vec<Car> = template
        .query_for_list(ctx.conn(), &all_cars(), &Params::new())
        .await
        .unwrap();
    assert_eq!(
        cars,
        [
            Car {
                id: 1,
                model: "alpha".into(),
                specs: Some(JsonHolder::new(r#"{"doors": 3}"#)),
            },
            Car {
                id: 2,
                model: "beta".into(),
                specs: None,
            },
        ]
    );

    template
        .execute(
            ctx.conn(),
            "INSERT INTO car (id, model) VALUES (:id, :model)",
            &Params::new().bind("id", 3_i64).bind("model", "gamma"),
        )
        .await
        .unwrap();
    let inside: Vec<Car> = template
        .query_for_list(ctx.conn(), &all_cars(), &Params::new())
        .await
        .unwrap();
    assert_eq!(inside.len(), 3);
    ctx.finish().await.unwrap();

    // Same instance, fresh schema, no trace of the rolled-back insert.
    let first_url = harness
        .get_or_create(VendorTag::Sqlite)
        .await
        .unwrap()
        .data_source()
        .url()
        .to_owned();
    let mut ctx = TestContext::prepare(&harness, profile, "cars", &scripts_dir())
        .await
        .unwrap();
    assert_eq!(ctx.instance().data_source().url(), first_url);
    let cars: Vec<Car> = template
        .query_for_list(ctx.conn(), &all_cars(), &Params::new())
        .await
        .unwrap();
    assert_eq!(cars.len(), 2);
    ctx.finish().await.unwrap();
}

#[tokio::test]
async fn missing_script_is_io_error() {
    let harness = harness();
    let err = TestContext::prepare(&harness, ActiveProfile::default(), "no-such-test", &scripts_dir())
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Db(DbError::Io(_))));
}

#[tokio::test]
async fn failing_script_statement_is_reported() {
    let harness = harness();
    let err = TestContext::prepare(&harness, ActiveProfile::default(), "broken", &scripts_dir())
        .await
        .unwrap_err();
    match err {
        BootstrapError::Db(DbError::Script { index, .. }) => assert_eq!(index, 2),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn profile_without_launcher_fails() {
    let harness = harness();
    let err = TestContext::prepare(
        &harness,
        ActiveProfile::new(VendorTag::Oracle),
        "cars",
        &scripts_dir(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, BootstrapError::NoLauncher(VendorTag::Oracle)));
    assert_eq!(harness.state(VendorTag::Oracle), InstanceState::Unstarted);
}
