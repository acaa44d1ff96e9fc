//! Integration tests against a real PostgreSQL.
//!
//! Run with: cargo test -p migen --features test-postgres --test postgres
//!
//! Note: Requires Docker to be running.
#![cfg(feature = "test-postgres")]

use camino::Utf8PathBuf;
use jiff::Timestamp;
use migen::{
    DeclaredType, FieldKind, GenerateOptions, Mode, ModelDef, Outcome, PgInspector,
    RelationMapping, SchemaInspector, TableSpec, generate_migration, inspect,
};
use std::collections::BTreeSet;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::{Client, NoTls};
use tracing_subscriber::EnvFilter;

async fn start_postgres() -> (ContainerAsync<Postgres>, Client) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let container = Postgres::default().start().await.unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let (client, connection) = tokio_postgres::connect(
        &format!("host={host} port={port} user=postgres password=postgres dbname=postgres"),
        NoTls,
    )
    .await
    .unwrap();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {e}");
        }
    });
    (container, client)
}

fn temp_dir(test: &str) -> Utf8PathBuf {
    let dir = std::env::temp_dir().join(format!("migen-pg-{}-{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    Utf8PathBuf::from_path_buf(dir).unwrap()
}

fn models() -> Vec<ModelDef> {
    vec![
        ModelDef::new("Person")
            .field("id", DeclaredType::Integer.primary_key())
            .field("firstName", DeclaredType::String)
            .field("lastName", DeclaredType::String)
            .field("age", DeclaredType::Integer)
            .field("profile", DeclaredType::Object)
            .relation(
                "movies",
                RelationMapping::many_to_many("Person_Movie.personId", "Person_Movie.movieId")
                    .extra(["role"]),
            ),
        ModelDef::new("Movie")
            .field("id", DeclaredType::Integer.primary_key())
            .field("title", DeclaredType::String.required())
            .field("released", DeclaredType::Date)
            .field("poster", DeclaredType::Binary)
            .field("rating", DeclaredType::Number)
            .field("hidden", DeclaredType::Boolean),
    ]
}

fn options<'a>(client: &'a Client, dir: &Utf8PathBuf, mode: Mode, at: &str) -> GenerateOptions<'a> {
    GenerateOptions::builder()
        .models(models().into_iter().map(|m| Box::new(m) as migen::BoxedModel))
        .migrations_dir(dir.clone())
        .connection(client)
        .mode(mode)
        .timestamp(at.parse::<Timestamp>().unwrap())
        .build()
        .unwrap()
}

type Columns = Vec<(String, Option<BTreeSet<(String, FieldKind)>>)>;

async fn snapshot(client: &Client) -> Columns {
    let inspector = PgInspector::new(client);
    let live = inspect(&inspector, ["Person", "Movie", "Person_Movie"])
        .await
        .unwrap();
    live.into_iter()
        .map(|(name, table)| {
            let columns = table.map(|t: TableSpec| {
                t.fields.into_iter().map(|f| (f.name, f.kind)).collect()
            });
            (name, columns)
        })
        .collect()
}

#[tokio::test]
async fn test_up_is_idempotent_and_down_restores() {
    let (_container, client) = start_postgres().await;
    let dir = temp_dir("roundtrip");

    client
        .batch_execute(
            r#"CREATE TABLE "Person" (
                "id" INTEGER PRIMARY KEY,
                "firstName" TEXT,
                "age" TEXT,
                "nickname" VARCHAR(40)
            )"#,
        )
        .await
        .unwrap();
    let before = snapshot(&client).await;

    let outcome = generate_migration(options(&client, &dir, Mode::Alter, "2026-10-18T09:30:00Z"))
        .await
        .unwrap();
    let Outcome::Written(migration) = outcome else {
        panic!("expected a migration, got {outcome}");
    };
    assert!(migration.path.exists());

    migration.apply_up(&client).await.unwrap();

    let again = generate_migration(options(&client, &dir, Mode::Alter, "2026-10-18T09:31:00Z"))
        .await
        .unwrap();
    assert_eq!(again, Outcome::NoMigrationNeeded);

    migration.apply_down(&client).await.unwrap();
    let after = snapshot(&client).await;

    // nickname comes back as text: the original length isn't recorded
    assert_eq!(after, before);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_create_mode_leaves_existing_columns() {
    let (_container, client) = start_postgres().await;
    let dir = temp_dir("create-mode");

    client
        .batch_execute(r#"CREATE TABLE "Person" ("id" INTEGER PRIMARY KEY, "age" TEXT, "nickname" TEXT)"#)
        .await
        .unwrap();

    let outcome = generate_migration(options(&client, &dir, Mode::Create, "2026-10-18T09:30:00Z"))
        .await
        .unwrap();
    let migration = outcome.migration().unwrap();
    migration.apply_up(&client).await.unwrap();

    let inspector = PgInspector::new(&client);
    let person = inspector.inspect_table("Person").await.unwrap().unwrap();
    assert_eq!(person.field("age").unwrap().kind, FieldKind::String);
    assert!(person.has_field("nickname"));
    assert!(person.has_field("lastName"));

    let again = generate_migration(options(&client, &dir, Mode::Create, "2026-10-18T09:31:00Z"))
        .await
        .unwrap();
    assert_eq!(again, Outcome::NoMigrationNeeded);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_inspector_reads_keys_and_nullability() {
    let (_container, client) = start_postgres().await;

    client
        .batch_execute(
            r#"CREATE TABLE "Pair" (
                "a" BIGINT,
                "b" CHARACTER VARYING(12),
                "c" UUID,
                "d" DOUBLE PRECISION NOT NULL,
                PRIMARY KEY ("a", "b")
            )"#,
        )
        .await
        .unwrap();

    let inspector = PgInspector::new(&client);
    inspector.ping().await.unwrap();
    assert_eq!(inspector.inspect_table("Missing").await.unwrap(), None);

    let pair = inspector.inspect_table("Pair").await.unwrap().unwrap();
    let fields: Vec<_> = pair
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.kind, f.nullable, f.primary_key))
        .collect();
    assert_eq!(
        fields,
        [
            ("a", FieldKind::Integer, false, true),
            ("b", FieldKind::String, false, true),
            ("c", FieldKind::Unsupported, true, false),
            ("d", FieldKind::Float, false, false),
        ]
    );
}
