//! `nx support category-add` creates a ticket category that the daemon's
//! category listing then serves.
//!
//! DB-backed test, skipped if NX_DATABASE_URL is not set.

use predicates::prelude::*;
use uuid::Uuid;

#[tokio::test]
async fn cli_support_category_add_creates_listed_category() -> anyhow::Result<()> {
    let url = match std::env::var(nx_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: NX_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("SKIP: cannot connect to DB: {e}");
            return Ok(());
        }
    };
    nx_db::migrate(&pool).await?;

    let name = format!("cli-category-{}", Uuid::new_v4());

    let mut cmd = assert_cmd::Command::cargo_bin("nx")?;
    cmd.env(nx_db::ENV_DB_URL, &url).args([
        "support",
        "category-add",
        "--name",
        &name,
        "--description",
        "billing questions",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(format!("name={name}")));

    let categories = nx_db::support::list_categories(&pool).await?;
    let created = categories
        .iter()
        .find(|c| c.name == name)
        .expect("created category is listed");
    assert_eq!(created.description.as_deref(), Some("billing questions"));
    assert!(created.is_active);

    sqlx::query("delete from ticket_categories where name = $1")
        .bind(&name)
        .execute(&pool)
        .await?;

    Ok(())
}
