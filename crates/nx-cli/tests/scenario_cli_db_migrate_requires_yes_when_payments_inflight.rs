//! `nx db migrate` must refuse while payments are pending/processing unless
//! the operator passes --yes.
//!
//! DB-backed test, skipped if NX_DATABASE_URL is not set.

use std::str::FromStr;

use chrono::{Duration, Utc};
use predicates::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn cli_db_migrate_requires_yes_when_payments_inflight() -> anyhow::Result<()> {
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

    // Seed a pending payment to trip the guardrail.
    let client_id = nx_db::clients::insert_client(
        &pool,
        &nx_db::clients::NewClient {
            name: format!("cli-migrate-test-{}", Uuid::new_v4()),
            email: format!("cli-migrate-{}@example.test", Uuid::new_v4()),
            phone: None,
            address: None,
            main_contact_name: "Contact".into(),
            main_contact_email: "contact@example.test".into(),
            industry: None,
            company_size: None,
            status: nx_schemas::ClientStatus::Active,
            notes: None,
        },
    )
    .await?;

    let invoice_id = nx_db::billing::insert_invoice(
        &pool,
        &nx_db::billing::NewInvoice {
            client_id,
            project_id: None,
            quote_id: None,
            created_by: None,
            title: "migrate guardrail invoice".into(),
            description: None,
            due_date: (Utc::now() + Duration::days(30)).date_naive(),
            tax_rate: Decimal::ZERO,
            currency: "EUR".into(),
            items: vec![nx_db::billing::LineItem {
                title: "work".into(),
                description: None,
                quantity: Decimal::ONE,
                unit_price: Decimal::from_str("50.00").unwrap(),
                sort_order: 0,
            }],
        },
    )
    .await?;
    nx_db::billing::mark_invoice_sent(&pool, invoice_id).await?;

    nx_db::payments::insert_payment(
        &pool,
        &nx_db::payments::NewPayment {
            invoice_id,
            client_id,
            initiated_by: None,
            provider_transaction_id: format!("TXN-{}", Uuid::new_v4()),
            amount: Decimal::from_str("50.00").unwrap(),
            currency: "EUR".into(),
            description: None,
        },
    )
    .await?;

    // Without --yes => must fail with the refusal message.
    let mut cmd = assert_cmd::Command::cargo_bin("nx")?;
    cmd.env(nx_db::ENV_DB_URL, &url).args(["db", "migrate"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("REFUSING MIGRATE"));

    // With --yes => should succeed.
    let mut cmd2 = assert_cmd::Command::cargo_bin("nx")?;
    cmd2.env(nx_db::ENV_DB_URL, &url)
        .args(["db", "migrate", "--yes"]);
    cmd2.assert().success();

    // Cleanup: the client cascade removes the invoice and payment.
    sqlx::query("delete from clients where id = $1")
        .bind(client_id)
        .execute(&pool)
        .await?;

    Ok(())
}
