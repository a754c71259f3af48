//! nx operator CLI.
//!
//! Administrative commands that run against the portal database directly:
//! migrations, account bootstrap, session and payment housekeeping, audit
//! verification. Anything client-facing goes through nx-daemon instead.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nx_schemas::{ClientStatus, MemberRole, UserRole};
use nx_scope::ScopeFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "nx")]
#[command(about = "NX portal operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// User account commands
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },

    /// Client (tenant) commands
    Client {
        #[command(subcommand)]
        cmd: ClientCmd,
    },

    /// Client membership commands
    Member {
        #[command(subcommand)]
        cmd: MemberCmd,
    },

    /// Payment housekeeping
    Payments {
        #[command(subcommand)]
        cmd: PaymentsCmd,
    },

    /// Session housekeeping
    Sessions {
        #[command(subcommand)]
        cmd: SessionsCmd,
    },

    /// Support desk administration
    Support {
        #[command(subcommand)]
        cmd: SupportCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses while payments are pending
    /// or processing unless --yes is provided.
    Migrate {
        /// Acknowledge migrating a DB with in-flight payments.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum UserCmd {
    /// Create a user account. Password is read from NX_NEW_USER_PASSWORD
    /// so it never appears in shell history.
    Create {
        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        full_name: String,

        /// admin | client
        #[arg(long, default_value = "client")]
        role: String,

        /// Grant provider-staff access.
        #[arg(long, default_value_t = false)]
        staff: bool,
    },
}

#[derive(Subcommand)]
enum ClientCmd {
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        #[arg(long)]
        contact_name: String,

        #[arg(long)]
        contact_email: String,

        /// prospect | active | inactive | archived
        #[arg(long, default_value = "prospect")]
        status: String,
    },
}

#[derive(Subcommand)]
enum MemberCmd {
    /// Attach a user to a client organization.
    Add {
        #[arg(long)]
        client_id: String,

        #[arg(long)]
        user_id: String,

        /// owner | admin | member | viewer
        #[arg(long, default_value = "member")]
        role: String,

        /// Grant access to quotes, invoices and payments.
        #[arg(long, default_value_t = false)]
        billing: bool,

        /// Allow managing the client's member list.
        #[arg(long, default_value_t = false)]
        manage_team: bool,
    },
}

#[derive(Subcommand)]
enum PaymentsCmd {
    /// Cancel pending payments whose checkout window has lapsed.
    Expire,

    /// Re-check one transaction against the provider and apply the result.
    Check {
        #[arg(long)]
        transaction_id: String,
    },
}

#[derive(Subcommand)]
enum SessionsCmd {
    /// Delete expired session rows.
    Purge,
}

#[derive(Subcommand)]
enum SupportCmd {
    /// Create a ticket category offered to requesters.
    CategoryAdd {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Hex color for the frontend badge, e.g. #007bff.
        #[arg(long)]
        color: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Recompute digests over recent audit rows and report mismatches.
    Verify {
        #[arg(long, default_value_t = 500)]
        limit: i64,
    },
}

fn refuse_migrate_if_inflight(inflight: i64, yes: bool) -> Result<()> {
    if inflight > 0 && !yes {
        anyhow::bail!(
            "REFUSING MIGRATE: {} payment(s) pending or processing. Re-run with: `nx db migrate --yes`",
            inflight
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = nx_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = nx_db::status(&pool).await?;
                    println!("db_ok={} has_schema={}", s.ok, s.has_schema);
                }
                DbCmd::Migrate { yes } => {
                    // In-flight payments may settle mid-migration; make the
                    // operator acknowledge that before touching the schema.
                    // A failed count refuses too: an unanswerable guardrail
                    // must not wave the migration through.
                    let n = nx_db::payments::count_processing(&pool)
                        .await
                        .context("could not count in-flight payments")?;
                    refuse_migrate_if_inflight(n, yes)?;

                    nx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::User { cmd } => match cmd {
            UserCmd::Create {
                username,
                email,
                full_name,
                role,
                staff,
            } => {
                let pool = nx_db::connect_from_env().await?;
                let role = UserRole::parse(&role)?;
                let password = std::env::var("NX_NEW_USER_PASSWORD")
                    .context("set NX_NEW_USER_PASSWORD to the initial password")?;

                let id = nx_db::users::insert_user(
                    &pool,
                    &nx_db::users::NewUser {
                        username: username.clone(),
                        email,
                        password,
                        full_name,
                        is_staff: staff,
                        role,
                    },
                )
                .await?;

                println!("user_id={} username={} staff={}", id, username, staff);
            }
        },

        Commands::Client { cmd } => match cmd {
            ClientCmd::Create {
                name,
                email,
                contact_name,
                contact_email,
                status,
            } => {
                let pool = nx_db::connect_from_env().await?;
                let status = ClientStatus::parse(&status)?;

                let id = nx_db::clients::insert_client(
                    &pool,
                    &nx_db::clients::NewClient {
                        name: name.clone(),
                        email,
                        phone: None,
                        address: None,
                        main_contact_name: contact_name,
                        main_contact_email: contact_email,
                        industry: None,
                        company_size: None,
                        status,
                        notes: None,
                    },
                )
                .await?;

                println!("client_id={} name={}", id, name);
            }
        },

        Commands::Member { cmd } => match cmd {
            MemberCmd::Add {
                client_id,
                user_id,
                role,
                billing,
                manage_team,
            } => {
                let pool = nx_db::connect_from_env().await?;
                let client_id = Uuid::parse_str(&client_id).context("invalid client_id uuid")?;
                let user_id = Uuid::parse_str(&user_id).context("invalid user_id uuid")?;
                let role = MemberRole::parse(&role)?;

                let id = nx_db::clients::add_member(
                    &pool, client_id, user_id, role, billing, manage_team,
                )
                .await?;

                println!(
                    "membership_id={} role={} billing={} manage_team={}",
                    id,
                    role.as_str(),
                    billing,
                    manage_team
                );
            }
        },

        Commands::Payments { cmd } => match cmd {
            PaymentsCmd::Expire => {
                let pool = nx_db::connect_from_env().await?;
                let n = nx_db::payments::expire_stale(&pool).await?;
                println!("payments_expired={}", n);
            }
            PaymentsCmd::Check { transaction_id } => {
                let pool = nx_db::connect_from_env().await?;
                let config = nx_config::PortalConfig::from_env()?;
                let provider = nx_payments::HttpProvider::new(config.provider.clone());

                let outcome =
                    nx_payments::reconcile_transaction(&pool, &provider, &transaction_id).await?;
                match outcome {
                    nx_payments::ReconcileOutcome::Settled(status) => {
                        println!("outcome=settled status={}", status.as_str());
                    }
                    nx_payments::ReconcileOutcome::InFlight(status) => {
                        println!("outcome=in_flight status={}", status.as_str());
                    }
                    nx_payments::ReconcileOutcome::UnknownTransaction => {
                        anyhow::bail!("no payment matches transaction {transaction_id}");
                    }
                    nx_payments::ReconcileOutcome::Unrecognized => {
                        println!("outcome=unrecognized");
                    }
                }
            }
        },

        Commands::Sessions { cmd } => match cmd {
            SessionsCmd::Purge => {
                let pool = nx_db::connect_from_env().await?;
                let n = nx_db::users::purge_expired_sessions(&pool).await?;
                println!("sessions_purged={}", n);
            }
        },

        Commands::Support { cmd } => match cmd {
            SupportCmd::CategoryAdd {
                name,
                description,
                color,
            } => {
                let pool = nx_db::connect_from_env().await?;
                let id = nx_db::support::insert_category(
                    &pool,
                    &name,
                    description.as_deref(),
                    color.as_deref(),
                )
                .await?;
                println!("category_id={} name={}", id, name);
            }
        },

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { limit } => {
                let pool = nx_db::connect_from_env().await?;
                let rows = nx_db::audit::list_audit(
                    &pool,
                    &ScopeFilter::Unrestricted,
                    &nx_db::audit::AuditListFilter {
                        entity_kind: None,
                        entity_id: None,
                        actor_id: None,
                        limit: Some(limit),
                    },
                )
                .await?;

                let mut bad = 0usize;
                for row in &rows {
                    if !nx_audit::verify_digest(&row.record)? {
                        bad += 1;
                        println!("digest_mismatch id={}", row.record.id);
                    }
                }
                println!("audit_checked={} mismatches={}", rows.len(), bad);
                if bad > 0 {
                    anyhow::bail!("{bad} audit record(s) failed digest verification");
                }
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_guard_refuses_inflight_payments_without_yes() {
        let err = refuse_migrate_if_inflight(3, false).unwrap_err();
        assert!(err.to_string().contains("REFUSING MIGRATE"));
        assert!(err.to_string().contains("3 payment(s)"));
    }

    #[test]
    fn migrate_guard_allows_with_yes_or_when_idle() {
        assert!(refuse_migrate_if_inflight(3, true).is_ok());
        assert!(refuse_migrate_if_inflight(0, false).is_ok());
    }
}
