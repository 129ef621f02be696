//! One-shot operator scripts
//!
//! Each subcommand connects, runs a single statement or store call, and exits.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};

use neighborly_core::{EmailAddress, JoinCode, Title, UserStatus};
use neighborly_server::db::{create_pool, maintenance};
use neighborly_server::store::{CommunityStore, UserStore};
use neighborly_server::{PgStore, StoreError};

use crate::config::{resolve_database_url, FileConfig};

/// Join code generation attempts before giving up
const CODE_ATTEMPTS: u32 = 5;

#[derive(Args, Debug)]
pub struct AdminArgs {
    /// Database URL (overrides config file)
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: AdminCommands,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommands {
    /// Make a user Admin of a community, joining them if needed
    Promote {
        #[arg(long)]
        email: String,
        /// Community join code
        #[arg(long)]
        code: String,
    },
    /// Force a user's verification status
    SetStatus {
        #[arg(long)]
        email: String,
        /// unverified, pending, approved or rejected
        #[arg(long)]
        status: String,
    },
    /// Fill approved_at on approved verifications that lack it
    BackfillApprovedAt,
    /// Create a community owned by an existing user and print its join code
    CreateCommunity {
        #[arg(long)]
        name: String,
        #[arg(long)]
        admin_email: String,
        #[arg(long)]
        description: Option<String>,
    },
}

pub async fn run_admin(args: AdminArgs, file: &FileConfig) -> Result<()> {
    // Validate input before touching the database
    let command = Parsed::from_command(args.command)?;

    let database_url = resolve_database_url(args.database_url, file)?;
    let database = file.server_config()?.database;
    let pool = create_pool(&database_url, &database)
        .await
        .context("Failed to create database pool")?;

    match command {
        Parsed::Promote { email, code } => {
            maintenance::promote_admin(&pool, email.as_str(), &code)
                .await
                .context("Failed to promote user")?;
            println!("{} is now Admin of {}", email.as_str(), code.as_str());
        }
        Parsed::SetStatus { email, status } => {
            maintenance::set_user_status(&pool, email.as_str(), status)
                .await
                .context("Failed to set user status")?;
            println!("{} is now {}", email.as_str(), status);
        }
        Parsed::BackfillApprovedAt => {
            let rows = maintenance::backfill_approved_at(&pool)
                .await
                .context("Failed to backfill approved_at")?;
            println!("Backfilled {rows} verification(s)");
        }
        Parsed::CreateCommunity {
            name,
            admin_email,
            description,
        } => {
            let store = PgStore::new(pool);
            let code =
                create_community(&store, &name, &admin_email, description.as_deref()).await?;
            println!("{code}");
        }
    }

    Ok(())
}

/// Subcommand arguments after validation
enum Parsed {
    Promote {
        email: EmailAddress,
        code: JoinCode,
    },
    SetStatus {
        email: EmailAddress,
        status: UserStatus,
    },
    BackfillApprovedAt,
    CreateCommunity {
        name: Title,
        admin_email: EmailAddress,
        description: Option<String>,
    },
}

impl Parsed {
    fn from_command(command: AdminCommands) -> Result<Self> {
        Ok(match command {
            AdminCommands::Promote { email, code } => Self::Promote {
                email: EmailAddress::parse(&email)?,
                code: JoinCode::parse(&code)?,
            },
            AdminCommands::SetStatus { email, status } => Self::SetStatus {
                email: EmailAddress::parse(&email)?,
                status: status.parse()?,
            },
            AdminCommands::BackfillApprovedAt => Self::BackfillApprovedAt,
            AdminCommands::CreateCommunity {
                name,
                admin_email,
                description,
            } => Self::CreateCommunity {
                name: Title::new(&name)?,
                admin_email: EmailAddress::parse(&admin_email)?,
                description: description
                    .map(|d| d.trim().to_owned())
                    .filter(|d| !d.is_empty()),
            },
        })
    }
}

async fn create_community(
    store: &PgStore,
    name: &Title,
    admin_email: &EmailAddress,
    description: Option<&str>,
) -> Result<String> {
    let admin = store
        .find_user_by_email(admin_email.as_str())
        .await?
        .ok_or_else(|| anyhow!("No user with email {}", admin_email.as_str()))?;

    let mut attempts = 0;
    let community = loop {
        attempts += 1;
        let code = JoinCode::generate();
        match store
            .create_community(name, &code, description, admin.id)
            .await
        {
            Ok(community) => break community,
            Err(StoreError::Conflict { .. }) if attempts < CODE_ATTEMPTS => {
                tracing::debug!(attempts, "join code collision, retrying");
            }
            Err(e) => return Err(e).context("Failed to create community"),
        }
    };

    tracing::info!(
        community_id = %community.id,
        admin_id = %admin.id,
        "community created"
    );
    Ok(community.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_validated_before_connecting() {
        let bad_status = AdminCommands::SetStatus {
            email: "resident@example.com".into(),
            status: "vip".into(),
        };
        assert!(Parsed::from_command(bad_status).is_err());

        let bad_email = AdminCommands::Promote {
            email: "not-an-email".into(),
            code: "ABC123".into(),
        };
        assert!(Parsed::from_command(bad_email).is_err());

        let ok = AdminCommands::SetStatus {
            email: "Resident@Example.com".into(),
            status: "approved".into(),
        };
        match Parsed::from_command(ok).unwrap() {
            Parsed::SetStatus { status, .. } => assert_eq!(status, UserStatus::Approved),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn blank_description_dropped() {
        let command = AdminCommands::CreateCommunity {
            name: "Maple Court".into(),
            admin_email: "admin@example.com".into(),
            description: Some("   ".into()),
        };
        match Parsed::from_command(command).unwrap() {
            Parsed::CreateCommunity { description, .. } => assert!(description.is_none()),
            _ => panic!("wrong variant"),
        }
    }
}
