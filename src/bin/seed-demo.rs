//! Demo data seed script
//!
//! Seeds a demo school with Czech-language data:
//! - School: Základní škola Komenského (Demo)
//! - 1 platform admin, 1 school admin, teachers and students
//! - Starting credit balances with matching ledger entries
//! - A few sample notifications
//!
//! Usage:
//!   DATABASE_URL=... ./seed-demo --password Demo2024!
//!
//! Existing demo accounts (…@demo.eduai.cz) are removed first, so the
//! script is safe to re-run.

use anyhow::{Context, Result};
use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::env;
use uuid::Uuid;

use eduai_api::models::credit::TransactionType;
use eduai_api::models::notification::{NewNotification, Severity};
use eduai_api::services::credits::CreditService;
use eduai_api::services::notifications::NotificationService;

const DEMO_DOMAIN: &str = "demo.eduai.cz";

#[derive(Parser, Debug)]
#[command(about = "Seed a demo school with users, credits and notifications")]
struct Args {
    /// Password for all demo accounts
    #[arg(long, default_value = "Demo2024!")]
    password: String,

    /// Number of teacher accounts
    #[arg(long, default_value_t = 4)]
    teachers: u32,

    /// Number of student accounts
    #[arg(long, default_value_t = 12)]
    students: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL required")?;

    println!("=== Seed Demo School ===");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    println!("Cleaning existing demo data...");
    sqlx::query("DELETE FROM users WHERE email LIKE $1")
        .bind(format!("%@{DEMO_DOMAIN}"))
        .execute(&pool)
        .await
        .context("Failed to delete demo users")?;
    sqlx::query("DELETE FROM schools WHERE name LIKE 'Základní škola Komenského%'")
        .execute(&pool)
        .await
        .context("Failed to delete demo school")?;

    println!("Creating school...");
    let school_id: Uuid = sqlx::query_scalar(
        "INSERT INTO schools (name, city, address, website)
         VALUES ('Základní škola Komenského (Demo)', 'Brno', 'Komenského 12', 'https://zs-komenskeho.cz')
         RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .context("Failed to insert school")?;

    let password_hash = bcrypt::hash(&args.password, 12)?;

    println!("Creating platform admin...");
    create_user(&pool, "admin", "Platform", "Admin", "platform_admin", None, &password_hash, 0).await?;

    println!("Creating school admin...");
    let school_admin_id = create_user(
        &pool,
        "reditel",
        "Marie",
        "Dvořáková",
        "school_admin",
        Some(school_id),
        &password_hash,
        100,
    )
    .await?;

    println!("Creating {} teachers...", args.teachers);
    let first_names = ["Jana", "Petr", "Eva", "Tomáš", "Lucie", "Martin", "Hana", "Jakub"];
    let last_names = ["Novák", "Svobodová", "Černý", "Procházková", "Veselý", "Horáková"];
    let mut rng = rand::thread_rng();

    for i in 0..args.teachers {
        let first = first_names.choose(&mut rng).copied().unwrap_or("Jan");
        let last = last_names.choose(&mut rng).copied().unwrap_or("Novák");
        create_user(
            &pool,
            &format!("ucitel{}", i + 1),
            first,
            last,
            "teacher_school",
            Some(school_id),
            &password_hash,
            rng.gen_range(20..80),
        )
        .await?;
    }

    println!("Creating {} students...", args.students);
    for i in 0..args.students {
        let first = first_names.choose(&mut rng).copied().unwrap_or("Jan");
        let last = last_names.choose(&mut rng).copied().unwrap_or("Novák");
        create_user(
            &pool,
            &format!("zak{}", i + 1),
            first,
            last,
            "student",
            Some(school_id),
            &password_hash,
            10,
        )
        .await?;
    }

    println!("Creating sample notifications...");
    NotificationService::create(
        &pool,
        NewNotification::for_school(
            school_id,
            "announcement",
            "Vítejte v EduAI Asistent",
            "Demo škola byla připravena. Vyzkoušejte generování pracovních listů.",
        ),
    )
    .await?;
    NotificationService::create(
        &pool,
        NewNotification::for_user(
            school_admin_id,
            "credits.low_balance",
            "Nízký zůstatek kreditů",
            "Některým učitelům dochází kredity.",
        )
        .severity(Severity::Warning),
    )
    .await?;

    println!("Done. Accounts use password '{}', e.g. reditel@{DEMO_DOMAIN}", args.password);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn create_user(
    pool: &PgPool,
    local_part: &str,
    first_name: &str,
    last_name: &str,
    role: &str,
    school_id: Option<Uuid>,
    password_hash: &str,
    credits: i32,
) -> Result<Uuid> {
    let email = format!("{local_part}@{DEMO_DOMAIN}");
    let user_id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, first_name, last_name, role, school_id, email_verified)
         VALUES ($1, $2, $3, $4, $5, $6, TRUE)
         RETURNING id",
    )
    .bind(&email)
    .bind(password_hash)
    .bind(first_name)
    .bind(last_name)
    .bind(role)
    .bind(school_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("Failed to insert {email}"))?;

    if credits > 0 {
        CreditService::grant(
            pool,
            user_id,
            credits,
            TransactionType::Bonus,
            Some("Demo kredity"),
            None,
        )
        .await
        .with_context(|| format!("Failed to grant credits to {email}"))?;
    }

    println!("  {email} ({role})");
    Ok(user_id)
}
