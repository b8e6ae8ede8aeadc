use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pengajuan::{
    auth::password::hash_password,
    config::AppConfig,
    db,
    models::{NewTrackingStatus, NewUser},
    schema::{tracking_statuses, users},
    workflow::Role,
};

const USAGE: &str = "Usage:\n  maintenance create-user <username> <password> <role> [office_id|-] [display name]\n  maintenance seed-tracking-statuses";

const DEFAULT_TRACKING_STATUSES: &[(&str, &str)] = &[
    ("proses_sk", "Proses SK Mutasi"),
    ("menunggu_ttd", "Menunggu Tanda Tangan"),
    ("sk_terbit", "SK Terbit"),
    ("diserahkan", "SK Diserahkan ke Pegawai"),
];

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("create-user") => create_user(&args[1..]),
        Some("seed-tracking-statuses") => seed_tracking_statuses(),
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn connect() -> Result<db::PgPool> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    db::init_pool_with_size(&config.database_url, 1)
}

fn create_user(args: &[String]) -> Result<()> {
    let (username, password, role) = match args {
        [username, password, role, ..] => (username.trim(), password.as_str(), role.trim()),
        _ => bail!("create-user needs <username> <password> <role>\n{USAGE}"),
    };
    if username.is_empty() {
        bail!("username must not be empty");
    }
    let role: Role = role.parse()?;
    let office_id = match args.get(3).map(String::as_str) {
        None | Some("-") => None,
        Some(raw) => Some(Uuid::parse_str(raw).context("office_id must be a UUID")?),
    };
    if role != Role::Superadmin && office_id.is_none() {
        tracing::warn!(
            username,
            role = %role,
            "creating an office-less user; it will see every office"
        );
    }
    let display_name = if args.len() > 4 {
        args[4..].join(" ")
    } else {
        username.to_string()
    };

    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let user = NewUser {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: hash_password(password)?,
        display_name,
        role: role.as_str().to_string(),
        office_id,
    };
    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .context("failed to insert user")?;

    println!("Created user {} ({}) with id {}", user.username, role, user.id);
    Ok(())
}

fn seed_tracking_statuses() -> Result<()> {
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let rows: Vec<NewTrackingStatus> = DEFAULT_TRACKING_STATUSES
        .iter()
        .enumerate()
        .map(|(index, (code, name))| NewTrackingStatus {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: code.to_string(),
            sort_order: index as i32,
            active: true,
        })
        .collect();

    let inserted = diesel::insert_into(tracking_statuses::table)
        .values(&rows)
        .on_conflict(tracking_statuses::code)
        .do_nothing()
        .execute(&mut conn)
        .context("failed to seed tracking statuses")?;

    println!(
        "Seeded {inserted} tracking statuses ({} already present).",
        rows.len() - inserted
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
