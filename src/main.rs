use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use librarium::infrastructure::AppContext;
use librarium::services::{CountKind, purge_expired_books, recalculate_counts};
use librarium::{config, db};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    RecalcGenres,
    RecalcSeries,
    PurgeTrash,
}

impl Command {
    fn parse(arg: &str) -> Option<Self> {
        match arg {
            "recalc-genres" => Some(Command::RecalcGenres),
            "recalc-series" => Some(Command::RecalcSeries),
            "purge-trash" => Some(Command::PurgeTrash),
            _ => None,
        }
    }
}

fn usage() -> ! {
    eprintln!("usage: librarium --user <id> [recalc-genres|recalc-series|purge-trash]...");
    std::process::exit(2);
}

/// `--user <id>` plus the commands to run, both recalculations by default
fn parse_args(args: &[String]) -> (String, Vec<Command>) {
    let mut user = None;
    let mut commands = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--user" {
            user = iter.next().cloned();
        } else if let Some(command) = Command::parse(arg) {
            commands.push(command);
        } else {
            eprintln!("unknown argument: {}", arg);
            usage();
        }
    }

    let Some(user) = user.filter(|u| !u.trim().is_empty()) else {
        usage();
    };
    if commands.is_empty() {
        commands = vec![Command::RecalcGenres, Command::RecalcSeries];
    }
    (user, commands)
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "librarium=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let (user, commands) = parse_args(&args);
    let config = config::Config::from_env();

    let db = match db::init_db(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let ctx = AppContext::with_database(user, db, config);

    let mut failed = false;
    for command in commands {
        let result = match command {
            Command::RecalcGenres => recalculate_counts(&ctx, CountKind::Genres)
                .await
                .map(|report| {
                    println!("genres: scanned {}, corrected {}", report.scanned, report.corrected)
                }),
            Command::RecalcSeries => recalculate_counts(&ctx, CountKind::Series)
                .await
                .map(|report| {
                    println!("series: scanned {}, corrected {}", report.scanned, report.corrected)
                }),
            Command::PurgeTrash => purge_expired_books(&ctx, ctx.now())
                .await
                .map(|purged| println!("trash: purged {}", purged)),
        };

        if let Err(e) = result {
            tracing::error!("{:?} failed: {}", command, e);
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("librarium")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn defaults_to_both_recalculations() {
        let (user, commands) = parse_args(&args(&["--user", "u1"]));
        assert_eq!(user, "u1");
        assert_eq!(commands, vec![Command::RecalcGenres, Command::RecalcSeries]);
    }

    #[test]
    fn explicit_commands_run_in_order() {
        let (_, commands) = parse_args(&args(&["purge-trash", "--user", "u1", "recalc-series"]));
        assert_eq!(commands, vec![Command::PurgeTrash, Command::RecalcSeries]);
    }
}
