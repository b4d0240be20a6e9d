use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use urlguard::{
    api::ApiClient,
    check::UrlChecker,
    config::Config,
    forms::{self, FormOutcome},
    session::{FileStore, SessionManager},
};

const USAGE: &str = "usage: urlguard-cli <command> [args]

commands:
  register <username> <password> <confirm-password>
  login <username> <password>
  logout
  whoami
  ping
  check <url> [<url>...]";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };

    let store = match FileStore::open(&config.token_store_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!(
                "cannot open token store {}: {}",
                config.token_store_path.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };
    let session = SessionManager::hydrate(ApiClient::new(config.api_base.as_str()), Arc::new(store));

    let outcome = match (command.as_str(), rest) {
        ("register", [username, password, confirm]) => {
            forms::submit_register(&session, username, password, confirm).await
        }
        ("login", [username, password]) => forms::submit_login(&session, username, password).await,
        ("logout", []) => forms::submit_logout(&session).await,
        ("whoami", []) => whoami(&session).await,
        ("ping", []) => match session.verify().await {
            Ok(user) => FormOutcome::Success(format!("Protected ping ok, signed in as {}", user.username)),
            Err(e) => FormOutcome::Error(format!("Protected ping failed: {}", forms::inline_message(&e))),
        },
        ("check", urls) if !urls.is_empty() => check_all(session, config.history_limit, urls).await,
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        FormOutcome::Success(message) => {
            println!("{message}");
            ExitCode::SUCCESS
        }
        FormOutcome::Error(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

async fn whoami(session: &SessionManager) -> FormOutcome {
    let snapshot = session.session().await;
    let Some(user) = snapshot.user else {
        return FormOutcome::Success(format!("{} (not signed in)", session.status()));
    };

    let mut line = format!("{} as {}", session.status(), user.username);
    if let Some(id) = user.id {
        line.push_str(&format!(" (id {id})"));
    }
    if let Some(expiry) = session.token_expiry().await {
        line.push_str(&format!(", access token expires {}", expiry.to_rfc3339()));
    }
    FormOutcome::Success(line)
}

async fn check_all(session: SessionManager, history_limit: usize, urls: &[String]) -> FormOutcome {
    let mut checker = UrlChecker::new(session, history_limit);
    let mut failed = false;

    for url in urls {
        match forms::submit_check(&mut checker, url).await {
            FormOutcome::Success(verdict) => println!("{url}: {verdict}"),
            FormOutcome::Error(message) => {
                failed = true;
                eprintln!("{url}: {message}");
            }
        }
    }

    let stats = checker.stats();
    let summary = format!(
        "{} checked, {} malicious, {} safe",
        stats.total, stats.malicious, stats.safe
    );
    if failed {
        FormOutcome::Error(summary)
    } else {
        FormOutcome::Success(summary)
    }
}
