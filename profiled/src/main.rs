use std::sync::Arc;

use anyhow::Context;
use profile_core::DocumentClient;
use profile_integrations::FavoriteKind;
use profile_integrations::ids::{APP_ID, ENV_LOG};
use profiled::config::SyncConfig;
use profiled::identity::IdentityResolver;
use profiled::model::ProfileEdit;
use profiled::notify::{ChannelObserver, NotificationHub};
use profiled::remote::RemoteProfileGateway;
use profiled::storage::{FileKv, LocalProfileStore};
use profiled::sync::{SyncContext, SyncOrchestrator};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Show,
    Login(String),
    Logout,
    SetName(String),
    SetLanguage(String),
    Toggle(FavoriteKind, String),
    Favorites(FavoriteKind),
    Help,
}

fn parse_command<I>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let Some(command) = args.next() else {
        return Ok(Command::Show);
    };
    let mut value = |what: &str| {
        args.next()
            .filter(|value| !value.trim().is_empty())
            .with_context(|| format!("{command} requires {what}"))
    };
    let parsed = match command.as_str() {
        "show" => Command::Show,
        "login" => Command::Login(value("an identity")?),
        "logout" => Command::Logout,
        "set-name" => Command::SetName(value("a name")?),
        "set-language" => Command::SetLanguage(value("a language code")?),
        "toggle" => {
            let kind = value("a kind")?;
            let kind = FavoriteKind::parse(&kind)
                .with_context(|| format!("unknown favorite kind: {kind}"))?;
            Command::Toggle(kind, value("an item id")?)
        }
        "favorites" => {
            let kind = value("a kind")?;
            Command::Favorites(
                FavoriteKind::parse(&kind)
                    .with_context(|| format!("unknown favorite kind: {kind}"))?,
            )
        }
        "help" | "--help" | "-h" => Command::Help,
        other => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }
    Ok(parsed)
}

fn print_usage() {
    println!("Usage: profiled [command]   ({APP_ID})");
    println!("  show                               Print the local profile (default)");
    println!("  login <identity>                   Sign in and sync with the remote profile");
    println!("  logout                             Sign out, keeping the local profile");
    println!("  set-name <name>                    Change the display name");
    println!("  set-language <code>                Change the language preference");
    println!("  toggle <retreat|instructor> <id>   Flip a favorite");
    println!("  favorites <retreat|instructor>     List favorites of one kind");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let command = parse_command(std::env::args())?;
    if command == Command::Help {
        print_usage();
        return Ok(());
    }
    init_tracing();

    let config = SyncConfig::from_env()?;
    let kv = Arc::new(
        FileKv::open(config.data_dir.clone(), Some(config.storage_quota_bytes))
            .with_context(|| format!("cannot open {}", config.data_dir.display()))?,
    );
    let resolver = Arc::new(IdentityResolver::open(kv.clone())?);
    let store = Arc::new(LocalProfileStore::open(kv, resolver.device_id()));

    let mut client = DocumentClient::with_base_url(&config.remote_url)?;
    if let Some(token) = &config.api_token {
        client = client.with_bearer_token(token.clone());
    }
    let gateway = RemoteProfileGateway::new(client).with_timeout(config.remote_timeout);

    let hub = Arc::new(NotificationHub::new());
    let (observer, mut events) = ChannelObserver::new();
    hub.subscribe(observer);

    let context = SyncContext::new(store, Arc::new(gateway), hub).with_backoff(config.retry);
    let orchestrator = SyncOrchestrator::new(context, resolver.clone());
    orchestrator.start()?;

    let listing = match &command {
        Command::Favorites(kind) => Some(*kind),
        _ => None,
    };
    let outcome = run_command(&orchestrator, &resolver, command);
    orchestrator.flush().await;
    orchestrator.stop().await;
    outcome?;

    while let Ok(event) = events.try_recv() {
        info!(event = %serde_json::to_string(&event)?, "profile event");
    }
    match listing {
        Some(kind) => {
            for id in orchestrator.favorites().list(kind) {
                println!("{id}");
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&orchestrator.profile())?),
    }
    Ok(())
}

fn run_command(
    orchestrator: &SyncOrchestrator,
    resolver: &IdentityResolver,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Show | Command::Favorites(_) | Command::Help => {}
        Command::Login(identity) => resolver.sign_in(&identity),
        Command::Logout => resolver.sign_out(),
        Command::SetName(name) => {
            orchestrator.edit(ProfileEdit {
                display_name: Some(name),
                ..ProfileEdit::default()
            })?;
        }
        Command::SetLanguage(language) => {
            orchestrator.edit(ProfileEdit {
                language: Some(language),
                ..ProfileEdit::default()
            })?;
        }
        Command::Toggle(kind, id) => {
            let member = orchestrator.favorites().toggle(kind, &id)?;
            info!(%kind, id, member, "favorite toggled");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Command> {
        parse_command(
            std::iter::once("profiled")
                .chain(args.iter().copied())
                .map(str::to_string),
        )
    }

    #[test]
    fn defaults_to_show() {
        assert_eq!(parse(&[]).unwrap(), Command::Show);
    }

    #[test]
    fn parses_login_and_toggle() {
        assert_eq!(
            parse(&["login", "u42"]).unwrap(),
            Command::Login("u42".into())
        );
        assert_eq!(
            parse(&["toggle", "instructors", "i7"]).unwrap(),
            Command::Toggle(FavoriteKind::Instructor, "i7".into())
        );
        assert_eq!(
            parse(&["favorites", "retreat"]).unwrap(),
            Command::Favorites(FavoriteKind::Retreat)
        );
    }

    #[test]
    fn supports_help_flags() {
        assert_eq!(parse(&["--help"]).unwrap(), Command::Help);
        assert_eq!(parse(&["help"]).unwrap(), Command::Help);
    }

    #[test]
    fn rejects_missing_or_extra_arguments() {
        assert!(parse(&["login"]).is_err());
        assert!(parse(&["toggle", "retreat"]).is_err());
        assert!(parse(&["toggle", "workshop", "w1"]).is_err());
        assert!(parse(&["favorites"]).is_err());
        assert!(parse(&["logout", "now"]).is_err());
        assert!(parse(&["sync"]).is_err());
    }
}
