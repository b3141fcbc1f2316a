use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use inspection_dashboard::{
    backend_client::HttpBackendClient,
    config::AppConfig,
    identity_provider::OidcProvider,
    session::{FileSessionStore, SessionController, SessionState},
    views::{
        AdminDashboard, InspectorDashboard, SupervisorDashboard, ViewContext, ViewKind,
        select_view,
    },
};
use log::{debug, error, info, warn};
use std::io::Write;

type Controller = SessionController<OidcProvider, HttpBackendClient, FileSessionStore>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }

    debug!("good bye");
}

async fn run() -> Result<()> {
    let config = AppConfig::get();
    let command = std::env::args().nth(1);

    let provider = OidcProvider::new(config.identity.clone())?;
    let backend = HttpBackendClient::new(&config.backend)?;
    let store = FileSessionStore::new(&config.paths.session_cache);
    let controller = SessionController::new(provider, backend, store, config.session.clone());
    let task = controller.start()?;
    let mut handle = controller.handle();

    // a restored session is being re-validated, or a sign-in is in flight
    let pending = controller.snapshot().loading
        || controller.session().authenticated
        || sign_in(&controller).await;

    let state = if pending {
        handle
            .next_settled()
            .await
            .context("session controller stopped")?
    } else {
        handle.snapshot()
    };

    present(&controller, &state).await?;

    match command.as_deref() {
        Some("logout") => {
            controller.logout().await;
            present(&controller, &controller.snapshot()).await?;
        }
        Some("watch") => loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    debug!("ctrl-c");
                    break;
                },
                state = handle.changed() => match state {
                    Some(state) if state.is_settled() => present(&controller, &state).await?,
                    Some(state) => debug!("session phase: {:?}", state.phase),
                    None => break,
                },
            }
        },
        Some(other) => warn!("unknown command '{other}', expected 'logout' or 'watch'"),
        None => {}
    }

    task.abort();
    Ok(())
}

/// Sign in with `DASHBOARD_EMAIL` and `DASHBOARD_PASSWORD` if both are set
async fn sign_in(controller: &Controller) -> bool {
    let (Ok(email), Ok(password)) = (
        std::env::var("DASHBOARD_EMAIL"),
        std::env::var("DASHBOARD_PASSWORD"),
    ) else {
        info!("no cached session; set DASHBOARD_EMAIL and DASHBOARD_PASSWORD to sign in");
        return false;
    };

    match controller.provider().sign_in(&email, &password).await {
        Ok(_) => true,
        Err(e) => {
            error!("sign-in failed: {e:#}");
            false
        }
    }
}

async fn present(controller: &Controller, state: &SessionState) -> Result<()> {
    let view = select_view(state);
    let ctx = || {
        ViewContext::new(
            &state.session,
            controller.commands(),
            controller.backend().clone(),
        )
    };

    match view {
        ViewKind::Loading => info!("waiting for sign-in"),
        ViewKind::SignIn { error: Some(e) } => info!("signed out: {e}"),
        ViewKind::SignIn { error: None } => info!("signed out"),
        ViewKind::AccessDenied => info!("access denied: no role assigned to this account"),
        ViewKind::Admin => {
            let overview = AdminDashboard::new(ctx())?.load().await?;
            info!(
                "admin dashboard: {} reports ({} pending), {} users ({} active)",
                overview.reports.len(),
                overview.pending_reports(),
                overview.users.len(),
                overview.active_users()
            );
        }
        ViewKind::Supervisor => {
            let dashboard = SupervisorDashboard::new(ctx())?;
            let reports = dashboard.reports().await?;
            info!(
                "supervisor dashboard for {}: {} assigned reports",
                dashboard.supervisor().await?,
                reports.len()
            );
            for report in reports {
                info!(
                    "  {} [{}] {} ({} images)",
                    report.id,
                    report.status,
                    report.location.as_deref().unwrap_or_default(),
                    report.image_paths().count()
                );
            }
        }
        ViewKind::Inspector => {
            let dashboard = InspectorDashboard::new(ctx())?;
            let profile = dashboard.profile().await?;
            let reports = dashboard.my_reports().await?;
            info!(
                "inspector dashboard for {}: {} submitted reports",
                profile.name.or(profile.email).unwrap_or_default(),
                reports.len()
            );
        }
    }

    Ok(())
}
