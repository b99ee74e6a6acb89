use std::{process, sync::Arc};

use chirp::{
    application::{
        composer::SubmitOutcome,
        error::AppError,
        pages::{PageGenerator, ViewState},
        prefetch::Prefetcher,
        router::ProcedureRouter,
        session::{PageSession, Viewer},
    },
    cache::{CacheConfig, ReadQuery},
    config,
    infra::{
        codec::{JsonCodec, SnapshotCodec},
        memory::InMemoryRouter,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const DEMO_VIEWER_ID: &str = "user_alice";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or_else(|| config::Command::Demo(config::DemoArgs::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Snapshot(args) => run_snapshot(settings, args).await,
        config::Command::Demo(args) => run_demo(settings, args).await,
    }
}

async fn run_snapshot(
    settings: config::Settings,
    args: config::SnapshotArgs,
) -> Result<(), AppError> {
    let router: Arc<dyn ProcedureRouter> = InMemoryRouter::seeded(settings.feed);
    let codec: Arc<dyn SnapshotCodec> = Arc::new(JsonCodec);
    let generator = PageGenerator::new(Prefetcher::new(router, codec));

    let page = generator.page(&args.path).await?;
    println!("{}", page.snapshot.as_str());
    Ok(())
}

async fn run_demo(settings: config::Settings, args: config::DemoArgs) -> Result<(), AppError> {
    let router = InMemoryRouter::seeded(settings.feed);
    let codec: Arc<dyn SnapshotCodec> = Arc::new(JsonCodec);
    let generator = PageGenerator::new(Prefetcher::new(router.clone(), Arc::clone(&codec)));

    let page = generator.page(&args.path).await?;
    info!(path = %page.route, bytes = page.snapshot.as_str().len(), "Page delivered");

    router.sign_in(DEMO_VIEWER_ID);
    let session = PageSession::create(
        CacheConfig::from(&settings.cache),
        router.clone(),
        codec,
        Viewer::signed_in(DEMO_VIEWER_ID),
    );

    let report = session.hydrate(&page.snapshot)?;
    info!(report = ?report, "Hydration finished");

    for mut subscription in session.open(&page.route) {
        let Some(entry) = subscription.settled().await else {
            warn!(key = %subscription.key(), "Session closed before the read settled");
            continue;
        };
        info!(
            key = %entry.key(),
            status = %entry.status(),
            updated_at = %entry.updated_at(),
            "Page read settled"
        );
    }

    let mut feed = session.subscribe(&ReadQuery::AllPosts);
    if let Some(entry) = feed.settled().await {
        log_feed("Feed loaded", &ViewState::feed(&entry));
    }

    let composer = session
        .composer()
        .ok_or_else(|| AppError::unexpected("demo viewer is not signed in"))?;
    composer.set_input(args.message);

    match composer.submit().await {
        SubmitOutcome::Posted(post) => {
            info!(post_id = %post.id, "Post published");
            info!(status = %feed.current().status(), "Feed after invalidation");
            if let Some(entry) = feed.settled().await {
                log_feed("Feed refreshed", &ViewState::feed(&entry));
            }
        }
        SubmitOutcome::Failed(notice) => {
            warn!(text = %notice.text, field = ?notice.field, "Post rejected");
        }
        SubmitOutcome::Rejected(reason) => warn!(reason = ?reason, "Post not sent"),
        SubmitOutcome::SignedOut => warn!("Viewer signed out while posting"),
    }

    info!(
        entries = session.cache().len(),
        router_calls = router.total_calls(),
        "Demo session finished"
    );
    session.dispose();
    Ok(())
}

fn log_feed(message: &str, view: &ViewState<Vec<chirp_api_types::FeedItem>>) {
    match view {
        ViewState::Ready(items) => {
            let latest = items.first().map(|item| item.post.content.as_str());
            info!(posts = items.len(), latest = ?latest, "{message}");
        }
        other => warn!(view = ?other, "{message}"),
    }
}
