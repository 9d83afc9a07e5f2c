use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use switchboard::call::{CallId, SessionProfile};
use switchboard::config::Config;
use switchboard::controller::{CallController, CallHandler, OutputOptions, PlayItem};
use switchboard::engine::Engine;
use switchboard::error::Result;
use switchboard::router::Router;
use switchboard::transport::{LoopbackTransport, Transport};
use async_trait::async_trait;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Minimal IVR: greet the caller, offer a two-key menu, confirm the choice
struct DemoMenu;

#[async_trait]
impl CallHandler for DemoMenu {
    async fn run(&self, controller: &mut CallController) -> Result<()> {
        controller.answer();
        controller
            .say("Welcome to the switchboard demo.", OutputOptions::default())
            .await?;

        let digit = controller
            .stream_file("/sounds/menu.wav", "12")
            .await?;
        match digit {
            Some(digit) => {
                controller
                    .play([
                        PlayItem::from("you pressed".to_string()),
                        PlayItem::from(digit.to_digit(10).map(i64::from).unwrap_or(0)),
                    ])
                    .await?;
            }
            None => {
                controller
                    .say("No selection received, goodbye.", OutputOptions::default())
                    .await?;
            }
        }
        controller.hangup().await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("starting switchboard");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    let mut router = Router::new();
    router.add_route(
        "demo-menu",
        |profile: &SessionProfile| profile.to.contains("demo"),
        Arc::new(DemoMenu),
    );
    router.set_fallback(Arc::new(DemoMenu));

    let transport = Arc::new(LoopbackTransport::new());
    let engine = Arc::new(Engine::new(
        config,
        router,
        transport.clone() as Arc<dyn Transport>,
    ));
    engine.start()?;

    // Feed one demo session through the loopback transport.
    let profile = SessionProfile::inbound(CallId::random(), "sip:alice@example.com", "sip:demo@pbx");
    engine.handle_session(profile)?;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = engine.statistics().aggregate();
    info!(
        statistics = %serde_json::to_string(&snapshot)?,
        "demo session finished"
    );

    engine.shutdown().await?;
    Ok(())
}
