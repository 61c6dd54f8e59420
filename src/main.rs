mod bootstrap;
mod config;
mod content;
mod error;
mod identity;
mod page;
mod render;
mod server;
mod submit;
mod template;
#[cfg(test)]
mod test_support;

use crate::bootstrap::Bootstrapper;
use crate::config::AppConfig;
use crate::content::ContentFetcher;
use crate::identity::{Credentials, IdentitySdk, LineSdk, StaticSdk, ViewerIdentity};
use crate::page::PageState;
use crate::server::AppState;
use crate::submit::{Submitter, sink_from_config};
use crate::template::PageTemplate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "liff-portal", version, about = "LINE member portal page host")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the portal page (default).
    Serve,
    /// Run one page load and print the resulting HTML.
    Render {
        /// LIFF access token for the viewer.
        #[arg(long, conflicts_with = "viewer_id")]
        access_token: Option<String>,
        /// Skip the identity platform and load the page as this user id.
        #[arg(long)]
        viewer_id: Option<String>,
        #[arg(long, default_value = "")]
        display_name: String,
        #[arg(long)]
        picture_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let client = config.http_client()?;
    let template = PageTemplate::load(config.page_template.as_deref()).await;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let sdk: Arc<dyn IdentitySdk> =
                Arc::new(LineSdk::new(client.clone(), config.line_api_base.clone()));
            let bootstrapper = build_bootstrapper(&config, client, sdk);
            let addr = config.bind_addr;
            tracing::info!(%addr, "starting liff-portal");
            server::run(addr, AppState::new(config, bootstrapper, template)).await?;
        }
        Command::Render {
            access_token,
            viewer_id,
            display_name,
            picture_url,
        } => {
            let sdk: Arc<dyn IdentitySdk> = match viewer_id {
                Some(id) => Arc::new(StaticSdk::viewer(ViewerIdentity {
                    id,
                    display_name,
                    picture_url,
                })),
                None => Arc::new(LineSdk::new(client.clone(), config.line_api_base.clone())),
            };
            let bootstrapper = build_bootstrapper(&config, client, sdk);
            let credentials = Credentials { access_token };
            let mut page = PageState::default();
            bootstrapper.load(&mut page, &credentials).await;
            println!("{}", template.render(&page)?);
        }
    }
    Ok(())
}

fn build_bootstrapper(
    config: &AppConfig,
    client: reqwest::Client,
    sdk: Arc<dyn IdentitySdk>,
) -> Bootstrapper {
    let fetcher = Arc::new(ContentFetcher::new(
        client.clone(),
        config.content_endpoint.clone(),
    ));
    let submitter = Submitter::new(sink_from_config(client, &config.sink));
    Bootstrapper::new(config.liff_id.clone(), sdk, fetcher, submitter)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
