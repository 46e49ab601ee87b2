use anyhow::{Context, Result};
use dotenvy::dotenv;
use log::info;

mod admission;
mod app;
mod boards;
mod captcha;
mod client;
mod console;
mod env;
mod http;
mod initdata;
mod locks;
mod operator;
mod policy;
mod relay;
mod store;
mod tg;
mod update;

use app::App;
use env::Env;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    let env = Env::load()?;
    info!(
        "starting relaybot: group={} admins={:?}",
        env.admin_group_id, env.admin_ids
    );

    let app = App::new(env)?;
    let bind_addr = app.env.bind_addr.clone();
    let router = http::router(app);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("cannot bind {bind_addr}"))?;
    info!("listening on {bind_addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
