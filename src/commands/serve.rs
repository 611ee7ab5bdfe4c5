use crate::context::AppContext;
use crate::web;
use anyhow::Result;
use log::info;
use std::net::SocketAddr;

pub async fn run(app: &AppContext, bind: Option<SocketAddr>) -> Result<()> {
    let bind_addr = bind.unwrap_or(app.settings().bind_addr);
    info!(
        "Starting dashboard with market data timeout {:?}",
        app.settings().market_data_timeout
    );
    web::serve(app.web_state(), bind_addr).await
}
