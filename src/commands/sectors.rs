use crate::commands::blocking;
use crate::context::AppContext;
use anyhow::Result;
use log::info;

pub async fn run(app: &AppContext) -> Result<()> {
    let store = app.reference_store();
    let sectors = blocking(move || Ok(store.list_distinct_sectors()?)).await?;
    info!("Found {} distinct sector(s)", sectors.len());
    for sector in sectors {
        println!("{}", sector);
    }
    Ok(())
}
