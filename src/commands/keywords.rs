use crate::commands::blocking;
use crate::context::AppContext;
use crate::models::KeywordColumn;
use anyhow::Result;
use log::info;

pub async fn run(app: &AppContext, column: KeywordColumn) -> Result<()> {
    let store = app.reference_store();
    let values = blocking(move || Ok(store.list_distinct_values(column)?)).await?;
    info!(
        "Found {} distinct value(s) in {}",
        values.len(),
        column.column()
    );
    for value in values {
        println!("{}", value);
    }
    Ok(())
}
