use crate::commands::blocking;
use crate::context::AppContext;
use anyhow::Result;

pub async fn run(app: &AppContext, keyword1: &str, keyword2: &str) -> Result<()> {
    let store = app.reference_store();
    let (first, second) = (keyword1.to_string(), keyword2.to_string());
    let response = blocking(move || Ok(store.resolve_keyword_response(&first, &second)?)).await?;
    println!("{}", response);
    Ok(())
}
