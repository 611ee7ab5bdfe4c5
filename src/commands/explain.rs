use crate::commands::blocking;
use crate::context::AppContext;
use crate::models::ExplanationCategory;
use anyhow::Result;

pub async fn run(app: &AppContext, category: ExplanationCategory, code: i64) -> Result<()> {
    let store = app.reference_store();
    let text = blocking(move || Ok(store.resolve_code_explanation(category, code)?)).await?;
    println!("{} {}: {}", category, code, text);
    Ok(())
}
