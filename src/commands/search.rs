use crate::context::AppContext;
use crate::pipeline::{run_search, KeywordSection, MarketSection, RenderModel, SearchRequest};
use crate::report::render_pdf;
use anyhow::{Context, Result};
use log::{info, warn};
use std::path::Path;

pub async fn run(app: &AppContext, request: &SearchRequest, pdf: Option<&Path>) -> Result<()> {
    let store = app.reference_store();
    let provider = app.market_data_provider();
    let model = run_search(
        &store,
        provider.as_ref(),
        request,
        app.settings().market_data_timeout,
    )
    .await?;

    print!("{}", summarize(&model));

    if let Some(path) = pdf {
        let bytes = render_pdf(&model)?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    }
    Ok(())
}

fn summarize(model: &RenderModel) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", model.title()));
    out.push_str(&format!("Timeframe: {}\n", model.timeframe));

    match &model.market {
        MarketSection::Available(view) => {
            for table in view.tables() {
                out.push_str(&format!("\n[{}]\n", table.heading));
                for row in &table.rows {
                    out.push_str(&format!("  {:<18} {}\n", row.label, row.value));
                }
            }
        }
        MarketSection::Unavailable { message } => {
            warn!("{}", message);
            out.push_str(&format!("\n{}\n", message));
        }
    }

    out.push_str(&format!(
        "\nSector matches for {:?}: {}\n",
        model.sector_query,
        model.sectors.len()
    ));
    for entry in &model.sectors {
        out.push_str(&format!("\n{}\n", entry.record.sector));
        for explanation in &entry.explanations {
            let code = explanation
                .code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            out.push_str(&format!(
                "  {} ({}): {}\n",
                explanation.category, code, explanation.text
            ));
        }
    }

    match &model.keyword {
        KeywordSection::Resolved {
            subindustry,
            screen,
            response,
        } => out.push_str(&format!("\n{} / {}: {}\n", subindustry, screen, response)),
        KeywordSection::Incomplete { message } => out.push_str(&format!("\n{}\n", message)),
    }

    out.push_str(&format!("\nGenerated at {}\n", model.generated_at));
    out
}
