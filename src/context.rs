use crate::config::DashboardSettings;
use crate::database::ReferenceStore;
use crate::http_client::build_async_client;
use crate::market_data::{MarketDataProvider, YahooFinanceClient};
use crate::web::AppState;
use anyhow::Result;
use log::info;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    settings: DashboardSettings,
    provider: Arc<dyn MarketDataProvider>,
}

impl AppContext {
    pub fn initialize(settings: DashboardSettings) -> Result<Self> {
        let http = build_async_client(Some(settings.market_data_timeout))?;
        let provider = YahooFinanceClient::new(
            http,
            &settings.market_data_url,
            &settings.market_data_cookie_url,
        )?;
        info!(
            "Using reference store {} and market data from {}",
            settings.database_path.display(),
            settings.market_data_url
        );
        Ok(Self {
            settings,
            provider: Arc::new(provider),
        })
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    pub fn reference_store(&self) -> ReferenceStore {
        ReferenceStore::new(&self.settings.database_path)
    }

    pub fn market_data_provider(&self) -> Arc<dyn MarketDataProvider> {
        Arc::clone(&self.provider)
    }

    pub fn web_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            store: self.reference_store(),
            provider: self.market_data_provider(),
            market_timeout: self.settings.market_data_timeout,
        })
    }
}
