use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CODE_NOT_FOUND: &str = "Not found";
pub const KEYWORD_RESPONSE_NOT_FOUND: &str = "No matching response found.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorHarmRecord {
    pub sector: String,
    pub description: Option<String>,
    pub primary_subsector: Option<String>,
    pub subsector_weight: Option<f64>,
    pub harm_magnitude: Option<i64>,
    pub population_impact: Option<i64>,
    pub directional_movement: Option<i64>,
    pub total_score: Option<f64>,
}

impl SectorHarmRecord {
    pub fn code_for(&self, category: ExplanationCategory) -> Option<i64> {
        match category {
            ExplanationCategory::HarmMagnitude => self.harm_magnitude,
            ExplanationCategory::PopulationImpact => self.population_impact,
            ExplanationCategory::DirectionalMovement => self.directional_movement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExplanationCategory {
    HarmMagnitude,
    PopulationImpact,
    DirectionalMovement,
}

impl ExplanationCategory {
    pub const ALL: [ExplanationCategory; 3] = [
        ExplanationCategory::HarmMagnitude,
        ExplanationCategory::PopulationImpact,
        ExplanationCategory::DirectionalMovement,
    ];

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "harm-magnitude" | "harm" => Ok(Self::HarmMagnitude),
            "population-impact" | "pop-impact" | "population" => Ok(Self::PopulationImpact),
            "directional-movement" | "directional-trend" | "directional" => {
                Ok(Self::DirectionalMovement)
            }
            other => Err(anyhow!(
                "explanation category must be harm-magnitude, population-impact or directional-movement (value: {})",
                other
            )),
        }
    }

    /// Column of the explanation table holding text for this category.
    pub fn column(self) -> &'static str {
        match self {
            Self::HarmMagnitude => "Harm-Magnitude",
            Self::PopulationImpact => "Pop-Impact",
            Self::DirectionalMovement => "Directional-Trend",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HarmMagnitude => "Harm Magnitude",
            Self::PopulationImpact => "Population Impact",
            Self::DirectionalMovement => "Directional Movement",
        }
    }
}

impl fmt::Display for ExplanationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Selectable columns of the keyword response table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeywordColumn {
    Subindustry,
    Screen,
}

impl KeywordColumn {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "subindustry" | "keyword1" => Ok(Self::Subindustry),
            "screen" | "keyword2" => Ok(Self::Screen),
            other => Err(anyhow!(
                "keyword column must be subindustry or screen (value: {})",
                other
            )),
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::Subindustry => "Keyword1",
            Self::Screen => "Keyword2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExplanation {
    pub category: ExplanationCategory,
    pub code: Option<i64>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainedSectorRecord {
    pub record: SectorHarmRecord,
    pub explanations: Vec<CodeExplanation>,
}

impl ExplainedSectorRecord {
    pub fn explanation(&self, category: ExplanationCategory) -> Option<&CodeExplanation> {
        self.explanations
            .iter()
            .find(|entry| entry.category == category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "5D")]
    FiveDays,
    #[default]
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "YTD")]
    YearToDate,
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "5Y")]
    FiveYears,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::OneDay,
        Timeframe::FiveDays,
        Timeframe::OneMonth,
        Timeframe::SixMonths,
        Timeframe::YearToDate,
        Timeframe::OneYear,
        Timeframe::FiveYears,
    ];

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|timeframe| timeframe.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                anyhow!(
                    "timeframe must be one of 1D, 5D, 1M, 6M, YTD, 1Y, 5Y (value: {})",
                    trimmed
                )
            })
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::OneDay => "1D",
            Self::FiveDays => "5D",
            Self::OneMonth => "1M",
            Self::SixMonths => "6M",
            Self::YearToDate => "YTD",
            Self::OneYear => "1Y",
            Self::FiveYears => "5Y",
        }
    }

    /// Range parameter understood by the chart endpoint.
    pub fn provider_range(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::SixMonths => "6mo",
            Self::YearToDate => "ytd",
            Self::OneYear => "1y",
            Self::FiveYears => "5y",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub long_name: Option<String>,
    pub currency: Option<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,
    pub full_time_employees: Option<i64>,
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub forward_eps: Option<f64>,
    pub forward_pe: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub dividend_rate: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub recommendation_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub profile: CompanyProfile,
    pub bars: Vec<PriceBar>,
}
