pub mod chart;
pub mod commands;
pub mod config;
pub mod context;
pub mod database;
pub mod formatting;
pub mod http_client;
pub mod market_data;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod web;
