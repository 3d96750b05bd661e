mod analytics;
mod config;
mod constraints;
mod domain;
mod error;
mod expander;
mod feasible;
mod schedule_builder;
mod server;
mod solver;
mod store;
mod substitutes;

use config::AppConfig;

#[tokio::main]
async fn main() {
    let app_config = AppConfig::from_env().expect("invalid configuration");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&app_config.log_filter)).init();

    server::run_server(app_config).await;
}
