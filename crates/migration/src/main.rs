use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    // DATABASE_URL wins, then the broker's config.yaml.
    if env::var("DATABASE_URL").is_err() {
        match Config::builder()
            .add_source(config::File::with_name("config.yaml"))
            .add_source(config::Environment::default().separator("__"))
            .build()
        {
            Ok(settings) => {
                if let Ok(url) = settings.get_string("database_url") {
                    env::set_var("DATABASE_URL", url);
                }
            }
            Err(e) => eprintln!("No DATABASE_URL set and config.yaml unusable: {e}"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
