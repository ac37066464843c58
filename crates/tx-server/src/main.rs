use tx_server::{config, init_tracing_with_level, shutdown_tracing, ServerBuilder};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cfg = config::loader::load_config(std::env::var("TX_CONFIG").ok().as_deref())
        .unwrap_or_else(|e| {
            eprintln!("config error: {e}, falling back to defaults");
            config::AppConfig::default()
        });

    init_tracing_with_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(server) => server,
        Err(err) => {
            eprintln!("server build error: {err}");
            shutdown_tracing();
            return;
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("server error: {err}");
    }

    shutdown_tracing();
}
