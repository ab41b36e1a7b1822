use email_triage::config::ServiceConfig;
use email_triage::server::serve;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export HF_API_KEY=hf_...");
        eprintln!("  export GOOGLE_API=...");
        std::process::exit(1);
    });

    eprintln!("📬 Email Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Classifier: {}", config.classifier_url);
    eprintln!("   Generator: {}", config.generator_model);
    eprintln!("   Workers: {}", config.workers);
    eprintln!("   API: http://0.0.0.0:{}/classify\n", config.port);

    serve(&config, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
    })
    .await?;

    Ok(())
}
