use anyhow::Result;
use clap::Parser;
use llama_eval::{runner, EvalArgs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "llama_eval=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = EvalArgs::parse();
    tracing::info!("🚀 Starting llama-eval");
    tracing::debug!("config: {}", serde_json::to_string(&args)?);

    runner::eval_llama(&args)?;

    Ok(())
}
