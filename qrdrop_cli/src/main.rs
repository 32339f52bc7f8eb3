use tracing_subscriber::EnvFilter;

mod app;

use app::Invocation;

fn main() -> anyhow::Result<()> {
    // .env is optional; QRDROP_* and RUST_LOG may come from there
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = match app::parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Share(args)) => args,
        Ok(Invocation::Help) => {
            println!("{}", app::USAGE);
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {:#}\n\n{}", e, app::USAGE);
            std::process::exit(2);
        }
    };

    let config = app::load_config(&args)?;
    tracing::debug!("Effective config: {:?}", config);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(app::run(args, config))
}
