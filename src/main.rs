// src/main.rs

use dagbuild::report::BuildStatus;
use dagbuild::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(err) => {
            eprintln!("dagbuild error: {err:?}");
            std::process::exit(BuildStatus::UserError.exit_code());
        }
    }
}

async fn run_main() -> anyhow::Result<BuildStatus> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
