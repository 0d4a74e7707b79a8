use canvas_sync_cli::Cli;
use clap::Parser;

fn main() {
    // stderr keeps stdout clean for --json output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let code = Cli::parse().run();
    std::process::exit(code);
}
