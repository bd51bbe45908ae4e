use clap::Parser;
use log::{error, info};
use tilery::args::{Args, Command, RunArgs};
use tilery::srv::new_server;
use tilery::{read_config, TileryResult};

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn start(args: RunArgs) -> TileryResult<()> {
    info!("Starting tilery v{VERSION}");
    info!("Using {}", args.config_file.display());

    let config = read_config(&args.config_file, &subst::Env)?;
    let state = config.resolve().await?;

    let (server, listen_addresses) = new_server(args.srv_config(), state)?;
    info!("Tilery server up and running @ {listen_addresses}");
    server.await
}

#[actix_web::main]
async fn main() {
    let args = Args::parse();
    match args.command {
        Command::Run(run) => {
            setup_logging(run.debug);
            if let Err(e) = start(run).await {
                error!("{e}");
                std::process::exit(1);
            }
        }
        Command::Version => println!("tilery version={VERSION}"),
    }
}

fn setup_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .init();
}
