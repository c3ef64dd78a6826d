use life_app::app::{run, AppConfig, Command};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("life: {err:#}");
            std::process::exit(2);
        }
    };
    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(config, command).await {
        eprintln!("life: {err:#}");
        std::process::exit(1);
    }
}
