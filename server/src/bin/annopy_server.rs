#![deny(warnings)]

use {
    annopy_server::Options,
    anyhow::Result,
    std::sync::Arc,
    structopt::StructOpt,
    tokio::sync::Mutex as AsyncMutex,
};

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init_timed();

    let options = Arc::new(Options::from_args());

    let conn = Arc::new(AsyncMutex::new(
        annopy_server::open(&options.state_file).await?,
    ));

    annopy_server::serve(&conn, &options).await
}
