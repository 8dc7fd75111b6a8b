mod cli;

use shared_utils::logging;
use tracing::error;

#[tokio::main]
async fn main() {
    // Console logging until the first resolved config switches it
    let _guard = logging::init_default_logging();

    if let Err(err) = cli::run().await {
        error!("{}", err);
        std::process::exit(1);
    }
}
