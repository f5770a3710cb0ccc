use std::path::PathBuf;

use anyhow::{Error, bail};
use clap::Parser;

use devcamper::database::RedisStore;
use seeder::{destroy, import, progress_bar};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Load the fixture files into Redis
    #[arg(short, long, conflicts_with = "destroy")]
    import: bool,

    /// Delete every bootcamp, course and review
    #[arg(short, long)]
    destroy: bool,

    #[arg(long, default_value = "_data")]
    data_dir: PathBuf,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    if !args.import && !args.destroy {
        bail!("Pass --import or --destroy");
    }

    let store = RedisStore::connect(&args.redis_url).await?;

    if args.destroy {
        let removed = destroy(&store).await?;
        println!("Data destroyed: {removed} records removed");
        return Ok(());
    }

    let fixtures = catalog::load_fixtures(&args.data_dir)?;
    println!("Loaded Records: {}\n", fixtures.len());

    let written = import(&store, &fixtures, &progress_bar(fixtures.len())).await?;
    println!("Data imported: {written} records");

    Ok(())
}
