use argoflow::cli::{self, Args};
use argoflow::core::config::ConfigLoader;
use clap::Parser;

fn main() -> argoflow::Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_explicit(path)?,
        None => ConfigLoader::load_from_dir(&std::env::current_dir()?)?,
    };
    argoflow::logging::init(&config.logging)?;
    cli::run(args, &config)
}
