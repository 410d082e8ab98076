mod args;

use clap::Parser;
use gallery_core::conf::Conf;

#[tokio::main]
async fn main() {
    let args = args::Args::parse();
    let conf = Conf::new(&args.config).expect("Failed to load config");
    gallery_core::utils::trace::setup("GalleryAPI", &conf.tracing.level);
    Box::pin(gallery_api::axum(conf)).await;
}
