use clap::Parser;

/// The command line args passed to the gallery gradient worker
#[derive(Parser, Debug)]
#[clap(version, author)]
pub struct Args {
    /// The path to load the config file from
    #[clap(short, long, default_value = "gallery.yml")]
    pub config: String,
}
