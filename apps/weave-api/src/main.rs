// crates.io
use clap::Parser;
// self
use weave_api::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = Args::parse();
	weave_api::run(args).await
}
