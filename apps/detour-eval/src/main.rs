use clap::Parser;

use detour_eval::Args;

fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	detour_eval::run(args)
}
