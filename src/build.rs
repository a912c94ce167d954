use crate::{invalid_data, Bank};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[derive(clap::Args)]
pub struct Args {
    /// JSON bank to build
    input: PathBuf,
    /// Bank file to output to [default: input with a .bnk extension]
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub fn read_json(path: &Path) -> io::Result<Bank> {
    let file = io::BufReader::new(fs::File::open(path)?);
    serde_json::from_reader(file)
        .map_err(|e| invalid_data(format!("Failed to parse `{}`: {e}", path.display())))
}

pub fn build(args: Args) -> io::Result<()> {
    let Args { input, output } = args;
    let mut bank = read_json(&input)?;
    let data = bank.pack().map_err(|e| {
        invalid_data(format!(
            "Failed to encode bank from `{}`: {e}",
            input.display()
        ))
    })?;
    let output = output.unwrap_or_else(|| input.with_extension("bnk"));
    fs::write(&output, &data)?;
    log::info!(
        "Built bank {} with {} instruments (0x{:x} bytes) to `{}`",
        bank.global_id,
        bank.instruments().count(),
        data.len(),
        output.display()
    );
    Ok(())
}
