use crate::{invalid_data, Bank};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[derive(clap::Args)]
pub struct Args {
    /// File containing the IBNK chunk
    input: PathBuf,
    /// JSON file to output to [default: input with a .json extension]
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Byte offset of the IBNK chunk inside the input, decimal or 0x-prefixed
    #[arg(long, default_value = "0", value_parser = crate::parse_offset)]
    offset: u64,
}

/// Reads `path` and decodes the bank found at `offset`. The raw file is
/// returned alongside for callers that compare against it.
pub fn read_bank(path: &Path, offset: u64) -> io::Result<(Vec<u8>, Bank)> {
    let data = fs::read(path)?;
    log::debug!(
        "Reading bank at {offset:#x} from `{}` ({:#x} bytes)",
        path.display(),
        data.len()
    );
    let bank = Bank::from_bytes(&data, offset).map_err(|e| {
        invalid_data(format!(
            "Failed to read bank from `{}`: {e}",
            path.display()
        ))
    })?;
    Ok((data, bank))
}

pub fn write_json(path: &Path, bank: &Bank) -> io::Result<()> {
    let file = io::BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(file, bank).map_err(invalid_data)
}

pub fn extract(args: Args) -> io::Result<()> {
    let Args {
        input,
        output,
        offset,
    } = args;
    let (_, bank) = read_bank(&input, offset)?;
    if !bank.skipped.is_empty() {
        log::warn!(
            "{} slot(s) with unknown instrument tags will be empty in the output",
            bank.skipped.len()
        );
    }
    let output = output.unwrap_or_else(|| input.with_extension("json"));
    write_json(&output, &bank)?;
    log::info!(
        "Extracted {} instruments from bank {} to `{}`",
        bank.instruments().count(),
        bank.global_id,
        output.display()
    );
    Ok(())
}
