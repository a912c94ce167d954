use std::{io, path::PathBuf};

use crate::{
    extract::read_bank, invalid_data, Bank, Instrument, KeyRegion, PercussionKit,
    StandardInstrument, VelocityRegion,
};

#[derive(clap::Args)]
pub struct Args {
    /// File containing the IBNK chunk
    input: PathBuf,
    /// Byte offset of the IBNK chunk inside the input, decimal or 0x-prefixed
    #[arg(long, default_value = "0", value_parser = crate::parse_offset)]
    offset: u64,
    /// Re-encode the bank and compare it against the input
    #[arg(short, long, default_value_t = false)]
    check: bool,
}

fn log_velocities(velocities: &[VelocityRegion]) {
    for vel in velocities {
        log::debug!(
            "        VEL {: <3} WSYS {: <5} WAVE {: <5} VOL {: <10} PITCH {} @ 0x{:x}",
            vel.velocity,
            vel.wsys_id,
            vel.wave_id,
            vel.volume,
            vel.pitch,
            vel.address,
        );
    }
}

fn log_standard(slot: usize, inst: &StandardInstrument, verbose: bool) {
    let keys: Vec<&KeyRegion> = inst.key_regions.iter().flatten().collect();
    let vels: usize = keys.iter().map(|k| k.velocities.len()).sum();
    log::info!(
        "  {slot: <4} INST 0x{: <8x} {: <10} {: <10} {: <3} {: <4} {: <4} {: <4} {}",
        inst.address,
        inst.pitch,
        inst.volume,
        inst.oscillators.iter().flatten().count(),
        inst.sense_effects.iter().flatten().count(),
        inst.rand_effects.iter().flatten().count(),
        keys.len(),
        vels,
    );
    if !verbose {
        return;
    }
    for (index, osc) in inst.oscillators.iter().enumerate() {
        if let Some(osc) = osc {
            log::debug!(
                "      OSC {index} TARGET {} RATE {} WIDTH {} VERTEX {} ATTACK {} RELEASE {}",
                osc.target,
                osc.rate,
                osc.width,
                osc.vertex,
                osc.attack.as_ref().map_or(0, |e| e.points.len()),
                osc.release.as_ref().map_or(0, |e| e.points.len()),
            );
        }
    }
    for key in keys {
        log::debug!("      KEY {: <3} @ 0x{:x}", key.base_key, key.address);
        log_velocities(&key.velocities);
    }
}

fn log_percussion(slot: usize, kit: &PercussionKit, verbose: bool) {
    let vels: usize = kit.sounds.iter().flatten().map(|s| s.velocities.len()).sum();
    log::info!(
        "  {slot: <4} PER2 0x{: <8x} {: <10} {: <10} {: <3} {: <4} {: <4} {: <4} {}",
        kit.address,
        "-",
        "-",
        0,
        0,
        0,
        kit.sounds.iter().flatten().count(),
        vels,
    );
    if !verbose {
        return;
    }
    for (key, sound) in kit.sounds.iter().enumerate() {
        if let Some(sound) = sound {
            log::debug!(
                "      KEY {key: <3} PITCH {} VOL {} FLAGS {} 0x{:04x} @ 0x{:x}",
                sound.pitch,
                sound.volume,
                sound.flag1,
                sound.flag2,
                sound.address,
            );
            log_velocities(&sound.velocities);
        }
    }
}

/// Returns the first offset at which the re-encoded bank differs from `input`.
fn first_mismatch(bank: &Bank, input: &[u8]) -> io::Result<Option<usize>> {
    let encoded = bank.encode().map_err(invalid_data)?;
    let pos = encoded
        .iter()
        .zip(input)
        .position(|(a, b)| a != b)
        .or_else(|| (input.len() < encoded.len()).then_some(input.len()));
    Ok(pos)
}

pub fn inspect(args: Args) -> io::Result<()> {
    let Args {
        input,
        offset,
        check,
    } = args;
    let verbose = crate::is_log_level(log::LevelFilter::Debug);
    let (data, bank) = read_bank(&input, offset)?;
    let start = offset as usize;
    let end = start.saturating_add(bank.size as usize).min(data.len());
    let bank_data = &data[start..end];

    let hash = blake3::hash(bank_data);
    log::info!(
        "Bank {}: size 0x{:x} hash 0x{hash}",
        bank.global_id,
        bank.size
    );
    log::info!("Instruments: {}", bank.instruments().count());
    log::info!("  SLOT TYPE ADDRESS    PITCH      VOLUME     OSC SENS RAND KEYS VELS");
    for (slot, inst) in bank.instruments() {
        match inst {
            Instrument::Standard(inst) => log_standard(slot, inst, verbose),
            Instrument::Percussion(kit) => log_percussion(slot, kit, verbose),
        }
    }
    for skipped in &bank.skipped {
        log::warn!(
            "  {: <4} ???? 0x{: <8x} unknown tag 0x{:08x}",
            skipped.slot,
            skipped.offset,
            skipped.tag
        );
    }

    if check {
        match first_mismatch(&bank, bank_data)? {
            None => log::info!("Re-encoded bank matches input ✓"),
            Some(pos) => {
                return Err(invalid_data(format!(
                    "Re-encoded bank differs from input at offset 0x{pos:x}"
                )))
            }
        }
    }
    Ok(())
}
