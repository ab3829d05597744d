use clathrin_core::backbone::backbone_frames;
use clathrin_core::{remove_center, DEFAULT_FRAME_EPS};
use clathrin_diffusion::interpolate_frames;
use clathrin_io::{load_structure_features, save_pdb};
use log::info;
use std::fs;
use std::path::Path;

pub fn execute(from: String, to: String, steps: usize, output: String) -> anyhow::Result<()> {
    let start = load_structure_features(&from)?;
    let end = load_structure_features(&to)?;
    let len_start = start.features.get("aatype")?.dim(0)?;
    let len_end = end.features.get("aatype")?.dim(0)?;
    if len_start != len_end {
        anyhow::bail!("structures differ in length: {len_start} vs {len_end}");
    }
    info!("interpolating {from} -> {to} in {steps} steps");

    let (frames_start, _) = backbone_frames(
        start.features.get("all_atom_positions")?,
        start.features.get("all_atom_mask")?,
        DEFAULT_FRAME_EPS,
    )?;
    let (frames_end, _) = backbone_frames(
        end.features.get("all_atom_positions")?,
        end.features.get("all_atom_mask")?,
        DEFAULT_FRAME_EPS,
    )?;
    let seq_mask = start.features.get("seq_mask")?;
    let centered = remove_center(&[&frames_start, &frames_end], seq_mask, 1e-12)?;
    let path = interpolate_frames(&centered[0], &centered[1], steps)?;

    fs::create_dir_all(&output)?;
    for (i, frames) in path.iter().enumerate() {
        let file = Path::new(&output).join(format!("model_{i:03}.pdb"));
        save_pdb(
            &file,
            start.features.get("aatype")?,
            frames,
            seq_mask,
            start.features.get("residue_index")?,
            start.features.get("chain_id")?,
            None,
            i + 1,
            false,
        )?;
    }
    println!("wrote {} models to {output}", path.len());
    Ok(())
}
