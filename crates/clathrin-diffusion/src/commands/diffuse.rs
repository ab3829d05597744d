use candle_core::{DType, Device, Tensor, D};
use clathrin_core::backbone::atom37_to_backbone_frames;
use clathrin_core::residue::NUM_CHI_ANGLES;
use clathrin_core::DEFAULT_FRAME_EPS;
use clathrin_diffusion::{build_prior_features, gen_region_mask, IsotropicPrior, JobConfig};
use clathrin_io::{load_structure_features, save_pdb};
use log::info;

pub fn execute(
    input: Option<String>,
    output: String,
    seed: Option<u64>,
    t: Option<f64>,
    gen_region: Option<String>,
    config: Option<String>,
) -> anyhow::Result<()> {
    let job = config.as_deref().map(JobConfig::from_json_file).transpose()?;
    // Command-line flags win over the job file.
    let input = input
        .or_else(|| job.as_ref().map(|job| job.input.clone()))
        .ok_or_else(|| anyhow::anyhow!("pass --input or a --config file naming one"))?;
    let seed = seed.or(job.as_ref().map(|job| job.seed)).unwrap_or(0);
    let t = t.or(job.as_ref().map(|job| job.diffusion_t)).unwrap_or(1.0);
    let gen_region = gen_region
        .or_else(|| job.as_ref().map(|job| job.gen_region.clone()))
        .unwrap_or_else(|| "-0:0".to_string());
    let prior_config = job.map(|job| job.prior).unwrap_or_default();

    let device = Device::Cpu;
    let loaded = load_structure_features(&input)?;
    let mut features = atom37_to_backbone_frames(&loaded.features, DEFAULT_FRAME_EPS)?;
    let frames = features.get("backb_frames")?.clone();
    let frame_mask = features.get("backb_frame_mask")?.clone();
    let seq_len = frame_mask.dim(D::Minus1)?;
    info!("diffusing {input}: {seq_len} residues, t = {t}, seed = {seed}");

    features.insert("true_frame_tensor", frames);
    features.insert("frame_mask", frame_mask);
    features.insert(
        "frame_gen_mask",
        gen_region_mask(seq_len, &gen_region, &device)?,
    );
    features.insert("diffusion_t", Tensor::full(t as f32, (), &device)?);
    if prior_config.chi_enabled {
        features.insert(
            "chi_angles_sin_cos",
            Tensor::zeros((seq_len, NUM_CHI_ANGLES, 2), DType::F32, &device)?,
        );
        features.insert(
            "chi_mask",
            Tensor::zeros((seq_len, NUM_CHI_ANGLES), DType::F32, &device)?,
        );
    }

    let diffuser = IsotropicPrior {
        trans_scale: prior_config.trans_scale,
    };
    let noised = build_prior_features(&features, &diffuser, seed, &prior_config)?;

    save_pdb(
        &output,
        features.get("aatype")?,
        noised.get("noisy_frames")?,
        features.get("seq_mask")?,
        features.get("residue_index")?,
        features.get("chain_id")?,
        None,
        1,
        false,
    )?;
    println!("wrote noisy backbone to {output}");
    Ok(())
}
