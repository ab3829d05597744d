use clathrin_io::{chain_feature_map, load_structure_features, save_chain_labels, DirectoryStore};
use log::info;
use std::path::Path;

pub fn execute(input: String, output: String) -> anyhow::Result<()> {
    let loaded = load_structure_features(&input)?;
    let seq_len = loaded.features.get("aatype")?.dim(0)?;
    info!("featurizing {input}: {seq_len} residues");

    let chains = chain_feature_map(&loaded)?;
    let store = DirectoryStore::open(&output)?;
    let entry = Path::new(&input)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("entry");
    save_chain_labels(&store, entry, &chains)?;

    for (chain, features) in &chains {
        println!("chain {chain}: {}", features.summary());
    }
    println!("wrote {} label records to {output}", chains.len());
    Ok(())
}
