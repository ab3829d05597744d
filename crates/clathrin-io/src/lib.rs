//! # clathrin-io
//!
//! Structure I/O for the clathrin workspace:
//!
//! - loading PDB and mmCIF files into feature tensors
//! - splitting entry-level features into per-chain maps
//! - exporting backbone frames back to PDB text
//! - gzipped pickle label records and a directory-backed record store

pub mod export;
pub mod labels;
pub mod loader;

pub use export::{make_output, save_pdb, to_pdb, to_pdb_string, ExportError, Protein};
pub use labels::{
    save_chain_labels, validate_label, ChainLabel, DirectoryStore, IdMap, LabelArrayF32,
    LabelArrayI64, LabelError, RecordStore,
};
pub use loader::{
    chain_feature_map, load_cif_features, load_pdb_features, load_structure_features,
    LoadedStructure, LoaderError, PdbIndex,
};
