//! clathrin-test-data
//!
//! Small structure files embedded in the crate so tests can run without
//! touching the network or a shared data directory.
//!
//! Each file is wrapped in a [`TestFile`] that writes the bytes to a named
//! temporary file and hands back its path.
use std::fs;
use tempfile::{Builder, NamedTempFile};

/// An embedded test file.
///
/// Example usage:
///
/// ```ignore
/// // returns (filepath, _tempfile_handle).
/// // keep the handle in scope or the file is removed
/// use clathrin_test_data::TestFile;
/// let (path, _temp) = TestFile::peptide_pdb().create_temp().unwrap();
/// ```
#[derive(Debug)]
pub struct TestFile {
    filebinary: &'static [u8],
    suffix: &'static str,
}

impl TestFile {
    /// Three-residue MET-ALA-GLY peptide, single chain, idealized backbone
    /// geometry laid out along x.
    pub fn peptide_pdb() -> Self {
        Self {
            filebinary: include_bytes!("../data/peptide_3res.pdb"),
            suffix: "pdb",
        }
    }

    /// The same peptide as [`TestFile::peptide_pdb`] in mmCIF form.
    pub fn peptide_cif() -> Self {
        Self {
            filebinary: include_bytes!("../data/peptide_3res.cif"),
            suffix: "cif",
        }
    }

    /// Two chains of two residues each, chain B offset 12 angstrom in y.
    pub fn dimer_pdb() -> Self {
        Self {
            filebinary: include_bytes!("../data/dimer_2chain.pdb"),
            suffix: "pdb",
        }
    }

    pub fn create_temp(&self) -> std::io::Result<(String, NamedTempFile)> {
        let temp = Builder::new()
            .suffix(&format!(".{}", self.suffix))
            .tempfile()?;

        fs::write(&temp, self.filebinary)?;
        let path = temp.path().to_string_lossy().into_owned();

        Ok((path, temp))
    }
}
