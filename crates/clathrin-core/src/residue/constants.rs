//! Residue-level constants: the residue-type alphabet, the 37-slot heavy-atom
//! layout and the idealized backbone geometry used when rebuilding atomic
//! coordinates from frames.

use strum::{Display, EnumIter, EnumString};

/// One-letter residue types in model-index order, index 20 is the unknown type.
pub const RESTYPES: &str = "ARNDCQEGHILKMFPSTWYV";

/// Number of standard residue types (excluding the unknown type).
pub const NUM_RESTYPES: usize = 20;

/// Index reserved for the unknown residue type `X`.
pub const UNKNOWN_RESTYPE: i64 = 20;

/// Number of slots in the fixed heavy-atom layout.
pub const NUM_ATOM_TYPES: usize = 37;

/// Number of side-chain torsion angles carried per residue.
pub const NUM_CHI_ANGLES: usize = 4;

/// Chain identifiers in the order chain indices map to PDB chain tags.
pub const PDB_CHAIN_IDS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Idealized N, CA, C positions in the local frame of a residue, CA at the
/// origin and C on the x axis.
pub const N_CA_C_IDEAL: [[f32; 3]; 3] = [
    [-0.5250, 1.3630, 0.0000],
    [0.0000, 0.0000, 0.0000],
    [1.5260, 0.0000, 0.0000],
];

/// Backbone oxygen position in the local frame spanned by CA, C and the next
/// residue's N.
pub const OXYGEN_OFFSET: [f32; 3] = [0.6270, -1.0620, 0.0000];

#[rustfmt::skip]
pub fn aa1to_int(aa: char) -> i64 {
    match aa {
        'A' => 0,  'R' => 1,  'N' => 2,  'D' => 3,  'C' => 4,
        'Q' => 5,  'E' => 6,  'G' => 7,  'H' => 8,  'I' => 9,
        'L' => 10, 'K' => 11, 'M' => 12, 'F' => 13, 'P' => 14,
        'S' => 15, 'T' => 16, 'W' => 17, 'Y' => 18, 'V' => 19,
        _ => 20,
    }
}

#[rustfmt::skip]
pub fn int_to_aa1(idx: i64) -> char {
    match idx {
        0 => 'A',  1 => 'R',  2 => 'N',  3 => 'D',  4 => 'C',
        5 => 'Q',  6 => 'E',  7 => 'G',  8 => 'H',  9 => 'I',
        10 => 'L', 11 => 'K', 12 => 'M', 13 => 'F', 14 => 'P',
        15 => 'S', 16 => 'T', 17 => 'W', 18 => 'Y', 19 => 'V',
        _ => 'X',
    }
}

#[rustfmt::skip]
pub fn aa1to3(aa: char) -> &'static str {
    match aa {
        'A' => "ALA", 'R' => "ARG", 'N' => "ASN", 'D' => "ASP", 'C' => "CYS",
        'Q' => "GLN", 'E' => "GLU", 'G' => "GLY", 'H' => "HIS", 'I' => "ILE",
        'L' => "LEU", 'K' => "LYS", 'M' => "MET", 'F' => "PHE", 'P' => "PRO",
        'S' => "SER", 'T' => "THR", 'W' => "TRP", 'Y' => "TYR", 'V' => "VAL",
        _ => "UNK",
    }
}

#[rustfmt::skip]
pub fn aa3to1(aa3: &str) -> char {
    match aa3 {
        "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D', "CYS" => 'C',
        "GLN" => 'Q', "GLU" => 'E', "GLY" => 'G', "HIS" => 'H', "ILE" => 'I',
        "LEU" => 'L', "LYS" => 'K', "MET" => 'M', "PHE" => 'F', "PRO" => 'P',
        "SER" => 'S', "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
        _ => 'X',
    }
}

/// Three-letter residue name for a residue-type index.
pub fn int_to_aa3(idx: i64) -> &'static str {
    aa1to3(int_to_aa1(idx))
}

/// The 37 heavy-atom slots shared by all residue types. The discriminant of
/// each variant is its slot in `(L, 37, ...)` shaped arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, EnumIter)]
pub enum Atom37 {
    N = 0,
    CA = 1,
    C = 2,
    CB = 3,
    O = 4,
    CG = 5,
    CG1 = 6,
    CG2 = 7,
    OG = 8,
    OG1 = 9,
    SG = 10,
    CD = 11,
    CD1 = 12,
    CD2 = 13,
    ND1 = 14,
    ND2 = 15,
    OD1 = 16,
    OD2 = 17,
    SD = 18,
    CE = 19,
    CE1 = 20,
    CE2 = 21,
    CE3 = 22,
    NE = 23,
    NE1 = 24,
    NE2 = 25,
    OE1 = 26,
    OE2 = 27,
    CH2 = 28,
    NH1 = 29,
    NH2 = 30,
    OH = 31,
    CZ = 32,
    CZ2 = 33,
    CZ3 = 34,
    NZ = 35,
    OXT = 36,
    Unknown = -1,
}

impl Atom37 {
    pub fn to_index(&self) -> usize {
        *self as usize
    }
}

/// Atom names in slot order.
pub fn atom37_names() -> impl Iterator<Item = String> {
    use strum::IntoEnumIterator;
    Atom37::iter()
        .filter(|a| *a != Atom37::Unknown)
        .map(|a| a.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_atom37_slots() {
        assert_eq!(Atom37::N.to_index(), 0);
        assert_eq!(Atom37::CA.to_index(), 1);
        assert_eq!(Atom37::C.to_index(), 2);
        assert_eq!(Atom37::CB.to_index(), 3);
        assert_eq!(Atom37::O.to_index(), 4);
        assert_eq!(Atom37::OXT.to_index(), 36);
        assert_eq!(atom37_names().count(), NUM_ATOM_TYPES);
    }

    #[test]
    fn test_atom37_names() {
        assert_eq!(Atom37::from_str("CA"), Ok(Atom37::CA));
        assert_eq!(Atom37::from_str("CG2"), Ok(Atom37::CG2));
        assert_eq!(Atom37::CD1.to_string(), "CD1");
        assert!(Atom37::from_str("HB2").is_err());
    }

    #[test]
    fn test_restype_mappings() {
        for (i, aa) in RESTYPES.chars().enumerate() {
            assert_eq!(aa1to_int(aa), i as i64);
            assert_eq!(int_to_aa1(i as i64), aa);
            assert_eq!(aa3to1(aa1to3(aa)), aa);
        }
        assert_eq!(aa1to_int('Z'), UNKNOWN_RESTYPE);
        assert_eq!(int_to_aa1(20), 'X');
        assert_eq!(int_to_aa3(12), "MET");
        assert_eq!(int_to_aa3(20), "UNK");
    }

    #[test]
    fn test_chain_ids() {
        assert_eq!(PDB_CHAIN_IDS.len(), 62);
        assert_eq!(PDB_CHAIN_IDS.chars().next(), Some('A'));
    }
}
