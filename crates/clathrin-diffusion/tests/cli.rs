use assert_cmd::Command;
use clathrin_test_data::TestFile;

#[test]
fn test_featurize_writes_label_records() {
    let (input, _temp) = TestFile::peptide_pdb().create_temp().unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("clathrin").unwrap();
    cmd.arg("featurize")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(out_dir.path());
    cmd.assert().success();

    let records: Vec<String> = std::fs::read_dir(out_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(records.len(), 1, "one chain, one record");
    assert!(records[0].ends_with("_A.label.pkl.gz"));
}

#[test]
fn test_featurize_dimer_yields_two_records() {
    let (input, _temp) = TestFile::dimer_pdb().create_temp().unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("clathrin").unwrap();
    cmd.arg("featurize")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(out_dir.path());
    cmd.assert().success();

    let mut records: Vec<String> = std::fs::read_dir(out_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    records.sort();
    assert_eq!(records.len(), 2);
    assert!(records[0].ends_with("_A.label.pkl.gz"));
    assert!(records[1].ends_with("_B.label.pkl.gz"));
}

#[test]
fn test_diffuse_writes_noisy_backbone() {
    let (input, _temp) = TestFile::peptide_pdb().create_temp().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let out_pdb = out_dir.path().join("noisy.pdb");

    let mut cmd = Command::cargo_bin("clathrin").unwrap();
    cmd.arg("diffuse")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&out_pdb)
        .arg("--seed")
        .arg("7")
        .arg("--t")
        .arg("0.5");
    cmd.assert().success();

    let pdb = std::fs::read_to_string(&out_pdb).unwrap();
    assert!(pdb.starts_with("MODEL"));
    assert!(pdb.contains("ATOM"));
    assert!(pdb.contains("ENDMDL"));
}

#[test]
fn test_diffuse_reads_job_config() {
    let (input, _temp) = TestFile::peptide_pdb().create_temp().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let out_pdb = out_dir.path().join("noisy.pdb");
    let config_path = out_dir.path().join("job.json");
    std::fs::write(
        &config_path,
        format!(
            r#"{{"name": "peptide", "input": "{}", "seed": 3, "diffusion_t": 0.25}}"#,
            input
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("clathrin").unwrap();
    cmd.arg("diffuse")
        .arg("--config")
        .arg(&config_path)
        .arg("--output")
        .arg(&out_pdb);
    cmd.assert().success();
    assert!(out_pdb.exists());
}

#[test]
fn test_interpolate_writes_numbered_models() {
    let (from, _t1) = TestFile::peptide_pdb().create_temp().unwrap();
    let (to, _t2) = TestFile::peptide_pdb().create_temp().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let models = out_dir.path().join("models");

    let mut cmd = Command::cargo_bin("clathrin").unwrap();
    cmd.arg("interpolate")
        .arg("--from")
        .arg(&from)
        .arg("--to")
        .arg(&to)
        .arg("--steps")
        .arg("2")
        .arg("--output")
        .arg(&models);
    cmd.assert().success();

    assert!(models.join("model_000.pdb").exists());
    assert!(models.join("model_001.pdb").exists());
    assert!(models.join("model_002.pdb").exists());
    assert!(!models.join("model_003.pdb").exists());
}

#[test]
fn test_interpolate_rejects_length_mismatch() {
    let (from, _t1) = TestFile::peptide_pdb().create_temp().unwrap();
    let (to, _t2) = TestFile::dimer_pdb().create_temp().unwrap();
    let out_dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("clathrin").unwrap();
    cmd.arg("interpolate")
        .arg("--from")
        .arg(&from)
        .arg("--to")
        .arg(&to)
        .arg("--output")
        .arg(out_dir.path().join("models"));
    cmd.assert().failure();
}
