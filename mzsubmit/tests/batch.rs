//! Run whole batches on small bundles on disk

use std::path::Path;

use context_error::*;
use mzsubmit::*;

fn write(directory: &Path, name: &str, content: &str) {
    let path = directory.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn mzid(description: &str, location: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<MzIdentML xmlns="http://psidev.info/psi/pi/mzIdentML/1.1" id="mzid" version="1.1.0">
    <DataCollection>
        <Inputs>
            <SpectraData location="{location}" id="SD_1">
                <FileFormat/>
            </SpectraData>
        </Inputs>
    </DataCollection>
    <AnalysisData>
        <Description>{description}</Description>
    </AnalysisData>
</MzIdentML>
"#
    )
}

const MGF: &str = "COM=Original comment\nBEGIN IONS\nTITLE=scan=1\nPEPMASS=500.25\n100.0 20\nEND IONS\n";

fn file_names(directory: &Path) -> Vec<String> {
    let mut names = std::fs::read_dir(directory)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    names.sort();
    names
}

fn run(directory: &Path, settings: Settings) -> BatchSummary {
    Batch::new(directory, settings).unwrap().run().unwrap()
}

#[test]
fn sample_bundle() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "Sample_01(F004051).mzid",
        &mzid(
            "Sample_01(F004051) searched",
            "D:\\raw\\Sample_01(F004051)_run1.MGF",
        ),
    );
    write(dir.path(), "Sample_01(F004051)_run1.MGF", MGF);

    let summary = run(dir.path(), Settings::default());
    assert_eq!(
        (summary.processed(), summary.skipped(), summary.failed()),
        (1, 0, 0)
    );
    assert_eq!(
        summary.outcomes[0].identifier.as_deref(),
        Some("Sample_01_F004051")
    );

    let results = dir.path().join("results");
    assert_eq!(
        file_names(&results),
        vec!["Sample_01_F004051.mgf", "Sample_01_F004051.mzid"]
    );
    let document = Document::load(&results.join("Sample_01_F004051.mzid")).unwrap();
    assert_eq!(
        document.spectrum_locations(),
        vec!["Sample_01_F004051.mgf".to_string()]
    );
    let written = std::fs::read_to_string(results.join("Sample_01_F004051.mzid")).unwrap();
    assert!(written.contains("<MzIdentML xmlns=\"http://psidev.info/psi/pi/mzIdentML/1.1\""));
    assert!(written.contains("Sample_01_F004051 searched"));
    assert!(!written.contains("Sample_01(F004051)"));

    let spectrum = std::fs::read_to_string(results.join("Sample_01_F004051.mgf")).unwrap();
    assert_eq!(
        spectrum,
        MGF.replace("COM=Original comment", "COM=Sample_01_F004051")
    );
}

#[test]
fn missing_spectrum_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Lonely.mzid", &mzid("Lonely", "Lonely.mgf"));
    write(dir.path(), "Other.mgf", MGF);

    let summary = run(dir.path(), Settings::default());
    assert_eq!(
        (summary.processed(), summary.skipped(), summary.failed()),
        (0, 1, 0)
    );
    match &summary.outcomes[0].status {
        PairStatus::Skipped(reason) => {
            assert_eq!(reason.get_kind(), SubmitError::MissingSpectrumFile);
        }
        other => panic!("expected a skipped pair, got {other:?}"),
    }
    assert!(file_names(&dir.path().join("results")).is_empty());
}

#[test]
fn bare_ampersand_survives() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "Run1.mzid",
        &mzid("Smith & Wesson &amp; Run1", "Run1.mgf"),
    );
    write(dir.path(), "Run1.mgf", MGF);

    let summary = run(dir.path(), Settings::default());
    assert_eq!(summary.processed(), 1);

    let output = dir.path().join("results/Run1.mzid");
    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("Smith &amp; Wesson &amp; Run1"));
    let document = Document::load(&output).unwrap();
    let mut descriptions = Vec::new();
    document.root.for_each_element(&mut |e| {
        if e.local_name() == "Description" {
            descriptions.push(e.text());
        }
    });
    assert_eq!(descriptions, vec!["Smith & Wesson & Run1".to_string()]);
}

#[test]
fn missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("does_not_exist");
    let output = dir.path().join("out");
    let error = Batch::new(
        &input,
        Settings {
            output_directory: Some(output.clone()),
            ..Settings::default()
        },
    )
    .unwrap_err();
    assert_eq!(error.get_kind(), SubmitError::InputDirectoryMissing);
    assert!(error.get_kind().is_fatal());
    assert!(!output.exists());
    assert!(!input.join("results").exists());
}

#[test]
fn collisions_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "A(B).mzid", &mzid("first", "A(B)_1.mgf"));
    write(dir.path(), "A(B)_1.mgf", "COM=first\n");
    write(dir.path(), "AB.mzid", &mzid("second", "AB_2.mgf"));
    write(dir.path(), "AB_2.mgf", "COM=second\n");

    let summary = run(dir.path(), Settings::default());
    assert_eq!(
        (summary.processed(), summary.skipped(), summary.failed()),
        (1, 0, 1)
    );
    match &summary.outcomes[1].status {
        PairStatus::Failed(error) => {
            assert_eq!(error.get_kind(), SubmitError::IdentifierCollision);
        }
        other => panic!("expected a failed pair, got {other:?}"),
    }

    let results = dir.path().join("results");
    assert_eq!(file_names(&results), vec!["AB.mgf", "AB.mzid"]);
    let written = std::fs::read_to_string(results.join("AB.mzid")).unwrap();
    assert!(written.contains("<Description>first</Description>"));
    assert!(written.contains("location=\"AB.mgf\""));
}

#[test]
fn collisions_ignore_case() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Run.mzid", &mzid("upper", "Run.mgf"));
    write(dir.path(), "Run.mgf", MGF);
    write(dir.path(), "run.mzid", &mzid("lower", "run.mgf"));
    write(dir.path(), "run.mgf", MGF);

    let summary = run(dir.path(), Settings::default());
    assert_eq!((summary.processed(), summary.failed()), (1, 1));
}

#[test]
fn recursive_walk() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "S1.mzid", &mzid("S1", "S1.mgf"));
    write(dir.path(), "S1.mgf", MGF);
    write(dir.path(), "sub/S2.mzid", &mzid("S2", "S2_run.mgf"));
    write(dir.path(), "sub/S2_run.mgf", MGF);

    let flat = run(dir.path(), Settings::default());
    assert_eq!((flat.processed(), flat.outcomes.len()), (1, 1));

    // The results of the first run are not picked up again
    let recursive = run(
        dir.path(),
        Settings {
            recursive: true,
            ..Settings::default()
        },
    );
    assert_eq!(
        (recursive.processed(), recursive.skipped(), recursive.failed()),
        (2, 0, 0)
    );
    assert_eq!(
        file_names(&dir.path().join("results")),
        vec!["S1.mgf", "S1.mzid", "S2.mgf", "S2.mzid"]
    );
}

#[test]
fn spectrum_pairs_stay_in_their_directory() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a/S1.mzid", &mzid("S1", "S1.mgf"));
    write(dir.path(), "b/S1.mgf", MGF);

    let summary = run(
        dir.path(),
        Settings {
            recursive: true,
            ..Settings::default()
        },
    );
    assert_eq!(summary.skipped(), 1);
}

#[test]
fn extension_case_policy() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Run.MZID", &mzid("Run", "Run.mgf"));
    write(dir.path(), "Run.MGF", MGF);

    let sensitive = run(
        dir.path(),
        Settings {
            extension_case_sensitive: true,
            output_directory: Some(dir.path().join("sensitive")),
            ..Settings::default()
        },
    );
    assert!(sensitive.outcomes.is_empty());

    let insensitive = run(dir.path(), Settings::default());
    assert_eq!(insensitive.processed(), 1);
    assert_eq!(
        file_names(&dir.path().join("results")),
        vec!["Run.mgf", "Run.mzid"]
    );
}

#[test]
fn embedded_reference_pairing() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "run7.mzid",
        &mzid("run7", "C:\\instrument\\spectra_x.MGF"),
    );
    write(dir.path(), "spectra_x.MGF", MGF);

    let by_name = run(dir.path(), Settings::default());
    assert_eq!(by_name.skipped(), 1);

    let output = dir.path().join("out");
    let by_reference = run(
        dir.path(),
        Settings {
            pairing: PairingStrategy::EmbeddedReference,
            spectrum_reference: ReferenceStyle::OutputPath,
            output_directory: Some(output.clone()),
            ..Settings::default()
        },
    );
    assert_eq!(by_reference.processed(), 1);
    assert_eq!(file_names(&output), vec!["run7.mgf", "run7.mzid"]);
    let document = Document::load(&output.join("run7.mzid")).unwrap();
    assert_eq!(
        document.spectrum_locations(),
        vec![output.join("run7.mgf").to_string_lossy().to_string()]
    );
}

#[test]
fn unparseable_document_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "Broken.mzid",
        "<MzIdentML><Inputs></MzIdentML>",
    );
    write(dir.path(), "Broken.mgf", MGF);
    write(dir.path(), "Fine.mzid", &mzid("Fine", "Fine.mgf"));
    write(dir.path(), "Fine.mgf", MGF);

    let summary = run(dir.path(), Settings::default());
    assert_eq!(
        (summary.processed(), summary.skipped(), summary.failed()),
        (1, 0, 1)
    );
    match &summary.outcomes[0].status {
        PairStatus::Failed(error) => assert_eq!(error.get_kind(), SubmitError::InvalidXml),
        other => panic!("expected a failed pair, got {other:?}"),
    }
    assert_eq!(
        file_names(&dir.path().join("results")),
        vec!["Fine.mgf", "Fine.mzid"]
    );
}

#[test]
fn replace_policy_and_report() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Run 1 (final).mzid", &mzid("Run 1 (final)", "x.mgf"));
    write(dir.path(), "Run 1 (final).mgf", MGF);
    write(dir.path(), "Missing.mzid", &mzid("Missing", "Missing.mgf"));

    let summary = run(
        dir.path(),
        Settings {
            sanitize_policy: SanitizePolicy::Replace,
            ..Settings::default()
        },
    );
    assert_eq!(summary.outcomes[1].identifier.as_deref(), Some("Run_1_final_"));

    let report = serde_json::to_value(summary.report()).unwrap();
    assert_eq!(report["processed"], 1);
    assert_eq!(report["skipped"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["pairs"][0]["status"], "skipped");
    assert_eq!(report["pairs"][1]["status"], "processed");
    assert_eq!(report["pairs"][1]["outputs"].as_array().unwrap().len(), 2);
    assert!(summary.to_string().ends_with(&format!(
        "1 processed, 1 skipped, 0 failed (output in {})",
        dir.path().join("results").display()
    )));
}

#[test]
fn invalid_settings_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let error = Batch::new(
        dir.path(),
        Settings {
            substitutions: vec![Substitution::new("abc", "x")],
            ..Settings::default()
        },
    )
    .unwrap_err();
    assert_eq!(error.get_kind(), SubmitError::InvalidSettings);
    assert!(!dir.path().join("results").exists());
}

#[cfg(unix)]
#[test]
fn symlink_cycles_are_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "S1.mzid", &mzid("S1", "S1.mgf"));
    write(dir.path(), "S1.mgf", MGF);
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();

    let summary = run(
        dir.path(),
        Settings {
            recursive: true,
            ..Settings::default()
        },
    );
    assert_eq!(
        (summary.outcomes.len(), summary.processed(), summary.failed()),
        (1, 1, 0)
    );
}

#[test]
fn prefix_identifiers_pair_with_their_own_spectrum() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "S1.mzid", &mzid("S1", "S1_run.mgf"));
    write(dir.path(), "S1_run.mgf", "COM=one\n");
    write(dir.path(), "S10.mzid", &mzid("S10", "S10_run.mgf"));
    write(dir.path(), "S10_run.mgf", "COM=ten\n");

    let summary = run(dir.path(), Settings::default());
    assert_eq!(summary.processed(), 2);
    let spectra = summary
        .outcomes
        .iter()
        .map(|outcome| match &outcome.status {
            PairStatus::Processed { spectrum, .. } => {
                spectrum.file_name().unwrap().to_string_lossy().to_string()
            }
            other => panic!("expected a processed pair, got {other:?}"),
        })
        .collect::<Vec<_>>();
    assert_eq!(spectra, vec!["S1_run.mgf", "S10_run.mgf"]);
}

#[test]
fn failed_document_write_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Run1.mzid", &mzid("Run1", "Run1.mgf"));
    write(dir.path(), "Run1.mgf", MGF);
    let results = dir.path().join("results");
    std::fs::create_dir_all(results.join("Run1.mzid")).unwrap();

    let summary = run(dir.path(), Settings::default());
    assert_eq!((summary.processed(), summary.failed()), (0, 1));
    match &summary.outcomes[0].status {
        PairStatus::Failed(error) => assert_eq!(error.get_kind(), SubmitError::FileNotWritable),
        other => panic!("expected a failed pair, got {other:?}"),
    }
    assert!(!results.join("Run1.mgf").exists());
    assert!(results.join("Run1.mzid").is_dir());
}

#[test]
fn output_extensions_are_lowercase() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Run.mzid", &mzid("Run", "Run.mgf"));
    write(dir.path(), "Run.MGF", MGF);

    let summary = run(
        dir.path(),
        Settings {
            identification_extension: "MZID".to_string(),
            spectrum_extension: "MGF".to_string(),
            ..Settings::default()
        },
    );
    assert_eq!(summary.processed(), 1);
    assert_eq!(
        file_names(&dir.path().join("results")),
        vec!["Run.mgf", "Run.mzid"]
    );
}
