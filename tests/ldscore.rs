mod common;

use std::path::Path;

use approx::assert_abs_diff_eq;

use ldsc::binning::REFERENCE_BIN;
use ldsc::genotype::{GenotypeSource, PlinkBed};
use ldsc::io::{extract_f64_column, read_numeric_row, read_table};
use ldsc::ldscore::{freq, ldscore, window_boundaries};
use ldsc::request::{FreqConfig, LdScoreFlags, WindowSize};
use ldsc::types::{KeepMask, SnpList, SnpRecord};

const N_SNPS: usize = 10;
const N_INDIV: usize = 20;

fn panel(dir: &Path) -> String {
    let prefix = dir.join("panel");
    let bp: Vec<i64> = (0..N_SNPS as i64).map(|j| 1000 * (j + 1)).collect();
    common::write_plink(&prefix, &common::cycling_dosages(N_SNPS, N_INDIV), &bp);
    prefix.to_string_lossy().into_owned()
}

fn snp_list(n: usize, spacing: i64) -> SnpList {
    SnpList::new(
        (0..n)
            .map(|i| SnpRecord {
                chr: "1".to_string(),
                id: format!("rs{i}"),
                bp: spacing * i as i64,
                cm: 0.0,
            })
            .collect(),
    )
}

#[test]
fn whole_chromosome_window_needs_override() {
    let snps = snp_list(500, 1000);
    let wide = WindowSize::Kb(10_000.0);
    let err = window_boundaries(&snps, wide, false).expect_err("whole chromosome");
    assert!(err.to_string().contains("--yes-really"));

    let block_left = window_boundaries(&snps, wide, true).expect("override");
    assert!(block_left.iter().all(|b| *b == 0));

    let narrow = window_boundaries(&snps, WindowSize::Kb(10.0), false).expect("narrow");
    assert_eq!(narrow[499], 489);
}

#[test]
fn plink_reader_standardizes_and_drops_monomorphic_snps() {
    let dir = tempfile::tempdir().expect("tempdir");
    let prefix = dir.path().join("mono");
    let mut dosages = common::cycling_dosages(3, 8);
    dosages[1] = vec![2; 8];
    dosages[2][3] = common::MISSING;
    common::write_plink(&prefix, &dosages, &[100, 200, 300]);

    let mut bed = PlinkBed::open(&prefix.to_string_lossy()).expect("open");
    assert_eq!(bed.snps().len(), 3);
    assert_eq!(bed.individuals().len(), 8);

    let geno = bed.read(&KeepMask::all(3), None, 0.0).expect("read");
    assert_eq!(geno.kept.indices(), vec![0, 2]);
    assert_eq!(geno.n_snps(), 2);
    for col in geno.standardized.columns() {
        let mean = col.sum() / col.len() as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn self_only_window_gives_unit_scores() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bfile = panel(dir.path());
    let out = dir.path().join("out").to_string_lossy().into_owned();
    let mut flags = LdScoreFlags::new(bfile, out);
    flags.ld_wind_snps = Some(0);
    flags.chunk_size = 3;
    let config = flags.validate().expect("valid");

    let mut log = common::open_log(dir.path());
    let outcome = ldscore(&config, &mut log).expect("ldscore");
    assert_eq!(outcome.names, vec!["L2".to_string()]);
    assert_eq!(outcome.m, vec![N_SNPS as f64]);
    assert_eq!(outcome.m_5_50, vec![N_SNPS as f64]);
    assert!(outcome.condition_number.is_none());
    for score in outcome.scores.iter() {
        assert_abs_diff_eq!(*score, 1.0, epsilon = 1e-9);
    }

    let table = read_table(&outcome.ldscore_path).expect("read scores");
    assert_eq!(table.height(), N_SNPS);
    let written = extract_f64_column(&table, "L2").expect("L2");
    assert_abs_diff_eq!(written[0], 1.0, epsilon = 1e-9);
    let m = read_numeric_row(&dir.path().join("out.l2.M")).expect("M");
    assert_eq!(m, vec![N_SNPS as f64]);
    let raw = std::fs::read_to_string(dir.path().join("out.l2.M")).expect("read M");
    assert_eq!(raw, format!("{N_SNPS}\n"));
}

#[test]
fn windowed_scores_include_neighbours() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bfile = panel(dir.path());
    let out = dir.path().join("out").to_string_lossy().into_owned();
    let mut flags = LdScoreFlags::new(bfile, out);
    flags.ld_wind_kb = Some(3.0);
    let config = flags.validate().expect("valid");

    let mut log = common::open_log(dir.path());
    let outcome = ldscore(&config, &mut log).expect("ldscore");
    // columns j and j + 3 carry the same genotypes
    assert!(outcome.scores[[3, 0]] > 1.9);
    assert!(outcome.scores.iter().all(|s| s.is_finite()));
}

#[test]
fn window_spanning_the_panel_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bfile = panel(dir.path());
    let out = dir.path().join("out").to_string_lossy().into_owned();
    let mut flags = LdScoreFlags::new(bfile, out);
    flags.ld_wind_kb = Some(1000.0);
    let config = flags.validate().expect("valid");

    let mut log = common::open_log(dir.path());
    assert!(ldscore(&config, &mut log).is_err());

    flags.yes_really = true;
    let config = flags.validate().expect("valid");
    ldscore(&config, &mut log).expect("override");
}

#[test]
fn binned_annotation_scores_and_annot_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bfile = panel(dir.path());
    let cts = dir.path().join("pos.cts");
    let content: String = (0..N_SNPS).map(|j| format!("rs{j} {j}\n")).collect();
    common::write_text(&cts, &content);

    let out = dir.path().join("out").to_string_lossy().into_owned();
    let mut flags = LdScoreFlags::new(bfile, out);
    flags.ld_wind_snps = Some(0);
    flags.cts_bin_add = Some(vec![cts]);
    flags.cts_breaks = Some("3,6".to_string());
    flags.cts_names = Some(vec!["POS".to_string()]);
    let config = flags.validate().expect("valid");

    let mut log = common::open_log(dir.path());
    let outcome = ldscore(&config, &mut log).expect("ldscore");
    assert_eq!(
        outcome.names,
        vec![
            format!("{REFERENCE_BIN}L2"),
            "POS_3_6L2".to_string(),
            "POS_6_maxL2".to_string(),
        ]
    );
    assert_eq!(outcome.m, vec![4.0, 3.0, 3.0]);
    for row in outcome.scores.rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
    assert!(outcome.condition_number.is_some());
    assert!(dir.path().join("out.annot.gz").exists());
}

#[test]
fn print_snps_restricts_rows_but_not_m() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bfile = panel(dir.path());
    let list = dir.path().join("print.txt");
    common::write_text(&list, "rs2\nrs5\nrs99\n");

    let out = dir.path().join("out").to_string_lossy().into_owned();
    let mut flags = LdScoreFlags::new(bfile, out);
    flags.ld_wind_snps = Some(2);
    flags.print_snps = Some(list);
    let config = flags.validate().expect("valid");

    let mut log = common::open_log(dir.path());
    let outcome = ldscore(&config, &mut log).expect("ldscore");
    assert_eq!(outcome.snps.ids(), vec!["rs2".to_string(), "rs5".to_string()]);
    assert_eq!(outcome.scores.nrows(), 2);
    assert_eq!(outcome.m, vec![N_SNPS as f64]);
}

#[test]
fn pq_scaling_renames_and_rescales() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bfile = panel(dir.path());
    let out = dir.path().join("out").to_string_lossy().into_owned();
    let mut flags = LdScoreFlags::new(bfile, out);
    flags.ld_wind_snps = Some(0);
    flags.per_allele = true;
    let config = flags.validate().expect("valid");

    let mut log = common::open_log(dir.path());
    let outcome = ldscore(&config, &mut log).expect("ldscore");
    assert_eq!(outcome.names, vec!["L2_S1".to_string()]);
    for (score, maf) in outcome.scores.iter().zip(&outcome.maf) {
        assert_abs_diff_eq!(*score, maf * (1.0 - maf), epsilon = 1e-9);
    }
}

#[test]
fn frequency_report_covers_extracted_snps() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bfile = panel(dir.path());
    let extract = dir.path().join("extract.txt");
    common::write_text(&extract, "rs0\nrs1\nrs4\n");

    let config = FreqConfig {
        bfile,
        out: dir.path().join("out").to_string_lossy().into_owned(),
        extract: Some(extract),
        keep: None,
    };
    let mut log = common::open_log(dir.path());
    let path = freq(&config, &mut log).expect("freq");
    let table = read_table(&path).expect("read frq");
    assert_eq!(table.height(), 3);
    let frq = extract_f64_column(&table, "FRQ").expect("FRQ");
    assert!(frq.iter().all(|f| (0.0..=1.0).contains(f)));
}
