#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use ldsc::logging::RunLog;

/// Sentinel for a missing genotype in `write_plink`.
pub const MISSING: u8 = 255;

pub fn write_text(path: &Path, content: &str) {
    let mut file = File::create(path).expect("create file");
    file.write_all(content.as_bytes()).expect("write file");
}

pub fn write_gz(path: &Path, content: &str) {
    let file = File::create(path).expect("create gz file");
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(content.as_bytes()).expect("write gz");
    encoder.finish().expect("finish gz");
}

pub fn open_log(dir: &Path) -> RunLog {
    RunLog::open(&dir.join("test.log")).expect("open log")
}

/// Writes `<prefix>.bed/.bim/.fam`. `dosages[snp][indiv]` counts allele 1
/// (0, 1, 2, or `MISSING`).
pub fn write_plink(prefix: &Path, dosages: &[Vec<u8>], bp: &[i64]) {
    let n_indiv = dosages.first().map_or(0, Vec::len);
    let prefix = prefix.to_string_lossy();

    let mut fam = String::new();
    for i in 0..n_indiv {
        fam.push_str(&format!("fam{i} ind{i} 0 0 1 -9\n"));
    }
    write_text(Path::new(&format!("{prefix}.fam")), &fam);

    let mut bim = String::new();
    for (j, pos) in bp.iter().enumerate() {
        let cm = *pos as f64 / 1_000_000.0;
        bim.push_str(&format!("1\trs{j}\t{cm}\t{pos}\tA\tG\n"));
    }
    write_text(Path::new(&format!("{prefix}.bim")), &bim);

    let mut bytes = vec![0x6c, 0x1b, 0x01];
    for snp in dosages {
        for chunk in snp.chunks(4) {
            let mut byte = 0u8;
            for (k, dosage) in chunk.iter().enumerate() {
                let code = match *dosage {
                    2 => 0b00,
                    1 => 0b10,
                    0 => 0b11,
                    _ => 0b01,
                };
                byte |= code << (2 * k);
            }
            bytes.push(byte);
        }
    }
    let mut bed = File::create(format!("{prefix}.bed")).expect("create bed");
    bed.write_all(&bytes).expect("write bed");
}

/// Polymorphic genotypes for `n_snps` SNPs over `n_indiv` individuals.
pub fn cycling_dosages(n_snps: usize, n_indiv: usize) -> Vec<Vec<u8>> {
    (0..n_snps)
        .map(|j| (0..n_indiv).map(|i| ((i + j) % 3) as u8).collect())
        .collect()
}

/// LD Scores `1 + 0.9 * (i % 10)` for `rs0..rs{n}`.
pub fn ld_values(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + 0.9 * (i % 10) as f64).collect()
}

/// Writes `<prefix>.l2.ldscore.gz` with one score column per `(name, values)`.
pub fn write_ldscore(prefix: &Path, columns: &[(&str, Vec<f64>)]) {
    let n = columns.first().map_or(0, |(_, v)| v.len());
    let mut out = String::from("CHR\tSNP\tBP\tCM\tMAF");
    for (name, _) in columns {
        out.push('\t');
        out.push_str(name);
    }
    out.push('\n');
    for i in 0..n {
        out.push_str(&format!("1\trs{i}\t{}\t0\t0.3", 1000 * (i + 1)));
        for (_, values) in columns {
            out.push_str(&format!("\t{}", values[i]));
        }
        out.push('\n');
    }
    write_gz(
        Path::new(&format!("{}.l2.ldscore.gz", prefix.to_string_lossy())),
        &out,
    );
}

pub fn write_m(prefix: &Path, m: &[f64]) {
    let line = m
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\t");
    write_text(
        Path::new(&format!("{}.l2.M_5_50", prefix.to_string_lossy())),
        &format!("{line}\n"),
    );
}

/// `<prefix>.chisq.gz` following `chi^2 = 1 + N h2 l / M` exactly.
pub fn write_chisq(prefix: &Path, ld: &[f64], n: f64, h2: f64, m: f64) {
    let mut out = String::from("SNP\tCHISQ\tN\n");
    for (i, l) in ld.iter().enumerate() {
        let chisq = 1.0 + n * h2 * l / m;
        out.push_str(&format!("rs{i}\t{chisq}\t{n}\n"));
    }
    write_gz(
        Path::new(&format!("{}.chisq.gz", prefix.to_string_lossy())),
        &out,
    );
}

pub fn write_allele(prefix: &Path, n: usize, allele: &str) {
    let mut out = String::from("SNP\tINC_ALLELE\n");
    for i in 0..n {
        out.push_str(&format!("rs{i}\t{allele}\n"));
    }
    write_gz(
        Path::new(&format!("{}.allele.gz", prefix.to_string_lossy())),
        &out,
    );
}

/// Like `write_chisq`, with an `INFO` column.
pub fn write_chisq_info(prefix: &Path, ld: &[f64], n: f64, h2: f64, m: f64, info: &[f64]) {
    let mut out = String::from("SNP\tCHISQ\tN\tINFO\n");
    for (i, (l, score)) in ld.iter().zip(info).enumerate() {
        let chisq = 1.0 + n * h2 * l / m;
        out.push_str(&format!("rs{i}\t{chisq}\t{n}\t{score}\n"));
    }
    write_gz(
        Path::new(&format!("{}.chisq.gz", prefix.to_string_lossy())),
        &out,
    );
}

/// `.annot` overlay with `CHR SNP BP CM` followed by `columns`.
pub fn write_annot(path: &Path, columns: &[(&str, Vec<f64>)]) {
    let n = columns.first().map_or(0, |(_, v)| v.len());
    let mut out = String::from("CHR\tSNP\tBP\tCM");
    for (name, _) in columns {
        out.push('\t');
        out.push_str(name);
    }
    out.push('\n');
    for i in 0..n {
        out.push_str(&format!("1\trs{i}\t{}\t0", 1000 * (i + 1)));
        for (_, values) in columns {
            out.push_str(&format!("\t{}", values[i]));
        }
        out.push('\n');
    }
    write_text(path, &out);
}
