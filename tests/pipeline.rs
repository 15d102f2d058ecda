//! End-to-end runs of the file-level tool entry points.

use std::fs;
use std::path::Path;

use edstring::tools::{
    eds_to_leds_files, generate_patterns_file, msa_to_eds_files, msa_to_leds_files, stats_file,
    vcf_to_eds_files, vcf_to_leds_files,
};
use edstring::transform::is_leds;
use edstring::{Eds, StorageMode};

const MSA: &str = ">s1\nAGTC--TCTATA\n>s2\nAGTCCCTATATA\n>s3\nAGTC--TATATA\n";

fn write(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
}

#[test]
fn msa_to_eds_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let msa = dir.path().join("aln.msa");
    write(&msa, MSA);

    let stats = msa_to_eds_files(&msa, &dir.path().join("aln")).unwrap();
    assert_eq!(stats.records, 3);

    let eds_text = fs::read_to_string(dir.path().join("aln.eds")).unwrap();
    let seds_text = fs::read_to_string(dir.path().join("aln.seds")).unwrap();
    assert_eq!(eds_text.trim_end(), "{AGTC}{,CC}{T}{C,A}{TATA}");
    assert_eq!(seds_text.trim_end(), "{0}{1,3}{2}{0}{1}{2,3}{0}");

    // artifacts reload into a consistent value
    let eds = Eds::load_with_sources(
        dir.path().join("aln.eds"),
        dir.path().join("aln.seds"),
        StorageMode::Full,
    )
    .unwrap();
    assert_eq!(eds.len(), 5);
    assert_eq!(eds.cardinality(), 7);
}

#[test]
fn msa_to_leds_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let msa = dir.path().join("aln.msa");
    write(&msa, MSA);

    msa_to_leds_files(&msa, &dir.path().join("aln"), 4).unwrap();

    let eds_text = fs::read_to_string(dir.path().join("aln_l4.leds")).unwrap();
    let seds_text = fs::read_to_string(dir.path().join("aln_l4.seds")).unwrap();
    assert_eq!(eds_text.trim_end(), "{AGTC}{TC,CCTA,TA}{TATA}");
    assert_eq!(seds_text.trim_end(), "{0}{1}{2}{3}{0}");
}

#[test]
fn eds_to_leds_with_sources() {
    let dir = tempfile::tempdir().unwrap();
    let eds = dir.path().join("in.eds");
    let seds = dir.path().join("in.seds");
    write(&eds, "{AGTC}{,CC}{T}{C,A}{TATA}\n");
    write(&seds, "{0}{1,3}{2}{0}{1}{2,3}{0}\n");

    eds_to_leds_files(&eds, Some(&seds), &dir.path().join("out"), 4, 2).unwrap();

    let leds = Eds::load_with_sources(
        dir.path().join("out_l4.leds"),
        dir.path().join("out_l4.seds"),
        StorageMode::Full,
    )
    .unwrap();
    assert!(is_leds(&leds, 4));
    assert!(leds.has_sources());
    assert_eq!(leds.len(), 3);
}

#[test]
fn eds_to_leds_without_sources_is_cartesian() {
    let dir = tempfile::tempdir().unwrap();
    let eds = dir.path().join("in.eds");
    write(&eds, "{A,C}{G}{T,G}\n");

    eds_to_leds_files(&eds, None, &dir.path().join("out"), 2, 1).unwrap();

    let leds = Eds::load(dir.path().join("out_l2.leds"), StorageMode::Full).unwrap();
    assert!(is_leds(&leds, 2));
    assert_eq!(leds.cardinality(), 4);
    assert!(!dir.path().join("out_l2.seds").exists());
}

#[test]
fn vcf_pipeline_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let vcf = dir.path().join("calls.vcf");
    let fasta = dir.path().join("ref.fa");
    write(
        &vcf,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts1\ts2\n\
         ref\t2\t.\tA\tC\t.\t.\t.\tGT\t0|1\t1|1\n",
    );
    write(&fasta, ">ref\nGAAAG\n");

    let stats = vcf_to_eds_files(&vcf, &fasta, &dir.path().join("calls")).unwrap();
    assert_eq!(stats.records, 1);
    assert_eq!(stats.paths, 2);

    let eds_text = fs::read_to_string(dir.path().join("calls.eds")).unwrap();
    let seds_text = fs::read_to_string(dir.path().join("calls.seds")).unwrap();
    assert_eq!(eds_text.trim_end(), "{G}{A,C}{AAG}");
    assert_eq!(seds_text.trim_end(), "{0}{1}{1,2}{0}");

    vcf_to_leds_files(&vcf, &fasta, &dir.path().join("calls"), 2, 1).unwrap();
    let leds = Eds::load_with_sources(
        dir.path().join("calls_l2.leds"),
        dir.path().join("calls_l2.seds"),
        StorageMode::Full,
    )
    .unwrap();
    assert!(is_leds(&leds, 2));
}

#[test]
fn pattern_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let eds = dir.path().join("in.eds");
    write(&eds, "{ACGT}{A,ACA}{CGT}{T,TG}\n");

    generate_patterns_file(&eds, &dir.path().join("in"), 5, 4).unwrap();

    let text = fs::read_to_string(dir.path().join("in.edp")).unwrap();
    let patterns: Vec<&str> = text.lines().collect();
    assert_eq!(patterns.len(), 5);
    assert!(patterns.iter().all(|p| p.len() == 4));
}

#[test]
fn stats_over_files() {
    let dir = tempfile::tempdir().unwrap();
    let eds = dir.path().join("in.eds");
    let seds = dir.path().join("in.seds");
    write(&eds, "{ACGT}{A,ACA}{CGT}{T,TG}\n");
    write(&seds, "{0}{1,3}{2}{0}{1}{2,3}\n");

    let stats = stats_file(&eds, Some(&seds)).unwrap();
    assert_eq!(stats.num_symbols, 4);
    assert_eq!(stats.cardinality, 6);
    assert_eq!(stats.total_chars, 14);
    assert_eq!(stats.num_degenerate_symbols, 2);
    assert_eq!(stats.num_paths, 3);

    // the record serializes for machine consumers
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["num_symbols"], 4);
    assert_eq!(json["num_common_chars"], 7);
}
