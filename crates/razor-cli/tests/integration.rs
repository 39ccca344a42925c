use razor_cli::input::Input;
use razor_cli::runner::Runner;
use razor_core::database::IndexedDatabase;
use razor_core::store::JsonStore;

const FASTA: &str = r#">sp|Q99536|VAT1_HUMAN Synaptic vesicle membrane protein VAT-1 homolog OS=Homo sapiens OX=9606 GN=VAT1 PE=1 SV=2
MSDEREVAEAATGEDASSPPPKTEAASDPQHPAASEGAAAAAASPPLLRCLVLTGFGGYD
KVKLQSRPAAPPAPGPGQLTLRLRACGLNFADLMARQGLYDRLPPLPVTPGMEGAGVVIA
VGEGVSDRKAGDRVMVLNRSGMWQEEVTVPSVQTFLIPEAMTFEEAAALLVNYITAYMVL
FDFGNLQPGHSVLVHMAAGGVGMAAVQLCRTVENVTVFGTASASKHEALKENGVTHPIDY
HTTDYVDEIKKISPKGVDIVMDPLGGSDTAKGYNLLKPMGKVVTYGMANLLTGPKRNLMA
LARTWWNQFSVTALQLLQANRAVCGFHLGYLDGEVELVSGVVARLLALYNQGHIKPHIDS
VWPFEKVADAMKQMQEKKNVGKVLLVPGPEKEN
"#;

const PSMS: &str = "query_id\tsequence\tscore\tdecoy\tprecursor_id
0\tAGDRVMVLNR\t30.0\tfalse\t0
0\tNLVMVRDGAR_decoy\t12.0\ttrue\t0
1\tLRAcCGLNFADLMAR\t25.0\tfalse\t1
2\tAGDRVoxMVLNR\t20.0\tfalse\t2
3\tNLVMVRDGAR_decoy\t5.0\ttrue\t3
";

#[test]
fn integration() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("razor-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let fasta = dir.join("Q99536.fasta");
    let psms = dir.join("psms.tsv");
    std::fs::write(&fasta, FASTA)?;
    std::fs::write(&psms, PSMS)?;

    let mut input: Input = serde_json::from_str(r#"{ "database": { "n_processes": 2 } }"#)?;
    input.database.update_fasta(fasta.display().to_string());
    input.output_directory = Some(dir.join("out").display().to_string());
    input.psm_paths = Some(vec![psms.display().to_string()]);

    let search = input.build().and_then(Runner::new)?.run()?;
    assert_eq!(search.output_paths.len(), 3);

    let library = JsonStore::open(dir.join("out").join("library.json"))?;
    let database = IndexedDatabase::load(&library)?;
    assert_eq!(database.n_possible_proteins("AGDRVMVLNR"), 1);
    assert_eq!(database.n_possible_proteins("NLVMVRDGAR_decoy"), 1);

    let results = std::fs::read_to_string(dir.join("out").join("results.razor.tsv"))?;
    let lines = results.lines().collect::<Vec<_>>();
    assert!(lines[0].starts_with("query_id\tpeptide\tscore"));
    // Query 0 keeps its target, the lone decoy sits below every target
    assert_eq!(lines.len(), 4);
    assert!(lines[1..].iter().all(|line| line.contains("\tQ99536\t")));

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}

#[test]
fn library_only() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("razor-cli-library-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let fasta = dir.join("Q99536.fasta");
    std::fs::write(&fasta, FASTA)?;

    let mut input = Input::default();
    input.database.update_fasta(fasta.display().to_string());
    input.output_directory = Some(dir.display().to_string());

    let search = input.build().and_then(Runner::new)?.run()?;
    assert_eq!(search.output_paths.len(), 2);
    assert!(dir.join("library.json").is_file());
    assert!(!dir.join("results.razor.tsv").exists());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
