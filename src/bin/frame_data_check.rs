use anyhow::{anyhow, Result};
use kestrel_vat::frames::CombinedFrameData;
use serde::Serialize;
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    match run() {
        Ok(summary) => {
            if summary.invalid > 0 {
                process::exit(2);
            }
        }
        Err(err) => {
            eprintln!("frame_data_check error: {err:?}");
            process::exit(1);
        }
    }
}

#[derive(Default, Serialize)]
struct RunSummary {
    checked: usize,
    invalid: usize,
}

struct CliOptions {
    json: bool,
    show_help: bool,
    targets: Vec<String>,
}

fn run() -> Result<RunSummary> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_cli_args(&args)?;
    if options.show_help {
        print_usage();
        return Ok(RunSummary::default());
    }
    let targets = resolve_targets(&options.targets)?;
    let mut summary = RunSummary::default();
    for path in targets {
        summary.checked += 1;
        match check_file(&path) {
            Ok(report) => {
                println!("OK {} ({})", path.display(), report);
            }
            Err(err) => {
                summary.invalid += 1;
                println!("[ERROR] {} - {err:#}", path.display());
            }
        }
    }
    println!("Checked {} frame data files ({} invalid)", summary.checked, summary.invalid);
    if options.json {
        println!("{}", json!({ "summary": summary }));
    }
    Ok(summary)
}

fn check_file(path: &Path) -> Result<String> {
    let data = CombinedFrameData::load(path)?;
    data.validate()?;
    let bones = if data.has_bone_data() {
        let limbs = data.bones.iter().filter(|bone| bone.is_limb_pair).count();
        format!("{} bones ({limbs} limb pairs) x {} frames", data.bone_count, data.total_frame_count)
    } else {
        "no bone data".to_string()
    };
    let digest = data.fingerprint()?;
    Ok(format!("{} clips, atlas height {}, {bones}, blake3 {}", data.animation_count(), data.atlas_height(), &digest[..16]))
}

fn print_usage() {
    eprintln!(
        "Frame Data Check

Usage:
  frame_data_check [--json] <file> [<file>...]

Each <file> holds bincode frame data. Invalid files exit with code 2.
"
    );
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions> {
    let mut options = CliOptions { json: false, show_help: false, targets: Vec::new() };
    for arg in args {
        match arg.as_str() {
            "--json" => options.json = true,
            "--help" | "-h" => options.show_help = true,
            _ if arg.starts_with("--") => {
                return Err(anyhow!("unknown flag '{arg}'"));
            }
            _ => options.targets.push(arg.clone()),
        }
    }
    Ok(options)
}

fn resolve_targets(inputs: &[String]) -> Result<Vec<PathBuf>> {
    if inputs.is_empty() {
        return Err(anyhow!("no frame data files given"));
    }
    inputs
        .iter()
        .map(|input| {
            let path = PathBuf::from(input);
            if path.is_file() {
                Ok(path)
            } else {
                Err(anyhow!("'{input}' is not a frame data file"))
            }
        })
        .collect()
}
