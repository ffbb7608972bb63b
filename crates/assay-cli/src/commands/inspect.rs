use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;

use assay_arch::{archive_digest, load_archive};
use assay_core::serde::to_canonical_json_bytes;
use clap::Args;
use serde::Serialize;

use super::load_options;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Archive to summarise (.zip).
    #[arg(long)]
    pub archive: PathBuf,
    /// Include the SHA-256 of every entry.
    #[arg(long)]
    pub digest: bool,
    /// Directory used to unpack the archive instead of ~/.assay/scratch.
    #[arg(long)]
    pub scratch: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PlateSummary {
    plate_id: String,
    destination: String,
    samples: usize,
    fitted: usize,
    zprime: f64,
}

#[derive(Debug, Serialize)]
struct SkippedPlate {
    index: usize,
    destination: String,
    code: String,
}

#[derive(Debug, Serialize)]
struct ArchiveSummary {
    assay_type: String,
    legacy: bool,
    plates: usize,
    processed: Vec<PlateSummary>,
    skipped: Vec<SkippedPlate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<BTreeMap<String, String>>,
}

pub fn run(args: &InspectArgs) -> Result<(), Box<dyn Error>> {
    let loaded = load_archive(&args.archive, &load_options(&args.scratch))?;
    let mut summary = ArchiveSummary {
        assay_type: loaded.project.details.assay_type.clone(),
        legacy: loaded.legacy,
        plates: loaded.project.plates.len(),
        processed: Vec::new(),
        skipped: Vec::new(),
        entries: None,
    };
    if let Some(container) = &loaded.container {
        for plate in &container.plates {
            let records = &plate.processed.records;
            summary.processed.push(PlateSummary {
                plate_id: plate.plate_id.clone(),
                destination: plate.destination.clone(),
                samples: records.len(),
                fitted: records.iter().filter(|r| r.shown_fit().do_fit).count(),
                zprime: plate.references.zprime_mean,
            });
        }
        for warning in &container.warnings {
            summary.skipped.push(SkippedPlate {
                index: warning.index,
                destination: warning.destination.clone(),
                code: warning.error.info().code.clone(),
            });
        }
    }
    if args.digest {
        summary.entries = Some(archive_digest(&args.archive)?);
    }
    let json = to_canonical_json_bytes(&summary)?;
    println!("{}", String::from_utf8(json)?);
    Ok(())
}
